//! What the player does with a rope: which rope and segment they hold,
//! pushing it into a swing, and lining their pose up with it.

use super::{pendulum::Pendulum, world::RopeKey, Rope, ROPE_SEGMENTS};
use crate::math::{
    fixed::{
        cos_w2v, cross_w2v, normalise, normalise_w2v, sin_w2v, FixedVec3, FP_SHIFT, W2V_SHIFT,
    },
    Angle,
};

/// The rope the player is holding on to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RopeControlData {
    pub rope: RopeKey,
    /// Segment the player's hands are on.
    pub segment: usize,
    /// Facing direction as a 16-bit engine angle.
    pub heading: i16,
}

impl RopeControlData {
    /// The segment the pendulum anchors to, one below the hands.
    #[inline]
    pub fn anchor_node(&self) -> usize {
        (self.segment + 1).min(ROPE_SEGMENTS - 1)
    }
}

/// Pose that puts the player on the rope.
#[derive(Clone, Copy, Debug)]
pub struct RopeAlignment {
    /// World position in fixed point.
    pub position: FixedVec3,
    pub heading: Angle,
    pub pitch: Angle,
    pub roll: Angle,
}

/// Push the pendulum along `heading`.
/// `speed` is read as unsigned, so negative speeds become large pushes.
pub fn apply_velocity_to_rope(pendulum: &mut Pendulum, heading: i16, speed: i16) {
    let speed = speed as u16 as i64;
    let impulse = FixedVec3::from_raw(
        (speed * sin_w2v(heading)) >> 2,
        0,
        (speed * cos_w2v(heading)) >> 2,
    );
    pendulum.add_swing_velocity(impulse);
}

/// Align a body held at `offset` world units below the held segment,
/// facing along the rope with the control's heading.
pub fn rope_alignment(rope: &Rope, control: &RopeControlData, offset: i64) -> RopeAlignment {
    let len = rope.segment_length.to_int();
    let distance = control.segment as i64 * len + offset;
    let position = rope.position_at(distance);
    let above = rope.position_at(distance - len * 3 / 2);

    let up = normalise(above - position).shr(FP_SHIFT - W2V_SHIFT);
    let side_heading = control.heading.wrapping_sub(16384);
    let side = FixedVec3::from_raw(sin_w2v(side_heading), 0, cos_w2v(side_heading));
    let forward = normalise_w2v(cross_w2v(side, up));
    let right = cross_w2v(up, forward);

    let [fx, fy, fz] = forward.raw().map(|c| c as f64);
    let [rx, ry, rz] = right.raw().map(|c| c as f64);
    RopeAlignment {
        position,
        heading: Angle::Rad(fx.atan2(fz)),
        pitch: Angle::Rad((-fy).atan2(fx.hypot(fz))),
        roll: Angle::Rad(ry.atan2(rx.hypot(rz))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rope::{world::RopeWorld, RopeParams};
    use std::f64::consts::PI;

    fn control_on(world: &mut RopeWorld, params: RopeParams, heading: i16) -> RopeControlData {
        RopeControlData {
            rope: world.spawn(params),
            segment: 5,
            heading,
        }
    }

    #[test]
    fn anchor_is_below_the_hands() {
        let mut world = RopeWorld::new();
        let mut control = control_on(&mut world, RopeParams::default(), 0);
        assert_eq!(control.anchor_node(), 6);
        control.segment = ROPE_SEGMENTS - 1;
        assert_eq!(control.anchor_node(), ROPE_SEGMENTS - 1);
    }

    #[test]
    fn swing_follows_heading() {
        let mut pendulum = Pendulum {
            node: Some(20),
            ..Default::default()
        };
        apply_velocity_to_rope(&mut pendulum, 16384, 16);
        // 16 * (1 << 14) >> 2, scaled by 4 for node 20
        assert_eq!(pendulum.velocity, FixedVec3::from_raw(4 * 65536, 0, 0));

        let mut backwards = Pendulum {
            node: Some(20),
            ..Default::default()
        };
        apply_velocity_to_rope(&mut backwards, -32768, 16);
        assert_eq!(backwards.velocity, FixedVec3::from_raw(0, 0, -4 * 65536));
    }

    #[test]
    fn aligns_to_a_hanging_rope() {
        let mut world = RopeWorld::new();
        let params = RopeParams {
            anchor: [0, -2048, 0],
            ..Default::default()
        };

        let control = control_on(&mut world, params, 0);
        let rope = world.get(control.rope).unwrap();
        let aligned = rope_alignment(rope, &control, 0);
        assert_eq!(aligned.position, FixedVec3::from_int(0, -2048 + 5 * 128, 0));
        assert!(aligned.heading.rad().abs() < 1e-9);
        assert!(aligned.pitch.rad().abs() < 1e-9);
        assert!(aligned.roll.rad().abs() < 1e-9);

        let turned = RopeControlData {
            heading: 16384,
            ..control
        };
        let aligned = rope_alignment(rope, &turned, 64);
        assert_eq!(aligned.position, FixedVec3::from_int(0, -2048 + 5 * 128 + 64, 0));
        assert!((aligned.heading.rad() - PI / 2.0).abs() < 1e-9);
        assert!(aligned.pitch.rad().abs() < 1e-9);
    }

    #[test]
    fn leaning_rope_rolls_the_body() {
        let mut world = RopeWorld::new();
        let params = RopeParams {
            direction: [100, 100, 0],
            ..Default::default()
        };
        let control = control_on(&mut world, params, 0);
        let aligned = rope_alignment(world.get(control.rope).unwrap(), &control, 0);
        assert!(aligned.heading.rad().abs() < 1e-9);
        assert!((aligned.roll.rad() - PI / 4.0).abs() < 1e-3);
    }
}
