use super::{world::RopeKey, Rope, ROPE_SEGMENTS};
use crate::math::fixed::{Fixed, FixedVec3, FP_SHIFT};

/// The point mass at the held end of a rope.
///
/// A detached pendulum has neither a node nor a rope.
/// `rope` only names the rope it hangs from and never keeps it alive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pendulum {
    pub position: FixedVec3,
    pub velocity: FixedVec3,
    /// Index of the rope segment the pendulum is anchored to.
    pub node: Option<usize>,
    pub rope: Option<RopeKey>,
}

impl Pendulum {
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.node.is_some()
    }

    /// Anchor the pendulum to a segment of a rope.
    ///
    /// A pendulum that was detached also picks up the segment's velocity,
    /// so grabbing a swinging rope keeps it swinging.
    pub fn set_pendulum_point(&mut self, key: RopeKey, rope: &Rope, node: usize) {
        let node = node.min(ROPE_SEGMENTS - 1);
        let segment = &rope.segments[node];
        self.position = segment.position;
        if self.node.is_none() {
            self.velocity += segment.velocity;
        }
        self.node = Some(node);
        self.rope = Some(key);
    }

    /// Let go of the rope. Every segment above the anchor node takes the
    /// node's velocity so the freed part keeps swinging together.
    pub fn detach(&mut self, rope: &mut Rope) {
        if let Some(node) = self.node {
            let node = node.min(ROPE_SEGMENTS - 1);
            let velocity = rope.segments[node].velocity;
            for segment in &mut rope.segments[..node] {
                segment.velocity = velocity;
            }
        }
        *self = Pendulum::default();
    }

    /// Apply gravity and horizontal damping, then move.
    pub fn integrate(&mut self) {
        self.velocity.y += Fixed(6 << FP_SHIFT);
        self.position += self.velocity;
        self.velocity.x -= self.velocity.x >> 8;
        self.velocity.z -= self.velocity.z >> 8;
    }

    /// Add a swing impulse, scaled by how far down the rope the pendulum hangs.
    pub fn add_swing_velocity(&mut self, impulse: FixedVec3) {
        let node = self.node.map_or(-1, |node| node as i64);
        let node2 = 2 * (node >> 1);
        let segments = ROPE_SEGMENTS as i64;
        let impulse = if node2 < segments {
            impulse.scale(Fixed(4096 / (segments - node2) * 256))
        } else {
            impulse
        };
        self.velocity += impulse;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rope::{world::RopeWorld, RopeParams};

    fn swinging_rope() -> (RopeWorld, RopeKey) {
        let mut world = RopeWorld::new();
        let key = world.spawn(RopeParams::default());
        let rope = world.get_mut(key).unwrap();
        for (i, segment) in rope.segments.iter_mut().enumerate() {
            segment.velocity = FixedVec3::from_int(i as i64, 0, -(i as i64));
        }
        (world, key)
    }

    #[test]
    fn attach_inherits_velocity_once() {
        let (world, key) = swinging_rope();
        let rope = world.get(key).unwrap();

        let mut pendulum = Pendulum::default();
        pendulum.set_pendulum_point(key, rope, 5);
        assert_eq!(pendulum.node, Some(5));
        assert_eq!(pendulum.rope, Some(key));
        assert_eq!(pendulum.position, rope.segments[5].position);
        assert_eq!(pendulum.velocity, FixedVec3::from_int(5, 0, -5));

        // moving along the rope while attached doesn't add velocity again
        pendulum.set_pendulum_point(key, rope, 7);
        assert_eq!(pendulum.position, rope.segments[7].position);
        assert_eq!(pendulum.velocity, FixedVec3::from_int(5, 0, -5));
    }

    #[test]
    fn detach_keeps_segment_velocities_continuous() {
        let (mut world, key) = swinging_rope();
        let mut pendulum = Pendulum::default();
        pendulum.set_pendulum_point(key, world.get(key).unwrap(), 9);

        let rope = world.get_mut(key).unwrap();
        let node_velocity = rope.segments[9].velocity;
        let below = rope.segments[10].velocity;
        pendulum.detach(rope);

        assert_eq!(pendulum, Pendulum::default());
        assert!(!pendulum.is_attached());
        for segment in &rope.segments[..=9] {
            assert_eq!(segment.velocity, node_velocity);
        }
        assert_eq!(rope.segments[10].velocity, below);
    }

    #[test]
    fn integrate_falls_and_damps() {
        let mut pendulum = Pendulum {
            velocity: FixedVec3::from_int(256, 0, -256),
            ..Default::default()
        };
        pendulum.integrate();
        assert_eq!(pendulum.position, FixedVec3::from_int(256, 6, -256));
        assert_eq!(pendulum.velocity, FixedVec3::from_int(255, 6, -255));
    }

    #[test]
    fn swing_impulse_scales_with_depth() {
        let impulse = FixedVec3::from_int(100, 0, 0);

        let mut high = Pendulum {
            node: Some(2),
            ..Default::default()
        };
        high.add_swing_velocity(impulse);
        let mut low = Pendulum {
            node: Some(20),
            ..Default::default()
        };
        low.add_swing_velocity(impulse);

        assert!(high.velocity.x < low.velocity.x);
        // 4096 / (24 - 20) * 256 is exactly 4 in fixed point
        assert_eq!(low.velocity, FixedVec3::from_int(400, 0, 0));
    }
}
