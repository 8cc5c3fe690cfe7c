//! Fixed-point ropes that hang from a point and can be grabbed and swung on.
//!
//! A rope is a chain of [`ROPE_SEGMENTS`] points kept roughly
//! [`segment_length`][Rope::segment_length] apart by the velocity corrections in [`rigid`].
//! Positions are relative to the rope's anchor and in 16.16 fixed point.
//! Each segment also has a separately computed render position
//! that always keeps the exact segment length.
//! The world is y-down, so gravity increases y.

use crate::math::fixed::{normalise, Fixed, FixedVec3, FP_SHIFT};

pub mod control;
pub mod pendulum;
pub mod rigid;
pub mod world;

use pendulum::Pendulum;
use world::RopeKey;

/// Number of points in every rope.
pub const ROPE_SEGMENTS: usize = 24;
/// How many ticks a rope spends uncoiling after being spawned coiled up.
const COIL_TICKS: u32 = 30;
/// Extra reach added to the grab radius, in world units.
const GRAB_MARGIN: i64 = 64;

/// One point of a rope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RopeSegment {
    /// Simulated position relative to the rope's anchor.
    pub position: FixedVec3,
    pub velocity: FixedVec3,
    /// Render position, rebuilt every tick from the normalized directions.
    pub mesh_segment: FixedVec3,
    /// Unit vector (`1 << 16` long) from this segment to the next.
    pub normalized_direction: FixedVec3,
}

/// Parameters for constructing a [`Rope`][self::Rope], in whole world units.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize),
    serde(default)
)]
pub struct RopeParams {
    /// World position the rope hangs from.
    pub anchor: [i64; 3],
    /// Direction the rope initially extends in. Doesn't need to be normalized.
    pub direction: [i64; 3],
    pub segment_length: i64,
    /// Spawn the rope bunched up at the top, falling open over the first ticks.
    pub coiled: bool,
}
impl Default for RopeParams {
    fn default() -> Self {
        Self {
            anchor: [0, 0, 0],
            direction: [0, 1, 0],
            segment_length: 128,
            coiled: false,
        }
    }
}

/// How a rope is being driven during one tick.
pub(crate) enum Drive<'a> {
    /// Held by the player at `node`, with the pendulum standing in for them.
    Held {
        pendulum: &'a mut Pendulum,
        key: RopeKey,
        node: usize,
    },
    /// Swinging freely. Only the pendulum's node is read.
    Free { pendulum: &'a Pendulum },
}

#[derive(Clone, Debug)]
pub struct Rope {
    /// World-space anchor in fixed point.
    pub position: FixedVec3,
    pub segment_length: Fixed,
    /// Ticks of uncoiling left.
    pub coiled: u32,
    /// Inactive ropes are not simulated.
    pub active: bool,
    pub segments: [RopeSegment; ROPE_SEGMENTS],
}

impl Rope {
    /// Lay out a new rope in a straight line from the anchor, or coiled up under it.
    /// New ropes start out inactive.
    pub fn new(params: RopeParams) -> Self {
        let [dx, dy, dz] = params.direction;
        let dir = normalise(FixedVec3::from_int(dx, dy, dz));
        let [ax, ay, az] = params.anchor;
        let segment_length = Fixed::from_int(params.segment_length);

        let mut segments = [RopeSegment::default(); ROPE_SEGMENTS];
        for (i, segment) in segments.iter_mut().enumerate() {
            let i = i as i64;
            segment.position = dir.scale(Fixed(i * segment_length.0));
            if params.coiled {
                segment.position.x = Fixed(i * 1024);
                segment.position.y = segment.position.y >> 4;
                segment.velocity = FixedVec3::from_raw(16384, 3145728 - i * 131072, 16384);
            }
        }

        let mut rope = Self {
            position: FixedVec3::from_int(ax, ay, az),
            segment_length,
            coiled: if params.coiled { COIL_TICKS } else { 0 },
            active: false,
            segments,
        };
        rope.update_directions();
        rope.update_mesh(None);
        rope
    }

    /// Advance the rope by one tick.
    pub(crate) fn dynamics(&mut self, drive: Drive<'_>) {
        if self.coiled > 0 {
            self.coiled -= 1;
            if self.coiled == 0 {
                for segment in &mut self.segments {
                    segment.velocity.y = Fixed::ZERO;
                }
            }
        }

        let (start, held) = match drive {
            Drive::Held {
                pendulum,
                key,
                node,
            } => {
                let node = node.clamp(1, ROPE_SEGMENTS - 1);
                let on_this_rope = pendulum.rope == Some(key);
                let moved_from = pendulum.node.filter(|&n| on_this_rope && n != node);
                if !on_this_rope || pendulum.node != Some(node) {
                    pendulum.set_pendulum_point(key, self, node);
                }
                self.follow_pendulum(pendulum, node, moved_from);
                (node, Some(node))
            }
            Drive::Free { pendulum } => (pendulum.node.unwrap_or(0), None),
        };

        for i in start..ROPE_SEGMENTS - 1 {
            let (upper, lower) = self.segments.split_at_mut(i + 1);
            let (seg, next) = (&mut upper[i], &mut lower[0]);
            if held == Some(i) {
                // the held node is pinned to the pendulum
                rigid::model_rigid_rope(
                    seg.position,
                    next.position,
                    seg.velocity,
                    &mut next.velocity,
                    self.segment_length,
                );
            } else {
                rigid::model_rigid(
                    seg.position,
                    next.position,
                    &mut seg.velocity,
                    &mut next.velocity,
                    self.segment_length,
                );
            }
        }

        for segment in &mut self.segments {
            segment.position += segment.velocity;
        }

        for segment in &mut self.segments[start..] {
            let vel = &mut segment.velocity;
            vel.y += Fixed(3 << FP_SHIFT);
            vel.x -= vel.x >> 4;
            vel.z -= vel.z >> 4;
        }

        self.segments[0].position = FixedVec3::ZERO;
        self.segments[0].velocity = FixedVec3::ZERO;

        self.update_directions();
        self.update_mesh(held);
    }

    /// Swing the pendulum, then lay the part of the rope above the held node
    /// in a straight line from the root to the pendulum.
    ///
    /// `moved_from` is the node the pendulum was anchored to before being
    /// moved along this rope this tick.
    fn follow_pendulum(
        &mut self,
        pendulum: &mut Pendulum,
        node: usize,
        moved_from: Option<usize>,
    ) {
        let len = self.segment_length;
        let root = self.segments[0];
        rigid::model_rigid_rope(
            root.position,
            pendulum.position,
            root.velocity,
            &mut pendulum.velocity,
            Fixed(len.0 * node as i64),
        );
        pendulum.integrate();

        let dir = normalise(pendulum.position - root.position);
        for (i, segment) in (1..).zip(&mut self.segments[1..node]) {
            segment.position = root.position + dir.scale(Fixed(len.0 * i));
            segment.velocity = FixedVec3::ZERO;
        }
        self.segments[node].position = pendulum.position;
        self.segments[node].velocity = FixedVec3::ZERO;
        self.segments[0].velocity = FixedVec3::ZERO;

        if let Some(previous) = moved_from {
            // the hanging part starts from rest after the hands move along the rope
            for segment in &mut self.segments[previous.min(node)..] {
                segment.velocity = FixedVec3::ZERO;
            }
        }
    }

    fn update_directions(&mut self) {
        for i in 0..ROPE_SEGMENTS - 1 {
            let delta = self.segments[i + 1].position - self.segments[i].position;
            self.segments[i].normalized_direction = normalise(delta);
        }
    }

    /// Rebuild render positions by stepping along the segment directions,
    /// starting from the root or outwards in both directions from a held node.
    fn update_mesh(&mut self, held: Option<usize>) {
        let len = self.segment_length;
        let start = held.unwrap_or(0);
        self.segments[start].mesh_segment = self.segments[start].position;

        for i in start + 1..ROPE_SEGMENTS {
            let prev = &self.segments[i - 1];
            let step = prev.normalized_direction.scale(len);
            self.segments[i].mesh_segment = prev.mesh_segment + step;
        }
        for i in (0..start).rev() {
            let step = self.segments[i].normalized_direction.scale(len);
            self.segments[i].mesh_segment = self.segments[i + 1].mesh_segment - step;
        }
    }

    /// Index of the first segment a sphere at world position `point`
    /// is close enough to grab, if any.
    pub fn rope_node_collision(&self, point: FixedVec3, radius: i64) -> Option<usize> {
        let [ax, ay, az] = self.position.descaled();
        let [px, py, pz] = point.descaled();
        let reach = radius + GRAB_MARGIN;

        (0..ROPE_SEGMENTS - 2).find(|&i| {
            let upper = self.segments[i].mesh_segment;
            let lower = self.segments[i + 1].mesh_segment;
            if py <= ay + upper.y.to_int() || py >= ay + lower.y.to_int() {
                return false;
            }
            let [mx, my, mz] = (upper + lower).shr(FP_SHIFT + 1).raw();
            let (dx, dy, dz) = (px - (ax + mx), py - (ay + my), pz - (az + mz));
            dx * dx + dy * dy + dz * dz < reach * reach
        })
    }

    /// World position `distance` units down the rendered rope from its anchor.
    /// Distances past the end extend the second-to-last segment.
    pub fn position_at(&self, distance: i64) -> FixedVec3 {
        let len = self.segment_length.to_int().max(1);
        let distance = distance.max(0);
        let index = ((distance / len) as usize).min(ROPE_SEGMENTS - 2);
        let along = distance - index as i64 * len;

        let segment = &self.segments[index];
        self.position
            + segment.mesh_segment
            + segment.normalized_direction.scale(Fixed::from_int(along))
    }

    /// Render positions in world space, for drawing.
    pub fn mesh_world(&self) -> impl Iterator<Item = FixedVec3> + '_ {
        self.segments
            .iter()
            .map(move |segment| self.position + segment.mesh_segment)
    }
}
