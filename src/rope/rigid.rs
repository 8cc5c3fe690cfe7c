//! Velocity corrections that keep two rope points at a fixed distance apart.
//!
//! Both solvers do a single relaxation pass: they look at where the points
//! would be after this tick's velocities and nudge the velocities towards
//! the target distance. Running them once per tick gives ropes a slightly
//! springy feel, which is the intended look.

use crate::math::fixed::{normalise, Fixed, FixedVec3, FP_ONE};

/// Distance between the predicted positions of two points.
/// The square root is taken of the descaled components in floating point
/// and the result truncated back to fixed point.
#[inline]
fn predicted_distance(delta: FixedVec3) -> i64 {
    let [x, y, z] = delta.descaled();
    let sum_sq = (x * x + y * y + z * z).unsigned_abs();
    (FP_ONE as f64 * (sum_sq as f64).sqrt()) as i64
}

/// Correct a link in the middle of the chain.
/// Half of the length error is added to `velocity` and half taken from `next_velocity`.
pub fn model_rigid(
    segment: FixedVec3,
    next_segment: FixedVec3,
    velocity: &mut FixedVec3,
    next_velocity: &mut FixedVec3,
    length: Fixed,
) {
    let delta = (next_segment + *next_velocity) - (segment + *velocity);
    let error = Fixed((predicted_distance(delta) - length.0) >> 1);
    let correction = normalise(delta).scale(error);

    *velocity += correction;
    *next_velocity -= correction;
}

/// Correct a link whose first point is pinned, like the rope's root
/// with a pendulum hanging off it. The whole length error goes to `pendulum`.
pub fn model_rigid_rope(
    segment: FixedVec3,
    pendulum: FixedVec3,
    velocity: FixedVec3,
    pendulum_velocity: &mut FixedVec3,
    length: Fixed,
) {
    let delta = (pendulum + *pendulum_velocity) - (segment + velocity);
    let error = Fixed(predicted_distance(delta) - length.0);

    *pendulum_velocity -= normalise(delta).scale(error);
}
