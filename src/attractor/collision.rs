//! Closest points on attractors and the collision records built from them.

use super::{set::AttractorKey, Attractor};
use crate::math::{self as m, Angle, Unit, Vec3};

/// Where a query point is relative to one segment of an attractor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Proximity {
    /// Closest point on the segment.
    pub intersection: Vec3,
    /// Distance to the closest point, ignoring the query axis.
    pub distance_2d: f64,
    pub distance_3d: f64,
    /// Distance of the closest point from the start of the attractor.
    pub chain_distance: f64,
    pub segment_id: usize,
}

/// Everything movement code needs to know to decide whether it can
/// interact with an attractor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttractorCollision {
    /// The attractor this was computed against, if it's stored in an
    /// [`AttractorSet`][super::set::AttractorSet].
    pub attractor: Option<AttractorKey>,
    pub proximity: Proximity,
    /// Direction of the segment in the horizontal plane. Zero is along +z.
    pub heading_angle: Angle,
    /// Incline of the segment, positive when it rises (towards -y).
    pub slope_angle: Angle,
    /// The query point lies on the segment as seen along the query axis.
    pub is_intersected: bool,
    /// The closest point is ahead of the query point along the query heading.
    pub is_in_front: bool,
}

/// Closest point to `pos` on the segment `start..end` when looking along `axis`.
///
/// Both are projected to the plane perpendicular to `axis` to find the closest
/// parameter, and the point is then taken from the unprojected segment.
/// Segments parallel to `axis` give `start`.
pub fn closest_point_on_line_perp(pos: Vec3, start: Vec3, end: Vec3, axis: Unit<Vec3>) -> Vec3 {
    let line = end - start;
    let line_perp = m::reject(line, axis);
    let len_sq = line_perp.mag_sq();
    if len_sq < m::EPSILON {
        return start;
    }
    let t = m::reject(pos - start, axis).dot(line_perp) / len_sq;
    start + line * t.clamp(0.0, 1.0)
}

impl Attractor {
    pub fn proximity(&self, pos: Vec3, segment_id: usize, axis: Unit<Vec3>) -> Proximity {
        let segment_id = self.clamp_segment_id(segment_id);
        let (start, end) = self.segment(segment_id);
        let intersection = closest_point_on_line_perp(pos, start, end, axis);
        Proximity {
            intersection,
            distance_2d: m::distance_perp(pos, intersection, axis),
            distance_3d: (intersection - pos).mag(),
            chain_distance: self.chain_distance_at_segment(segment_id)
                + (intersection - start).mag(),
            segment_id,
        }
    }

    /// Collision against one segment, for a query point facing `heading`.
    pub fn collision(
        &self,
        segment_id: usize,
        pos: Vec3,
        heading: Angle,
        axis: Unit<Vec3>,
    ) -> AttractorCollision {
        let proximity = self.proximity(pos, segment_id, axis);
        let (start, end) = self.segment(proximity.segment_id);
        let dir = end - start;

        AttractorCollision {
            attractor: None,
            proximity,
            heading_angle: Angle::Rad(dir.x.atan2(dir.z)),
            slope_angle: Angle::Rad((-dir.y).atan2(dir.x.hypot(dir.z))),
            is_intersected: proximity.distance_2d <= m::EPSILON,
            is_in_front: heading.heading_dir().dot(proximity.intersection - pos) > 0.0,
        }
    }

    /// Collision against the segment containing a chain distance.
    pub fn collision_at_chain_distance(
        &self,
        chain_distance: f64,
        pos: Vec3,
        heading: Angle,
        axis: Unit<Vec3>,
    ) -> AttractorCollision {
        let segment_id = self.segment_id_at_chain_distance(chain_distance);
        self.collision(segment_id, pos, heading, axis)
    }
}
