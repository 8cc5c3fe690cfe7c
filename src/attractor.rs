//! Attractors are polylines along level geometry, like ledges and bridge edges,
//! that the player can snap to for context-sensitive actions.
//!
//! An attractor is measured by its chain distance, the distance along the
//! polyline from its first point. Attractors whose last point coincides with
//! the first are loops and chain distances wrap around them.

use crate::{
    collision::AABB,
    math::{self as m, Vec3},
};
use itertools::izip;

pub mod collision;
pub mod generate;
pub mod set;

use set::AttractorKey;

/// Index of a room in the level.
pub type RoomNumber = i32;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize)
)]
pub enum AttractorType {
    /// An edge that can be hung from or stood on.
    #[default]
    Edge,
}

#[derive(thiserror::Error, Debug)]
pub enum AttractorError {
    #[error("An attractor needs at least one point")]
    NoPoints,
    #[error("No attractor with key {0:?}")]
    UnknownAttractor(AttractorKey),
    #[error("Failed to update the attractor bounding tree")]
    Tree(#[from] crate::collision::bvh::BoundingTreeError),
}

/// A polyline in world space belonging to a room.
#[derive(Clone, Debug)]
pub struct Attractor {
    ty: AttractorType,
    points: Vec<Vec3>,
    room: RoomNumber,
    segment_lengths: Vec<f64>,
    length: f64,
    aabb: AABB,
}

impl Attractor {
    pub fn new(
        ty: AttractorType,
        points: Vec<Vec3>,
        room: RoomNumber,
    ) -> Result<Self, AttractorError> {
        let aabb = AABB::from_points(points.iter().copied()).ok_or(AttractorError::NoPoints)?;
        let segment_lengths: Vec<f64> = izip!(&points, points.iter().skip(1))
            .map(|(start, end)| (*end - *start).mag())
            .collect();
        Ok(Self {
            ty,
            length: segment_lengths.iter().sum(),
            segment_lengths,
            points,
            room,
            aabb,
        })
    }

    /// Replace the points and room, keeping the type.
    /// Nothing changes if there are no points.
    pub fn update(&mut self, points: Vec<Vec3>, room: RoomNumber) -> Result<(), AttractorError> {
        *self = Self::new(self.ty, points, room)?;
        Ok(())
    }

    #[inline]
    pub fn ty(&self) -> AttractorType {
        self.ty
    }

    #[inline]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    #[inline]
    pub fn room(&self) -> RoomNumber {
        self.room
    }

    /// Total length of the polyline.
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    #[inline]
    pub fn aabb(&self) -> AABB {
        self.aabb
    }

    /// Number of line segments. A single point counts as one degenerate segment.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segment_lengths.len().max(1)
    }

    pub fn is_looped(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) if self.points.len() > 2 => {
                (*last - *first).mag() <= m::EPSILON
            }
            _ => false,
        }
    }

    /// Endpoints of a segment. Out-of-range ids are clamped with a warning.
    pub fn segment(&self, segment_id: usize) -> (Vec3, Vec3) {
        let id = self.clamp_segment_id(segment_id);
        let start = self.points[id];
        let end = self.points.get(id + 1).copied().unwrap_or(start);
        (start, end)
    }

    pub(crate) fn clamp_segment_id(&self, segment_id: usize) -> usize {
        let last = self.segment_count() - 1;
        if segment_id > last {
            log::warn!(
                "Segment {} out of range for an attractor with {} segments, using {}",
                segment_id,
                self.segment_count(),
                last
            );
            last
        } else {
            segment_id
        }
    }

    /// Bring a chain distance into `0..=length`, wrapping around loops.
    fn wrap_chain_distance(&self, chain_distance: f64) -> f64 {
        if self.is_looped() && self.length > m::EPSILON {
            chain_distance.rem_euclid(self.length)
        } else {
            chain_distance.clamp(0.0, self.length)
        }
    }

    /// Segment containing a chain distance and how far into the segment it is.
    fn locate(&self, chain_distance: f64) -> (usize, f64) {
        let mut remaining = self.wrap_chain_distance(chain_distance);
        let last = self.segment_count() - 1;
        for (id, &segment_length) in self.segment_lengths.iter().enumerate() {
            if remaining <= segment_length || id == last {
                return (id, remaining.min(segment_length));
            }
            remaining -= segment_length;
        }
        (0, 0.0)
    }

    pub fn point_at_chain_distance(&self, chain_distance: f64) -> Vec3 {
        let (id, along) = self.locate(chain_distance);
        let (start, end) = self.segment(id);
        let segment_length = self.segment_lengths.get(id).copied().unwrap_or(0.0);
        if segment_length <= m::EPSILON {
            return start;
        }
        start + (end - start) * (along / segment_length)
    }

    pub fn segment_id_at_chain_distance(&self, chain_distance: f64) -> usize {
        self.locate(chain_distance).0
    }

    /// Chain distance at the start of a segment.
    pub fn chain_distance_at_segment(&self, segment_id: usize) -> f64 {
        let id = self.clamp_segment_id(segment_id);
        self.segment_lengths[..id.min(self.segment_lengths.len())]
            .iter()
            .sum()
    }

    /// Line segments for debug drawing.
    pub fn debug_lines(&self) -> impl Iterator<Item = [Vec3; 2]> + '_ {
        self.points.windows(2).map(|w| [w[0], w[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_loop() -> Attractor {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, 4.0),
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::new(0.0, 0.0, 0.0),
        ];
        Attractor::new(AttractorType::Edge, points, 1).unwrap()
    }

    fn zigzag() -> Attractor {
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 4.0, 0.0),
            Vec3::new(3.0, 4.0, 10.0),
        ];
        Attractor::new(AttractorType::Edge, points, 2).unwrap()
    }

    #[test]
    fn needs_points() {
        assert!(matches!(
            Attractor::new(AttractorType::Edge, Vec::new(), 0),
            Err(AttractorError::NoPoints)
        ));

        let mut attractor = zigzag();
        assert!(attractor.update(Vec::new(), 5).is_err());
        // failed updates leave the attractor alone
        assert_eq!(attractor.room(), 2);
        assert_eq!(attractor.points().len(), 3);
    }

    #[test]
    fn lengths_and_bounds() {
        let attractor = zigzag();
        assert_eq!(attractor.length(), 15.0);
        assert_eq!(attractor.segment_count(), 2);
        assert!(!attractor.is_looped());
        assert_eq!(attractor.aabb().min, Vec3::zero());
        assert_eq!(attractor.aabb().max, Vec3::new(3.0, 4.0, 10.0));
        assert_eq!(attractor.chain_distance_at_segment(0), 0.0);
        assert_eq!(attractor.chain_distance_at_segment(1), 5.0);
        assert_eq!(attractor.debug_lines().count(), 2);

        let looped = square_loop();
        assert!(looped.is_looped());
        assert_eq!(looped.length(), 16.0);
    }

    #[test]
    fn chain_distance_is_monotonic_and_clamped() {
        let attractor = zigzag();
        assert_eq!(attractor.point_at_chain_distance(-3.0), Vec3::zero());
        assert_eq!(attractor.point_at_chain_distance(99.0), Vec3::new(3.0, 4.0, 10.0));
        assert_eq!(attractor.point_at_chain_distance(2.5), Vec3::new(1.5, 2.0, 0.0));
        assert_eq!(attractor.segment_id_at_chain_distance(2.5), 0);
        assert_eq!(attractor.segment_id_at_chain_distance(7.0), 1);
        assert_eq!(attractor.segment_id_at_chain_distance(99.0), 1);

        // walking along the chain never goes backwards along the polyline
        let mut prev = 0.0;
        for step in 0..=150 {
            let d = step as f64 * 0.1;
            let p = attractor.point_at_chain_distance(d);
            let id = attractor.segment_id_at_chain_distance(d);
            let (start, _) = attractor.segment(id);
            let projected = attractor.chain_distance_at_segment(id) + (p - start).mag();
            assert!(projected + 1e-9 >= prev);
            assert!((projected - d).abs() < 1e-9);
            prev = projected;
        }
    }

    #[test]
    fn loops_wrap_around() {
        let looped = square_loop();
        let wrapped = looped.point_at_chain_distance(18.0);
        assert!((wrapped - Vec3::new(2.0, 0.0, 0.0)).mag() < 1e-9);
        let backwards = looped.point_at_chain_distance(-2.0);
        assert!((backwards - Vec3::new(0.0, 0.0, 2.0)).mag() < 1e-9);
        assert_eq!(looped.segment_id_at_chain_distance(-2.0), 3);
    }

    #[test]
    fn single_point() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        let attractor = Attractor::new(AttractorType::Edge, vec![p], 0).unwrap();
        assert_eq!(attractor.length(), 0.0);
        assert_eq!(attractor.segment_count(), 1);
        assert!(!attractor.is_looped());
        assert_eq!(attractor.point_at_chain_distance(5.0), p);
        assert_eq!(attractor.segment(0), (p, p));
        assert_eq!(attractor.segment(3), (p, p));
        assert_eq!(attractor.debug_lines().count(), 0);
    }
}
