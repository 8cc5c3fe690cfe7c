//! Bounding volumes and intersection tests used by the bounding tree.

use crate::math::{self as m, Rotor3, Unit, Vec3};

pub mod bvh;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize)
)]
pub struct AABB {
    pub min: Vec3,
    pub max: Vec3,
}

impl AABB {
    #[inline]
    pub fn zero() -> Self {
        Self {
            min: Vec3::zero(),
            max: Vec3::zero(),
        }
    }

    #[inline]
    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing every point, or `None` if there are no points.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |aabb, p| Self {
            min: aabb.min.min_by_component(p),
            max: aabb.max.max_by_component(p),
        }))
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[inline]
    pub fn union(&self, other: &AABB) -> AABB {
        AABB {
            min: self.min.min_by_component(other.min),
            max: self.max.max_by_component(other.max),
        }
    }

    /// Grow the box by `amount` in every direction.
    #[inline]
    pub fn padded(&self, amount: f64) -> AABB {
        let pad = Vec3::broadcast(amount);
        AABB {
            min: self.min - pad,
            max: self.max + pad,
        }
    }

    #[inline]
    pub fn surface_area(&self) -> f64 {
        let d = self.max - self.min;
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Check whether `other` lies entirely inside this box.
    #[inline]
    pub fn contains(&self, other: &AABB) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && self.min.z <= other.min.z
            && self.max.x >= other.max.x
            && self.max.y >= other.max.y
            && self.max.z >= other.max.z
    }

    #[inline]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    #[inline]
    pub fn intersects(&self, other: &AABB) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

/// A ray with a start point, a direction and a maximum distance.
#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub start: Vec3,
    pub dir: Unit<Vec3>,
    pub max_distance: f64,
}

impl Ray {
    /// A ray of infinite length.
    pub fn new(start: Vec3, dir: Unit<Vec3>) -> Self {
        Self {
            start,
            dir,
            max_distance: f64::INFINITY,
        }
    }

    /// A ray from `start` that ends at `end`, or `None` if the points coincide.
    pub fn between(start: Vec3, end: Vec3) -> Option<Self> {
        let dist = end - start;
        let dist_mag = dist.mag();
        if dist_mag < m::EPSILON {
            return None;
        }
        Some(Self {
            start,
            dir: Unit::new_unchecked(dist / dist_mag),
            max_distance: dist_mag,
        })
    }

    pub fn with_max_distance(mut self, max_distance: f64) -> Self {
        self.max_distance = max_distance;
        self
    }

    #[inline]
    pub fn point_at(&self, t: f64) -> Vec3 {
        self.start + *self.dir * t
    }
}

/// Distance along the ray where it enters the box, zero if it starts inside,
/// or `None` if it misses entirely. Ignores the ray's maximum distance.
pub fn ray_aabb(ray: &Ray, aabb: &AABB) -> Option<f64> {
    let start = m::to_array(ray.start);
    let dir = m::to_array(*ray.dir);
    let min = m::to_array(aabb.min);
    let max = m::to_array(aabb.max);

    let mut t_min = 0.0_f64;
    let mut t_max = f64::INFINITY;
    for axis in 0..3 {
        if dir[axis].abs() < m::EPSILON {
            // parallel to this slab, must already be between its planes
            if start[axis] < min[axis] || start[axis] > max[axis] {
                return None;
            }
            continue;
        }
        let inv_dir = 1.0 / dir[axis];
        let mut t0 = (min[axis] - start[axis]) * inv_dir;
        let mut t1 = (max[axis] - start[axis]) * inv_dir;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

#[derive(Clone, Copy, Debug)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f64,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn aabb(&self) -> AABB {
        AABB::from_center(self.center, Vec3::broadcast(self.radius))
    }
}

/// An oriented bounding box.
#[derive(Clone, Copy, Debug)]
pub struct Obb {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub rotation: Rotor3,
}

impl Obb {
    pub fn new(center: Vec3, half_extents: Vec3, rotation: Rotor3) -> Self {
        Self {
            center,
            half_extents,
            rotation,
        }
    }

    /// The box's local x, y and z axes in world space.
    pub fn axes(&self) -> [Vec3; 3] {
        [
            self.rotation * Vec3::unit_x(),
            self.rotation * Vec3::unit_y(),
            self.rotation * Vec3::unit_z(),
        ]
    }

    /// Transform a point from the box's local space to world space.
    #[inline]
    pub fn to_world(&self, local: Vec3) -> Vec3 {
        self.center + self.rotation * local
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let h = self.half_extents;
        let mut corners = [Vec3::zero(); 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { -h.x } else { h.x },
                if i & 2 == 0 { -h.y } else { h.y },
                if i & 4 == 0 { -h.z } else { h.z },
            );
            *corner = self.to_world(local);
        }
        corners
    }

    pub fn aabb(&self) -> AABB {
        // corners() is never empty
        AABB::from_points(self.corners()).unwrap_or_else(AABB::zero)
    }
}

/// Separating axis test between two oriented boxes given as axes and half extents.
fn boxes_overlap(
    a_center: Vec3,
    a_axes: [Vec3; 3],
    a_half: [f64; 3],
    b_center: Vec3,
    b_axes: [Vec3; 3],
    b_half: [f64; 3],
) -> bool {
    let mut r = [[0.0; 3]; 3];
    let mut abs_r = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            r[i][j] = a_axes[i].dot(b_axes[j]);
            // epsilon keeps near-parallel edge pairs from producing a false separating axis
            abs_r[i][j] = r[i][j].abs() + m::EPSILON;
        }
    }
    let d = b_center - a_center;
    let t = [d.dot(a_axes[0]), d.dot(a_axes[1]), d.dot(a_axes[2])];

    for i in 0..3 {
        let ra = a_half[i];
        let rb = b_half[0] * abs_r[i][0] + b_half[1] * abs_r[i][1] + b_half[2] * abs_r[i][2];
        if t[i].abs() > ra + rb {
            return false;
        }
    }
    for j in 0..3 {
        let ra = a_half[0] * abs_r[0][j] + a_half[1] * abs_r[1][j] + a_half[2] * abs_r[2][j];
        let rb = b_half[j];
        let tj = t[0] * r[0][j] + t[1] * r[1][j] + t[2] * r[2][j];
        if tj.abs() > ra + rb {
            return false;
        }
    }
    for i in 0..3 {
        let (i1, i2) = ((i + 1) % 3, (i + 2) % 3);
        for j in 0..3 {
            let (j1, j2) = ((j + 1) % 3, (j + 2) % 3);
            let ra = a_half[i1] * abs_r[i2][j] + a_half[i2] * abs_r[i1][j];
            let rb = b_half[j1] * abs_r[i][j2] + b_half[j2] * abs_r[i][j1];
            let tl = t[i2] * r[i1][j] - t[i1] * r[i2][j];
            if tl.abs() > ra + rb {
                return false;
            }
        }
    }
    true
}

//
// Overlap trait
//

/// A query volume that can be tested against the boxes of a [`BoundingTree`][bvh::BoundingTree].
pub trait Overlap {
    fn overlaps_aabb(&self, aabb: &AABB) -> bool;
}

impl Overlap for AABB {
    #[inline]
    fn overlaps_aabb(&self, aabb: &AABB) -> bool {
        self.intersects(aabb)
    }
}

impl Overlap for Sphere {
    fn overlaps_aabb(&self, aabb: &AABB) -> bool {
        let closest = self.center.clamped(aabb.min, aabb.max);
        (closest - self.center).mag_sq() <= self.radius * self.radius
    }
}

impl Overlap for Ray {
    fn overlaps_aabb(&self, aabb: &AABB) -> bool {
        matches!(ray_aabb(self, aabb), Some(t) if t <= self.max_distance)
    }
}

impl Overlap for Obb {
    fn overlaps_aabb(&self, aabb: &AABB) -> bool {
        let h = aabb.half_extents();
        boxes_overlap(
            aabb.center(),
            [Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z()],
            [h.x, h.y, h.z],
            self.center,
            self.axes(),
            m::to_array(self.half_extents),
        )
    }
}
