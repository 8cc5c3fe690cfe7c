//! Types, aliases and helper operations for doing math with `ultraviolet`,
//! plus the fixed-point types used by the rope simulation.
use std::f64::consts::PI;
pub use ultraviolet as uv;

pub mod fixed;

pub type Vec3 = uv::DVec3;
pub type Rotor3 = uv::DRotor3;

/// Tolerance used for floating-point geometry comparisons.
pub const EPSILON: f64 = 1e-5;

/// An angle in either degrees or radians.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize)
)]
pub enum Angle {
    Rad(f64),
    Deg(f64),
}
impl Angle {
    /// Get the angle as degrees.
    #[inline]
    pub fn deg(&self) -> f64 {
        match self {
            Angle::Rad(rad) => rad * 180.0 / PI,
            Angle::Deg(deg) => *deg,
        }
    }

    /// Get the angle as radians.
    #[inline]
    pub fn rad(&self) -> f64 {
        match self {
            Angle::Rad(rad) => *rad,
            Angle::Deg(deg) => deg * PI / 180.0,
        }
    }

    /// Convert from a 16-bit engine angle where the full circle is 65536 units.
    #[inline]
    pub fn from_engine(units: i16) -> Self {
        Angle::Rad(units as f64 * PI / 32768.0)
    }

    /// Convert to a 16-bit engine angle, wrapping around the full circle.
    #[inline]
    pub fn to_engine(&self) -> i16 {
        let units = (self.rad() * 32768.0 / PI).round() as i64;
        units as i16
    }

    /// Unit vector in the horizontal plane pointing along this heading.
    /// A heading of zero points along +z, a quarter turn along +x.
    #[inline]
    pub fn heading_dir(&self) -> Vec3 {
        let rad = self.rad();
        Vec3::new(rad.sin(), 0.0, rad.cos())
    }
}
impl Default for Angle {
    fn default() -> Self {
        Angle::Rad(0.0)
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug)]
pub struct Unit<T>(T);

impl Unit<Vec3> {
    pub const fn new_unchecked(v: Vec3) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec3::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec3::unit_y())
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// Vec3 utils

#[inline]
pub(crate) fn to_array(v: Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Remove the component of `v` along `axis`.
#[inline]
pub fn reject(v: Vec3, axis: Unit<Vec3>) -> Vec3 {
    v - *axis * v.dot(*axis)
}

/// Distance between two points measured in the plane perpendicular to `axis`.
#[inline]
pub fn distance_perp(a: Vec3, b: Vec3, axis: Unit<Vec3>) -> f64 {
    reject(b - a, axis).mag()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_angles() {
        assert!((Angle::from_engine(16384).deg() - 90.0).abs() < 1e-9);
        assert!((Angle::from_engine(-32768).deg() + 180.0).abs() < 1e-9);
        assert_eq!(Angle::Deg(90.0).to_engine(), 16384);
        assert_eq!(Angle::Deg(-45.0).to_engine(), -8192);
        // wraps past a half turn like the engine's 16-bit angles
        assert_eq!(Angle::Deg(270.0).to_engine(), -16384);
        assert_eq!(Angle::from_engine(-16384), Angle::Rad(-PI / 2.0));
        assert_ne!(Angle::Deg(90.0), Angle::Rad(PI / 2.0));
    }

    #[test]
    fn perpendicular_distance_ignores_axis() {
        let d = distance_perp(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(3.0, 100.0, 4.0),
            Unit::unit_y(),
        );
        assert!((d - 5.0).abs() < 1e-9);
    }
}
