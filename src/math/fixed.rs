//! 16.16 fixed-point arithmetic for the rope simulation.
//!
//! The rope code was tuned against integer-only math, and these operations
//! reproduce its exact bit-shift semantics rather than correct real-number
//! arithmetic. In particular [`fp_div`] drops the low 8 bits of the divisor,
//! and the `w2v` products use a 14-bit shift instead of [`FP_SHIFT`].

use super::Vec3;
use std::ops;

pub const FP_SHIFT: u32 = 16;
pub const FP_ONE: i64 = 1 << FP_SHIFT;
/// Shift of the world-to-view convention used by dot and cross products.
pub const W2V_SHIFT: u32 = 14;

/// `(a * b) >> FP_SHIFT`
#[inline]
pub fn fp_mul(a: i64, b: i64) -> i64 {
    (a * b) >> FP_SHIFT
}

/// `(a / (b >> 8)) << 8`.
///
/// Not a true fixed-point division: the low 8 bits of the divisor are discarded.
/// A divisor that is zero after the shift yields zero.
#[inline]
pub fn fp_div(a: i64, b: i64) -> i64 {
    match a.checked_div(b >> 8) {
        Some(q) => q << 8,
        None => 0,
    }
}

/// Integer square root, rounded down.
pub fn isqrt(n: u64) -> u64 {
    let mut op = n;
    let mut res = 0u64;
    let mut one = 1u64 << 62;
    while one > op {
        one >>= 2;
    }
    while one != 0 {
        if op >= res + one {
            op -= res + one;
            res = (res >> 1) + one;
        } else {
            res >>= 1;
        }
        one >>= 2;
    }
    res
}

/// Sine of a 16-bit engine angle, scaled by `1 << W2V_SHIFT`.
#[inline]
pub fn sin_w2v(angle: i16) -> i64 {
    let rad = angle as f64 * std::f64::consts::PI / 32768.0;
    (rad.sin() * (1 << W2V_SHIFT) as f64).round() as i64
}

/// Cosine of a 16-bit engine angle, scaled by `1 << W2V_SHIFT`.
#[inline]
pub fn cos_w2v(angle: i16) -> i64 {
    let rad = angle as f64 * std::f64::consts::PI / 32768.0;
    (rad.cos() * (1 << W2V_SHIFT) as f64).round() as i64
}

//
// Fixed
//

/// A real number scaled by `2^16` and stored in 64 bits.
///
/// `*` and `/` follow [`fp_mul`] and [`fp_div`] exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize),
    serde(transparent)
)]
pub struct Fixed(pub i64);

impl Fixed {
    pub const ZERO: Self = Fixed(0);
    pub const ONE: Self = Fixed(FP_ONE);

    #[inline]
    pub const fn from_int(n: i64) -> Self {
        Fixed(n << FP_SHIFT)
    }

    /// Integer part, rounded towards negative infinity.
    #[inline]
    pub const fn to_int(self) -> i64 {
        self.0 >> FP_SHIFT
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / FP_ONE as f64
    }

    #[inline]
    pub fn abs(self) -> Self {
        Fixed(self.0.abs())
    }
}

impl ops::Add for Fixed {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Fixed(self.0 + rhs.0)
    }
}
impl ops::AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}
impl ops::Sub for Fixed {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Fixed(self.0 - rhs.0)
    }
}
impl ops::SubAssign for Fixed {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}
impl ops::Neg for Fixed {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Fixed(-self.0)
    }
}
impl ops::Mul for Fixed {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Fixed(fp_mul(self.0, rhs.0))
    }
}
impl ops::Div for Fixed {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        Fixed(fp_div(self.0, rhs.0))
    }
}
impl ops::Shr<u32> for Fixed {
    type Output = Self;
    #[inline]
    fn shr(self, rhs: u32) -> Self {
        Fixed(self.0 >> rhs)
    }
}

//
// FixedVec3
//

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(
    feature = "serde-types",
    derive(serde::Deserialize, serde::Serialize)
)]
pub struct FixedVec3 {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
}

impl FixedVec3 {
    pub const ZERO: Self = FixedVec3 {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    #[inline]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        FixedVec3 { x, y, z }
    }

    #[inline]
    pub const fn from_raw(x: i64, y: i64, z: i64) -> Self {
        FixedVec3::new(Fixed(x), Fixed(y), Fixed(z))
    }

    /// Create a vector from whole world units.
    #[inline]
    pub const fn from_int(x: i64, y: i64, z: i64) -> Self {
        FixedVec3::new(Fixed::from_int(x), Fixed::from_int(y), Fixed::from_int(z))
    }

    #[inline]
    pub fn raw(&self) -> [i64; 3] {
        [self.x.0, self.y.0, self.z.0]
    }

    /// Components shifted down by [`FP_SHIFT`], i.e. whole world units.
    #[inline]
    pub fn descaled(&self) -> [i64; 3] {
        [self.x.to_int(), self.y.to_int(), self.z.to_int()]
    }

    /// Convert to floating-point world units.
    #[inline]
    pub fn to_world(&self) -> Vec3 {
        Vec3::new(self.x.to_f64(), self.y.to_f64(), self.z.to_f64())
    }

    /// Multiply every component by `s` with [`fp_mul`].
    #[inline]
    pub fn scale(&self, s: Fixed) -> Self {
        FixedVec3::new(self.x * s, self.y * s, self.z * s)
    }

    /// Arithmetic right shift of every raw component.
    #[inline]
    pub fn shr(&self, n: u32) -> Self {
        FixedVec3::new(self.x >> n, self.y >> n, self.z >> n)
    }

    /// Left shift of every raw component.
    #[inline]
    pub fn shl(&self, n: u32) -> Self {
        FixedVec3::from_raw(self.x.0 << n, self.y.0 << n, self.z.0 << n)
    }

    #[inline]
    pub fn normalised(&self) -> Self {
        normalise(*self)
    }
}

impl ops::Add for FixedVec3 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        FixedVec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}
impl ops::AddAssign for FixedVec3 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}
impl ops::Sub for FixedVec3 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        FixedVec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}
impl ops::SubAssign for FixedVec3 {
    #[inline]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}
impl ops::Neg for FixedVec3 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        FixedVec3::new(-self.x, -self.y, -self.z)
    }
}

/// Scale `v` to a length of [`FP_ONE`].
///
/// The length is measured on the descaled components, so the result is only as
/// precise as the integer part of `v`. If every descaled component is zero,
/// `v` is returned unchanged.
pub fn normalise(v: FixedVec3) -> FixedVec3 {
    let [x, y, z] = v.descaled();
    if x == 0 && y == 0 && z == 0 {
        return v;
    }
    let length = isqrt((x * x + y * y + z * z).unsigned_abs()) as i64;
    let recip = fp_div(FP_ONE << 8, length << FP_SHIFT) >> 8;
    v.scale(Fixed(recip))
}

/// Dot product of two vectors in world-to-view scale (`1 << W2V_SHIFT` is one).
#[inline]
pub fn dot_w2v(a: FixedVec3, b: FixedVec3) -> i64 {
    (a.x.0 * b.x.0 + a.y.0 * b.y.0 + a.z.0 * b.z.0) >> W2V_SHIFT
}

/// Cross product of two vectors in world-to-view scale (`1 << W2V_SHIFT` is one).
#[inline]
pub fn cross_w2v(a: FixedVec3, b: FixedVec3) -> FixedVec3 {
    FixedVec3::from_raw(
        (a.y.0 * b.z.0 - a.z.0 * b.y.0) >> W2V_SHIFT,
        (a.z.0 * b.x.0 - a.x.0 * b.z.0) >> W2V_SHIFT,
        (a.x.0 * b.y.0 - a.y.0 * b.x.0) >> W2V_SHIFT,
    )
}

/// Renormalise a world-to-view scale vector, keeping it in that scale.
#[inline]
pub fn normalise_w2v(v: FixedVec3) -> FixedVec3 {
    normalise(v.shl(FP_SHIFT)).shr(FP_SHIFT - W2V_SHIFT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_length(v: FixedVec3) -> f64 {
        let [x, y, z] = v.raw();
        ((x * x + y * y + z * z) as f64).sqrt()
    }

    #[test]
    fn mul_and_lossy_div() {
        assert_eq!(fp_mul(3 << 16, 5 << 16), 15 << 16);
        assert_eq!(fp_mul(-(1 << 16), 1 << 15), -(1 << 15));
        // the divisor's low byte is thrown away
        assert_eq!(fp_div(1 << 24, (1 << 16) + 0xff), (1 << 24) / (1 << 8) << 8);
        assert_eq!(fp_div(1000, 0xff), 0);
        assert_eq!(Fixed::from_int(6) / Fixed::from_int(2), Fixed::from_int(3));
    }

    #[test]
    fn integer_sqrt() {
        for n in [0u64, 1, 2, 3, 4, 15, 16, 17, 99, 100, 1 << 40, u64::MAX] {
            let r = isqrt(n);
            assert!(r * r <= n);
            assert!((r + 1).checked_mul(r + 1).map_or(true, |sq| sq > n));
        }
    }

    #[test]
    fn normalise_unit_length() {
        let v = normalise(FixedVec3::from_int(3, 4, 0));
        assert_eq!(v, FixedVec3::from_raw(39321, 52428, 0));

        for (x, y, z) in [
            (100, 37, -20),
            (-64, 0, 0),
            (0, 128, 128),
            (-250, -300, 90),
            (77, -77, 77),
        ] {
            let len = raw_length(normalise(FixedVec3::from_int(x, y, z)));
            let err = (len - FP_ONE as f64).abs() / FP_ONE as f64;
            assert!(err < 0.01, "({x}, {y}, {z}) normalised to length {len}");
        }
    }

    #[test]
    fn normalise_leaves_zero_alone() {
        assert_eq!(normalise(FixedVec3::ZERO), FixedVec3::ZERO);
        // all components vanish after the shift, so nothing happens either
        let tiny = FixedVec3::from_raw(1000, 0, 65535);
        assert_eq!(normalise(tiny), tiny);
    }

    #[test]
    fn w2v_products() {
        let one = 1 << W2V_SHIFT;
        let x = FixedVec3::from_raw(one, 0, 0);
        let y = FixedVec3::from_raw(0, one, 0);
        assert_eq!(cross_w2v(x, y), FixedVec3::from_raw(0, 0, one));
        assert_eq!(dot_w2v(x, x), one);
        assert_eq!(dot_w2v(x, y), 0);
        assert_eq!(sin_w2v(16384), one);
        assert_eq!(cos_w2v(0), one);
        assert_eq!(cos_w2v(-32768), -one);
    }
}
