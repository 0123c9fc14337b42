//! Deterministic fixed-point numbers for feature values and tree parameters.
//!
//! Feature vectors and ensemble parameters are carried as micro-unit integers
//! (1 unit = 1e-6) so that tree traversal and leaf accumulation are
//! bit-for-bit reproducible regardless of platform or summation hardware.
//! Floats only appear at the edges: raw record values on the way in and the
//! predicted revenue on the way out.

use core::fmt::{self, Display, Formatter};
use core::iter::Sum;
use core::ops::{Add, AddAssign, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Scaling factor: 1 unit = 1e-6.
pub const SCALE: i64 = 1_000_000;

/// Fixed-point 64-bit number with six decimal places of precision.
#[derive(
    Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub struct Fixed(pub i64);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(SCALE);

    /// Construct from a raw micro-unit integer.
    #[inline]
    pub const fn from_micro(raw: i64) -> Self {
        Self(raw)
    }

    /// Construct from a whole number.
    #[inline]
    pub const fn from_int(value: i64) -> Self {
        Self(value.saturating_mul(SCALE))
    }

    /// Raw micro-unit integer.
    #[inline]
    pub const fn into_inner(self) -> i64 {
        self.0
    }

    /// Convert an `f64` into fixed-point, rounding to the nearest micro unit.
    ///
    /// Out-of-range magnitudes saturate; callers reject non-finite input first.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self((value * SCALE as f64).round() as i64)
    }

    /// Convert an `f64` only when it fits without saturating.
    ///
    /// `None` for non-finite input and for magnitudes of 2^63 micro units or more.
    #[inline]
    pub fn checked_from_f64(value: f64) -> Option<Self> {
        let scaled = (value * SCALE as f64).round();
        if scaled.is_finite() && scaled.abs() < i64::MAX as f64 {
            Some(Self(scaled as i64))
        } else {
            None
        }
    }

    /// Largest magnitude `checked_from_f64` accepts, in whole units
    pub fn max_f64() -> f64 {
        i64::MAX as f64 / SCALE as f64
    }

    /// Convert back to `f64`.
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / SCALE as f64
    }

    /// Multiply, rounding toward zero. Promotes to `i128` and saturates.
    #[inline]
    pub fn mul_fixed(self, rhs: Self) -> Self {
        let product = (self.0 as i128 * rhs.0 as i128) / SCALE as i128;
        Self(product.clamp(i64::MIN as i128, i64::MAX as i128) as i64)
    }

    #[inline]
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Display for Fixed {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u64;
        write!(f, "{}{}.{:06}", sign, abs / scale, abs % scale)
    }
}

impl From<i64> for Fixed {
    #[inline]
    fn from(value: i64) -> Self {
        Self::from_int(value)
    }
}

impl From<Fixed> for f64 {
    #[inline]
    fn from(value: Fixed) -> Self {
        value.to_f64()
    }
}

impl Add for Fixed {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Fixed {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Fixed {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Fixed {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self::Output {
        Self(self.0.saturating_neg())
    }
}

impl Sum for Fixed {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_keeps_micro_precision() {
        let value = 123.456_789_f64;
        let fixed = Fixed::from_f64(value);
        assert_eq!(fixed.into_inner(), 123_456_789);
        assert!((fixed.to_f64() - value).abs() < 1e-6);
    }

    #[test]
    fn multiplication_rounds_toward_zero() {
        let a = Fixed::from_f64(1.5);
        let b = Fixed::from_f64(2.25);
        assert_eq!(a.mul_fixed(b), Fixed::from_f64(3.375));
        assert_eq!(Fixed::from_micro(1).mul_fixed(Fixed::from_micro(1)), Fixed::ZERO);
    }

    #[test]
    fn checked_conversion_refuses_to_saturate() {
        assert_eq!(Fixed::checked_from_f64(1.5), Some(Fixed::from_micro(1_500_000)));
        assert_eq!(
            Fixed::checked_from_f64(-9.0e12),
            Some(Fixed::from_int(-9_000_000_000_000))
        );
        assert_eq!(Fixed::checked_from_f64(1.0e13), None);
        assert_eq!(Fixed::checked_from_f64(-1.0e13), None);
        assert_eq!(Fixed::checked_from_f64(f64::NAN), None);
        assert_eq!(Fixed::checked_from_f64(f64::INFINITY), None);
    }

    #[test]
    fn addition_saturates() {
        let max = Fixed::from_micro(i64::MAX);
        assert_eq!(max + Fixed::ONE, max);
    }

    #[test]
    fn serializes_as_raw_integer() {
        let value = Fixed::from_f64(42.1337);
        assert_eq!(serde_json::to_string(&value).unwrap(), "42133700");
    }

    #[test]
    fn display_uses_six_decimals() {
        assert_eq!(Fixed::from_f64(-12.345_678).to_string(), "-12.345678");
        assert_eq!(Fixed::from_int(7).to_string(), "7.000000");
    }
}
