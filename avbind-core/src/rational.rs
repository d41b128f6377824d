//! Exact rational arithmetic and time-base rescaling.
//!
//! Values are kept in lowest terms with a positive denominator. Construction
//! goes through a continued-fraction reduction bounded by a caller-supplied
//! maximum, so a value that cannot be represented in 32 bits is reported
//! instead of silently wrapping.

use crate::error::{Error, Result};
use crate::timestamp::NO_PTS;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

/// Default bound used when reducing: the largest `i32`.
pub const DEFAULT_BOUND: i64 = i32::MAX as i64;

/// Rounding policy for [`rescale_rnd`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Rounding {
    /// Round to nearest, ties away from zero.
    #[default]
    NearInf,
    /// Round toward negative infinity.
    Down,
    /// Round toward positive infinity.
    Up,
    /// Round toward zero.
    Zero,
    /// Round to nearest, but pass `i64::MIN` and `i64::MAX` through untouched.
    PassMinMax,
}

/// A rational number in lowest terms.
///
/// Used for time bases, frame rates and aspect ratios.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rational {
    num: i32,
    den: i32,
}

impl Rational {
    /// Create a new rational, reduced to lowest terms.
    pub fn new(num: i32, den: i32) -> Result<Self> {
        Self::reduce_with_bound(num as i64, den as i64, DEFAULT_BOUND).map(|(r, _)| r)
    }

    /// Internal constructor for values already in lowest terms.
    pub(crate) const fn raw(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Create a rational from an integer.
    pub const fn from_int(n: i32) -> Self {
        Self { num: n, den: 1 }
    }

    /// Create a zero rational.
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// Create a rational representing one.
    pub const fn one() -> Self {
        Self { num: 1, den: 1 }
    }

    /// The numerator.
    pub const fn num(&self) -> i32 {
        self.num
    }

    /// The denominator, always positive.
    pub const fn den(&self) -> i32 {
        self.den
    }

    /// Check if this rational is zero.
    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// Check if this rational is strictly positive.
    pub fn is_positive(&self) -> bool {
        self.num > 0
    }

    /// Reduce `num / den` so that both terms are at most `max` in magnitude.
    ///
    /// Returns the reduced value and whether it is exactly equal to the input.
    /// When the exact fraction does not fit, the closest continued-fraction
    /// convergent within the bound is used. Fails if `den` is zero or the
    /// integer part of the value already exceeds `max`.
    pub fn reduce_with_bound(num: i64, den: i64, max: i64) -> Result<(Self, bool)> {
        if den == 0 {
            return Err(Error::invalid_arg("rational denominator is zero"));
        }
        if max <= 0 || max > DEFAULT_BOUND {
            return Err(Error::invalid_arg(format!(
                "reduction bound {max} outside 1..={DEFAULT_BOUND}"
            )));
        }
        let negative = (num < 0) != (den < 0);
        let mut n = num.unsigned_abs() as u128;
        let mut d = den.unsigned_abs() as u128;
        let max = max as u128;

        if n == 0 {
            return Ok((Self::zero(), true));
        }
        if n / d > max {
            return Err(Error::invalid_arg(format!(
                "{num}/{den} is not representable under bound {max}"
            )));
        }

        let g = gcd(n, d);
        n /= g;
        d /= g;

        let (mut a0n, mut a0d) = (0u128, 1u128);
        let (mut a1n, mut a1d) = (1u128, 0u128);
        let exact;

        if n <= max && d <= max {
            a1n = n;
            a1d = d;
            exact = true;
        } else {
            loop {
                if d == 0 {
                    exact = true;
                    break;
                }
                let x = n / d;
                let next_d = n - d * x;
                let a2n = x * a1n + a0n;
                let a2d = x * a1d + a0d;

                if a2n > max || a2d > max {
                    let mut x = x;
                    if a1n != 0 {
                        x = (max - a0n) / a1n;
                    }
                    if a1d != 0 {
                        x = x.min((max - a0d) / a1d);
                    }
                    if d * (2 * x * a1d + a0d) > n * a1d {
                        a1n = x * a1n + a0n;
                        a1d = x * a1d + a0d;
                    }
                    exact = false;
                    break;
                }

                a0n = a1n;
                a0d = a1d;
                a1n = a2n;
                a1d = a2d;
                n = d;
                d = next_d;
            }
        }

        if a1d == 0 {
            return Err(Error::invalid_arg(format!(
                "{num}/{den} has no representable form under bound {max}"
            )));
        }

        let num = if negative { -(a1n as i64) } else { a1n as i64 };
        let value = if num == 0 {
            Self::zero()
        } else {
            Self::raw(num as i32, a1d as i32)
        };
        Ok((value, exact))
    }

    /// Approximate a floating point value with denominators up to `max`.
    pub fn from_f64(value: f64, max: i64) -> Result<Self> {
        if !value.is_finite() {
            return Err(Error::invalid_arg(format!("cannot represent {value} as a rational")));
        }
        if value.abs() > max as f64 + 0.5 {
            return Err(Error::invalid_arg(format!(
                "{value} exceeds rational bound {max}"
            )));
        }
        let exponent = ((value.abs() + 1e-20).log2().floor() as i32).max(0);
        let den = 1i64 << (61 - exponent.min(61));
        let num = (value * den as f64 + 0.5).floor() as i64;
        Self::reduce_with_bound(num, den, max).map(|(r, _)| r)
    }

    /// Replace the numerator and re-normalize.
    pub fn set_numerator(&mut self, num: i32) -> Result<()> {
        *self = Self::new(num, self.den)?;
        Ok(())
    }

    /// Replace the denominator and re-normalize.
    pub fn set_denominator(&mut self, den: i32) -> Result<()> {
        *self = Self::new(self.num, den)?;
        Ok(())
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Get the reciprocal of this rational.
    pub fn invert(&self) -> Result<Self> {
        if self.num == 0 {
            return Err(Error::invalid_arg("cannot invert a zero rational"));
        }
        Self::new(self.den, self.num)
    }

    /// Add two rationals.
    pub fn checked_add(self, rhs: Self) -> Result<Self> {
        let num = self.num as i64 * rhs.den as i64 + rhs.num as i64 * self.den as i64;
        let den = self.den as i64 * rhs.den as i64;
        Self::reduce_with_bound(num, den, DEFAULT_BOUND).map(|(r, _)| r)
    }

    /// Subtract two rationals.
    pub fn checked_sub(self, rhs: Self) -> Result<Self> {
        let num = self.num as i64 * rhs.den as i64 - rhs.num as i64 * self.den as i64;
        let den = self.den as i64 * rhs.den as i64;
        Self::reduce_with_bound(num, den, DEFAULT_BOUND).map(|(r, _)| r)
    }

    /// Multiply two rationals.
    pub fn checked_mul(self, rhs: Self) -> Result<Self> {
        let num = self.num as i64 * rhs.num as i64;
        let den = self.den as i64 * rhs.den as i64;
        Self::reduce_with_bound(num, den, DEFAULT_BOUND).map(|(r, _)| r)
    }

    /// Divide two rationals. Dividing by zero is an error.
    pub fn checked_div(self, rhs: Self) -> Result<Self> {
        if rhs.num == 0 {
            return Err(Error::invalid_arg(format!("division of {self} by zero")));
        }
        let num = self.num as i64 * rhs.den as i64;
        let den = self.den as i64 * rhs.num as i64;
        Self::reduce_with_bound(num, den, DEFAULT_BOUND).map(|(r, _)| r)
    }

    /// Rescale `value` expressed in units of `self` into units of `target`.
    ///
    /// Fails if `target` is zero. `NO_PTS` passes through unchanged.
    pub fn rescale(&self, value: i64, target: Rational, rnd: Rounding) -> Result<i64> {
        if target.num == 0 {
            return Err(Error::invalid_arg("cannot rescale into a zero time base"));
        }
        let b = self.num as i64 * target.den as i64;
        let c = self.den as i64 * target.num as i64;
        let (b, c) = if c < 0 { (-b, -c) } else { (b, c) };
        Ok(rescale_rnd(value, b, c, rnd))
    }
}

/// Compute `a * b / c` with 128-bit intermediates and the given rounding.
///
/// `c` must be positive. `NO_PTS` is returned unchanged under every policy;
/// results outside the `i64` range saturate and never collide with `NO_PTS`.
pub fn rescale_rnd(a: i64, b: i64, c: i64, rnd: Rounding) -> i64 {
    if a == NO_PTS {
        return NO_PTS;
    }
    if rnd == Rounding::PassMinMax && a == i64::MAX {
        return a;
    }
    debug_assert!(c > 0, "rescale divisor must be positive");
    if c <= 0 {
        return NO_PTS;
    }

    let n = a as i128 * b as i128;
    let d = c as i128;
    let q = n.div_euclid(d);
    let r = n.rem_euclid(d);

    let rounded = match rnd {
        Rounding::Down => q,
        Rounding::Up => {
            if r != 0 {
                q + 1
            } else {
                q
            }
        }
        Rounding::Zero => {
            if n < 0 && r != 0 {
                q + 1
            } else {
                q
            }
        }
        Rounding::NearInf | Rounding::PassMinMax => match (2 * r).cmp(&d) {
            Ordering::Greater => q + 1,
            Ordering::Less => q,
            Ordering::Equal => {
                if n >= 0 {
                    q + 1
                } else {
                    q
                }
            }
        },
    };

    if rounded > i64::MAX as i128 {
        i64::MAX
    } else if rounded <= i64::MIN as i128 {
        i64::MIN + 1
    } else {
        rounded as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i64 * other.den as i64;
        let rhs = other.num as i64 * self.den as i64;
        lhs.cmp(&rhs)
    }
}

impl Add for Rational {
    type Output = Result<Rational>;

    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs)
    }
}

impl Sub for Rational {
    type Output = Result<Rational>;

    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs)
    }
}

impl Mul for Rational {
    type Output = Result<Rational>;

    fn mul(self, rhs: Self) -> Self::Output {
        self.checked_mul(rhs)
    }
}

impl Div for Rational {
    type Output = Result<Rational>;

    fn div(self, rhs: Self) -> Self::Output {
        self.checked_div(rhs)
    }
}

impl From<i32> for Rational {
    fn from(n: i32) -> Self {
        Self::from_int(n)
    }
}

impl TryFrom<(i32, i32)> for Rational {
    type Error = Error;

    fn try_from((num, den): (i32, i32)) -> Result<Self> {
        Self::new(num, den)
    }
}

/// Greatest common divisor using the Euclidean algorithm.
fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}
