//! Timestamp and time base handling.
//!
//! A [`TimeBase`] is a strictly positive rational giving the duration of one
//! tick. All conversions between time bases go through
//! [`rescale_rnd`](crate::rational::rescale_rnd), so the [`NO_PTS`] sentinel is
//! carried through every conversion unchanged.

use crate::error::{Error, Result};
use crate::rational::{rescale_rnd, Rational, Rounding};
use std::cmp::Ordering;
use std::fmt;

/// Sentinel for an unknown timestamp.
pub const NO_PTS: i64 = i64::MIN;

/// A time base for converting between timestamp units.
///
/// Common time bases:
/// - 1/90000 for MPEG-TS
/// - 1/48000 for 48kHz audio
/// - 1/1000000 for timestamps at the API boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeBase(Rational);

impl TimeBase {
    /// Standard MPEG time base (1/90000).
    pub const MPEG: Self = Self(Rational::raw(1, 90000));

    /// Millisecond time base (1/1000).
    pub const MILLISECONDS: Self = Self(Rational::raw(1, 1000));

    /// Microsecond time base (1/1000000).
    pub const MICROSECONDS: Self = Self(Rational::raw(1, 1_000_000));

    /// Second time base (1/1).
    pub const SECONDS: Self = Self(Rational::raw(1, 1));

    /// Create a new time base from numerator and denominator.
    ///
    /// Both terms must give a strictly positive value.
    pub fn new(num: i32, den: i32) -> Result<Self> {
        Self::from_rational(Rational::new(num, den)?)
    }

    /// Wrap a rational, rejecting zero and negative values.
    pub fn from_rational(r: Rational) -> Result<Self> {
        if !r.is_positive() {
            return Err(Error::invalid_arg(format!(
                "time base must be positive, got {r}"
            )));
        }
        Ok(Self(r))
    }

    /// Time base with one tick per frame at the given frame rate.
    pub fn from_frame_rate(rate: Rational) -> Result<Self> {
        Self::from_rational(rate.invert()?)
    }

    /// Time base with one tick per sample at the given sample rate.
    pub fn from_sample_rate(rate: u32) -> Result<Self> {
        let rate = i32::try_from(rate)
            .map_err(|_| Error::invalid_arg(format!("sample rate {rate} too large")))?;
        Self::new(1, rate)
    }

    /// Convert a value from this time base to another, rounding to nearest.
    pub fn rescale(&self, value: i64, target: TimeBase) -> i64 {
        self.rescale_rnd(value, target, Rounding::NearInf)
    }

    /// Convert a value from this time base to another.
    pub fn rescale_rnd(&self, value: i64, target: TimeBase, rnd: Rounding) -> i64 {
        let b = self.0.num() as i64 * target.0.den() as i64;
        let c = self.0.den() as i64 * target.0.num() as i64;
        rescale_rnd(value, b, c, rnd)
    }

    /// Convert to seconds as f64.
    pub fn to_seconds(&self, value: i64) -> f64 {
        value as f64 * self.0.to_f64()
    }

    /// Convert from seconds.
    pub fn from_seconds(&self, seconds: f64) -> i64 {
        (seconds / self.0.to_f64()).round() as i64
    }

    /// Get the time base as a rational.
    pub fn as_rational(&self) -> Rational {
        self.0
    }

    pub fn num(&self) -> i32 {
        self.0.num()
    }

    pub fn den(&self) -> i32 {
        self.0.den()
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MICROSECONDS
    }
}

impl TryFrom<Rational> for TimeBase {
    type Error = Error;

    fn try_from(r: Rational) -> Result<Self> {
        Self::from_rational(r)
    }
}

impl From<TimeBase> for Rational {
    fn from(tb: TimeBase) -> Self {
        tb.0
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0.num(), self.0.den())
    }
}

/// A timestamp with an associated time base.
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    /// The raw timestamp value.
    pub value: i64,
    /// The time base for interpreting the value.
    pub time_base: TimeBase,
}

impl Timestamp {
    /// Create a new timestamp.
    pub fn new(value: i64, time_base: TimeBase) -> Self {
        Self { value, time_base }
    }

    /// Create an undefined timestamp.
    pub fn none() -> Self {
        Self {
            value: NO_PTS,
            time_base: TimeBase::default(),
        }
    }

    /// Check if this timestamp is defined.
    pub fn is_valid(&self) -> bool {
        self.value != NO_PTS
    }

    /// Convert to a different time base.
    pub fn rescale(&self, target: TimeBase) -> Self {
        Self {
            value: self.time_base.rescale(self.value, target),
            time_base: target,
        }
    }

    /// Convert to seconds.
    pub fn to_seconds(&self) -> Option<f64> {
        if self.is_valid() {
            Some(self.time_base.to_seconds(self.value))
        } else {
            None
        }
    }

    /// Convert to microseconds.
    pub fn to_micros(&self) -> Option<i64> {
        if self.is_valid() {
            Some(self.time_base.rescale(self.value, TimeBase::MICROSECONDS))
        } else {
            None
        }
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timestamp {}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    /// Exact comparison across time bases. Undefined timestamps sort first.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => return Ordering::Equal,
            (false, true) => return Ordering::Less,
            (true, false) => return Ordering::Greater,
            (true, true) => {}
        }
        let lhs = self.value as i128
            * self.time_base.num() as i128
            * other.time_base.den() as i128;
        let rhs = other.value as i128
            * other.time_base.num() as i128
            * self.time_base.den() as i128;
        lhs.cmp(&rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_seconds() {
            Some(secs) => {
                let hours = (secs / 3600.0) as u32;
                let mins = ((secs % 3600.0) / 60.0) as u32;
                let secs = secs % 60.0;
                write!(f, "{:02}:{:02}:{:06.3}", hours, mins, secs)
            }
            None => write!(f, "NOPTS"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timebase_conversion() {
        let tb_90k = TimeBase::MPEG;
        let tb_ms = TimeBase::MILLISECONDS;

        assert_eq!(tb_90k.rescale(90000, tb_ms), 1000);
        assert_eq!(tb_ms.rescale(1000, tb_90k), 90000);
    }

    #[test]
    fn test_timebase_must_be_positive() {
        assert!(TimeBase::new(0, 1).is_err());
        assert!(TimeBase::new(-1, 25).is_err());
        assert!(TimeBase::new(1, 0).is_err());
        assert_eq!(TimeBase::new(2, 50).unwrap(), TimeBase::new(1, 25).unwrap());
    }

    #[test]
    fn test_timebase_from_rates() {
        let fps = Rational::new(30000, 1001).unwrap();
        let tb = TimeBase::from_frame_rate(fps).unwrap();
        assert_eq!((tb.num(), tb.den()), (1001, 30000));

        let tb = TimeBase::from_sample_rate(48000).unwrap();
        assert_eq!((tb.num(), tb.den()), (1, 48000));
    }

    #[test]
    fn test_no_pts_survives_rescale() {
        let ts = Timestamp::none();
        assert!(!ts.rescale(TimeBase::MPEG).is_valid());
        assert_eq!(TimeBase::MPEG.rescale(NO_PTS, TimeBase::SECONDS), NO_PTS);
    }

    #[test]
    fn test_timestamp_cross_base_ordering() {
        let a = Timestamp::new(90000, TimeBase::MPEG);
        let b = Timestamp::new(1000, TimeBase::MILLISECONDS);
        let c = Timestamp::new(1001, TimeBase::MILLISECONDS);
        assert_eq!(a, b);
        assert!(a < c);
        assert!(Timestamp::none() < a);
    }

    #[test]
    fn test_timestamp_display() {
        let ts = Timestamp::new(3_723_500_000, TimeBase::MICROSECONDS);
        assert_eq!(ts.to_string(), "01:02:03.500");
        assert_eq!(Timestamp::none().to_string(), "NOPTS");
    }
}
