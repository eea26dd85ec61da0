//! Simulated time.
//!
//! [`Time`] is a point on the simulated timeline and [`Duration`] the
//! difference between two points. Both carry the [`TimeUnit`] they were
//! expressed in; values in different units compare and combine through the
//! fixed nanosecond ratio of each unit, so a coordinator working in seconds
//! can order the events of a submodel declared in milliseconds.
//!
//! # Example
//!
//! ```
//! use devs_hioa::time::{Duration, Time, TimeUnit};
//!
//! let t = Time::new(1.5, TimeUnit::Seconds);
//! let later = t + Duration::new(500.0, TimeUnit::Milliseconds);
//! assert_eq!(later, Time::new(2.0, TimeUnit::Seconds));
//! assert!(t + Duration::INFINITY > later);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Sub};

/// Unit in which a model or an architecture expresses simulated time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Number of nanoseconds in one unit.
    pub const fn nanos(self) -> u64 {
        match self {
            TimeUnit::Nanoseconds => 1,
            TimeUnit::Microseconds => 1_000,
            TimeUnit::Milliseconds => 1_000_000,
            TimeUnit::Seconds => 1_000_000_000,
            TimeUnit::Minutes => 60_000_000_000,
            TimeUnit::Hours => 3_600_000_000_000,
            TimeUnit::Days => 86_400_000_000_000,
        }
    }

    /// How many `other` units fit in one `self` unit.
    pub fn ratio_to(self, other: TimeUnit) -> f64 {
        self.nanos() as f64 / other.nanos() as f64
    }

    /// Short symbol used when displaying times.
    pub fn symbol(self) -> &'static str {
        match self {
            TimeUnit::Nanoseconds => "ns",
            TimeUnit::Microseconds => "us",
            TimeUnit::Milliseconds => "ms",
            TimeUnit::Seconds => "s",
            TimeUnit::Minutes => "min",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

fn convert(value: f64, from: TimeUnit, to: TimeUnit) -> f64 {
    if from == to || value.is_infinite() {
        value
    } else {
        value * from.nanos() as f64 / to.nanos() as f64
    }
}

fn compare(a: f64, a_unit: TimeUnit, b: f64, b_unit: TimeUnit) -> Ordering {
    if a_unit == b_unit {
        return a.total_cmp(&b);
    }
    // Scale both sides to nanoseconds; exact for integral values below 2^53.
    let a = a * a_unit.nanos() as f64;
    let b = b * b_unit.nanos() as f64;
    a.total_cmp(&b)
}

/// A point on the simulated timeline.
///
/// Totally ordered; `+inf` is the time of a model that never activates
/// on its own.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Time {
    value: f64,
    unit: TimeUnit,
}

impl Time {
    /// Creates a time value. NaN is rejected in debug builds.
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        debug_assert!(!value.is_nan(), "simulated time cannot be NaN");
        Self { value, unit }
    }

    /// The origin of the timeline in the given unit.
    pub fn zero(unit: TimeUnit) -> Self {
        Self::new(0.0, unit)
    }

    /// The time that never comes.
    pub fn infinity(unit: TimeUnit) -> Self {
        Self::new(f64::INFINITY, unit)
    }

    /// Numeric value in [`Time::unit`].
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unit this time is expressed in.
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Returns true for `+inf`.
    pub fn is_infinite(&self) -> bool {
        self.value.is_infinite()
    }

    /// Re-expresses this time in another unit.
    pub fn to_unit(self, unit: TimeUnit) -> Self {
        Self::new(convert(self.value, self.unit, unit), unit)
    }

    /// Elapsed duration since `earlier`, in this time's unit.
    pub fn since(self, earlier: Time) -> Duration {
        self - earlier
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.value, self.unit, other.value, other.unit)
    }
}

impl Add<Duration> for Time {
    type Output = Time;

    fn add(self, rhs: Duration) -> Time {
        Time::new(self.value + convert(rhs.value, rhs.unit, self.unit), self.unit)
    }
}

impl Sub for Time {
    type Output = Duration;

    fn sub(self, rhs: Time) -> Duration {
        Duration::new(self.value - convert(rhs.value, rhs.unit, self.unit), self.unit)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Difference between two simulated times.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Duration {
    value: f64,
    unit: TimeUnit,
}

impl Duration {
    /// "Passive until an external event arrives".
    ///
    /// Infinity compares equal across units, so the unit tag is irrelevant.
    pub const INFINITY: Duration = Duration {
        value: f64::INFINITY,
        unit: TimeUnit::Seconds,
    };

    /// Creates a duration. NaN is rejected in debug builds.
    pub fn new(value: f64, unit: TimeUnit) -> Self {
        debug_assert!(!value.is_nan(), "simulated duration cannot be NaN");
        Self { value, unit }
    }

    /// The zero duration in the given unit.
    pub fn zero(unit: TimeUnit) -> Self {
        Self::new(0.0, unit)
    }

    /// Numeric value in [`Duration::unit`].
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unit this duration is expressed in.
    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Returns true for [`Duration::INFINITY`].
    pub fn is_infinite(&self) -> bool {
        self.value.is_infinite()
    }

    /// Returns true for a zero-length duration.
    pub fn is_zero(&self) -> bool {
        self.value == 0.0
    }

    /// Re-expresses this duration in another unit.
    pub fn to_unit(self, unit: TimeUnit) -> Self {
        Self::new(convert(self.value, self.unit, unit), unit)
    }

    /// Converts to a wall-clock duration; `None` when infinite.
    ///
    /// Negative durations clamp to zero.
    pub fn to_std(self) -> Option<std::time::Duration> {
        if self.is_infinite() {
            return None;
        }
        let secs = convert(self.value, self.unit, TimeUnit::Seconds).max(0.0);
        std::time::Duration::try_from_secs_f64(secs).ok()
    }

    /// Converts a wall-clock duration into the given simulated unit.
    pub fn from_std(duration: std::time::Duration, unit: TimeUnit) -> Self {
        Self::new(
            convert(duration.as_secs_f64(), TimeUnit::Seconds, unit),
            unit,
        )
    }
}

impl PartialEq for Duration {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Duration {}

impl PartialOrd for Duration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Duration {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self.value, self.unit, other.value, other.unit)
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::new(self.value + convert(rhs.value, rhs.unit, self.unit), self.unit)
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::new(self.value - convert(rhs.value, rhs.unit, self.unit), self.unit)
    }
}

impl Mul<f64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: f64) -> Duration {
        Duration::new(self.value * rhs, self.unit)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_ratios() {
        assert_eq!(TimeUnit::Seconds.ratio_to(TimeUnit::Milliseconds), 1000.0);
        assert_eq!(TimeUnit::Hours.ratio_to(TimeUnit::Minutes), 60.0);
        assert_eq!(TimeUnit::Milliseconds.ratio_to(TimeUnit::Seconds), 0.001);
    }

    #[test]
    fn test_time_ordering_across_units() {
        let a = Time::new(1.0, TimeUnit::Seconds);
        let b = Time::new(1000.0, TimeUnit::Milliseconds);
        let c = Time::new(1001.0, TimeUnit::Milliseconds);

        assert_eq!(a, b);
        assert!(c > a);
        assert!(Time::infinity(TimeUnit::Seconds) > c);
        assert_eq!(
            Time::infinity(TimeUnit::Seconds),
            Time::infinity(TimeUnit::Hours)
        );
    }

    #[test]
    fn test_time_arithmetic() {
        let t = Time::new(2.0, TimeUnit::Seconds);
        let d = Duration::new(250.0, TimeUnit::Milliseconds);

        let later = t + d;
        assert_eq!(later.unit(), TimeUnit::Seconds);
        assert_eq!(later.value(), 2.25);

        let back = later - t;
        assert_eq!(back, d);
        assert_eq!(later.since(t).unit(), TimeUnit::Seconds);
    }

    #[test]
    fn test_infinite_advance() {
        let t = Time::new(5.0, TimeUnit::Minutes);
        let never = t + Duration::INFINITY;
        assert!(never.is_infinite());
        assert_eq!(never.unit(), TimeUnit::Minutes);
    }

    #[test]
    fn test_duration_helpers() {
        let zero = Duration::zero(TimeUnit::Seconds);
        assert!(zero.is_zero());
        assert!(!zero.is_infinite());
        assert!(Duration::INFINITY.is_infinite());

        let d = Duration::new(2.0, TimeUnit::Seconds) * 1.5;
        assert_eq!(d.value(), 3.0);
        assert_eq!(
            (d - Duration::new(1.0, TimeUnit::Seconds)).value(),
            2.0
        );
    }

    #[test]
    fn test_std_conversion() {
        let d = Duration::new(1500.0, TimeUnit::Milliseconds);
        assert_eq!(d.to_std(), Some(std::time::Duration::from_millis(1500)));
        assert_eq!(Duration::INFINITY.to_std(), None);
        assert_eq!(
            Duration::new(-3.0, TimeUnit::Seconds).to_std(),
            Some(std::time::Duration::ZERO)
        );

        let back = Duration::from_std(std::time::Duration::from_secs(2), TimeUnit::Milliseconds);
        assert_eq!(back.value(), 2000.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Time::new(2.0, TimeUnit::Seconds).to_string(), "2 s");
        assert_eq!(Duration::new(0.5, TimeUnit::Hours).to_string(), "0.5 h");
    }

    #[test]
    fn test_unit_serialization() {
        let json = serde_json::to_string(&TimeUnit::Milliseconds).unwrap();
        assert_eq!(json, "\"milliseconds\"");
        let unit: TimeUnit = serde_json::from_str("\"hours\"").unwrap();
        assert_eq!(unit, TimeUnit::Hours);
    }
}
