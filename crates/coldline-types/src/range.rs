use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Inclusive time window `[earliest, latest]` covered by a bucket or
/// requested by a filter.
///
/// Ordering invariant: `earliest <= latest`. Construction through
/// [`TimeRange::new`] enforces it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    earliest: DateTime<Utc>,
    latest: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting `earliest > latest`.
    pub fn new(earliest: DateTime<Utc>, latest: DateTime<Utc>) -> Result<Self, TypeError> {
        if earliest > latest {
            return Err(TypeError::InvertedRange { earliest, latest });
        }
        Ok(Self { earliest, latest })
    }

    /// Create a range from epoch seconds.
    pub fn from_epoch_secs(earliest: i64, latest: i64) -> Result<Self, TypeError> {
        Self::new(epoch_secs(earliest)?, epoch_secs(latest)?)
    }

    /// The widest representable range. Used when a filter bound is omitted.
    pub fn unbounded() -> Self {
        Self {
            earliest: DateTime::<Utc>::MIN_UTC,
            latest: DateTime::<Utc>::MAX_UTC,
        }
    }

    pub fn earliest(&self) -> DateTime<Utc> {
        self.earliest
    }

    pub fn latest(&self) -> DateTime<Utc> {
        self.latest
    }

    /// Returns `true` if the two inclusive ranges share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.earliest <= other.latest && other.earliest <= self.latest
    }

    /// Returns `true` if `instant` falls inside this range.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.earliest <= instant && instant <= self.latest
    }
}

pub(crate) fn epoch_secs(secs: i64) -> Result<DateTime<Utc>, TypeError> {
    DateTime::from_timestamp(secs, 0).ok_or(TypeError::TimestampOutOfRange(secs))
}

impl fmt::Debug for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimeRange({}..={})",
            self.earliest.timestamp(),
            self.latest.timestamp()
        )
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.earliest.to_rfc3339(), self.latest.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(a: i64, b: i64) -> TimeRange {
        TimeRange::from_epoch_secs(a, b).unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = TimeRange::from_epoch_secs(10, 5).unwrap_err();
        assert!(matches!(err, TypeError::InvertedRange { .. }));
    }

    #[test]
    fn single_instant_range_is_valid() {
        let r = range(7, 7);
        assert_eq!(r.earliest(), r.latest());
        assert!(r.contains(epoch_secs(7).unwrap()));
    }

    #[test]
    fn overlapping_ranges() {
        assert!(range(0, 10).overlaps(&range(5, 15)));
        assert!(range(5, 15).overlaps(&range(0, 10)));
        assert!(range(0, 10).overlaps(&range(10, 20)));
        assert!(range(0, 100).overlaps(&range(40, 50)));
    }

    #[test]
    fn disjoint_ranges() {
        assert!(!range(0, 9).overlaps(&range(10, 20)));
        assert!(!range(21, 30).overlaps(&range(10, 20)));
    }

    #[test]
    fn unbounded_overlaps_everything() {
        assert!(TimeRange::unbounded().overlaps(&range(0, 1)));
        assert!(TimeRange::unbounded().overlaps(&range(i32::MAX as i64, i32::MAX as i64)));
    }

    #[test]
    fn debug_shows_epoch_seconds() {
        assert_eq!(format!("{:?}", range(1, 2)), "TimeRange(1..=2)");
    }
}
