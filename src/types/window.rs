use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TimelineError};
use crate::types::sample::{from_unix_seconds, unix_seconds};

/// A half-open `[start, end)` interval of whole seconds.
///
/// Stored blobs are keyed by `(MetricId, TimeWindow)`, and the window's start is
/// the reference time the blob's stream was encoded against.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        unix_seconds(&start)?;
        unix_seconds(&end)?;
        if start >= end {
            return Err(TimelineError::InvalidRange(format!(
                "time window start {} is not before end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The window of length `length_secs` containing `timestamp`, aligned to the unix epoch.
    pub fn aligned(timestamp: &DateTime<Utc>, length_secs: u32) -> Result<Self> {
        if length_secs == 0 {
            return Err(TimelineError::InvalidConfig(
                "window length must be positive".to_string(),
            ));
        }
        let length = i64::from(length_secs);
        let secs = unix_seconds(timestamp)?;
        let start = secs.div_euclid(length) * length;
        let out_of_range = || {
            TimelineError::PrecisionLoss(format!("window around {} is out of range", timestamp))
        };
        Ok(Self {
            start: from_unix_seconds(start).ok_or_else(out_of_range)?,
            end: from_unix_seconds(start + length).ok_or_else(out_of_range)?,
        })
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        *timestamp >= self.start && *timestamp < self.end
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_secs(&self) -> i64 {
        (self.end - self.start).num_seconds()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.timestamp(), self.end.timestamp())
    }
}
