//! The canonical representation of a single metered measurement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TimelineError};

//==================================================================================
// 1. SampleValue
//==================================================================================

/// The numeric payload of a sample.
///
/// Equality is exact: doubles compare by bit pattern, so `-0.0` and `0.0` are
/// different values and a NaN is equal to an identical NaN. This is the notion
/// of "same value" the encoder uses for repeat compression, and the one the
/// round-trip guarantee is stated in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum SampleValue {
    Integer(i64),
    Double(f64),
}

impl SampleValue {
    /// Returns the value widened to `f64`. Lossy for integers beyond 2^53.
    pub fn as_f64(&self) -> f64 {
        match *self {
            SampleValue::Integer(v) => v as f64,
            SampleValue::Double(v) => v,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, SampleValue::Integer(_))
    }
}

impl PartialEq for SampleValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SampleValue::Integer(a), SampleValue::Integer(b)) => a == b,
            (SampleValue::Double(a), SampleValue::Double(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for SampleValue {}

macro_rules! impl_from_lossless {
    ($variant:ident, $target:ty, $($src:ty),+) => {
        $(
            impl From<$src> for SampleValue {
                fn from(v: $src) -> Self {
                    SampleValue::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

impl_from_lossless!(Integer, i64, i8, i16, i32, i64, u8, u16, u32);
impl_from_lossless!(Double, f64, f32, f64);

/// Raw counters are often `u64`; values above `i64::MAX` have no exact encoding.
impl TryFrom<u64> for SampleValue {
    type Error = TimelineError;

    fn try_from(v: u64) -> Result<Self> {
        i64::try_from(v).map(SampleValue::Integer).map_err(|_| {
            TimelineError::PrecisionLoss(format!("counter value {} exceeds i64::MAX", v))
        })
    }
}

impl TryFrom<i128> for SampleValue {
    type Error = TimelineError;

    fn try_from(v: i128) -> Result<Self> {
        i64::try_from(v).map(SampleValue::Integer).map_err(|_| {
            TimelineError::PrecisionLoss(format!("value {} does not fit in 64 bits", v))
        })
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Integer(v) => write!(f, "{}", v),
            SampleValue::Double(v) => write!(f, "{}", v),
        }
    }
}

//==================================================================================
// 2. Sample
//==================================================================================

/// A single (timestamp, value) measurement for one metric.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: SampleValue,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: impl Into<SampleValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
        }
    }

    /// Builds a sample from unix seconds.
    pub fn at_unix(seconds: i64, value: impl Into<SampleValue>) -> Result<Self> {
        let timestamp = from_unix_seconds(seconds).ok_or_else(|| {
            TimelineError::PrecisionLoss(format!("unix time {} is out of range", seconds))
        })?;
        Ok(Self::new(timestamp, value))
    }
}

//==================================================================================
// 3. Timestamp Helpers
//==================================================================================

/// The stream format carries whole seconds only; anything finer cannot round-trip.
pub(crate) fn unix_seconds(timestamp: &DateTime<Utc>) -> Result<i64> {
    if timestamp.timestamp_subsec_nanos() != 0 {
        return Err(TimelineError::PrecisionLoss(format!(
            "timestamp {} has a sub-second component",
            timestamp
        )));
    }
    Ok(timestamp.timestamp())
}

pub(crate) fn from_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_double_equality_is_bitwise() {
        assert_ne!(SampleValue::Double(0.0), SampleValue::Double(-0.0));
        assert_eq!(SampleValue::Double(f64::NAN), SampleValue::Double(f64::NAN));
        assert_ne!(SampleValue::Integer(1), SampleValue::Double(1.0));
    }

    #[test]
    fn test_oversized_counter_is_precision_loss() {
        assert_eq!(
            SampleValue::try_from(42u64).unwrap(),
            SampleValue::Integer(42)
        );
        let result = SampleValue::try_from(u64::MAX);
        assert!(matches!(result, Err(TimelineError::PrecisionLoss(_))));
        assert!(SampleValue::try_from(i128::MIN).is_err());
    }

    #[test]
    fn test_sub_second_timestamp_rejected() {
        let whole = from_unix_seconds(1_700_000_000).unwrap();
        assert_eq!(unix_seconds(&whole).unwrap(), 1_700_000_000);

        let fractional = whole + Duration::milliseconds(250);
        assert!(matches!(
            unix_seconds(&fractional),
            Err(TimelineError::PrecisionLoss(_))
        ));
    }
}
