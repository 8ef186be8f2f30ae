//! This module defines the core, strongly-typed data representations used
//! throughout the timeline codec and service.
//!
//! It includes the `Sample`/`SampleValue` pair the codec operates on, the
//! dictionary's `MetricId`/`MetricEntry`, and the `TimeWindow` that keys
//! stored blobs.

pub mod metric;
pub mod sample;
pub mod window;

// Re-export the main type(s) for easier access.
pub use metric::{MetricEntry, MetricId};
pub use sample::{Sample, SampleValue};
pub use window::TimeWindow;

pub(crate) use sample::{from_unix_seconds, unix_seconds};
