//! This file is the root of the `meter_timeline` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`codec`, `kernels`, etc.)
//!     so the Rust compiler knows they exist.
//! 2.  Re-exporting the public surface: the codec functions, the metric
//!     dictionary, the persistence traits and the timeline service.

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
pub mod codec;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod format;
pub mod kernels;
pub mod logging;
pub mod store;
pub mod timeline;
pub mod types;

//==================================================================================
// 2. Public Surface
//==================================================================================
pub use codec::{
    combine_streams, count_samples, decode, decode_partial, encode, DecodeOutcome, SampleDecoder,
};
pub use config::{LogConfig, TimelineConfig};
pub use dictionary::MetricDictionary;
pub use error::{Result, StoreError, TimelineError};
pub use format::{Opcode, FORMAT_VERSION, MAX_DELTA_TIME};
pub use logging::init_logging;
pub use store::{BlobStore, InMemoryStore, MetricStore, StoredBlob};
pub use timeline::{TimelineChunk, TimelineService};
pub use types::{MetricEntry, MetricId, Sample, SampleValue, TimeWindow};
