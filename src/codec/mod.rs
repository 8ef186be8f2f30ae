// In: src/codec/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Sample Codec
// ====================================================================================
//
// The codec is pure, stateless transformation logic. It owns no shared state and
// never blocks, so independent streams can be encoded and decoded in parallel.
//
// Data Flow (Encoding):
//
//   [&[Sample] + reference time]
//         |
//         `-> encoder::encode -> for each sample:
//               a. repeat opcode (start of a run of equal values), or
//                  width marker (only when the narrowest width changes)
//               b. time unit: literal delta < MAX_DELTA_TIME, else FullTime + i64
//               c. value payload in the active width (skipped for repeats)
//         `-> EndOfStream
//
// Data Flow (Decoding):
//
//   [&[u8] + the same reference time]
//         |
//         `-> decoder::SampleDecoder -> classifies each unit via format::Unit
//         `-> Vec<Sample> (or DecodeOutcome with the prefix decoded before corruption)
//
// ====================================================================================
pub mod decoder;
pub mod encoder;

pub use decoder::{count_samples, decode, decode_partial, DecodeOutcome, SampleDecoder};
pub use encoder::encode;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Merges several streams encoded against the same `reference` into one stream.
///
/// The streams are decoded in the given order and must form a single strictly
/// increasing sequence; overlap is reported as `NonMonotonicInput` by the encoder.
/// The inputs are left untouched: the result is a freshly encoded stream.
pub fn combine_streams<B: AsRef<[u8]>>(streams: &[B], reference: &DateTime<Utc>) -> Result<Vec<u8>> {
    let mut samples = Vec::new();
    for stream in streams {
        samples.extend(decode(stream.as_ref(), reference)?);
    }
    encode(&samples, reference)
}
