//! Pure, stateless, panic-free building blocks of the sample codec.
//!
//! - `cursor`: bounds-checked reads over an encoded stream, reporting the byte
//!   offset of any truncation.
//! - `width`: exact narrowing of sample values to the smallest lossless on-wire
//!   representation, and the matching payload readers and writers.

pub mod cursor;
pub mod width;
