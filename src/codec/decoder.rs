//! The sample decoder: the exact inverse of `encoder::encode`.
//!
//! The decoder never guesses. Any byte sequence the encoder could not have
//! produced (a truncated payload, an empty delta run, a missing end marker, a
//! repeat with nothing to repeat, a timestamp that does not move forward...)
//! stops decoding with `CorruptStream`.

use chrono::{DateTime, Utc};

use crate::error::{Result, TimelineError};
use crate::format::{Opcode, Unit, MAX_DELTA_TIME};
use crate::kernels::cursor::ByteCursor;
use crate::kernels::width::ValueWidth;
use crate::types::{from_unix_seconds, unix_seconds, Sample, SampleValue};

//==================================================================================
// 1. Streaming Decoder
//==================================================================================

/// Decodes a stream one sample at a time.
///
/// Also usable as an `Iterator<Item = Result<Sample>>`; the iterator yields at
/// most one error and then stops.
pub struct SampleDecoder<'a> {
    cursor: ByteCursor<'a>,
    /// Running timestamp, in unix seconds. Starts at the reference time.
    time: i64,
    previous_time: Option<i64>,
    previous_value: Option<SampleValue>,
    width: Option<ValueWidth>,
    pending_repeats: u32,
    /// Samples still owed by a `RepeatDelta` unit, and the delta they use.
    pending_deltas: u32,
    repeated_delta: i64,
    decoded: usize,
    done: bool,
}

impl<'a> SampleDecoder<'a> {
    pub fn new(bytes: &'a [u8], reference: &DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            cursor: ByteCursor::new(bytes),
            time: unix_seconds(reference)?,
            previous_time: None,
            previous_value: None,
            width: None,
            pending_repeats: 0,
            pending_deltas: 0,
            repeated_delta: 0,
            decoded: 0,
            done: false,
        })
    }

    /// Number of samples produced so far.
    pub fn decoded(&self) -> usize {
        self.decoded
    }

    /// Returns the next sample, `Ok(None)` after `EndOfStream`, or the corruption error.
    pub fn next_sample(&mut self) -> Result<Option<Sample>> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_sample();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn read_sample(&mut self) -> Result<Option<Sample>> {
        if self.pending_deltas > 0 {
            // The time unit was consumed by the RepeatDelta that covers this sample.
            let offset = self.cursor.position();
            self.pending_deltas -= 1;
            let secs = self.advance(offset, self.repeated_delta)?;
            return self.emit(offset, secs).map(Some);
        }

        loop {
            let offset = self.cursor.position();
            let byte = self.cursor.read_u8().map_err(|_| {
                TimelineError::corrupt(offset, "stream ended without an end-of-stream marker")
            })?;

            match Unit::classify(byte) {
                Unit::Delta(delta) => {
                    let secs = self.advance(offset, i64::from(delta))?;
                    return self.emit(offset, secs).map(Some);
                }
                Unit::Op(Opcode::RepeatDelta) => {
                    let secs = self.start_delta_run(offset)?;
                    return self.emit(offset, secs).map(Some);
                }
                Unit::Op(Opcode::FullTime) => {
                    let secs = i64::from_le_bytes(self.cursor.read_array()?);
                    return self.emit(offset, secs).map(Some);
                }
                Unit::Op(Opcode::EndOfStream) => {
                    self.check_end(offset)?;
                    return Ok(None);
                }
                Unit::Op(op) if op.is_repeat() => self.start_repeat(offset, op)?,
                Unit::Op(op) => self.switch_width(offset, op)?,
                Unit::Unknown(index) => {
                    return Err(TimelineError::corrupt(
                        offset,
                        format!("unknown opcode index {:#04x}", index),
                    ));
                }
            }
        }
    }

    fn start_repeat(&mut self, offset: usize, op: Opcode) -> Result<()> {
        if self.previous_value.is_none() {
            return Err(TimelineError::corrupt(
                offset,
                format!("{} before any sample", op.name()),
            ));
        }
        if self.pending_repeats > 0 {
            return Err(TimelineError::corrupt(
                offset,
                format!(
                    "{} while {} repeated sample(s) are still pending",
                    op.name(),
                    self.pending_repeats
                ),
            ));
        }
        let count = match op {
            Opcode::RepeatOne => 1,
            Opcode::RepeatByte => u32::from(self.cursor.read_u8()?),
            Opcode::RepeatShort => u32::from(u16::from_le_bytes(self.cursor.read_array()?)),
            _ => return Err(TimelineError::corrupt(offset, "not a repeat opcode")),
        };
        if count == 0 {
            return Err(TimelineError::corrupt(
                offset,
                format!("{} with a zero count", op.name()),
            ));
        }
        self.pending_repeats = count;
        Ok(())
    }

    /// Reads a `RepeatDelta` unit and returns the time of the first sample it covers.
    fn start_delta_run(&mut self, offset: usize) -> Result<i64> {
        let count = u16::from_le_bytes(self.cursor.read_array()?);
        let delta = self.cursor.read_u8()?;
        if count == 0 {
            return Err(TimelineError::corrupt(offset, "REPEAT_DELTA with a zero count"));
        }
        if delta == 0 || delta >= MAX_DELTA_TIME {
            return Err(TimelineError::corrupt(
                offset,
                format!("REPEAT_DELTA with invalid delta {}", delta),
            ));
        }
        self.pending_deltas = u32::from(count) - 1;
        self.repeated_delta = i64::from(delta);
        self.advance(offset, self.repeated_delta)
    }

    fn advance(&self, offset: usize, delta: i64) -> Result<i64> {
        self.time
            .checked_add(delta)
            .ok_or_else(|| TimelineError::corrupt(offset, "timestamp overflow"))
    }

    fn switch_width(&mut self, offset: usize, op: Opcode) -> Result<()> {
        let width = op.value_width().ok_or_else(|| {
            TimelineError::corrupt(offset, format!("unexpected opcode {}", op.name()))
        })?;
        if self.pending_repeats > 0 {
            return Err(TimelineError::corrupt(
                offset,
                format!("{} inside a repeat run", op.name()),
            ));
        }
        self.width = Some(width);
        Ok(())
    }

    fn check_end(&self, offset: usize) -> Result<()> {
        if self.pending_repeats > 0 {
            return Err(TimelineError::corrupt(
                offset,
                format!(
                    "end of stream with {} repeated sample(s) still pending",
                    self.pending_repeats
                ),
            ));
        }
        if !self.cursor.is_exhausted() {
            return Err(TimelineError::corrupt(
                offset + 1,
                format!(
                    "{} trailing byte(s) after end of stream",
                    self.cursor.remaining()
                ),
            ));
        }
        Ok(())
    }

    /// Completes a sample whose time unit started at `offset`.
    fn emit(&mut self, offset: usize, secs: i64) -> Result<Sample> {
        if let Some(previous) = self.previous_time {
            if secs <= previous {
                return Err(TimelineError::corrupt(
                    offset,
                    format!("timestamp {} does not follow {}", secs, previous),
                ));
            }
        }
        let timestamp = from_unix_seconds(secs).ok_or_else(|| {
            TimelineError::corrupt(offset, format!("timestamp {} is out of range", secs))
        })?;

        let value = if self.pending_repeats > 0 {
            self.pending_repeats -= 1;
            self.previous_value
                .ok_or_else(|| TimelineError::corrupt(offset, "repeat with no previous value"))?
        } else {
            let width = self.width.ok_or_else(|| {
                TimelineError::corrupt(offset, "sample value with no active width marker")
            })?;
            width.read(&mut self.cursor)?
        };

        self.time = secs;
        self.previous_time = Some(secs);
        self.previous_value = Some(value);
        self.decoded += 1;
        Ok(Sample { timestamp, value })
    }
}

impl Iterator for SampleDecoder<'_> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_sample().transpose()
    }
}

//==================================================================================
// 2. One-Shot API
//==================================================================================

/// The result of a best-effort decode.
///
/// `samples` are those decoded before the corruption point; when `error` is
/// set they are an incomplete prefix and must not be used as the full series.
#[derive(Debug)]
pub struct DecodeOutcome {
    pub samples: Vec<Sample>,
    pub error: Option<TimelineError>,
}

impl DecodeOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Converts into the strict form, discarding the partial samples on error.
    pub fn into_result(self) -> Result<Vec<Sample>> {
        match self.error {
            None => Ok(self.samples),
            Some(err) => Err(err),
        }
    }
}

/// Decodes a whole stream encoded against `reference`.
pub fn decode(bytes: &[u8], reference: &DateTime<Utc>) -> Result<Vec<Sample>> {
    decode_partial(bytes, reference)?.into_result()
}

/// Decodes as far as possible, keeping the samples read before any corruption.
///
/// Only an unusable `reference` fails outright; stream errors are reported in
/// the outcome.
pub fn decode_partial(bytes: &[u8], reference: &DateTime<Utc>) -> Result<DecodeOutcome> {
    let mut decoder = SampleDecoder::new(bytes, reference)?;
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    loop {
        match decoder.next_sample() {
            Ok(Some(sample)) => samples.push(sample),
            Ok(None) => {
                return Ok(DecodeOutcome {
                    samples,
                    error: None,
                })
            }
            Err(err) => {
                log::debug!(
                    "decode stopped after {} sample(s): {}",
                    samples.len(),
                    err
                );
                return Ok(DecodeOutcome {
                    samples,
                    error: Some(err),
                });
            }
        }
    }
}

/// Validates a stream encoded against `reference` and counts its samples
/// without collecting them. Accepts exactly the streams `decode` accepts.
pub fn count_samples(bytes: &[u8], reference: &DateTime<Utc>) -> Result<usize> {
    let mut decoder = SampleDecoder::new(bytes, reference)?;
    while decoder.next_sample()?.is_some() {}
    Ok(decoder.decoded())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> DateTime<Utc> {
        DateTime::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn test_value_without_width_marker_is_corrupt() {
        let bytes = [5u8, 1, Opcode::EndOfStream.index()];
        let err = decode(&bytes, &reference()).unwrap_err();
        assert!(matches!(err, TimelineError::CorruptStream { offset: 0, .. }));
    }

    #[test]
    fn test_repeat_before_any_sample_is_corrupt() {
        let bytes = [Opcode::RepeatOne.index(), 5, Opcode::EndOfStream.index()];
        assert!(decode(&bytes, &reference()).is_err());
    }

    #[test]
    fn test_zero_repeat_count_is_corrupt() {
        let bytes = [
            Opcode::Byte.index(),
            1,
            9,
            Opcode::RepeatByte.index(),
            0,
            Opcode::EndOfStream.index(),
        ];
        let err = decode(&bytes, &reference()).unwrap_err();
        assert!(matches!(err, TimelineError::CorruptStream { offset: 3, .. }));
    }

    #[test]
    fn test_end_with_pending_repeats_is_corrupt() {
        let bytes = [
            Opcode::Byte.index(),
            1,
            9,
            Opcode::RepeatByte.index(),
            2,
            1,
            Opcode::EndOfStream.index(),
        ];
        let outcome = decode_partial(&bytes, &reference()).unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.samples.len(), 2);
    }

    #[test]
    fn test_width_marker_inside_repeat_run_is_corrupt() {
        let bytes = [
            Opcode::Byte.index(),
            1,
            9,
            Opcode::RepeatByte.index(),
            2,
            1,
            Opcode::Short.index(),
            1,
            Opcode::EndOfStream.index(),
        ];
        let err = decode(&bytes, &reference()).unwrap_err();
        assert!(matches!(err, TimelineError::CorruptStream { offset: 6, .. }));
    }

    #[test]
    fn test_non_increasing_literal_is_corrupt() {
        // A zero delta is only meaningful for the first sample.
        let bytes = [Opcode::Byte.index(), 0, 1, 0, 2, Opcode::EndOfStream.index()];
        let outcome = decode_partial(&bytes, &reference()).unwrap();
        assert_eq!(outcome.samples.len(), 1);
        assert!(matches!(
            outcome.error,
            Some(TimelineError::CorruptStream { offset: 3, .. })
        ));
    }

    #[test]
    fn test_redundant_width_markers_are_accepted() {
        let bytes = [
            Opcode::Byte.index(),
            Opcode::Byte.index(),
            2,
            4,
            Opcode::EndOfStream.index(),
        ];
        let samples = decode(&bytes, &reference()).unwrap();
        assert_eq!(samples, vec![Sample::at_unix(2, 4).unwrap()]);
    }

    #[test]
    fn test_iterator_stops_after_first_error() {
        // A repeat with a zero count after one good sample.
        let bytes = [Opcode::Byte.index(), 1, 1, Opcode::RepeatByte.index(), 0, 2];
        let mut decoder = SampleDecoder::new(&bytes, &reference()).unwrap();
        assert!(matches!(decoder.next(), Some(Ok(_))));
        assert!(matches!(decoder.next(), Some(Err(_))));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn test_count_samples_matches_decode() {
        let bytes = [
            Opcode::IntZero.index(),
            3,
            Opcode::Byte.index(),
            Opcode::FullTime.index(),
        ];
        // Truncated FullTime payload.
        assert!(count_samples(&bytes, &reference()).is_err());

        let bytes = [
            Opcode::IntZero.index(),
            3,
            Opcode::RepeatShort.index(),
            0x02,
            0x01,
        ];
        let mut full = bytes.to_vec();
        full.extend(std::iter::repeat(1u8).take(0x0102));
        full.push(Opcode::EndOfStream.index());
        assert_eq!(count_samples(&full, &reference()).unwrap(), 1 + 0x0102);
    }

    #[test]
    fn test_count_samples_uses_the_reference() {
        let at = |secs| DateTime::from_timestamp(secs, 0).unwrap();

        // Literal deltas against a negative reference, then a jump forward.
        let samples = [
            Sample::at_unix(-995, 1).unwrap(),
            Sample::at_unix(-500, 2).unwrap(),
        ];
        let bytes = crate::codec::encode(&samples, &at(-1_000)).unwrap();
        assert_eq!(count_samples(&bytes, &at(-1_000)).unwrap(), 2);

        // A full time that goes backwards relative to the reference is corrupt for both.
        let mut bytes = vec![Opcode::Byte.index(), 5, 1, Opcode::FullTime.index()];
        bytes.extend_from_slice(&100i64.to_le_bytes());
        bytes.push(2);
        bytes.push(Opcode::EndOfStream.index());
        assert!(matches!(
            decode(&bytes, &at(1_000)),
            Err(TimelineError::CorruptStream { offset: 3, .. })
        ));
        assert!(matches!(
            count_samples(&bytes, &at(1_000)),
            Err(TimelineError::CorruptStream { offset: 3, .. })
        ));
    }

    #[test]
    fn test_repeat_delta_implies_following_times() {
        let bytes = [
            Opcode::Byte.index(),
            Opcode::RepeatDelta.index(),
            3,
            0,
            60,
            7,
            8,
            9,
            Opcode::EndOfStream.index(),
        ];
        let samples = decode(&bytes, &reference()).unwrap();
        let expected: Vec<Sample> = [(60, 7), (120, 8), (180, 9)]
            .iter()
            .map(|&(secs, v)| Sample::at_unix(secs, v).unwrap())
            .collect();
        assert_eq!(samples, expected);
        assert_eq!(count_samples(&bytes, &reference()).unwrap(), 3);
    }

    #[test]
    fn test_repeat_delta_with_repeated_values_needs_no_payload() {
        let bytes = [
            Opcode::Byte.index(),
            0,
            4,
            Opcode::RepeatByte.index(),
            3,
            Opcode::RepeatDelta.index(),
            3,
            0,
            10,
            Opcode::EndOfStream.index(),
        ];
        let samples = decode(&bytes, &reference()).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[3], Sample::at_unix(30, 4).unwrap());
    }

    #[test]
    fn test_malformed_repeat_delta_is_corrupt() {
        for unit in [[0u8, 0, 60], [2, 0, 0], [2, 0, MAX_DELTA_TIME]] {
            let mut bytes = vec![Opcode::Byte.index(), Opcode::RepeatDelta.index()];
            bytes.extend_from_slice(&unit);
            bytes.extend_from_slice(&[1, 2, Opcode::EndOfStream.index()]);
            assert!(
                matches!(
                    decode(&bytes, &reference()),
                    Err(TimelineError::CorruptStream { offset: 1, .. })
                ),
                "unit {:?} was accepted",
                unit
            );
        }

        // The run promises two samples but the stream ends after one.
        let bytes = [
            Opcode::Byte.index(),
            Opcode::RepeatDelta.index(),
            2,
            0,
            5,
            1,
            Opcode::EndOfStream.index(),
        ];
        let outcome = decode_partial(&bytes, &reference()).unwrap();
        assert_eq!(outcome.samples.len(), 2);
        assert!(!outcome.is_complete());
    }
}
