//! The sample encoder: packs an ordered sample sequence into a byte stream.
//!
//! Per sample the encoder writes, in order: an optional width marker (when the
//! value's narrowest width differs from the active one) or, for a value equal to
//! its predecessor, a repeat opcode at the start of the run; then the time unit
//! (a literal delta or `FullTime` + absolute seconds); then the value payload
//! unless the sample is a repeat. The stream ends with `EndOfStream`.
//!
//! Runs of equal literal deltas are folded into one `RepeatDelta` unit when that
//! is shorter. Samples covered by it after the first carry no time unit, so such
//! a run never spans a sample that needs a width marker or a repeat opcode.

use chrono::{DateTime, Utc};

use crate::error::{Result, TimelineError};
use crate::format::{Opcode, MAX_DELTA_TIME, MAX_REPEAT_RUN, REPEAT_DELTA_UNIT_LEN};
use crate::kernels::width::ValueWidth;
use crate::types::{unix_seconds, Sample, SampleValue};

//==================================================================================
// 1. Value Plan
//==================================================================================

/// The opcode written before a sample's time unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Prefix {
    Width(ValueWidth),
    /// Start of a run of this many repeated values.
    Repeat(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValuePart {
    Repeated,
    Payload(ValueWidth),
}

#[derive(Debug, Clone, Copy)]
struct Step {
    prefix: Option<Prefix>,
    value: ValuePart,
}

/// Decides, for every sample, its prefix opcode and how its value is written.
fn plan_values(samples: &[Sample]) -> Vec<Step> {
    let mut steps = Vec::with_capacity(samples.len());
    let mut width: Option<ValueWidth> = None;
    let mut previous: Option<SampleValue> = None;

    let mut index = 0;
    while index < samples.len() {
        let value = samples[index].value;
        if previous == Some(value) {
            let run = samples[index..]
                .iter()
                .take_while(|s| s.value == value)
                .count();
            // Runs longer than one opcode can count are split.
            for offset in 0..run {
                let prefix = (offset % MAX_REPEAT_RUN == 0)
                    .then(|| Prefix::Repeat((run - offset).min(MAX_REPEAT_RUN)));
                steps.push(Step {
                    prefix,
                    value: ValuePart::Repeated,
                });
            }
            index += run;
        } else {
            let narrowest = ValueWidth::narrowest(&value);
            let prefix = (width != Some(narrowest)).then_some(Prefix::Width(narrowest));
            width = Some(narrowest);
            previous = Some(value);
            steps.push(Step {
                prefix,
                value: ValuePart::Payload(narrowest),
            });
            index += 1;
        }
    }
    steps
}

//==================================================================================
// 2. Time Plan
//==================================================================================

/// Unix seconds of every sample, checked to be strictly increasing.
fn sample_seconds(samples: &[Sample]) -> Result<Vec<i64>> {
    let mut secs: Vec<i64> = Vec::with_capacity(samples.len());
    for (index, sample) in samples.iter().enumerate() {
        let current = unix_seconds(&sample.timestamp)?;
        if let Some(&previous) = secs.last() {
            if current <= previous {
                return Err(TimelineError::NonMonotonicInput {
                    index,
                    previous: samples[index - 1].timestamp,
                    current: sample.timestamp,
                });
            }
        }
        secs.push(current);
    }
    Ok(secs)
}

fn is_literal(delta: i64) -> bool {
    (0..i64::from(MAX_DELTA_TIME)).contains(&delta)
}

//==================================================================================
// 3. Emission
//==================================================================================

struct EncoderState<'a> {
    samples: &'a [Sample],
    steps: Vec<Step>,
    secs: Vec<i64>,
    reference_secs: i64,
    out: Vec<u8>,
}

impl<'a> EncoderState<'a> {
    fn push_opcode(&mut self, op: Opcode) {
        self.out.push(op.index());
    }

    fn delta(&self, index: usize) -> i64 {
        match index {
            0 => self.secs[0] - self.reference_secs,
            _ => self.secs[index] - self.secs[index - 1],
        }
    }

    /// Number of samples from `start` that can share one `RepeatDelta` unit.
    fn delta_run(&self, start: usize) -> usize {
        let delta = self.delta(start);
        if delta < 1 || !is_literal(delta) {
            return 1;
        }
        let mut len = 1;
        while start + len < self.samples.len()
            && len < MAX_REPEAT_RUN
            && self.steps[start + len].prefix.is_none()
            && self.delta(start + len) == delta
        {
            len += 1;
        }
        len
    }

    fn push_prefix(&mut self, prefix: Option<Prefix>) {
        match prefix {
            None => {}
            Some(Prefix::Width(width)) => self.push_opcode(width.opcode()),
            Some(Prefix::Repeat(1)) => self.push_opcode(Opcode::RepeatOne),
            Some(Prefix::Repeat(count)) => match u8::try_from(count) {
                Ok(count) => {
                    self.push_opcode(Opcode::RepeatByte);
                    self.out.push(count);
                }
                Err(_) => {
                    self.push_opcode(Opcode::RepeatShort);
                    self.out.extend_from_slice(&(count as u16).to_le_bytes());
                }
            },
        }
    }

    fn push_time(&mut self, index: usize) {
        let delta = self.delta(index);
        if is_literal(delta) {
            self.out.push(delta as u8);
        } else {
            self.push_opcode(Opcode::FullTime);
            let secs = self.secs[index];
            self.out.extend_from_slice(&secs.to_le_bytes());
        }
    }

    fn push_value(&mut self, index: usize) -> Result<()> {
        match self.steps[index].value {
            ValuePart::Repeated => Ok(()),
            ValuePart::Payload(width) => width.write(&self.samples[index].value, &mut self.out),
        }
    }

    fn run(mut self) -> Result<Vec<u8>> {
        let mut index = 0;
        while index < self.samples.len() {
            self.push_prefix(self.steps[index].prefix);

            let run = self.delta_run(index);
            if run > REPEAT_DELTA_UNIT_LEN {
                let delta = self.delta(index) as u8;
                self.push_opcode(Opcode::RepeatDelta);
                self.out.extend_from_slice(&(run as u16).to_le_bytes());
                self.out.push(delta);
                for covered in index..index + run {
                    self.push_value(covered)?;
                }
                index += run;
            } else {
                self.push_time(index);
                self.push_value(index)?;
                index += 1;
            }
        }
        self.push_opcode(Opcode::EndOfStream);
        Ok(self.out)
    }
}

/// Encodes `samples` against `reference` (usually the start of the storage window).
///
/// The output is deterministic and lossless. Fails with `NonMonotonicInput` if
/// timestamps are not strictly increasing, and with `PrecisionLoss` if a
/// timestamp (or the reference) has a sub-second component.
pub fn encode(samples: &[Sample], reference: &DateTime<Utc>) -> Result<Vec<u8>> {
    let reference_secs = unix_seconds(reference)?;
    let state = EncoderState {
        samples,
        steps: plan_values(samples),
        secs: sample_seconds(samples)?,
        reference_secs,
        // Regularly sampled integer data averages under two bytes per sample.
        out: Vec::with_capacity(samples.len() * 2 + 1),
    };
    let bytes = state.run()?;
    log::trace!(
        "encoded {} samples into {} bytes",
        samples.len(),
        bytes.len()
    );
    Ok(bytes)
}
