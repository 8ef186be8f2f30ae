// In: src/timeline.rs

//! The timeline service: per-metric sample storage built on the codec.
//!
//! Samples for a metric are bucketed into fixed, epoch-aligned windows. Each
//! `(metric, window)` pair holds one encoded stream whose reference time is the
//! window start. Recording into a window that already holds data decodes the old
//! stream, merges, and stores a freshly encoded replacement.
//!
//! Writes go through a single gate: the fetch, merge and store of one `record`
//! call never interleave with another call's, and every window of a call is
//! encoded before any of them is stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::config::TimelineConfig;
use crate::dictionary::MetricDictionary;
use crate::error::{Result, TimelineError};
use crate::format::FORMAT_VERSION;
use crate::store::{BlobStore, MetricStore, StoredBlob};
use crate::types::{MetricId, Sample, TimeWindow};

/// In-memory size of one sample (i64 seconds + 8-byte value), the baseline for
/// compression ratios.
pub const RAW_SAMPLE_BYTES: usize = 16;

//==================================================================================
// 1. Chunk Metadata
//==================================================================================

/// Describes one stored blob.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimelineChunk {
    pub metric_id: MetricId,
    pub window: TimeWindow,
    pub sample_count: usize,
    pub encoded_len: usize,
    pub format_version: u8,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl TimelineChunk {
    fn describe(metric_id: MetricId, window: TimeWindow, samples: &[Sample], blob: &StoredBlob) -> Self {
        Self {
            metric_id,
            window,
            sample_count: samples.len(),
            encoded_len: blob.bytes.len(),
            format_version: blob.format_version,
            first: samples.first().map(|s| s.timestamp),
            last: samples.last().map(|s| s.timestamp),
        }
    }

    /// Raw sample bytes divided by encoded bytes. Zero for an empty blob.
    pub fn compression_ratio(&self) -> f64 {
        if self.encoded_len == 0 {
            return 0.0;
        }
        (self.sample_count * RAW_SAMPLE_BYTES) as f64 / self.encoded_len as f64
    }
}

//==================================================================================
// 2. Service
//==================================================================================

pub struct TimelineService<S: MetricStore + BlobStore> {
    store: Arc<S>,
    config: Arc<TimelineConfig>,
    dictionary: MetricDictionary<S>,
    write_gate: Mutex<()>,
}

/// A window whose replacement blob is encoded and verified but not yet stored.
struct PreparedWindow {
    window: TimeWindow,
    blob: StoredBlob,
    chunk: TimelineChunk,
}

impl<S: MetricStore + BlobStore> TimelineService<S> {
    pub fn new(store: Arc<S>, config: Arc<TimelineConfig>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            dictionary: MetricDictionary::new(Arc::clone(&store)),
            store,
            config,
            write_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn dictionary(&self) -> &MetricDictionary<S> {
        &self.dictionary
    }

    pub fn intern_metric(&self, name: &str) -> Result<MetricId> {
        self.dictionary.resolve(name)
    }

    pub fn resolve_metric(&self, id: MetricId) -> Result<String> {
        self.dictionary.lookup(id)
    }

    /// Appends `samples` (strictly increasing) to the timeline of `name`.
    ///
    /// Returns one chunk per window written. A timestamp already stored for the
    /// metric fails the call with `NonMonotonicInput` and nothing is written.
    /// A store error part way through the final writes can still leave the
    /// windows before it replaced.
    pub fn record(&self, name: &str, samples: &[Sample]) -> Result<Vec<TimelineChunk>> {
        check_increasing(samples)?;
        let metric_id = self.intern_metric(name)?;

        let _gate = self.write_gate.lock();
        let mut prepared = Vec::new();
        let mut start = 0;
        while start < samples.len() {
            let window = TimeWindow::aligned(&samples[start].timestamp, self.config.window_secs)?;
            let len = samples[start..]
                .iter()
                .take_while(|s| window.contains(&s.timestamp))
                .count();
            prepared.push(self.prepare_window(metric_id, window, &samples[start..start + len])?);
            start += len;
        }

        let mut chunks = Vec::with_capacity(prepared.len());
        for PreparedWindow { window, blob, chunk } in prepared {
            self.store.store_blob(metric_id, &window, &blob)?;
            chunks.push(chunk);
        }

        log::debug!(
            "recorded {} sample(s) for '{}' across {} window(s)",
            samples.len(),
            name,
            chunks.len()
        );
        Ok(chunks)
    }

    fn prepare_window(
        &self,
        metric_id: MetricId,
        window: TimeWindow,
        incoming: &[Sample],
    ) -> Result<PreparedWindow> {
        let merged = match self.store.fetch_blob(metric_id, &window)? {
            Some(blob) => merge_sorted(decode_blob(&blob, &window)?, incoming)?,
            None => incoming.to_vec(),
        };

        let bytes = codec::encode(&merged, &window.start)?;
        if self.config.verify_on_write {
            verify(&bytes, &merged, &window)?;
        }

        let blob = StoredBlob {
            format_version: FORMAT_VERSION,
            bytes,
        };
        let chunk = TimelineChunk::describe(metric_id, window, &merged, &blob);
        log::trace!(
            "metric {} window {}: {} sample(s) in {} bytes",
            metric_id,
            window,
            chunk.sample_count,
            chunk.encoded_len
        );
        Ok(PreparedWindow { window, blob, chunk })
    }

    /// Samples of `name` inside `range`, in time order. Unknown metrics read as empty.
    pub fn read(&self, name: &str, range: &TimeWindow) -> Result<Vec<Sample>> {
        let Some(metric_id) = self.dictionary.find(name)? else {
            return Ok(Vec::new());
        };

        let mut out = Vec::new();
        for window in self.store.list_windows(metric_id)? {
            if !window.overlaps(range) {
                continue;
            }
            if let Some(blob) = self.store.fetch_blob(metric_id, &window)? {
                out.extend(
                    decode_blob(&blob, &window)?
                        .into_iter()
                        .filter(|s| range.contains(&s.timestamp)),
                );
            }
        }
        Ok(out)
    }

    /// Metadata for the blob of `name` in `window`, if one is stored.
    pub fn chunk(&self, name: &str, window: &TimeWindow) -> Result<Option<TimelineChunk>> {
        let Some(metric_id) = self.dictionary.find(name)? else {
            return Ok(None);
        };
        match self.store.fetch_blob(metric_id, window)? {
            Some(blob) => {
                let samples = decode_blob(&blob, window)?;
                Ok(Some(TimelineChunk::describe(metric_id, *window, &samples, &blob)))
            }
            None => Ok(None),
        }
    }
}

//==================================================================================
// 3. Helpers
//==================================================================================

fn check_increasing(samples: &[Sample]) -> Result<()> {
    for (index, pair) in samples.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(TimelineError::NonMonotonicInput {
                index: index + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

fn decode_blob(blob: &StoredBlob, window: &TimeWindow) -> Result<Vec<Sample>> {
    if blob.format_version != FORMAT_VERSION {
        log::debug!(
            "blob for window {} has format version {}",
            window,
            blob.format_version
        );
        return Err(TimelineError::UnsupportedFormatVersion(blob.format_version));
    }
    codec::decode(&blob.bytes, &window.start)
}

/// Merges two strictly increasing sequences. Equal timestamps are rejected.
fn merge_sorted(existing: Vec<Sample>, incoming: &[Sample]) -> Result<Vec<Sample>> {
    let mut merged: Vec<Sample> = Vec::with_capacity(existing.len() + incoming.len());
    let mut old = existing.into_iter().peekable();
    let mut new = incoming.iter().copied().peekable();

    loop {
        let take_old = match (old.peek(), new.peek()) {
            (Some(a), Some(b)) => a.timestamp <= b.timestamp,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_old { old.next() } else { new.next() };
        let Some(sample) = next else { break };
        if let Some(previous) = merged.last() {
            if sample.timestamp <= previous.timestamp {
                return Err(TimelineError::NonMonotonicInput {
                    index: merged.len(),
                    previous: previous.timestamp,
                    current: sample.timestamp,
                });
            }
        }
        merged.push(sample);
    }
    Ok(merged)
}

fn verify(bytes: &[u8], expected: &[Sample], window: &TimeWindow) -> Result<()> {
    let decoded = codec::decode(bytes, &window.start)
        .map_err(|err| TimelineError::VerificationFailed(err.to_string()))?;
    if decoded != expected {
        return Err(TimelineError::VerificationFailed(format!(
            "window {} decoded to {} sample(s), expected {}",
            window,
            decoded.len(),
            expected.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::thread;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn sample(secs: i64, value: i64) -> Sample {
        Sample::at_unix(secs, value).unwrap()
    }

    fn range(start: i64, end: i64) -> TimeWindow {
        TimeWindow::new(at(start), at(end)).unwrap()
    }

    fn service() -> (Arc<InMemoryStore>, TimelineService<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let service =
            TimelineService::new(Arc::clone(&store), Arc::new(TimelineConfig::default())).unwrap();
        (store, service)
    }

    #[test]
    fn test_record_splits_into_aligned_windows() {
        let (store, service) = service();
        let samples = vec![sample(3_590, 1), sample(3_599, 2), sample(3_600, 3), sample(7_300, 4)];
        let chunks = service.record("bytes_in", &samples).unwrap();

        let windows: Vec<TimeWindow> = chunks.iter().map(|c| c.window).collect();
        assert_eq!(
            windows,
            vec![range(0, 3_600), range(3_600, 7_200), range(7_200, 10_800)]
        );
        assert_eq!(chunks[0].sample_count, 2);
        assert_eq!(chunks[0].first, Some(at(3_590)));
        assert_eq!(chunks[0].last, Some(at(3_599)));
        assert_eq!(store.blob_count(), 3);

        assert_eq!(service.read("bytes_in", &range(0, 10_800)).unwrap(), samples);
    }

    #[test]
    fn test_record_merges_with_existing_window() {
        let (_, service) = service();
        service.record("cpu", &[sample(10, 1), sample(30, 3)]).unwrap();
        let chunks = service.record("cpu", &[sample(20, 2), sample(40, 4)]).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sample_count, 4);

        let values: Vec<i64> = service
            .read("cpu", &range(0, 3_600))
            .unwrap()
            .into_iter()
            .map(|s| match s.value {
                crate::types::SampleValue::Integer(v) => v,
                other => panic!("unexpected value {:?}", other),
            })
            .collect();
        assert_eq!(values, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_timestamp_is_rejected() {
        let (_, service) = service();
        service.record("cpu", &[sample(10, 1)]).unwrap();
        assert!(matches!(
            service.record("cpu", &[sample(10, 1)]),
            Err(TimelineError::NonMonotonicInput { .. })
        ));
        assert!(matches!(
            service.record("cpu", &[sample(50, 1), sample(40, 1)]),
            Err(TimelineError::NonMonotonicInput { index: 1, .. })
        ));
    }

    #[test]
    fn test_failing_window_leaves_earlier_windows_untouched() {
        let (_, service) = service();
        service.record("cpu", &[sample(10, 1), sample(3_700, 1)]).unwrap();

        // The first window would merge cleanly; the second collides at 3700.
        assert!(matches!(
            service.record("cpu", &[sample(20, 2), sample(3_700, 5)]),
            Err(TimelineError::NonMonotonicInput { .. })
        ));

        assert_eq!(service.read("cpu", &range(0, 3_600)).unwrap(), vec![sample(10, 1)]);
        let chunk = service.chunk("cpu", &range(0, 3_600)).unwrap().unwrap();
        assert_eq!(chunk.sample_count, 1);
        assert_eq!(
            service.read("cpu", &range(3_600, 7_200)).unwrap(),
            vec![sample(3_700, 1)]
        );
    }

    #[test]
    fn test_concurrent_records_into_one_window_keep_every_sample() {
        let (_, service) = service();
        let service = Arc::new(service);

        let handles: Vec<_> = (0..8i64)
            .map(|t| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    for k in 0..200i64 {
                        service.record("shared", &[sample(t + 8 * k, k)]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let read = service.read("shared", &range(0, 3_600)).unwrap();
        assert_eq!(read.len(), 1_600);
        assert!(read.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_read_filters_to_range() {
        let (_, service) = service();
        let samples: Vec<Sample> = (0..10).map(|i| sample(i * 1_000, i)).collect();
        service.record("mem", &samples).unwrap();

        let read = service.read("mem", &range(2_500, 6_000)).unwrap();
        assert_eq!(read, samples[3..6].to_vec());
        assert!(service.read("missing", &range(0, 10)).unwrap().is_empty());
        // Reading never allocates an id.
        assert!(service.dictionary().find("missing").unwrap().is_none());
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let (store, service) = service();
        let id = service.intern_metric("disk").unwrap();
        let blob = StoredBlob {
            format_version: 9,
            bytes: vec![0xFF],
        };
        store.store_blob(id, &range(0, 3_600), &blob).unwrap();

        assert!(matches!(
            service.read("disk", &range(0, 3_600)),
            Err(TimelineError::UnsupportedFormatVersion(9))
        ));
        assert!(matches!(
            service.record("disk", &[sample(5, 1)]),
            Err(TimelineError::UnsupportedFormatVersion(9))
        ));
    }

    #[test]
    fn test_chunk_metadata_and_ratio() {
        let (_, service) = service();
        let samples: Vec<Sample> = (0..60).map(|i| sample(i * 60, 7)).collect();
        service.record("requests", &samples).unwrap();

        let chunk = service.chunk("requests", &range(0, 3_600)).unwrap().unwrap();
        assert_eq!(chunk.sample_count, 60);
        assert_eq!(chunk.format_version, FORMAT_VERSION);
        assert!(chunk.compression_ratio() > 10.0);
        assert_eq!(service.resolve_metric(chunk.metric_id).unwrap(), "requests");

        assert!(service.chunk("requests", &range(3_600, 7_200)).unwrap().is_none());
        assert!(service.chunk("nobody", &range(0, 3_600)).unwrap().is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let config = TimelineConfig {
            window_secs: 0,
            ..TimelineConfig::default()
        };
        assert!(matches!(
            TimelineService::new(store, Arc::new(config)),
            Err(TimelineError::InvalidConfig(_))
        ));
    }
}
