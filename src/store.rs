// In: src/store.rs

//! Persistence collaborators consumed by the dictionary and the timeline service.
//!
//! The crate never talks to a database directly. A deployment supplies a type
//! implementing `MetricStore` (the name/id table) and `BlobStore` (encoded streams
//! keyed by metric and window). `InMemoryStore` implements both and backs the tests.

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{MetricEntry, MetricId, TimeWindow};

// =============================================================================
// Collaborator Traits
// =============================================================================

/// The durable metric name table.
pub trait MetricStore: Send + Sync {
    /// Inserts `name` and returns its freshly allocated id.
    ///
    /// Must fail with `StoreError::Conflict` if the name already exists.
    fn store_metric(&self, name: &str) -> Result<MetricId, StoreError>;

    fn fetch_metric_id(&self, name: &str) -> Result<Option<MetricId>, StoreError>;

    fn fetch_metric_name(&self, id: MetricId) -> Result<Option<String>, StoreError>;

    /// Every known entry, in any order.
    fn load_metrics(&self) -> Result<Vec<MetricEntry>, StoreError>;
}

/// An encoded stream as persisted, with the format version stored beside it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub format_version: u8,
    pub bytes: Vec<u8>,
}

/// Storage for encoded streams, one per `(metric, window)`.
pub trait BlobStore: Send + Sync {
    /// Stores `blob`, replacing any blob already held for the same key.
    fn store_blob(
        &self,
        metric: MetricId,
        window: &TimeWindow,
        blob: &StoredBlob,
    ) -> Result<(), StoreError>;

    fn fetch_blob(
        &self,
        metric: MetricId,
        window: &TimeWindow,
    ) -> Result<Option<StoredBlob>, StoreError>;

    /// Windows holding a blob for `metric`, sorted by start time.
    fn list_windows(&self, metric: MetricId) -> Result<Vec<TimeWindow>, StoreError>;
}

// =============================================================================
// In-Memory Backend
// =============================================================================

#[derive(Debug, Default)]
struct MetricTable {
    by_name: HashMap<String, MetricId>,
    by_id: HashMap<MetricId, String>,
    last_id: u32,
}

/// A process-local store for tests and embedded use.
///
/// Ids start at 1 and increase monotonically; nothing is ever deleted.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    metrics: Mutex<MetricTable>,
    blobs: Mutex<HashMap<(MetricId, TimeWindow), StoredBlob>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs across all metrics.
    pub fn blob_count(&self) -> usize {
        self.blobs.lock().len()
    }
}

impl MetricStore for InMemoryStore {
    fn store_metric(&self, name: &str) -> Result<MetricId, StoreError> {
        let mut table = self.metrics.lock();
        if table.by_name.contains_key(name) {
            return Err(StoreError::Conflict(format!(
                "metric '{}' already exists",
                name
            )));
        }
        let next = table
            .last_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend("metric id space exhausted".to_string()))?;
        let id = MetricId(next);
        table.last_id = next;
        table.by_name.insert(name.to_string(), id);
        table.by_id.insert(id, name.to_string());
        Ok(id)
    }

    fn fetch_metric_id(&self, name: &str) -> Result<Option<MetricId>, StoreError> {
        Ok(self.metrics.lock().by_name.get(name).copied())
    }

    fn fetch_metric_name(&self, id: MetricId) -> Result<Option<String>, StoreError> {
        Ok(self.metrics.lock().by_id.get(&id).cloned())
    }

    fn load_metrics(&self) -> Result<Vec<MetricEntry>, StoreError> {
        let table = self.metrics.lock();
        Ok(table
            .by_id
            .iter()
            .map(|(id, name)| MetricEntry::new(name.clone(), *id))
            .collect())
    }
}

impl BlobStore for InMemoryStore {
    fn store_blob(
        &self,
        metric: MetricId,
        window: &TimeWindow,
        blob: &StoredBlob,
    ) -> Result<(), StoreError> {
        self.blobs.lock().insert((metric, *window), blob.clone());
        Ok(())
    }

    fn fetch_blob(
        &self,
        metric: MetricId,
        window: &TimeWindow,
    ) -> Result<Option<StoredBlob>, StoreError> {
        Ok(self.blobs.lock().get(&(metric, *window)).cloned())
    }

    fn list_windows(&self, metric: MetricId) -> Result<Vec<TimeWindow>, StoreError> {
        let mut windows: Vec<TimeWindow> = self
            .blobs
            .lock()
            .keys()
            .filter(|(id, _)| *id == metric)
            .map(|(_, window)| *window)
            .collect();
        windows.sort();
        Ok(windows)
    }
}
