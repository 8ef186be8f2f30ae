// In: src/dictionary.rs

//! The metric dictionary: a process-wide, bidirectional cache between metric
//! names and their stable `MetricId`s, backed by a `MetricStore`.
//!
//! Reads take a shared lock on the cache. A first sighting of a name is
//! serialized through a separate allocation gate so that two concurrent callers
//! interning the same new name observe the same id and the store sees a single
//! insert.

use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, StoreError, TimelineError};
use crate::store::MetricStore;
use crate::types::{MetricEntry, MetricId};

#[derive(Debug, Default)]
struct Cache {
    ids: HashMap<String, MetricId>,
    names: HashMap<MetricId, String>,
}

impl Cache {
    fn insert(&mut self, name: &str, id: MetricId) {
        self.ids.insert(name.to_string(), id);
        self.names.insert(id, name.to_string());
    }
}

pub struct MetricDictionary<S: MetricStore> {
    store: Arc<S>,
    cache: RwLock<Cache>,
    allocation: Mutex<()>,
}

impl<S: MetricStore> MetricDictionary<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            cache: RwLock::new(Cache::default()),
            allocation: Mutex::new(()),
        }
    }

    /// Returns the id for `name`, allocating one on first sighting.
    pub fn resolve(&self, name: &str) -> Result<MetricId> {
        if let Some(id) = self.cache.read().ids.get(name) {
            return Ok(*id);
        }

        let _gate = self.allocation.lock();
        // Another caller may have allocated while we waited on the gate.
        if let Some(id) = self.cache.read().ids.get(name) {
            return Ok(*id);
        }

        let id = match self.store.fetch_metric_id(name)? {
            Some(id) => id,
            None => self.allocate(name)?,
        };
        self.cache.write().insert(name, id);
        Ok(id)
    }

    /// Like `resolve`, but never allocates: unknown names yield `None`.
    pub fn find(&self, name: &str) -> Result<Option<MetricId>> {
        if let Some(id) = self.cache.read().ids.get(name) {
            return Ok(Some(*id));
        }
        let found = self.store.fetch_metric_id(name)?;
        if let Some(id) = found {
            self.cache.write().insert(name, id);
        }
        Ok(found)
    }

    fn allocate(&self, name: &str) -> Result<MetricId> {
        match self.store.store_metric(name) {
            Ok(id) => {
                log::info!("allocated metric id {} for '{}'", id, name);
                Ok(id)
            }
            Err(StoreError::Conflict(reason)) => {
                // Another process inserted the name first; adopt its id.
                log::warn!("conflict storing metric '{}': {}", name, reason);
                self.store.fetch_metric_id(name)?.ok_or_else(|| {
                    log::debug!("metric '{}' still missing after conflict", name);
                    TimelineError::DictionaryConflict(format!(
                        "metric '{}' conflicted on insert but cannot be found: {}",
                        name, reason
                    ))
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the name registered for `id`.
    pub fn lookup(&self, id: MetricId) -> Result<String> {
        if let Some(name) = self.cache.read().names.get(&id) {
            return Ok(name.clone());
        }
        match self.store.fetch_metric_name(id)? {
            Some(name) => {
                self.cache.write().insert(&name, id);
                Ok(name)
            }
            None => {
                log::debug!("lookup of unknown metric id {}", id);
                Err(TimelineError::UnknownMetric(id))
            }
        }
    }

    /// Loads every stored entry into the cache. Returns the number loaded.
    pub fn preload(&self) -> Result<usize> {
        let entries = self.store.load_metrics()?;
        let mut cache = self.cache.write();
        for entry in &entries {
            cache.insert(&entry.name, entry.id);
        }
        log::debug!("preloaded {} metric(s)", entries.len());
        Ok(entries.len())
    }

    /// Cached entries, sorted by id.
    pub fn entries(&self) -> Vec<MetricEntry> {
        let mut entries: Vec<MetricEntry> = self
            .cache
            .read()
            .names
            .iter()
            .map(|(id, name)| MetricEntry::new(name.clone(), *id))
            .collect();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    pub fn len(&self) -> usize {
        self.cache.read().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
