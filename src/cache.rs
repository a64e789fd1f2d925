//! Keyed store of last-known event records.

use crate::event::EventRecord;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Lookup of the last known record for a key.
pub trait EventCache: Send + Sync {
    /// Record stored under `key`, if any
    fn get_by_key(&self, key: &str) -> Option<EventRecord>;

    /// Number of cached records
    fn len(&self) -> usize;

    /// Check if the cache is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory cache fed directly by the observation feed.
#[derive(Debug, Default)]
pub struct MemoryEventCache {
    records: RwLock<HashMap<String, EventRecord>>,
}

impl MemoryEventCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `record` under `key`, returning the previous record.
    pub fn upsert(&self, key: &str, record: EventRecord) -> Option<EventRecord> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), record)
    }

    /// Remove the record under `key`.
    pub fn remove(&self, key: &str) -> Option<EventRecord> {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    /// Version of the record under `key`, if both exist.
    pub fn resource_version(&self, key: &str) -> Option<String> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(|r| r.resource_version.clone())
    }
}

impl EventCache for MemoryEventCache {
    fn get_by_key(&self, key: &str) -> Option<EventRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
