//! Event tracker: the observation entry point and scrape source.
//!
//! The tracker owns the [`BackoffStore`], the [`MemoryEventCache`] and the
//! filter chain. It is meant to be shared behind an `Arc` between whatever
//! feeds observations in and whatever scrapes state out.

use crate::backoff::BackoffStore;
use crate::cache::{EventCache, MemoryEventCache};
use crate::config::TrackerConfig;
use crate::error::{ConfigError, KeyError};
use crate::event::EventRecord;
use crate::filter::{EventFilter, EventTypeFilter};
use crate::key::{event_key, object_key};
use crate::scrape::{scrape_cycle, ScrapeReport};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, trace, warn};

/// Result of feeding one record to the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Record cached and its backoff advanced
    Tracked {
        key: String,
        /// The key was new, or started over from the base window
        first_seen: bool,
    },
    /// Same upstream version as the cached record; nothing changed
    Duplicate { key: String },
    /// Rejected by a filter
    Filtered,
}

impl Observation {
    /// Short label for counting outcomes.
    pub fn as_str(&self) -> &'static str {
        match self {
            Observation::Tracked { .. } => "tracked",
            Observation::Duplicate { .. } => "duplicate",
            Observation::Filtered => "filtered",
        }
    }
}

/// What a deletion removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forgotten {
    /// Cached record, if there was one
    pub record: Option<EventRecord>,
    /// Whether the key had a backoff entry
    pub tracked: bool,
}

impl Forgotten {
    pub fn removed_anything(&self) -> bool {
        self.record.is_some() || self.tracked
    }
}

/// Shared tracker state.
pub struct EventTracker {
    store: BackoffStore,
    cache: MemoryEventCache,
    filters: Vec<Box<dyn EventFilter>>,
    /// Held across each cache write plus store update, and across pruning.
    feed: Mutex<()>,
}

impl EventTracker {
    /// Create a tracker from a validated configuration.
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            "Event tracker: base window {}s, max window {}s, types {:?}",
            config.base_window_secs, config.max_window_secs, config.allowed_types
        );
        Ok(Self {
            store: BackoffStore::new(config.base_window(), config.max_window()),
            cache: MemoryEventCache::new(),
            filters: vec![Box::new(EventTypeFilter::new(config.allowed_types.clone()))],
            feed: Mutex::new(()),
        })
    }

    /// Add a filter; records must pass every filter to be tracked.
    pub fn with_filter(mut self, filter: impl EventFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Backoff store
    pub fn store(&self) -> &BackoffStore {
        &self.store
    }

    /// Record cache
    pub fn cache(&self) -> &MemoryEventCache {
        &self.cache
    }

    fn feed(&self) -> MutexGuard<'_, ()> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn accepts(&self, event: &EventRecord) -> bool {
        self.filters.iter().all(|f| f.accepts(event))
    }

    /// Feed a new or updated record.
    ///
    /// Key derivation failures leave all state untouched.
    pub fn observe(&self, mut event: EventRecord) -> Result<Observation, KeyError> {
        event.normalize_reason();

        if !self.accepts(&event) {
            trace!("Filtered event {}/{} ({})", event.namespace, event.name, event.event_type);
            return Ok(Observation::Filtered);
        }

        let key = event_key(&event).map_err(|e| {
            warn!("Cannot generate key of event: {}", e);
            e
        })?;

        let _feed = self.feed();
        if let Some(version) = event.resource_version.as_deref() {
            if self.cache.resource_version(&key).as_deref() == Some(version) {
                trace!("Duplicate delivery of {} at version {}", key, version);
                return Ok(Observation::Duplicate { key });
            }
        }

        debug!(
            "event name: {}, count: {}, involved_object_namespace: {}, involved_object_kind: {}, involved_object_name: {}, reason: {}, type: {}",
            event.name,
            event.count,
            event.involved_object.namespace,
            event.involved_object.kind,
            event.involved_object.name,
            event.reason,
            event.event_type,
        );

        let observed_at = event.last_timestamp;
        self.cache.upsert(&key, event);
        let first_seen = self.store.advance(&key, observed_at);
        Ok(Observation::Tracked { key, first_seen })
    }

    /// Handle deletion of an event upstream.
    ///
    /// Returns true if the event was cached or tracked.
    pub fn forget(&self, namespace: &str, name: &str) -> Result<bool, KeyError> {
        self.forget_entry(namespace, name).map(|f| f.removed_anything())
    }

    /// Like [`forget`](Self::forget), handing back the removed record.
    pub fn forget_entry(&self, namespace: &str, name: &str) -> Result<Forgotten, KeyError> {
        let key = object_key(namespace, name)?;
        let _feed = self.feed();
        let forgotten = Forgotten {
            record: self.cache.remove(&key),
            tracked: self.store.reset(&key),
        };
        if forgotten.removed_anything() {
            info!("Event {} has been deleted", key);
        }
        Ok(forgotten)
    }

    /// Run one scrape cycle as of `now`.
    ///
    /// Records whose keys were garbage collected are dropped from the cache
    /// and returned in [`ScrapeReport::pruned`], unless the key was observed
    /// again in the meantime.
    pub fn scrape(&self, now: DateTime<Utc>) -> ScrapeReport {
        let mut report = scrape_cycle(&self.store, &self.cache, now);
        let _feed = self.feed();
        for key in &report.collected {
            if self.store.peek(key).is_none() {
                if let Some(record) = self.cache.remove(key) {
                    report.pruned.push(record);
                }
            }
        }
        report
    }

    /// Number of keys in the backoff store
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// Number of cached records
    pub fn cached_records(&self) -> usize {
        self.cache.len()
    }
}
