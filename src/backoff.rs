//! Per-key exponential backoff windows
//!
//! A [`BackoffStore`] decides, for every tracked key, whether the condition
//! behind it is still ongoing. Each observation of a key doubles its quiet
//! window (capped at `max_window`); a key is active while the time since its
//! last observation is shorter than that window. Keys silent for more than
//! `2 * max_window` are "doubly stale": they restart from `base_window` on the
//! next observation, drop out of snapshots and are removed by garbage
//! collection.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Backoff state of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffEntry {
    /// Current required quiet interval.
    pub window: TimeDelta,
    /// Timestamp of the most recent observation.
    pub last_seen: DateTime<Utc>,
}

impl BackoffEntry {
    /// Whether the entry is still inside its quiet window as of `as_of`.
    pub fn is_active_as_of(&self, as_of: DateTime<Utc>) -> bool {
        as_of.signed_duration_since(self.last_seen) < self.window
    }
}

/// Returns true if `last_seen` is more than twice `max_window` before `now`.
pub fn is_doubly_stale(now: DateTime<Utc>, last_seen: DateTime<Utc>, max_window: TimeDelta) -> bool {
    now.signed_duration_since(last_seen) > double(max_window)
}

fn double(window: TimeDelta) -> TimeDelta {
    window.checked_mul(2).unwrap_or(TimeDelta::MAX)
}

/// Thread-safe store of backoff entries.
///
/// Every operation takes the single store lock for its own duration, so a
/// concurrent reader always sees an entry from one completed operation.
#[derive(Debug)]
pub struct BackoffStore {
    base_window: TimeDelta,
    max_window: TimeDelta,
    entries: Mutex<HashMap<String, BackoffEntry>>,
}

impl BackoffStore {
    /// Create an empty store.
    ///
    /// `max_window` is raised to `base_window` if it is smaller.
    pub fn new(base_window: TimeDelta, max_window: TimeDelta) -> Self {
        Self {
            base_window,
            max_window: max_window.max(base_window),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Initial window given to new keys.
    pub fn base_window(&self) -> TimeDelta {
        self.base_window
    }

    /// Upper bound of any window.
    pub fn max_window(&self) -> TimeDelta {
        self.max_window
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, BackoffEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an observation of `key` at `observed_at`.
    ///
    /// Returns true when the entry was (re)initialized to the base window.
    pub fn advance(&self, key: &str, observed_at: DateTime<Utc>) -> bool {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            if !is_doubly_stale(observed_at, entry.last_seen, self.max_window) {
                entry.window = double(entry.window).min(self.max_window);
                entry.last_seen = observed_at;
                return false;
            }
        }
        entries.insert(
            key.to_string(),
            BackoffEntry {
                window: self.base_window,
                last_seen: observed_at,
            },
        );
        true
    }

    /// Forget everything about `key`. Returns whether an entry existed.
    pub fn reset(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Whether the condition behind `key` is ongoing as of `as_of`.
    pub fn is_active_as_of(&self, key: &str, as_of: DateTime<Utc>) -> bool {
        let entries = self.entries();
        match entries.get(key) {
            Some(entry) if !is_doubly_stale(as_of, entry.last_seen, self.max_window) => {
                entry.is_active_as_of(as_of)
            }
            _ => false,
        }
    }

    /// Activity of every key that is not doubly stale as of `as_of`.
    pub fn snapshot_activity(&self, as_of: DateTime<Utc>) -> HashMap<String, bool> {
        self.entries()
            .iter()
            .filter(|(_, entry)| !is_doubly_stale(as_of, entry.last_seen, self.max_window))
            .map(|(key, entry)| (key.clone(), entry.is_active_as_of(as_of)))
            .collect()
    }

    /// Drop every doubly stale entry. Returns the removed keys.
    pub fn collect_garbage(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut entries = self.entries();
        let mut removed = Vec::new();
        entries.retain(|key, entry| {
            let stale = is_doubly_stale(now, entry.last_seen, self.max_window);
            if stale {
                removed.push(key.clone());
            }
            !stale
        });
        removed
    }

    /// Current entry for `key`, if tracked.
    pub fn peek(&self, key: &str) -> Option<BackoffEntry> {
        self.entries().get(key).copied()
    }

    /// Number of tracked keys, stale ones included.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if no key is tracked
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
