//! Scrape cycle: join backoff verdicts with cached records.

use crate::backoff::BackoffStore;
use crate::cache::EventCache;
use crate::event::EventRecord;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Label names of an [`EventSample`], in the order of [`EventSample::label_values`].
pub const EVENT_LABELS: [&str; 7] = [
    "event_namespace",
    "event_name",
    "event_kind",
    "event_reason",
    "event_type",
    "event_subobject",
    "event_source",
];

/// Label names of the per-event count series, in the order of
/// [`EventSample::count_label_values`].
pub const COUNT_LABELS: [&str; 8] = [
    "name",
    "involved_object_namespace",
    "namespace",
    "involved_object_name",
    "involved_object_kind",
    "reason",
    "type",
    "source",
];

/// One exported sample for a tracked event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSample {
    pub key: String,
    /// Namespace of the involved object
    pub namespace: String,
    /// Name of the involved object
    pub name: String,
    /// Kind of the involved object
    pub kind: String,
    pub reason: String,
    pub event_type: String,
    pub subobject: String,
    /// `host/component`
    pub source: String,
    /// Name of the event object itself
    pub event_name: String,
    /// Namespace of the event object itself
    pub event_namespace: String,
    /// Occurrences reported upstream
    pub count: u32,
    pub active: bool,
}

impl EventSample {
    /// Build the sample for `record` stored under `key`.
    pub fn from_record(key: String, record: &EventRecord, active: bool) -> Self {
        Self {
            key,
            namespace: record.involved_object.namespace.clone(),
            name: record.involved_object.name.clone(),
            kind: record.involved_object.kind.clone(),
            reason: record.reason.clone(),
            event_type: record.event_type.clone(),
            subobject: record.involved_object.field_path.clone(),
            source: record.source_label(),
            event_name: record.name.clone(),
            event_namespace: record.namespace.clone(),
            count: record.count,
            active,
        }
    }

    /// Gauge value: 1 while active, 0 once resolved.
    pub fn value(&self) -> f64 {
        if self.active {
            1.0
        } else {
            0.0
        }
    }

    /// Label values matching [`EVENT_LABELS`].
    pub fn label_values(&self) -> [&str; 7] {
        [
            self.namespace.as_str(),
            self.name.as_str(),
            self.kind.as_str(),
            self.reason.as_str(),
            self.event_type.as_str(),
            self.subobject.as_str(),
            self.source.as_str(),
        ]
    }

    /// Label values matching [`COUNT_LABELS`].
    pub fn count_label_values(&self) -> [&str; 8] {
        [
            self.event_name.as_str(),
            self.namespace.as_str(),
            self.event_namespace.as_str(),
            self.name.as_str(),
            self.kind.as_str(),
            self.reason.as_str(),
            self.event_type.as_str(),
            self.source.as_str(),
        ]
    }
}

/// Outcome of one scrape cycle.
#[derive(Debug, Clone, Default)]
pub struct ScrapeReport {
    /// Samples, sorted by key.
    pub samples: Vec<EventSample>,
    /// Tracked keys without a cached record.
    pub missing_keys: Vec<String>,
    /// Keys removed by garbage collection.
    pub collected: Vec<String>,
    /// Cache records dropped along with collected keys.
    pub pruned: Vec<EventRecord>,
}

impl ScrapeReport {
    /// True if the cache was inconsistent with the store.
    pub fn has_anomalies(&self) -> bool {
        !self.missing_keys.is_empty()
    }

    /// Number of samples currently active
    pub fn active_count(&self) -> usize {
        self.samples.iter().filter(|s| s.active).count()
    }
}

/// Run one scrape cycle as of `now`, then garbage collect the store.
///
/// Keys missing from the cache are skipped for this cycle only; they stay
/// tracked until they go stale.
pub fn scrape_cycle(store: &BackoffStore, cache: &dyn EventCache, now: DateTime<Utc>) -> ScrapeReport {
    let mut activity: Vec<(String, bool)> = store.snapshot_activity(now).into_iter().collect();
    activity.sort_unstable_by(|a, b| a.0.cmp(&b.0));

    let mut report = ScrapeReport::default();
    for (key, active) in activity {
        match cache.get_by_key(&key) {
            Some(record) => report.samples.push(EventSample::from_record(key, &record, active)),
            None => {
                warn!("Event not found in cache: {}", key);
                report.missing_keys.push(key);
            }
        }
    }

    report.collected = store.collect_garbage(now);
    debug!(
        "Scrape complete: {} samples ({} active), {} missing, {} collected",
        report.samples.len(),
        report.active_count(),
        report.missing_keys.len(),
        report.collected.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryEventCache;
    use chrono::TimeDelta;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(name: &str) -> EventRecord {
        EventRecord::new("prod", name, at(0))
            .with_involved_object("Pod", "prod", "web-1")
            .with_reason("BackOff", "Back-off restarting failed container")
            .with_type("Warning")
            .with_source("node-3", "kubelet")
    }

    fn setup() -> (BackoffStore, MemoryEventCache) {
        (
            BackoffStore::new(TimeDelta::seconds(10), TimeDelta::seconds(300)),
            MemoryEventCache::new(),
        )
    }

    #[test]
    fn test_sample_fields_copied_from_record() {
        let (store, cache) = setup();
        let mut event = record("web-1.a");
        event.involved_object.field_path = "spec.containers{app}".to_string();
        cache.upsert("prod/web-1.a", event);
        store.advance("prod/web-1.a", at(0));

        let report = scrape_cycle(&store, &cache, at(1));
        assert_eq!(report.samples.len(), 1);

        let sample = &report.samples[0];
        assert_eq!(
            sample.label_values(),
            ["prod", "web-1", "Pod", "BackOff", "Warning", "spec.containers{app}", "node-3/kubelet"]
        );
        assert_eq!(sample.value(), 1.0);
        assert_eq!(
            sample.count_label_values(),
            ["web-1.a", "prod", "prod", "web-1", "Pod", "BackOff", "Warning", "node-3/kubelet"]
        );
        assert_eq!(sample.count, 1);
    }

    #[test]
    fn test_resolved_event_reports_zero() {
        let (store, cache) = setup();
        cache.upsert("prod/a", record("a"));
        store.advance("prod/a", at(0));

        let report = scrape_cycle(&store, &cache, at(20));
        assert_eq!(report.samples.len(), 1);
        assert!(!report.samples[0].active);
        assert_eq!(report.samples[0].value(), 0.0);
    }

    #[test]
    fn test_missing_record_is_skipped_but_kept() {
        let (store, cache) = setup();
        cache.upsert("prod/a", record("a"));
        store.advance("prod/a", at(0));
        store.advance("prod/ghost", at(0));

        let report = scrape_cycle(&store, &cache, at(1));
        assert_eq!(report.samples.len(), 1);
        assert_eq!(report.missing_keys, vec!["prod/ghost".to_string()]);
        assert!(report.has_anomalies());
        assert!(store.peek("prod/ghost").is_some());
    }

    #[test]
    fn test_scrape_collects_stale_entries() {
        let (store, cache) = setup();
        cache.upsert("prod/a", record("a"));
        store.advance("prod/a", at(0));

        let report = scrape_cycle(&store, &cache, at(700));
        assert!(report.samples.is_empty());
        assert_eq!(report.collected, vec!["prod/a".to_string()]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_samples_sorted_by_key() {
        let (store, cache) = setup();
        for name in ["c", "a", "b"] {
            let key = format!("prod/{}", name);
            cache.upsert(&key, record(name));
            store.advance(&key, at(0));
        }

        let report = scrape_cycle(&store, &cache, at(1));
        let keys: Vec<&str> = report.samples.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["prod/a", "prod/b", "prod/c"]);
    }
}
