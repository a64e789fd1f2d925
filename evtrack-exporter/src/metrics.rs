// evtrack Exporter - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for event state.
//!
//! [`EventExporter`] owns a registry holding the per-event state gauge, the
//! per-event occurrence series and the exporter's own instrumentation. Each
//! scrape runs one tracker scrape cycle, refills the gauge families from its
//! samples and encodes the registry.

use chrono::{DateTime, Utc};
use evtrack::{
    EventRecord, EventSample, EventTracker, KeyError, Observation, COUNT_LABELS, EVENT_LABELS,
};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::string::FromUtf8Error;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

lazy_static! {
    /// Build information, constant 1.
    pub static ref BUILD_INFO: Gauge = Gauge::with_opts(
        Opts::new(
            "event_exporter_build_info",
            "A metric with a constant '1' value labeled by the version from which event_exporter was built"
        )
        .const_label("version", env!("CARGO_PKG_VERSION"))
        .const_label("evtrack_version", evtrack::VERSION)
    ).unwrap();
}

/// Outcome label for records whose key could not be derived.
pub const INVALID_OUTCOME: &str = "invalid";

/// Errors while producing metrics output.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics output is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
}

/// Event state exporter.
pub struct EventExporter {
    tracker: Arc<EventTracker>,
    registry: Registry,
    /// 1 while an event is ongoing, 0 once resolved.
    events: GaugeVec,
    /// Upstream occurrence count of each tracked event.
    event_count: GaugeVec,
    /// Accepted observations per event, dropped when the event goes away.
    unique_events: IntCounterVec,
    scrapes_total: IntCounter,
    last_scrape_duration: Gauge,
    last_scrape_error: Gauge,
    observations_total: IntCounterVec,
    /// Serializes whole scrapes so gauge refills never interleave.
    scrape_lock: Mutex<()>,
}

impl EventExporter {
    /// Create an exporter around a shared tracker.
    pub fn new(tracker: Arc<EventTracker>) -> Result<Self, ExportError> {
        let registry = Registry::new();

        let events = GaugeVec::new(
            Opts::new("kubernetes_events", "State of kubernetes events"),
            &EVENT_LABELS,
        )?;
        let event_count = GaugeVec::new(
            Opts::new("kube_event_count", "Number of kubernetes event happened"),
            &COUNT_LABELS,
        )?;
        let unique_events = IntCounterVec::new(
            Opts::new(
                "kube_event_unique_events_total",
                "Total number of kubernetes unique event happened",
            ),
            &COUNT_LABELS,
        )?;
        let scrapes_total = IntCounter::new(
            "event_exporter_scrapes_total",
            "Total number of times events were scraped for metrics",
        )?;
        let last_scrape_duration = Gauge::new(
            "event_exporter_last_scrape_duration_seconds",
            "Duration of the last scrape of events",
        )?;
        let last_scrape_error = Gauge::new(
            "event_exporter_last_scrape_error",
            "Whether the last scrape of events resulted in an error (1 for error, 0 for success)",
        )?;
        let observations_total = IntCounterVec::new(
            Opts::new(
                "event_exporter_observations_total",
                "Total event observations received, by outcome",
            ),
            &["outcome"],
        )?;

        registry.register(Box::new(BUILD_INFO.clone()))?;
        registry.register(Box::new(events.clone()))?;
        registry.register(Box::new(event_count.clone()))?;
        registry.register(Box::new(unique_events.clone()))?;
        registry.register(Box::new(scrapes_total.clone()))?;
        registry.register(Box::new(last_scrape_duration.clone()))?;
        registry.register(Box::new(last_scrape_error.clone()))?;
        registry.register(Box::new(observations_total.clone()))?;
        BUILD_INFO.set(1.0);

        Ok(Self {
            tracker,
            registry,
            events,
            event_count,
            unique_events,
            scrapes_total,
            last_scrape_duration,
            last_scrape_error,
            observations_total,
            scrape_lock: Mutex::new(()),
        })
    }

    /// Shared tracker
    pub fn tracker(&self) -> &Arc<EventTracker> {
        &self.tracker
    }

    /// Feed a record to the tracker and count the outcome.
    pub fn observe(&self, mut event: EventRecord) -> Result<Observation, KeyError> {
        event.normalize_reason();
        let sample = EventSample::from_record(String::new(), &event, true);

        let result = self.tracker.observe(event);
        let outcome = match &result {
            Ok(observation) => observation.as_str(),
            Err(_) => INVALID_OUTCOME,
        };
        self.observations_total.with_label_values(&[outcome]).inc();
        if let Ok(Observation::Tracked { .. }) = &result {
            self.unique_events
                .with_label_values(&sample.count_label_values())
                .inc();
        }
        result
    }

    /// Forget a deleted event and drop its occurrence series.
    pub fn forget(&self, namespace: &str, name: &str) -> Result<bool, KeyError> {
        let forgotten = self.tracker.forget_entry(namespace, name)?;
        if let Some(record) = &forgotten.record {
            let _guard = self.scrape_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.drop_series(record);
        }
        Ok(forgotten.removed_anything())
    }

    fn drop_series(&self, record: &EventRecord) {
        let sample = EventSample::from_record(String::new(), record, false);
        let labels = sample.count_label_values();
        let removed_count = self.event_count.remove_label_values(&labels).is_ok();
        let removed_total = self.unique_events.remove_label_values(&labels).is_ok();
        if removed_count || removed_total {
            info!("event {} has been removed from Prometheus", record.name);
        }
    }

    /// Number of scrapes served so far
    pub fn scrape_count(&self) -> u64 {
        self.scrapes_total.get()
    }

    /// Scrape as of the current time.
    pub fn scrape(&self) -> Result<String, ExportError> {
        self.scrape_at(Utc::now())
    }

    /// Run a scrape cycle as of `now` and encode all metrics.
    ///
    /// Instrumentation gauges are updated before encoding, whatever the outcome.
    pub fn scrape_at(&self, now: DateTime<Utc>) -> Result<String, ExportError> {
        let _guard = self.scrape_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();

        let report = self.tracker.scrape(now);
        self.events.reset();
        self.event_count.reset();
        for sample in &report.samples {
            self.events
                .with_label_values(&sample.label_values())
                .set(sample.value());
            self.event_count
                .with_label_values(&sample.count_label_values())
                .set(f64::from(sample.count));
        }
        for record in &report.pruned {
            self.drop_series(record);
        }

        if report.has_anomalies() {
            warn!(
                "Error scraping for events: {} tracked events missing from cache",
                report.missing_keys.len()
            );
        }

        self.scrapes_total.inc();
        self.last_scrape_duration.set(start.elapsed().as_secs_f64());
        self.last_scrape_error
            .set(if report.has_anomalies() { 1.0 } else { 0.0 });

        match self.encode() {
            Ok(output) => {
                debug!("Scrape served {} event samples", report.samples.len());
                Ok(output)
            }
            Err(e) => {
                self.last_scrape_error.set(1.0);
                Err(e)
            }
        }
    }

    fn encode(&self) -> Result<String, ExportError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
