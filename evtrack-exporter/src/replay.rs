// evtrack Exporter - Recorded event replay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Replay engine feeding recorded events into the tracker.
//!
//! A replay file is a CSV with one event occurrence per row. The `offset_ms`
//! column gives when the occurrence happens relative to the start of the
//! replay; every delivered record is stamped with the wall-clock time of its
//! delivery so the exported state evolves in real time.
//!
//! ```text
//! offset_ms,namespace,name,kind,object_namespace,object_name,field_path,reason,message,type,source_host,source_component,count
//! 0,prod,web-1.17a,Pod,prod,web-1,,BackOff,Back-off restarting failed container,Warning,node-1,kubelet,1
//! ```

use crate::metrics::EventExporter;
use chrono::Utc;
use evtrack::{object_key, EventRecord};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Configuration for event replay.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to CSV replay file.
    pub csv_path: String,
    /// Replay speed multiplier (1.0 = real-time, 10.0 = 10x faster).
    pub speed: f64,
    /// Whether to loop the replay.
    pub loop_replay: bool,
    /// Pause before starting over when looping (ms).
    pub loop_pause_ms: u64,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            csv_path: String::new(),
            speed: 1.0,
            loop_replay: false,
            loop_pause_ms: 1_000,
        }
    }
}

/// State of the replay engine.
#[derive(Debug, Default)]
pub struct ReplayState {
    /// Current position in the replay (row index).
    pub position: AtomicUsize,
    /// Total rows in the replay.
    pub total_events: AtomicUsize,
    /// Completed passes over the file.
    pub passes: AtomicUsize,
    /// Whether replay is running.
    pub running: AtomicBool,
}

impl ReplayState {
    /// Ask the replay loop to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Summary of a loaded replay file.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub event_count: usize,
    pub distinct_keys: usize,
    pub duration_ms: u64,
}

/// One CSV row.
#[derive(Debug, Clone, Deserialize)]
struct ReplayRow {
    offset_ms: u64,
    #[serde(default)]
    namespace: String,
    name: String,
    #[serde(default)]
    kind: String,
    #[serde(default)]
    object_namespace: String,
    #[serde(default)]
    object_name: String,
    #[serde(default)]
    field_path: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    source_host: String,
    #[serde(default)]
    source_component: String,
    #[serde(default)]
    count: Option<u32>,
}

impl ReplayRow {
    fn to_record(&self) -> EventRecord {
        let mut record = EventRecord::new(&self.namespace, &self.name, Utc::now())
            .with_involved_object(&self.kind, &self.object_namespace, &self.object_name)
            .with_reason(&self.reason, &self.message)
            .with_type(&self.event_type)
            .with_source(&self.source_host, &self.source_component)
            .with_count(self.count.unwrap_or(1));
        record.involved_object.field_path = self.field_path.clone();
        record
    }
}

/// Replay engine that feeds recorded events through the exporter.
pub struct ReplayEngine {
    config: ReplayConfig,
    state: Arc<ReplayState>,
    exporter: Arc<EventExporter>,
    rows: Vec<ReplayRow>,
}

impl ReplayEngine {
    /// Create a new replay engine from a CSV file.
    pub fn from_csv(config: ReplayConfig, exporter: Arc<EventExporter>) -> Result<Self, ReplayError> {
        let path = Path::new(&config.csv_path);
        if !path.exists() {
            return Err(ReplayError::FileNotFound(config.csv_path.clone()));
        }
        if config.speed.is_nan() || config.speed <= 0.0 {
            return Err(ReplayError::InvalidSpeed(config.speed));
        }

        let rows = Self::parse_csv(path)?;
        if rows.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }

        let state = Arc::new(ReplayState::default());
        state.total_events.store(rows.len(), Ordering::SeqCst);
        state.running.store(true, Ordering::SeqCst);

        Ok(Self {
            config,
            state,
            exporter,
            rows,
        })
    }

    /// Parse a CSV file into rows ordered by offset.
    fn parse_csv(path: &Path) -> Result<Vec<ReplayRow>, ReplayError> {
        let mut reader = csv::Reader::from_path(path)?;

        let headers = reader.headers()?.clone();
        for required in ["offset_ms", "name"] {
            if !headers.iter().any(|h| h == required) {
                return Err(ReplayError::InvalidFormat(format!(
                    "Missing '{}' column",
                    required
                )));
            }
        }

        let mut rows = Vec::new();
        for (line, result) in reader.deserialize::<ReplayRow>().enumerate() {
            let row = result.map_err(|e| {
                ReplayError::InvalidFormat(format!("Row {}: {}", line + 1, e))
            })?;
            rows.push(row);
        }
        rows.sort_by_key(|r| r.offset_ms);

        Ok(rows)
    }

    /// Get the replay state.
    pub fn state(&self) -> Arc<ReplayState> {
        Arc::clone(&self.state)
    }

    /// Summary of the loaded file.
    pub fn dataset_info(&self) -> DatasetInfo {
        let distinct_keys: HashSet<String> = self
            .rows
            .iter()
            .filter_map(|r| object_key(&r.namespace, &r.name).ok())
            .collect();
        DatasetInfo {
            event_count: self.rows.len(),
            distinct_keys: distinct_keys.len(),
            duration_ms: self.rows.last().map(|r| r.offset_ms).unwrap_or(0),
        }
    }

    /// Start the replay loop (runs until stopped or exhausted).
    ///
    /// A [`ReplayState::stop`] issued before the loop starts is honored.
    pub async fn run(&self) {
        info!(
            "Starting replay: speed={}, loop={}",
            self.config.speed, self.config.loop_replay
        );

        loop {
            if !self.state.running.load(Ordering::SeqCst) {
                break;
            }

            let position = self.state.position.load(Ordering::SeqCst);

            if position >= self.rows.len() {
                self.state.passes.fetch_add(1, Ordering::SeqCst);
                if self.config.loop_replay {
                    info!("Replay complete, looping...");
                    self.state.position.store(0, Ordering::SeqCst);
                    sleep(self.scaled(self.config.loop_pause_ms)).await;
                    continue;
                } else {
                    info!("Replay complete, stopping");
                    self.state.running.store(false, Ordering::SeqCst);
                    break;
                }
            }

            let row = &self.rows[position];
            self.deliver(row, position);
            self.state.position.fetch_add(1, Ordering::SeqCst);

            if let Some(next) = self.rows.get(position + 1) {
                let gap_ms = next.offset_ms - row.offset_ms;
                if gap_ms > 0 {
                    sleep(self.scaled(gap_ms)).await;
                }
            }
        }
    }

    fn scaled(&self, ms: u64) -> Duration {
        Duration::from_millis((ms as f64 / self.config.speed) as u64)
    }

    fn deliver(&self, row: &ReplayRow, position: usize) {
        let record = row.to_record();
        match self.exporter.observe(record) {
            Ok(observation) => debug!(
                "Replayed row {} ({}/{}): {}",
                position,
                row.namespace,
                row.name,
                observation.as_str()
            ),
            Err(e) => warn!("Skipping replay row {}: {}", position, e),
        }
    }
}

/// Replay errors.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Invalid replay speed: {0}")]
    InvalidSpeed(f64),

    #[error("Empty dataset")]
    EmptyDataset,
}

#[cfg(test)]
mod tests {
    use super::*;
    use evtrack::{EventCache, EventTracker, TrackerConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "offset_ms,namespace,name,kind,object_namespace,object_name,field_path,reason,message,type,source_host,source_component,count";

    fn write_csv(rows: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{}", HEADER).unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
        file.flush().unwrap();
        file
    }

    fn exporter() -> Arc<EventExporter> {
        let tracker = EventTracker::new(&TrackerConfig::default()).unwrap();
        Arc::new(EventExporter::new(Arc::new(tracker)).unwrap())
    }

    fn config(file: &NamedTempFile) -> ReplayConfig {
        ReplayConfig {
            csv_path: file.path().to_string_lossy().to_string(),
            speed: 1000.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_load_and_sort_rows() {
        let file = write_csv(&[
            "500,prod,b.1,Pod,prod,b,,BackOff,restarting,Warning,node-1,kubelet,2",
            "0,prod,a.1,Pod,prod,a,spec.containers{app},Failed,pull failed,Warning,node-2,kubelet,",
            "200,prod,a.1,Pod,prod,a,spec.containers{app},Failed,pull failed,Warning,node-2,kubelet,3",
        ]);

        let engine = ReplayEngine::from_csv(config(&file), exporter()).unwrap();
        let offsets: Vec<u64> = engine.rows.iter().map(|r| r.offset_ms).collect();
        assert_eq!(offsets, vec![0, 200, 500]);

        let info = engine.dataset_info();
        assert_eq!(info.event_count, 3);
        assert_eq!(info.distinct_keys, 2);
        assert_eq!(info.duration_ms, 500);
    }

    #[test]
    fn test_row_to_record() {
        let file = write_csv(&[
            "0,prod,a.1,Pod,prod,a,spec.containers{app},Failed,pull failed,Warning,node-2,kubelet,",
        ]);
        let engine = ReplayEngine::from_csv(config(&file), exporter()).unwrap();

        let record = engine.rows[0].to_record();
        assert_eq!(record.involved_object.field_path, "spec.containers{app}");
        assert_eq!(record.source_label(), "node-2/kubelet");
        assert_eq!(record.count, 1);
        assert_eq!(evtrack::event_key(&record).unwrap(), "prod/a.1");
    }

    #[test]
    fn test_missing_file() {
        let config = ReplayConfig {
            csv_path: "/nonexistent/events.csv".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ReplayEngine::from_csv(config, exporter()),
            Err(ReplayError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "timestamp,name").unwrap();
        writeln!(file, "0,a").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            ReplayEngine::from_csv(config(&file), exporter()),
            Err(ReplayError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_bad_offset() {
        let file = write_csv(&["soon,prod,a.1,Pod,prod,a,,Failed,,Warning,,,"]);
        assert!(matches!(
            ReplayEngine::from_csv(config(&file), exporter()),
            Err(ReplayError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_empty_file_and_bad_speed() {
        let file = write_csv(&[]);
        assert!(matches!(
            ReplayEngine::from_csv(config(&file), exporter()),
            Err(ReplayError::EmptyDataset)
        ));

        let file = write_csv(&["0,prod,a.1,Pod,prod,a,,Failed,,Warning,,,"]);
        let mut bad = config(&file);
        bad.speed = 0.0;
        assert!(matches!(
            ReplayEngine::from_csv(bad, exporter()),
            Err(ReplayError::InvalidSpeed(_))
        ));
    }

    #[tokio::test]
    async fn test_run_delivers_every_row() {
        let file = write_csv(&[
            "0,prod,a.1,Pod,prod,a,,BackOff,restarting,Warning,node-1,kubelet,1",
            "10,prod,a.1,Pod,prod,a,,BackOff,restarting,Warning,node-1,kubelet,2",
            "20,prod,b.1,Pod,prod,b,,Scheduled,assigned,Normal,node-1,scheduler,1",
            "30,prod,,Pod,prod,c,,BackOff,restarting,Warning,node-1,kubelet,1",
        ]);
        let exporter = exporter();
        let engine = ReplayEngine::from_csv(config(&file), Arc::clone(&exporter)).unwrap();
        let state = engine.state();

        engine.run().await;

        assert_eq!(state.position.load(Ordering::SeqCst), 4);
        assert_eq!(state.passes.load(Ordering::SeqCst), 1);
        assert!(!state.running.load(Ordering::SeqCst));

        let tracker = exporter.tracker();
        assert_eq!(tracker.tracked_keys(), 1);
        assert_eq!(tracker.cache().get_by_key("prod/a.1").unwrap().count, 2);

        let output = exporter.scrape().unwrap();
        assert!(output.contains("event_exporter_observations_total{outcome=\"tracked\"} 2"));
        assert!(output.contains("event_exporter_observations_total{outcome=\"filtered\"} 1"));
        assert!(output.contains("event_exporter_observations_total{outcome=\"invalid\"} 1"));
    }

    #[tokio::test]
    async fn test_stop_before_run_delivers_nothing() {
        let file = write_csv(&["0,prod,a.1,Pod,prod,a,,BackOff,restarting,Warning,node-1,kubelet,1"]);
        let exporter = exporter();
        let engine = ReplayEngine::from_csv(config(&file), Arc::clone(&exporter)).unwrap();
        let state = engine.state();
        assert!(state.running.load(Ordering::SeqCst));

        state.stop();
        engine.run().await;

        assert_eq!(state.position.load(Ordering::SeqCst), 0);
        assert!(!state.running.load(Ordering::SeqCst));
        assert_eq!(exporter.tracker().tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_stop_interrupts_loop() {
        let file = write_csv(&["0,prod,a.1,Pod,prod,a,,BackOff,restarting,Warning,node-1,kubelet,1"]);
        let mut looping = config(&file);
        looping.speed = 1.0;
        looping.loop_replay = true;
        looping.loop_pause_ms = 10;

        let engine = Arc::new(ReplayEngine::from_csv(looping, exporter()).unwrap());
        let state = engine.state();
        let handle = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run().await })
        };

        while state.passes.load(Ordering::SeqCst) < 2 {
            sleep(Duration::from_millis(1)).await;
        }
        state.stop();
        handle.await.unwrap();
        assert!(!state.running.load(Ordering::SeqCst));
    }
}
