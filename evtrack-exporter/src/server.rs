// evtrack Exporter - HTTP endpoints
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP router: metrics scrape, event ingestion and status endpoints.

use crate::metrics::EventExporter;
#[cfg(feature = "replay")]
use crate::replay::{DatasetInfo, ReplayState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use evtrack::{split_key, EventRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

/// Paths served by the router besides the telemetry path.
pub const RESERVED_PATHS: [&str; 5] = ["/", "/health", "/ready", "/status", "/events"];

/// Application state shared across handlers.
pub struct AppState {
    pub exporter: Arc<EventExporter>,
    pub telemetry_path: String,
    #[cfg(feature = "replay")]
    pub replay_state: Option<Arc<ReplayState>>,
    #[cfg(feature = "replay")]
    pub dataset_info: Option<DatasetInfo>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(exporter: Arc<EventExporter>, telemetry_path: impl Into<String>) -> Self {
        Self {
            exporter,
            telemetry_path: telemetry_path.into(),
            #[cfg(feature = "replay")]
            replay_state: None,
            #[cfg(feature = "replay")]
            dataset_info: None,
            start_time: Instant::now(),
        }
    }
}

/// Build the router.
pub fn router(state: Arc<AppState>) -> Router {
    let telemetry_path = state.telemetry_path.clone();
    Router::new()
        .route("/", get(root_handler))
        .route(&telemetry_path, get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .route("/events", post(ingest_handler))
        .route("/events/*key", delete(delete_handler))
        .with_state(state)
}

/// Root handler - shows a simple HTML page.
async fn root_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(format!(
        r#"<html>
<head><title>Event exporter</title></head>
<body>
<h1>Event exporter</h1>
<p><a href='{}'>Metrics</a></p>
<p><a href='/status'>Status</a></p>
</body>
</html>
"#,
        state.telemetry_path
    ))
}

/// Metrics handler - runs a scrape cycle and returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.exporter.scrape() {
        Ok(metrics) => (
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics,
        )
            .into_response(),
        Err(e) => {
            error!("Error scraping for events: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
async fn ready_handler() -> impl IntoResponse {
    (StatusCode::OK, "Ready")
}

/// Ingestion response.
#[derive(Debug, Serialize)]
struct IngestResponse {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Push a new or updated event.
async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<EventRecord>,
) -> (StatusCode, Json<IngestResponse>) {
    match state.exporter.observe(event) {
        Ok(observation) => {
            let key = match &observation {
                evtrack::Observation::Tracked { key, .. }
                | evtrack::Observation::Duplicate { key } => Some(key.clone()),
                evtrack::Observation::Filtered => None,
            };
            (
                StatusCode::ACCEPTED,
                Json(IngestResponse {
                    outcome: observation.as_str(),
                    key,
                    error: None,
                }),
            )
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(IngestResponse {
                outcome: crate::metrics::INVALID_OUTCOME,
                key: None,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Deletion response.
#[derive(Debug, Serialize)]
struct DeleteResponse {
    key: String,
    deleted: bool,
}

/// Forget a deleted event by key (`namespace/name` or `name`).
async fn delete_handler(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    let forgotten =
        split_key(&key).and_then(|(namespace, name)| state.exporter.forget(namespace, name));
    match forgotten {
        Ok(deleted) => (StatusCode::OK, Json(DeleteResponse { key, deleted })).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    tracked_keys: usize,
    cached_records: usize,
    scrapes_total: u64,
    base_window_secs: i64,
    max_window_secs: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    replay: Option<ReplayStatus>,
}

/// Replay status information.
#[derive(Serialize)]
struct ReplayStatus {
    running: bool,
    position: usize,
    total_events: usize,
    passes: usize,
    distinct_keys: usize,
    duration_ms: u64,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    #[cfg(feature = "replay")]
    let replay = state.replay_state.as_ref().map(|replay_state| {
        use std::sync::atomic::Ordering;
        ReplayStatus {
            running: replay_state.running.load(Ordering::SeqCst),
            position: replay_state.position.load(Ordering::SeqCst),
            total_events: replay_state.total_events.load(Ordering::SeqCst),
            passes: replay_state.passes.load(Ordering::SeqCst),
            distinct_keys: state
                .dataset_info
                .as_ref()
                .map(|i| i.distinct_keys)
                .unwrap_or(0),
            duration_ms: state
                .dataset_info
                .as_ref()
                .map(|i| i.duration_ms)
                .unwrap_or(0),
        }
    });

    #[cfg(not(feature = "replay"))]
    let replay: Option<ReplayStatus> = None;

    let tracker = state.exporter.tracker();
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        tracked_keys: tracker.tracked_keys(),
        cached_records: tracker.cached_records(),
        scrapes_total: state.exporter.scrape_count(),
        base_window_secs: tracker.store().base_window().num_seconds(),
        max_window_secs: tracker.store().max_window().num_seconds(),
        replay,
    })
}
