// evtrack Exporter - Prometheus exporter for event liveness
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # evtrack Exporter
//!
//! Prometheus exporter reporting whether cluster events are still ongoing,
//! with optional replay of recorded events.
//!
//! ## Usage
//!
//! ```bash
//! # Serve pushed events on the default port
//! evtrack-exporter
//!
//! # Replay a recorded file ten times faster, forever
//! evtrack-exporter --replay events.csv --speed 10.0 --loop-replay
//!
//! # Track both Warning and Normal events with a shorter base window
//! evtrack-exporter --event-type Warning --event-type Normal --init-length 10
//! ```

mod metrics;
mod server;

#[cfg(feature = "replay")]
mod replay;

use clap::Parser;
use evtrack::{EventTracker, EvtrackError, TrackerConfig};
use metrics::{EventExporter, ExportError};
use server::{AppState, RESERVED_PATHS};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "replay")]
use replay::{ReplayConfig, ReplayEngine, ReplayError};

/// Kubernetes event state exporter
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "9102")]
    port: u16,

    /// Path under which to expose metrics
    #[arg(long, default_value = "/metrics")]
    telemetry_path: String,

    /// Initial backoff window in seconds
    #[arg(long, default_value = "20")]
    init_length: u64,

    /// Maximum backoff window in seconds
    #[arg(long, default_value = "300")]
    max_length: u64,

    /// Event type to track (repeatable)
    #[arg(long = "event-type", default_value = "Warning")]
    event_types: Vec<String>,

    /// CSV file of recorded events to replay
    #[arg(short, long)]
    replay: Option<String>,

    /// Replay speed multiplier (1.0 = real-time)
    #[arg(short, long, default_value = "1.0")]
    speed: f64,

    /// Start the replay over when it reaches the end
    #[arg(short, long)]
    loop_replay: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Errors that stop the exporter.
#[derive(Debug, Error)]
enum ExporterError {
    #[error("Invalid tracker configuration: {0}")]
    Tracker(#[from] EvtrackError),

    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] ExportError),

    #[cfg(feature = "replay")]
    #[error("Failed to load replay: {0}")]
    Replay(#[from] ReplayError),

    #[error("Invalid telemetry path {0:?}: must start with '/' and not shadow a built-in route")]
    InvalidPath(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting event_exporter v{}", env!("CARGO_PKG_VERSION"));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate_telemetry_path(path: &str) -> Result<(), ExporterError> {
    let shadows = RESERVED_PATHS.contains(&path) || path.starts_with("/events/");
    if !path.starts_with('/') || shadows {
        return Err(ExporterError::InvalidPath(path.to_string()));
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), ExporterError> {
    validate_telemetry_path(&args.telemetry_path)?;

    let config = TrackerConfig {
        base_window_secs: args.init_length,
        max_window_secs: args.max_length,
        allowed_types: args.event_types.clone(),
    };
    let tracker = EventTracker::new(&config).map_err(EvtrackError::from)?;
    info!(
        "Tracking event types {:?} with backoff {}s..{}s",
        config.allowed_types, config.base_window_secs, config.max_window_secs
    );

    let exporter = Arc::new(EventExporter::new(Arc::new(tracker))?);

    #[cfg_attr(not(feature = "replay"), allow(unused_mut))]
    let mut state = AppState::new(exporter.clone(), args.telemetry_path.clone());

    #[cfg(feature = "replay")]
    if let Some(csv_path) = args.replay.clone() {
        let config = ReplayConfig {
            csv_path,
            speed: args.speed,
            loop_replay: args.loop_replay,
            ..Default::default()
        };

        let engine = ReplayEngine::from_csv(config, exporter.clone())?;
        let info = engine.dataset_info();
        info!(
            "Replay loaded: {} events over {} keys, {} ms",
            info.event_count, info.distinct_keys, info.duration_ms
        );

        state.replay_state = Some(engine.state());
        state.dataset_info = Some(info);

        // Start replay in background
        tokio::spawn(async move {
            engine.run().await;
        });
    }

    #[cfg(not(feature = "replay"))]
    if args.replay.is_some() {
        tracing::warn!("Replay feature not enabled, ignoring --replay argument");
    }

    let state = Arc::new(state);
    let app = server::router(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    info!("Metrics endpoint: http://{}{}", addr, args.telemetry_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    info!("Exporter stopped");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");

    #[cfg(feature = "replay")]
    if let Some(replay_state) = &state.replay_state {
        replay_state.stop();
    }
    #[cfg(not(feature = "replay"))]
    let _ = state;
}
