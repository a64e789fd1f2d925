//! # evtrack - Backoff-windowed event liveness tracking
//!
//! Turns a stream of repeating notification events into a queryable binary
//! state: is the condition behind this event still going on?
//!
//! ## Key Features
//!
//! - **Exponential windows**: every repeat doubles the quiet interval, up to a cap
//! - **Staleness escape**: keys silent for twice the cap restart from scratch
//! - **Scrape-driven GC**: forgetting happens as a side effect of reading
//! - **Shared state**: one lock per store, safe across producer and scraper
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{DateTime, TimeDelta};
//! use evtrack::{EventRecord, EventTracker, TrackerConfig};
//!
//! let config = TrackerConfig {
//!     base_window_secs: 10,
//!     max_window_secs: 300,
//!     ..Default::default()
//! };
//! let tracker = EventTracker::new(&config).unwrap();
//!
//! let t0 = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
//! let event = EventRecord::new("prod", "web-1.17a", t0)
//!     .with_involved_object("Pod", "prod", "web-1")
//!     .with_reason("BackOff", "Back-off restarting failed container")
//!     .with_type("Warning");
//! tracker.observe(event).unwrap();
//!
//! let report = tracker.scrape(t0 + TimeDelta::seconds(1));
//! assert_eq!(report.samples.len(), 1);
//! assert!(report.samples[0].active);
//!
//! let report = tracker.scrape(t0 + TimeDelta::seconds(20));
//! assert!(!report.samples[0].active);
//! ```
//!
//! ## Modules
//!
//! - [`backoff`]: Per-key backoff windows and garbage collection
//! - [`cache`]: Last-known event records
//! - [`event`]: Event record model
//! - [`key`]: Key derivation
//! - [`filter`]: Event filters
//! - [`scrape`]: Scrape cycle and samples
//! - [`tracker`]: Observation entry point tying it all together

// Modules
pub mod backoff;
pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod key;
pub mod scrape;
pub mod tracker;

// Re-exports for convenient access
pub use backoff::{is_doubly_stale, BackoffEntry, BackoffStore};
pub use cache::{EventCache, MemoryEventCache};
pub use config::TrackerConfig;
pub use error::{ConfigError, EvtrackError, KeyError};
pub use event::{EventRecord, EventSource, ObjectReference};
pub use filter::{EventFilter, EventTypeFilter};
pub use key::{event_key, object_key, split_key};
pub use scrape::{scrape_cycle, EventSample, ScrapeReport, COUNT_LABELS, EVENT_LABELS};
pub use tracker::{EventTracker, Forgotten, Observation};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
