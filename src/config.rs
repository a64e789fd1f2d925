//! Tracker configuration.

use crate::error::ConfigError;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

/// Configuration for an [`EventTracker`](crate::EventTracker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Window given to a key on its first observation (seconds).
    pub base_window_secs: u64,

    /// Cap on any window (seconds). Keys silent for twice this are forgotten.
    pub max_window_secs: u64,

    /// Event types that are tracked, compared case-insensitively.
    pub allowed_types: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_window_secs: 20,
            max_window_secs: 300, // 5 minutes
            allowed_types: vec!["Warning".to_string()],
        }
    }
}

impl TrackerConfig {
    /// Check the windows are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = clamp_secs(self.base_window_secs);
        let max = clamp_secs(self.max_window_secs);
        if base <= 0 {
            return Err(ConfigError::NonPositiveBase(base));
        }
        if base > max {
            return Err(ConfigError::BaseExceedsMax { base, max });
        }
        Ok(())
    }

    /// Base window as a duration
    pub fn base_window(&self) -> TimeDelta {
        to_delta(self.base_window_secs)
    }

    /// Max window as a duration
    pub fn max_window(&self) -> TimeDelta {
        to_delta(self.max_window_secs)
    }
}

fn clamp_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

fn to_delta(secs: u64) -> TimeDelta {
    TimeDelta::try_seconds(clamp_secs(secs)).unwrap_or(TimeDelta::MAX)
}
