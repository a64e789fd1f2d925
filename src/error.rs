//! Error types for evtrack
//!
//! This module defines all error types used throughout the library.

use thiserror::Error;

/// Main error type for evtrack operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvtrackError {
    /// Key derivation error
    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors while deriving a stable key for an event record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The record has no name to key on
    #[error("event has no name (namespace {namespace:?})")]
    MissingName { namespace: String },

    /// A key string does not have the `namespace/name` shape
    #[error("malformed key: {0:?}")]
    Malformed(String),
}

/// Errors in tracker configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Base window must be strictly positive
    #[error("base window must be positive, got {0}s")]
    NonPositiveBase(i64),

    /// Base window larger than the cap
    #[error("base window ({base}s) exceeds max window ({max}s)")]
    BaseExceedsMax { base: i64, max: i64 },
}
