//! Error types for LeadHarvest.
//!
//! Library crates use [`LeadHarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Fetch failures are deliberately *not* part of this enum: a failing source is
//! an expected outcome of a run and is modelled as a [`FetchError`] value
//! (see [`crate::types`]) that ends up in the run report.
//!
//! [`FetchError`]: crate::types::FetchError

use std::path::PathBuf;

/// Top-level error type for LeadHarvest operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadHarvestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside of source fetching (client setup, enrichment).
    #[error("network error: {0}")]
    Network(String),

    /// Sources file or payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Enrichment provider unavailable or returned garbage.
    #[error("enrichment error: {0}")]
    Enrichment(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad settings, oversized batch, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Export serialization error.
    #[error("export error: {0}")]
    Export(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadHarvestError>;

impl LeadHarvestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
