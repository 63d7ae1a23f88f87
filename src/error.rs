//! Custom error types for the acquisition pipeline.
//!
//! This module defines the primary error type, `SensorError`. Using the `thiserror`
//! crate, it provides one consistent way to report everything that can go wrong
//! between loading configuration and appending a record to the log.
//!
//! ## Error Hierarchy
//!
//! - **`ConfigLoad`**: Wraps errors from `figment`, typically parse or type errors in the
//!   TOML file or environment overrides.
//! - **`Config`**: Semantic errors in the configuration, such as an empty or duplicated
//!   channel set or a non-positive sample rate. Always fatal, raised before a session starts.
//! - **`Read`**: A channel read failed. The sample for that tick is discarded.
//! - **`Storage`**: An I/O failure while creating or appending to the log.
//! - **`ColumnMismatch`**: A sample does not line up with the log header. This means the
//!   channel set changed under a running session and is never recoverable.
//!
//! `is_recoverable` tells the session controller whether the loop may carry on.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type SensorResult<T> = std::result::Result<T, SensorError>;

/// Errors raised by the acquisition pipeline.
#[derive(Error, Debug)]
pub enum SensorError {
    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    ConfigLoad(#[from] Box<figment::Error>),

    /// Configuration loaded but is not usable.
    #[error("Configuration validation error: {0}")]
    Config(String),

    /// A channel read failed; the whole sample is dropped.
    #[error("Read error on channel '{channel}': {source}")]
    Read {
        /// Channel whose reader failed.
        channel: String,
        /// Error reported by the reader capability.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The log could not be created or appended to.
    #[error("Storage error on '{}': {source}", .path.display())]
    Storage {
        /// Path of the log file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A sample has a different number of values than the log has columns.
    #[error("Sample has {actual} readings but the log expects {expected}")]
    ColumnMismatch {
        /// Value columns declared by the header (excluding the timestamp).
        expected: usize,
        /// Readings present in the rejected sample.
        actual: usize,
    },
}

impl SensorError {
    /// Whether the acquisition loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SensorError::Read { .. } | SensorError::Storage { .. } => true,
            SensorError::ConfigLoad(_)
            | SensorError::Config(_)
            | SensorError::ColumnMismatch { .. } => false,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SensorError::Storage {
            path: path.into(),
            source,
        }
    }
}

impl From<figment::Error> for SensorError {
    fn from(value: figment::Error) -> Self {
        SensorError::ConfigLoad(Box::new(value))
    }
}
