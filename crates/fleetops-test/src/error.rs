//! Error types for the test-support crate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for test-support operations.
pub type Result<T> = std::result::Result<T, TestError>;

/// Errors that can occur while building or loading test fixtures.
#[derive(Error, Debug)]
pub enum TestError {
    /// Failed to read a fixture file.
    #[error("failed to read fixture file {path}: {source}")]
    FileReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Core domain error surfaced while building a fixture.
    #[error(transparent)]
    CoreError(#[from] fleetops_core::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML error.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}
