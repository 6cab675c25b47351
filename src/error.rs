// Error types for netpulse

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Failures produced while acquiring a single measurement
#[derive(Error, Debug)]
pub enum MeasurementError {
    /// Upstream rate limiting or a forbidden response
    #[error("rate limited by speed test backend: {0}")]
    Transient(String),

    /// The external tool still wants licence/consent acceptance
    #[error("speed test CLI requires license acceptance: {0}")]
    LicenseRequired(String),

    /// The required backend is not installed
    #[error("measurement engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Structured output could not be decoded
    #[error("malformed engine output: {0}")]
    Parse(String),

    #[error("engine failed (exit code {}): {message}", .code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    EngineFailure { code: Option<i32>, message: String },
}

impl MeasurementError {
    /// Only a missing required engine stops a run outright
    pub fn is_fatal(&self) -> bool {
        matches!(self, MeasurementError::EngineUnavailable(_))
    }
}

/// Failures reading or writing the dataset files
#[derive(Error, Debug)]
pub enum PersistError {
    /// Destination held open by another process after all retries
    #[error("{} is locked by another process: {source}", path.display())]
    Locked {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A dataset file exists but cannot be decoded
    #[error("corrupt dataset {} at line {line}: {reason}", path.display())]
    Corrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),
}

impl PersistError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PersistError::Io {
            path: path.into(),
            source,
        }
    }
}
