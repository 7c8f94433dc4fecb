//! replica-reload Error Types

use thiserror::Error;

use crate::reload::ReloadStep;

/// Result type alias for replica-reload operations
pub type Result<T> = std::result::Result<T, Error>;

/// replica-reload error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Leader discovery errors
    #[error("No writable replica among {candidates} candidate(s)")]
    NoWritableReplica { candidates: usize },

    #[error("Fabric coordinator {address} unreachable: {reason}")]
    CoordinatorUnreachable { address: String, reason: String },

    // Upstream errors
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Dataset errors
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Row {row} rejected: {reason}")]
    RowValidationFailed { row: usize, reason: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Transaction failed during {step} on {host}: {reason}")]
    TransactionFailed {
        step: ReloadStep,
        host: String,
        reason: String,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if the orchestrator may spend another attempt on this error.
    ///
    /// Validation failures are retryable too: an upstream snapshot may be
    /// replaced by a corrected one between attempts.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }

    /// Whether the error came from a malformed dataset rather than from
    /// infrastructure.
    pub fn is_data_quality(&self) -> bool {
        matches!(self, Error::RowValidationFailed { .. } | Error::Csv(_))
    }

    /// The reload step this error is attributed to, for diagnostics.
    pub fn step(&self) -> ReloadStep {
        match self {
            Error::NoWritableReplica { .. } | Error::CoordinatorUnreachable { .. } => {
                ReloadStep::Discover
            }
            Error::UpstreamFetchFailed(_) | Error::Http(_) => ReloadStep::Fetch,
            Error::Csv(_) => ReloadStep::Parse,
            Error::RowValidationFailed { .. } => ReloadStep::Validate,
            Error::ConnectionFailed { .. } | Error::Database(_) => ReloadStep::Connect,
            Error::TransactionFailed { step, .. } => *step,
            Error::Io(_) => ReloadStep::Archive,
            Error::Config(_) | Error::ConfigParse(_) | Error::Internal(_) => ReloadStep::Setup,
        }
    }

    /// Wrap a database error raised while `step` was running against `host`.
    pub fn transaction(step: ReloadStep, host: &str, err: impl std::fmt::Display) -> Self {
        Error::TransactionFailed {
            step,
            host: host.to_string(),
            reason: err.to_string(),
        }
    }
}
