//! # Trendwatch Errors
//!
//! Shared error taxonomy for the title store.
//!
//! Backends translate their native errors (`duckdb::Error`, S3 `SdkError`)
//! into [`StorageError`] at the `TitleStore` trait boundary, so the manager
//! and detector never depend on backend-specific error types.

use thiserror::Error;

/// Record-level validation errors.
///
/// Raised before a record reaches any backend; invalid records never touch
/// storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title is empty after normalization")]
    EmptyTitle,

    #[error("source is empty after normalization")]
    EmptySource,

    #[error("observed_at timestamp is missing")]
    MissingTimestamp,
}

/// Storage layer errors, classified by retry eligibility.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Timeout, throttling, lock contention. Eligible for bounded retry.
    #[error("transient {backend} failure: {reason}")]
    Transient { backend: &'static str, reason: String },

    /// Auth failure, schema mismatch, corrupt data. Never retried.
    #[error("permanent {backend} failure: {reason}")]
    Permanent { backend: &'static str, reason: String },

    /// Queried date/object absent. Read operations treat this as an empty
    /// result, not an error.
    #[error("{backend} object not found: {key}")]
    NotFound { backend: &'static str, key: String },
}

impl StorageError {
    pub fn transient(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Transient {
            backend,
            reason: reason.into(),
        }
    }

    pub fn permanent(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Permanent {
            backend,
            reason: reason.into(),
        }
    }

    pub fn not_found(backend: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            backend,
            key: key.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Configuration errors surfaced at manager construction.
///
/// These fail fast: a manager is never built over a half-understood
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown storage backend kind: {kind}")]
    UnknownBackend { kind: String },

    #[error("missing required configuration parameter: {name}")]
    MissingParameter { name: String },

    #[error("invalid value for configuration parameter {name}: {value}")]
    InvalidParameter { name: String, value: String },
}

/// Detection cycle errors.
///
/// The detector treats any storage failure as fatal for the cycle rather
/// than guessing a baseline.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors surfaced while constructing the storage manager.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
