// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the refresh engine.
//!
//! Every phase returns a [`SyncError`] classified by [`ErrorKind`]. Nothing is
//! swallowed: the coordinator records the error against the entity (or table)
//! that produced it and carries on with the next independent unit of work.

use thiserror::Error;

/// Which store an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Source,
    Destination,
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Destination => write!(f, "destination"),
        }
    }
}

/// Coarse classification used for reporting and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ConnectivityFailure,
    StoreUnavailable,
    ExtractionFailure,
    MergeFailure,
    LogFailure,
    CleanupFailure,
    ConfigError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectivityFailure => "connectivity",
            Self::StoreUnavailable => "store_unavailable",
            Self::ExtractionFailure => "extraction",
            Self::MergeFailure => "merge",
            Self::LogFailure => "log",
            Self::CleanupFailure => "cleanup",
            Self::ConfigError => "config",
        }
    }
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("{store} store unreachable: {message}")]
    Connectivity { store: StoreRole, message: String },

    #[error("watermark unavailable for '{entity}': {message}")]
    StoreUnavailable { entity: String, message: String },

    #[error("extraction failed for '{entity}': {message}")]
    Extraction { entity: String, message: String },

    #[error("merge failed for '{entity}': {message}")]
    Merge { entity: String, message: String },

    #[error("run log write failed for '{entity}': {message}")]
    Log { entity: String, message: String },

    #[error("cleanup failed for '{table}': {message}")]
    Cleanup { table: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connectivity { .. } => ErrorKind::ConnectivityFailure,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::Extraction { .. } => ErrorKind::ExtractionFailure,
            Self::Merge { .. } => ErrorKind::MergeFailure,
            Self::Log { .. } => ErrorKind::LogFailure,
            Self::Cleanup { .. } => ErrorKind::CleanupFailure,
            Self::Config(_) => ErrorKind::ConfigError,
        }
    }

    /// True when the store could not be reached at all.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        self.kind() == ErrorKind::ConnectivityFailure
    }

    /// Classify a sqlx error. Transport-level failures become
    /// [`SyncError::Connectivity`]; everything else is handed to `otherwise`.
    pub fn from_sqlx(
        err: sqlx::Error,
        store: StoreRole,
        otherwise: impl FnOnce(String) -> SyncError,
    ) -> SyncError {
        if is_transport_error(&err) {
            SyncError::Connectivity {
                store,
                message: err.to_string(),
            }
        } else {
            otherwise(err.to_string())
        }
    }
}

fn is_transport_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = SyncError::Merge {
            entity: "campaign".into(),
            message: "NOT NULL constraint failed".into(),
        };
        assert_eq!(err.kind(), ErrorKind::MergeFailure);
        assert!(!err.is_connectivity());
        assert_eq!(err.kind().as_str(), "merge");
    }

    #[test]
    fn test_pool_timeout_is_connectivity() {
        let err = SyncError::from_sqlx(sqlx::Error::PoolTimedOut, StoreRole::Source, |m| {
            SyncError::Extraction { entity: "tactic".into(), message: m }
        });
        assert!(err.is_connectivity());
        assert!(err.to_string().starts_with("source store unreachable"));
    }

    #[test]
    fn test_row_not_found_uses_fallback() {
        let err = SyncError::from_sqlx(sqlx::Error::RowNotFound, StoreRole::Destination, |m| {
            SyncError::StoreUnavailable { entity: "offer".into(), message: m }
        });
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert!(err.to_string().contains("'offer'"));
    }
}
