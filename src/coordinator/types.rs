// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the refresh engine coordinator.

use std::time::Duration;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::{ErrorKind, SyncError};
use crate::validation::{CleanupReport, ValidSets};

/// Engine lifecycle state.
///
/// Use [`super::RefreshEngine::state()`] to check current state or
/// [`super::RefreshEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet connected
    Created,
    /// Opening source and destination pools
    Connecting,
    /// Idle between runs
    Ready,
    /// Per-entity watermark → extract → merge → log
    Syncing,
    /// Computing valid-ID sets from the allowlist
    Validating,
    /// Deleting rows outside the valid sets
    Cleaning,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Validating => write!(f, "Validating"),
            Self::Cleaning => write!(f, "Cleaning"),
        }
    }
}

/// How one entity sync ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    /// Rows merged and logged in one commit
    Synced,
    /// Nothing newer than the watermark; no log entry written
    NoChanges,
    Failed { kind: ErrorKind, message: String },
}

/// Result of syncing one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub entity: EntityKind,
    /// Watermark the extraction started from (absent if it could not be read)
    pub since: Option<i64>,
    pub extracted: usize,
    pub written: usize,
    pub ids: Vec<i64>,
    pub status: EntityStatus,
}

impl EntityReport {
    pub(super) fn failed(entity: EntityKind, since: Option<i64>, err: &SyncError) -> Self {
        Self {
            entity,
            since,
            extracted: 0,
            written: 0,
            ids: Vec::new(),
            status: EntityStatus::Failed {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self.status, EntityStatus::Failed { .. })
    }
}

impl std::fmt::Display for EntityReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            EntityStatus::Synced => write!(
                f,
                "{}: {} rows written ({} extracted)",
                self.entity, self.written, self.extracted
            ),
            EntityStatus::NoChanges => write!(f, "{}: no new or updated records", self.entity),
            EntityStatus::Failed { kind, message } => {
                write!(f, "{}: FAILED [{}] {}", self.entity, kind.as_str(), message)
            }
        }
    }
}

/// Outcome of the validate-then-cleanse phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupPhase {
    /// `cleanup_enabled = false`
    Disabled,
    /// Allowlist or hierarchy could not be read; nothing deleted
    ValidationFailed { kind: ErrorKind, message: String },
    Completed { valid: ValidSets, report: CleanupReport },
}

/// Summary of one full refresh.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub entities: Vec<EntityReport>,
    pub cleanup: CleanupPhase,
    pub elapsed: Duration,
}

impl RunReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.entities.iter().all(EntityReport::is_success)
            && match &self.cleanup {
                CleanupPhase::Disabled => true,
                CleanupPhase::ValidationFailed { .. } => false,
                CleanupPhase::Completed { report, .. } => report.is_success(),
            }
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|r| r.entity == kind)
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "refresh {} {} in {:.2}s",
            self.run_id,
            if self.is_success() { "succeeded" } else { "finished with errors" },
            self.elapsed.as_secs_f64()
        )?;
        for entity in &self.entities {
            writeln!(f, "  {}", entity)?;
        }
        match &self.cleanup {
            CleanupPhase::Disabled => writeln!(f, "  cleanup disabled"),
            CleanupPhase::ValidationFailed { kind, message } => {
                writeln!(f, "  validation FAILED [{}] {}", kind.as_str(), message)
            }
            CleanupPhase::Completed { valid, report } => {
                writeln!(f, "  valid ids: {}", valid)?;
                write!(f, "  {}", report)
            }
        }
    }
}
