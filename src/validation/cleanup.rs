// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cascade cleanup: delete destination rows outside their valid-ID set.
//!
//! Tables are visited in hierarchy order against one precomputed
//! [`ValidSets`] snapshot. A table whose valid set is empty is skipped
//! outright, so an empty allowlist can never wipe the destination.

use std::collections::BTreeSet;
use tracing::{debug, info, instrument, warn};

use crate::entity::{ColumnType, EntityKind};
use crate::error::{ErrorKind, StoreRole, SyncError};
use crate::metrics;
use crate::storage::{decode_value, qualify, SqlStore};
use crate::validation::hierarchy::ValidSets;

/// A destination table and the column checked against a valid set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupTarget {
    pub entity: EntityKind,
    pub column: &'static str,
    /// Level whose valid set the column must belong to
    pub valid_set: EntityKind,
}

impl CleanupTarget {
    pub fn table(&self) -> &'static str {
        self.entity.as_str()
    }
}

/// Targets in hierarchy order. Leaves are checked by their version link.
pub const CLEANUP_TARGETS: [CleanupTarget; 6] = [
    CleanupTarget { entity: EntityKind::Campaign, column: "id_campaign", valid_set: EntityKind::Campaign },
    CleanupTarget { entity: EntityKind::Tactic, column: "id_tactic", valid_set: EntityKind::Tactic },
    CleanupTarget { entity: EntityKind::Version, column: "id_version", valid_set: EntityKind::Version },
    CleanupTarget { entity: EntityKind::Offer, column: "id_offer", valid_set: EntityKind::Offer },
    CleanupTarget { entity: EntityKind::Link, column: "id_version", valid_set: EntityKind::Version },
    CleanupTarget { entity: EntityKind::Treatment, column: "id_version", valid_set: EntityKind::Version },
];

/// What happened to one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Deleted(u64),
    /// Valid set empty; table untouched
    Skipped,
    Failed { kind: ErrorKind, message: String },
    /// An earlier connectivity failure ended the pass
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCleanup {
    pub table: &'static str,
    pub column: &'static str,
    pub valid_ids: usize,
    pub outcome: TableOutcome,
}

/// Per-table outcomes of one cleanup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub tables: Vec<TableCleanup>,
}

impl CleanupReport {
    pub fn total_deleted(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Deleted(n) => n,
                _ => 0,
            })
            .sum()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.tables
            .iter()
            .all(|t| matches!(t.outcome, TableOutcome::Deleted(_) | TableOutcome::Skipped))
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == table).map(|t| &t.outcome)
    }
}

impl std::fmt::Display for TableOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deleted(n) => write!(f, "deleted {}", n),
            Self::Skipped => write!(f, "skipped (empty valid set)"),
            Self::Failed { kind, message } => write!(f, "failed [{}]: {}", kind.as_str(), message),
            Self::NotAttempted => write!(f, "not attempted"),
        }
    }
}

impl std::fmt::Display for CleanupReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "cleanup: {} rows deleted", self.total_deleted())?;
        for t in &self.tables {
            writeln!(f, "  {}.{} ({} valid): {}", t.table, t.column, t.valid_ids, t.outcome)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CascadeCleaner {
    store: SqlStore,
    schema: Option<String>,
    chunk_size: usize,
    targets: Vec<CleanupTarget>,
}

impl CascadeCleaner {
    pub fn new(store: SqlStore, schema: Option<String>, chunk_size: usize) -> Self {
        Self {
            store,
            schema,
            chunk_size: chunk_size.max(1),
            targets: CLEANUP_TARGETS.to_vec(),
        }
    }

    /// Restrict the pass to tables of the given entities.
    pub fn with_entities(mut self, entities: &[EntityKind]) -> Self {
        self.targets.retain(|t| entities.contains(&t.entity));
        self
    }

    /// Delete rows whose checked column is NULL or outside its valid set.
    #[instrument(skip(self, valid))]
    pub async fn cleanse(&self, valid: &ValidSets) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut aborted = false;

        for target in &self.targets {
            let ids = valid.get(target.valid_set);
            let outcome = if aborted {
                TableOutcome::NotAttempted
            } else if ids.is_empty() {
                debug!(table = target.table(), "Valid set empty, skipping");
                metrics::record_cleanup_skipped(target.table());
                TableOutcome::Skipped
            } else {
                match self.cleanse_table(target, ids).await {
                    Ok(deleted) => {
                        metrics::record_cleanup_deleted(target.table(), deleted);
                        TableOutcome::Deleted(deleted)
                    }
                    Err(e) => {
                        warn!(table = target.table(), error = %e, "Cleanup failed");
                        metrics::record_error("cleanse", e.kind().as_str());
                        aborted = e.is_connectivity();
                        TableOutcome::Failed { kind: e.kind(), message: e.to_string() }
                    }
                }
            };
            report.tables.push(TableCleanup {
                table: target.table(),
                column: target.column,
                valid_ids: ids.len(),
                outcome,
            });
        }

        info!(deleted = report.total_deleted(), success = report.is_success(), "Cleanup pass complete");
        report
    }

    /// One table in its own transaction: read the distinct values present,
    /// then delete the ones outside the set in chunks.
    async fn cleanse_table(&self, target: &CleanupTarget, valid: &BTreeSet<i64>) -> Result<u64, SyncError> {
        let table = qualify(self.schema.as_deref(), target.table());
        let cleanup_err = |message: String| SyncError::Cleanup {
            table: target.table().to_string(),
            message,
        };
        let classify = |e: sqlx::Error| SyncError::from_sqlx(e, StoreRole::Destination, cleanup_err);

        let mut tx = self.store.begin().await?;

        let present = sqlx::query(&format!(
            "SELECT DISTINCT {col} AS present_id FROM {table}",
            col = target.column,
            table = table
        ))
        .fetch_all(&mut *tx)
        .await
        .map_err(classify)?;

        let mut has_null = false;
        let mut doomed = Vec::new();
        for row in &present {
            match decode_value(row, "present_id", ColumnType::BigInt)
                .map_err(|e| cleanup_err(e.to_string()))?
                .as_int()
            {
                Some(id) if valid.contains(&id) => {}
                Some(id) => doomed.push(id),
                None => has_null = true,
            }
        }

        let mut deleted = 0u64;
        if has_null {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE {} IS NULL", table, target.column))
                .execute(&mut *tx)
                .await
                .map_err(classify)?;
            deleted += result.rows_affected();
        }

        for chunk in doomed.chunks(self.chunk_size) {
            let mut p = self.store.dialect().placeholders();
            let sql = format!(
                "DELETE FROM {} WHERE {} IN ({})",
                table,
                target.column,
                p.list(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            deleted += query.execute(&mut *tx).await.map_err(classify)?.rows_affected();
        }

        tx.commit().await.map_err(classify)?;
        debug!(table = target.table(), deleted, "Table cleansed");
        Ok(deleted)
    }
}
