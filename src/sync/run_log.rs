// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Append-only audit log of entity syncs.
//!
//! One entry per successful entity sync, written in the same transaction as
//! the merge. The log is also the watermark source (see
//! [`super::watermark`]), so an entry must never exist without its merge.

use serde::Serialize;
use sqlx::{Any, Transaction};
use tracing::{debug, instrument};

use crate::entity::{ColumnType, EntityKind};
use crate::error::{StoreRole, SyncError};
use crate::storage::{decode_value, qualify, Dialect, SqlStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLogEntry {
    pub entity: EntityKind,
    pub ingest_start_ts: i64,
    pub ingest_end_ts: i64,
    /// `upsert` or `append`
    pub op_kind: String,
    pub row_count: i64,
    /// Affected keys joined with the configured delimiter
    pub ids: String,
}

#[derive(Debug, Clone)]
pub struct RunLogger {
    dialect: Dialect,
    table: String,
    index_name: String,
    delimiter: String,
}

impl RunLogger {
    pub fn new(dialect: Dialect, schema: Option<&str>, log_table: &str, delimiter: &str) -> Self {
        Self {
            dialect,
            table: qualify(schema, log_table),
            index_name: format!("idx_{}_entity", log_table.replace('.', "_")),
            delimiter: delimiter.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Join keys for the `ids` column.
    pub fn join_ids(&self, ids: &[i64]) -> String {
        ids.iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(&self.delimiter)
    }

    /// DDL for the log table and its watermark index.
    pub fn schema_statements(&self) -> Vec<String> {
        let short = self.dialect.short_text_sql();
        match self.dialect {
            // MySQL has no CREATE INDEX IF NOT EXISTS
            Dialect::MySql => vec![format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 entity {short} NOT NULL, \
                 ingest_start_ts BIGINT NOT NULL, \
                 ingest_end_ts BIGINT NOT NULL, \
                 op_kind {short} NOT NULL, \
                 row_count BIGINT NOT NULL, \
                 ids LONGTEXT, \
                 INDEX {index} (entity, ingest_start_ts))",
                table = self.table,
                index = self.index_name,
            )],
            Dialect::Sqlite | Dialect::Postgres => vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {table} (\
                     entity {short} NOT NULL, \
                     ingest_start_ts BIGINT NOT NULL, \
                     ingest_end_ts BIGINT NOT NULL, \
                     op_kind {short} NOT NULL, \
                     row_count BIGINT NOT NULL, \
                     ids TEXT)",
                    table = self.table,
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} (entity, ingest_start_ts)",
                    self.index_name, self.table
                ),
            ],
        }
    }

    /// Append one entry inside the merge transaction.
    #[instrument(skip(self, tx, entry), fields(entity = %entry.entity, rows = entry.row_count))]
    pub async fn record(
        &self,
        tx: &mut Transaction<'_, Any>,
        entry: &RunLogEntry,
    ) -> Result<(), SyncError> {
        let mut p = self.dialect.placeholders();
        let sql = format!(
            "INSERT INTO {} (entity, ingest_start_ts, ingest_end_ts, op_kind, row_count, ids) \
             VALUES ({})",
            self.table,
            p.list(6)
        );

        sqlx::query(&sql)
            .bind(entry.entity.as_str())
            .bind(entry.ingest_start_ts)
            .bind(entry.ingest_end_ts)
            .bind(entry.op_kind.clone())
            .bind(entry.row_count)
            .bind(entry.ids.clone())
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                SyncError::from_sqlx(e, StoreRole::Destination, |message| SyncError::Log {
                    entity: entry.entity.to_string(),
                    message,
                })
            })?;

        debug!("Recorded run log entry");
        Ok(())
    }

    /// Entries for `kind`, oldest first.
    pub async fn history(
        &self,
        store: &SqlStore,
        kind: EntityKind,
    ) -> Result<Vec<RunLogEntry>, SyncError> {
        let mut p = self.dialect.placeholders();
        let sql = format!(
            "SELECT ingest_start_ts, ingest_end_ts, op_kind, row_count, ids FROM {} \
             WHERE entity = {} ORDER BY ingest_start_ts, ingest_end_ts",
            self.table,
            p.next()
        );
        let log_err = |message: String| SyncError::Log {
            entity: kind.to_string(),
            message,
        };

        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_all(store.pool())
            .await
            .map_err(|e| SyncError::from_sqlx(e, store.role(), log_err))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let int = |name: &str| -> Result<i64, SyncError> {
                decode_value(row, name, ColumnType::BigInt)
                    .map_err(|e| log_err(e.to_string()))?
                    .as_int()
                    .ok_or_else(|| log_err(format!("NULL {}", name)))
            };
            let text = |name: &str| -> Result<String, SyncError> {
                Ok(decode_value(row, name, ColumnType::Text)
                    .map_err(|e| log_err(e.to_string()))?
                    .as_text()
                    .unwrap_or_default()
                    .to_string())
            };
            entries.push(RunLogEntry {
                entity: kind,
                ingest_start_ts: int("ingest_start_ts")?,
                ingest_end_ts: int("ingest_end_ts")?,
                op_kind: text("op_kind")?,
                row_count: int("row_count")?,
                ids: text("ids")?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_join_ids() {
        let logger = RunLogger::new(Dialect::Sqlite, None, "update_log", ", ");
        assert_eq!(logger.join_ids(&[10, 11, 12]), "10, 11, 12");
        assert_eq!(logger.join_ids(&[]), "");

        let piped = RunLogger::new(Dialect::Sqlite, None, "update_log", "|");
        assert_eq!(piped.join_ids(&[1, 2]), "1|2");
    }

    #[test]
    fn test_mysql_schema_is_single_statement() {
        let logger = RunLogger::new(Dialect::MySql, Some("analytical_model"), "update_log", ", ");
        let stmts = logger.schema_statements();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].contains("analytical_model.update_log"));
        assert!(stmts[0].contains("INDEX idx_update_log_entity"));
    }

    #[tokio::test]
    async fn test_record_and_history_roundtrip() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("log.db").display());
        let store = SqlStore::connect(&url, StoreRole::Destination, 2, Duration::from_secs(5))
            .await
            .unwrap();

        let logger = RunLogger::new(Dialect::Sqlite, None, "update_log", ", ");
        store.execute_statements(&logger.schema_statements()).await.unwrap();

        let entry = RunLogEntry {
            entity: EntityKind::Campaign,
            ingest_start_ts: 1_000,
            ingest_end_ts: 1_500,
            op_kind: "upsert".into(),
            row_count: 3,
            ids: logger.join_ids(&[10, 11, 12]),
        };
        let mut tx = store.begin().await.unwrap();
        logger.record(&mut tx, &entry).await.unwrap();
        tx.commit().await.unwrap();

        let history = logger.history(&store, EntityKind::Campaign).await.unwrap();
        assert_eq!(history, vec![entry]);
        assert!(logger.history(&store, EntityKind::Offer).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_transaction_leaves_no_entry() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("log.db").display());
        let store = SqlStore::connect(&url, StoreRole::Destination, 2, Duration::from_secs(5))
            .await
            .unwrap();
        let logger = RunLogger::new(Dialect::Sqlite, None, "update_log", ", ");
        store.execute_statements(&logger.schema_statements()).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let entry = RunLogEntry {
                entity: EntityKind::Tactic,
                ingest_start_ts: 1,
                ingest_end_ts: 2,
                op_kind: "upsert".into(),
                row_count: 1,
                ids: "20".into(),
            };
            logger.record(&mut tx, &entry).await.unwrap();
        }

        assert!(logger.history(&store, EntityKind::Tactic).await.unwrap().is_empty());
    }
}
