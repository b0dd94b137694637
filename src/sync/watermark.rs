// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! High watermark per entity, derived from the audit log.

use tracing::{debug, instrument};

use crate::entity::{ColumnType, EntityKind};
use crate::error::SyncError;
use crate::storage::{decode_value, qualify, SqlStore};

/// Reads `max(ingest_start_ts)` for an entity from the audit log.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    store: SqlStore,
    log_table: String,
    epoch_floor_ms: i64,
}

impl WatermarkStore {
    pub fn new(store: SqlStore, schema: Option<&str>, log_table: &str, epoch_floor_ms: i64) -> Self {
        Self {
            store,
            log_table: qualify(schema, log_table),
            epoch_floor_ms,
        }
    }

    pub fn epoch_floor(&self) -> i64 {
        self.epoch_floor_ms
    }

    /// Exclusive lower bound for the next extraction of `kind`.
    ///
    /// Returns the epoch floor when the entity has never been logged. A log
    /// that cannot be read is an error, never "no prior runs".
    #[instrument(skip(self), fields(entity = %kind))]
    pub async fn high_watermark(&self, kind: EntityKind) -> Result<i64, SyncError> {
        let mut placeholders = self.store.dialect().placeholders();
        let sql = format!(
            "SELECT MAX(ingest_start_ts) AS hwm FROM {} WHERE entity = {}",
            self.log_table,
            placeholders.next()
        );

        let unavailable = |message: String| SyncError::StoreUnavailable {
            entity: kind.to_string(),
            message,
        };

        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .fetch_one(self.store.pool())
            .await
            .map_err(|e| SyncError::from_sqlx(e, self.store.role(), unavailable))?;

        let hwm = decode_value(&row, "hwm", ColumnType::BigInt)
            .map_err(|e| unavailable(e.to_string()))?
            .as_int();

        let watermark = hwm.unwrap_or(self.epoch_floor_ms);
        debug!(watermark, logged = hwm.is_some(), "Resolved watermark");
        Ok(watermark)
    }
}
