// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sources of validated root (campaign) IDs.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::entity::ColumnType;
use crate::error::SyncError;
use crate::storage::{decode_value, qualify, SqlStore};

/// The externally curated set of campaign IDs cleanup trusts.
#[async_trait]
pub trait RootAllowlist: Send + Sync {
    async fn allowed_roots(&self) -> Result<BTreeSet<i64>, SyncError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// One ID column of a destination table or view.
#[derive(Debug, Clone)]
pub struct TableAllowlist {
    store: SqlStore,
    table: String,
    column: String,
}

impl TableAllowlist {
    pub fn new(store: SqlStore, schema: Option<&str>, table: &str, column: &str) -> Self {
        Self {
            store,
            table: qualify(schema, table),
            column: column.to_string(),
        }
    }
}

#[async_trait]
impl RootAllowlist for TableAllowlist {
    async fn allowed_roots(&self) -> Result<BTreeSet<i64>, SyncError> {
        let sql = format!(
            "SELECT DISTINCT {col} AS root_id FROM {table} WHERE {col} IS NOT NULL",
            col = self.column,
            table = self.table
        );
        let cleanup_err = |message: String| SyncError::Cleanup {
            table: self.table.clone(),
            message,
        };

        let rows = sqlx::query(&sql)
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| SyncError::from_sqlx(e, self.store.role(), cleanup_err))?;

        let mut ids = BTreeSet::new();
        for row in &rows {
            let value = decode_value(row, "root_id", ColumnType::BigInt)
                .map_err(|e| cleanup_err(e.to_string()))?;
            if let Some(id) = value.as_int() {
                ids.insert(id);
            }
        }
        Ok(ids)
    }

    fn describe(&self) -> String {
        format!("{}.{}", self.table, self.column)
    }
}

/// IDs fixed in configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticAllowlist {
    ids: BTreeSet<i64>,
}

impl StaticAllowlist {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self { ids: ids.into_iter().collect() }
    }
}

#[async_trait]
impl RootAllowlist for StaticAllowlist {
    async fn allowed_roots(&self) -> Result<BTreeSet<i64>, SyncError> {
        Ok(self.ids.clone())
    }

    fn describe(&self) -> String {
        format!("static({} ids)", self.ids.len())
    }
}
