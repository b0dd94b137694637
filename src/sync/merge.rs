// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Idempotent writes into destination tables.
//!
//! Rows go out as chunked multi-row INSERTs inside the caller's transaction,
//! so a batch is either fully visible after commit or not at all.

use sqlx::{Any, Transaction};
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::entity::registry::{EntitySpec, MergePolicy};
use crate::entity::{Row, Value};
use crate::error::{StoreRole, SyncError};
use crate::storage::{bind_value, qualify, Dialect};

/// Rows written and their keys in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub count: usize,
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct MergeWriter {
    dialect: Dialect,
    schema: Option<String>,
    chunk_size: usize,
}

impl MergeWriter {
    pub fn new(dialect: Dialect, schema: Option<String>, chunk_size: usize) -> Self {
        Self {
            dialect,
            schema,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write `rows` for `spec` according to its merge policy.
    ///
    /// Upserts collapse duplicate keys first (last values win) since a single
    /// statement may not touch the same key twice on every backend.
    #[instrument(skip(self, tx, spec, rows), fields(entity = %spec.kind, policy = spec.policy.op_kind()))]
    pub async fn apply(
        &self,
        tx: &mut Transaction<'_, Any>,
        spec: &EntitySpec,
        rows: Vec<Row>,
    ) -> Result<MergeResult, SyncError> {
        let key_index = spec.key_index();
        for row in &rows {
            key_of(spec, row, key_index)?;
        }

        let rows = match spec.policy {
            MergePolicy::Upsert => collapse_by_key(rows, key_index),
            MergePolicy::Append => rows,
        };
        if rows.is_empty() {
            return Ok(MergeResult::default());
        }

        let ids = rows
            .iter()
            .map(|row| key_of(spec, row, key_index))
            .collect::<Result<Vec<_>, _>>()?;

        let mut written = 0usize;
        for chunk in rows.chunks(self.chunk_size) {
            let sql = self.insert_sql(spec, chunk.len());
            let mut query = sqlx::query(&sql);
            for row in chunk {
                for (column, value) in spec.columns.iter().zip(&row.values) {
                    query = bind_value(query, value, column.ty);
                }
            }
            query.execute(&mut **tx).await.map_err(|e| {
                SyncError::from_sqlx(e, StoreRole::Destination, |message| SyncError::Merge {
                    entity: spec.kind.to_string(),
                    message,
                })
            })?;
            written += chunk.len();
            debug!(chunk = chunk.len(), written, "Merged chunk");
        }

        Ok(MergeResult { count: written, ids })
    }

    fn insert_sql(&self, spec: &EntitySpec, row_count: usize) -> String {
        let names = spec.column_names();
        let mut placeholders = self.dialect.placeholders();
        let tuples: Vec<String> = (0..row_count)
            .map(|_| format!("({})", placeholders.list(names.len())))
            .collect();

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            qualify(self.schema.as_deref(), spec.table),
            names.join(", "),
            tuples.join(", ")
        );

        if spec.policy == MergePolicy::Upsert {
            let updates: Vec<&str> = names.iter().copied().filter(|n| *n != spec.key).collect();
            sql.push(' ');
            sql.push_str(&self.dialect.upsert_clause(spec.key, &updates));
        }
        sql
    }
}

fn key_of(spec: &EntitySpec, row: &Row, key_index: usize) -> Result<i64, SyncError> {
    match row.get(key_index) {
        Some(Value::Int(id)) => Ok(*id),
        Some(Value::Null) | None => Err(SyncError::Merge {
            entity: spec.kind.to_string(),
            message: format!("row has NULL key '{}'", spec.key),
        }),
        Some(other) => Err(SyncError::Merge {
            entity: spec.kind.to_string(),
            message: format!("key '{}' is not an integer: {:?}", spec.key, other),
        }),
    }
}

/// Keep one row per key: the last occurrence's values at the first
/// occurrence's position. Rows without an integer key pass through.
pub fn collapse_by_key(rows: Vec<Row>, key_index: usize) -> Vec<Row> {
    let mut positions: HashMap<i64, usize> = HashMap::with_capacity(rows.len());
    let mut out: Vec<Row> = Vec::with_capacity(rows.len());

    for row in rows {
        match row.get(key_index).and_then(Value::as_int) {
            Some(key) => match positions.get(&key) {
                Some(&pos) => out[pos] = row,
                None => {
                    positions.insert(key, out.len());
                    out.push(row);
                }
            },
            None => out.push(row),
        }
    }
    out
}
