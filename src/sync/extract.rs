// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Change extraction: rows modified after a watermark, shaped for the
//! destination.
//!
//! The stream is lazy and not restartable. A failed extraction is retried by
//! rendering a fresh plan with the same watermark.

use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use sqlx::any::AnyRow;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use crate::entity::registry::{EntitySpec, Origin};
use crate::entity::template::{self, RenderedQuery, TemplateContext};
use crate::entity::{ColumnType, Row, Value};
use crate::error::SyncError;
use crate::storage::{bind_value, decode_value, SqlStore};

/// A rendered extraction for one entity and watermark.
#[derive(Debug, Clone)]
pub struct ExtractionPlan {
    pub since: i64,
    pub query: RenderedQuery,
}

/// Runs extraction templates against the store each entity reads from.
#[derive(Debug, Clone)]
pub struct ChangeExtractor {
    source: SqlStore,
    destination: SqlStore,
}

impl ChangeExtractor {
    pub fn new(source: SqlStore, destination: SqlStore) -> Self {
        Self { source, destination }
    }

    fn store_for(&self, spec: &EntitySpec) -> &SqlStore {
        match spec.origin {
            Origin::Source => &self.source,
            Origin::Destination => &self.destination,
        }
    }

    /// Render the entity's template for `since`.
    pub fn plan(
        &self,
        spec: &EntitySpec,
        params: &BTreeMap<String, String>,
        since: i64,
    ) -> Result<ExtractionPlan, SyncError> {
        let ctx = TemplateContext {
            since,
            params,
            exclusion: spec
                .exclusion_column
                .map(|column| (column, spec.excluded_ids.as_slice())),
        };
        let query = template::render(&spec.query, self.store_for(spec).dialect(), &ctx)?;
        debug!(entity = %spec.kind, binds = query.binds.len(), "Rendered extraction query");
        Ok(ExtractionPlan { since, query })
    }

    /// Stream rows for a plan in source order.
    pub fn extract<'a>(
        &'a self,
        spec: &'a EntitySpec,
        plan: &'a ExtractionPlan,
    ) -> BoxStream<'a, Result<Row, SyncError>> {
        let store = self.store_for(spec);
        let role = store.role();

        let mut query = sqlx::query(&plan.query.sql);
        for value in &plan.query.binds {
            query = bind_value(query, value, bind_type(value));
        }

        query
            .fetch(store.pool())
            .map(move |result| {
                let row = result.map_err(|e| {
                    SyncError::from_sqlx(e, role, |message| SyncError::Extraction {
                        entity: spec.kind.to_string(),
                        message,
                    })
                })?;
                decode_row(spec, &row)
            })
            .boxed()
    }

    /// Drain the stream for `since` into memory.
    #[instrument(skip(self, spec, params), fields(entity = %spec.kind))]
    pub async fn extract_all(
        &self,
        spec: &EntitySpec,
        params: &BTreeMap<String, String>,
        since: i64,
    ) -> Result<Vec<Row>, SyncError> {
        let plan = self.plan(spec, params, since)?;
        let rows: Vec<Row> = self.extract(spec, &plan).try_collect().await?;
        debug!(rows = rows.len(), "Extraction complete");
        Ok(rows)
    }
}

fn bind_type(value: &Value) -> ColumnType {
    match value {
        Value::Int(_) => ColumnType::BigInt,
        Value::Float(_) => ColumnType::Double,
        Value::Text(_) | Value::Null => ColumnType::Text,
    }
}

/// Decode by the static column list, then fill derived columns.
fn decode_row(spec: &EntitySpec, row: &AnyRow) -> Result<Row, SyncError> {
    let mut values = Vec::with_capacity(spec.columns.len());
    for column in spec.columns {
        if column.derive.is_some() {
            values.push(Value::Null);
            continue;
        }
        let value = decode_value(row, column.name, column.ty).map_err(|e| SyncError::Extraction {
            entity: spec.kind.to_string(),
            message: format!("column '{}': {}", column.name, e),
        })?;
        values.push(value);
    }

    for (idx, column) in spec.columns.iter().enumerate() {
        if let Some(derivation) = column.derive {
            let derived = derivation.apply(spec.columns, &values);
            values[idx] = derived;
        }
    }

    Ok(Row::new(values))
}
