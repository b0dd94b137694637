// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Connection pools and value codecs over the sqlx `Any` driver.
//!
//! ## sqlx Any Driver Quirks
//!
//! - The driver must be installed at runtime before the first connect.
//! - MySQL TEXT columns may come back as bytes, so text decoding falls back
//!   to `Vec<u8>` and UTF-8 conversion.
//! - Postgres INT4 columns do not decode as `i64`, so integer decoding walks
//!   down the widths.
//! - NULL binds must carry a concrete type, taken from the column declaration.

use sqlx::any::{AnyArguments, AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

use super::dialect::{qualify, Dialect};
use crate::entity::{ColumnType, Value};
use crate::error::{StoreRole, SyncError};

pub type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// A pool plus the facts needed to render SQL for it.
#[derive(Clone, Debug)]
pub struct SqlStore {
    pool: AnyPool,
    dialect: Dialect,
    role: StoreRole,
}

impl SqlStore {
    /// Connect without retrying: an unreachable store is reported immediately
    /// and re-invocation by the scheduler is the retry mechanism.
    pub async fn connect(
        connection_string: &str,
        role: StoreRole,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, SyncError> {
        install_drivers();
        let dialect = Dialect::from_url(connection_string)?;

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(Duration::from_secs(300))
            .connect(connection_string)
            .await
            .map_err(|e| SyncError::Connectivity { store: role, message: e.to_string() })?;

        let store = Self { pool, dialect, role };
        if dialect == Dialect::Sqlite {
            store.enable_wal_mode().await?;
        }

        info!(store = %role, dialect = ?dialect, "Connected");
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn role(&self) -> StoreRole {
        self.role
    }

    /// WAL mode lets readers proceed while the merge transaction is open.
    async fn enable_wal_mode(&self) -> Result<(), SyncError> {
        for pragma in ["PRAGMA journal_mode = WAL", "PRAGMA synchronous = NORMAL"] {
            sqlx::query(pragma)
                .execute(&self.pool)
                .await
                .map_err(|e| self.connectivity(e))?;
        }
        Ok(())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Any>, SyncError> {
        self.pool.begin().await.map_err(|e| self.connectivity(e))
    }

    /// Run schema statements one by one (SQLite rejects multi-statement strings).
    pub async fn execute_statements(&self, statements: &[String]) -> Result<(), SyncError> {
        for stmt in statements {
            debug!(sql = %stmt, "Executing schema statement");
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    SyncError::from_sqlx(e, self.role, |m| {
                        SyncError::Config(format!("schema statement failed: {}", m))
                    })
                })?;
        }
        Ok(())
    }

    /// Row count of a table, for reporting.
    pub async fn count_rows(&self, schema: Option<&str>, table: &str) -> Result<u64, SyncError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {}", qualify(schema, table));
        let row = sqlx::query(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                SyncError::from_sqlx(e, self.role, |m| SyncError::Cleanup {
                    table: table.to_string(),
                    message: m,
                })
            })?;
        let count: i64 = row.try_get("cnt").map_err(|e| SyncError::Cleanup {
            table: table.to_string(),
            message: e.to_string(),
        })?;
        Ok(count as u64)
    }

    fn connectivity(&self, err: sqlx::Error) -> SyncError {
        SyncError::Connectivity { store: self.role, message: err.to_string() }
    }
}

/// Bind one value; NULLs take their type from the column declaration.
pub fn bind_value<'q>(query: AnyQuery<'q>, value: &Value, ty: ColumnType) -> AnyQuery<'q> {
    match value {
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(s) => query.bind(s.clone()),
        Value::Null => match ty {
            ColumnType::BigInt => query.bind(None::<i64>),
            ColumnType::Double => query.bind(None::<f64>),
            ColumnType::Text => query.bind(None::<String>),
        },
    }
}

/// Decode a named column into a [`Value`] of the declared type.
pub fn decode_value(row: &AnyRow, name: &str, ty: ColumnType) -> Result<Value, sqlx::Error> {
    match ty {
        ColumnType::BigInt => decode_int(row, name).map(Value::from),
        ColumnType::Double => {
            if let Ok(v) = row.try_get::<Option<f64>, _>(name) {
                return Ok(v.into());
            }
            if let Ok(v) = row.try_get::<Option<f32>, _>(name) {
                return Ok(v.map(f64::from).into());
            }
            decode_int(row, name).map(|v| v.map(|i| i as f64).into())
        }
        ColumnType::Text => {
            if let Ok(v) = row.try_get::<Option<String>, _>(name) {
                return Ok(v.into());
            }
            // MySQL LONGTEXT/TEXT arrives as BLOB through Any
            if let Ok(bytes) = row.try_get::<Option<Vec<u8>>, _>(name) {
                return match bytes {
                    Some(b) => String::from_utf8(b)
                        .map(Value::Text)
                        .map_err(|e| sqlx::Error::Decode(Box::new(e))),
                    None => Ok(Value::Null),
                };
            }
            // SQLite is dynamically typed: a TEXT column can still hold a number
            if let Ok(v) = decode_int(row, name) {
                return Ok(v.map(|i| i.to_string()).into());
            }
            row.try_get::<Option<f64>, _>(name).map(|v| v.map(|f| f.to_string()).into())
        }
    }
}

fn decode_int(row: &AnyRow, name: &str) -> Result<Option<i64>, sqlx::Error> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(name) {
        return Ok(v);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(name) {
        return Ok(v.map(i64::from));
    }
    row.try_get::<Option<i16>, _>(name).map(|v| v.map(i64::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn sqlite_store(dir: &std::path::Path) -> SqlStore {
        let url = format!("sqlite://{}?mode=rwc", dir.join("codec.db").display());
        SqlStore::connect(&url, StoreRole::Destination, 2, Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_scheme() {
        let result = SqlStore::connect(
            "oracle://nowhere",
            StoreRole::Source,
            1,
            Duration::from_millis(100),
        )
        .await;
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_sqlite_is_connectivity_failure() {
        // mode=ro on a missing file cannot be opened
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=ro", dir.path().join("missing.db").display());
        let result =
            SqlStore::connect(&url, StoreRole::Source, 1, Duration::from_millis(500)).await;
        assert!(result.unwrap_err().is_connectivity());
    }

    #[tokio::test]
    async fn test_bind_and_decode_each_type() {
        let dir = tempdir().unwrap();
        let store = sqlite_store(dir.path()).await;
        store
            .execute_statements(&["CREATE TABLE codec (i BIGINT, d REAL, t TEXT)".to_string()])
            .await
            .unwrap();

        let rows = [
            (Value::Int(7), Value::Float(2.5), Value::from("seven")),
            (Value::Null, Value::Null, Value::Null),
        ];
        for (i, d, t) in &rows {
            let q = sqlx::query("INSERT INTO codec (i, d, t) VALUES (?, ?, ?)");
            let q = bind_value(q, i, ColumnType::BigInt);
            let q = bind_value(q, d, ColumnType::Double);
            let q = bind_value(q, t, ColumnType::Text);
            q.execute(store.pool()).await.unwrap();
        }

        let fetched = sqlx::query("SELECT i, d, t FROM codec ORDER BY i IS NULL, i")
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(decode_value(&fetched[0], "i", ColumnType::BigInt).unwrap(), Value::Int(7));
        assert_eq!(decode_value(&fetched[0], "d", ColumnType::Double).unwrap(), Value::Float(2.5));
        assert_eq!(decode_value(&fetched[0], "t", ColumnType::Text).unwrap(), Value::from("seven"));
        assert_eq!(decode_value(&fetched[1], "i", ColumnType::BigInt).unwrap(), Value::Null);
        assert_eq!(decode_value(&fetched[1], "t", ColumnType::Text).unwrap(), Value::Null);

        assert_eq!(store.count_rows(None, "codec").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_text_column_holding_integer() {
        let dir = tempdir().unwrap();
        let store = sqlite_store(dir.path()).await;
        let row = sqlx::query("SELECT 42 AS t, 3 AS d")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(decode_value(&row, "t", ColumnType::Text).unwrap(), Value::from("42"));
        assert_eq!(decode_value(&row, "d", ColumnType::Double).unwrap(), Value::Float(3.0));
    }
}
