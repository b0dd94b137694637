// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL dialect differences behind the sqlx `Any` driver.
//!
//! The `Any` driver passes SQL through untouched, so placeholder syntax and
//! upsert clauses have to be rendered per backend:
//!
//! | Backend  | Placeholder | Upsert clause                                 |
//! |----------|-------------|-----------------------------------------------|
//! | SQLite   | `?`         | `ON CONFLICT (key) DO UPDATE SET c = excluded.c` |
//! | Postgres | `$1, $2…`   | `ON CONFLICT (key) DO UPDATE SET c = excluded.c` |
//! | MySQL    | `?`         | `ON DUPLICATE KEY UPDATE c = VALUES(c)`        |

use crate::entity::ColumnType;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Detect the dialect from a connection string.
    pub fn from_url(url: &str) -> Result<Self, SyncError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(SyncError::Config(format!(
                "unsupported connection scheme '{}'",
                scheme
            ))),
        }
    }

    pub fn placeholders(self) -> Placeholders {
        Placeholders { dialect: self, next: 1 }
    }

    /// Column type used when creating destination tables.
    pub fn column_sql(self, ty: ColumnType) -> &'static str {
        match (self, ty) {
            (_, ColumnType::BigInt) => "BIGINT",
            (_, ColumnType::Text) => "TEXT",
            (Self::Sqlite, ColumnType::Double) => "REAL",
            (Self::MySql, ColumnType::Double) => "DOUBLE",
            (Self::Postgres, ColumnType::Double) => "DOUBLE PRECISION",
        }
    }

    /// Short text column, indexable on MySQL.
    pub fn short_text_sql(self) -> &'static str {
        match self {
            Self::Sqlite | Self::Postgres => "TEXT",
            Self::MySql => "VARCHAR(64)",
        }
    }

    /// Conflict clause appended to a multi-row INSERT.
    pub fn upsert_clause(self, key: &str, update_columns: &[&str]) -> String {
        match self {
            Self::Sqlite | Self::Postgres => {
                if update_columns.is_empty() {
                    return format!("ON CONFLICT ({}) DO NOTHING", key);
                }
                let sets: Vec<String> = update_columns
                    .iter()
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect();
                format!("ON CONFLICT ({}) DO UPDATE SET {}", key, sets.join(", "))
            }
            Self::MySql => {
                // MySQL has no DO NOTHING; a self-assignment is a no-op update
                let cols: Vec<&str> = if update_columns.is_empty() {
                    vec![key]
                } else {
                    update_columns.to_vec()
                };
                let sets: Vec<String> = cols.iter().map(|c| format!("{c} = VALUES({c})")).collect();
                format!("ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
        }
    }
}

/// Hands out placeholders in statement order.
#[derive(Debug)]
pub struct Placeholders {
    dialect: Dialect,
    next: usize,
}

impl Placeholders {
    pub fn next(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        match self.dialect {
            Dialect::Postgres => format!("${}", n),
            Dialect::Sqlite | Dialect::MySql => "?".to_string(),
        }
    }

    /// `count` placeholders joined with `, `.
    pub fn list(&mut self, count: usize) -> String {
        (0..count).map(|_| self.next()).collect::<Vec<_>>().join(", ")
    }
}

/// Prefix a table with its schema when one is configured.
pub fn qualify(schema: Option<&str>, table: &str) -> String {
    match schema {
        Some(s) if !s.is_empty() => format!("{}.{}", s, table),
        _ => table.to_string(),
    }
}
