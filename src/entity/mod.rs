// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity kinds, column declarations and row values.
//!
//! The hierarchy is strictly layered:
//!
//! ```text
//! Campaign ─▶ Tactic ─▶ Version ─┬▶ Offer
//!                                ├▶ Link
//!                                └▶ Treatment
//! ```
//!
//! Column lists are declared statically per entity (see [`registry`]), so a
//! [`Row`] is just a vector of [`Value`]s aligned with those declarations.

pub mod registry;
pub mod template;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::SyncError;

/// One synchronized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Campaign,
    Tactic,
    Version,
    Offer,
    Link,
    Treatment,
}

impl EntityKind {
    /// All kinds in hierarchy order (parents before children).
    pub const ALL: [EntityKind; 6] = [
        Self::Campaign,
        Self::Tactic,
        Self::Version,
        Self::Offer,
        Self::Link,
        Self::Treatment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Campaign => "campaign",
            Self::Tactic => "tactic",
            Self::Version => "version",
            Self::Offer => "offer",
            Self::Link => "link",
            Self::Treatment => "treatment",
        }
    }

    /// Parent in the hierarchy. `None` for the root.
    pub fn parent(&self) -> Option<EntityKind> {
        match self {
            Self::Campaign => None,
            Self::Tactic => Some(Self::Campaign),
            Self::Version => Some(Self::Tactic),
            Self::Offer | Self::Link | Self::Treatment => Some(Self::Version),
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SyncError::Config(format!("unknown entity '{}'", s)))
    }
}

/// Storage type of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Double,
    /// Free text; dates travel as ISO-8601 text.
    Text,
}

/// A value computed in Rust after decoding rather than read from the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Host portion of a URL held in another column of the same row.
    UrlDomain { from: &'static str },
}

impl Derivation {
    pub fn apply(&self, columns: &[Column], values: &[Value]) -> Value {
        match self {
            Derivation::UrlDomain { from } => columns
                .iter()
                .position(|c| c.name == *from)
                .and_then(|idx| values.get(idx))
                .and_then(Value::as_text)
                .map(|url| Value::Text(url_domain(url).to_string()))
                .unwrap_or(Value::Null),
        }
    }
}

/// Text between the scheme separator (if any) and the first `/`.
pub fn url_domain(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    rest.split('/').next().unwrap_or(rest)
}

/// Static description of one destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub derive: Option<Derivation>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, derive: None }
    }

    pub const fn derived(name: &'static str, ty: ColumnType, derive: Derivation) -> Self {
        Self { name, ty, derive: Some(derive) }
    }
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One destination-shaped record, aligned with its entity's column list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_parents() {
        assert_eq!(EntityKind::Campaign.parent(), None);
        assert_eq!(EntityKind::Tactic.parent(), Some(EntityKind::Campaign));
        assert_eq!(EntityKind::Treatment.parent(), Some(EntityKind::Version));
        assert_eq!(EntityKind::Link.parent(), Some(EntityKind::Version));
    }

    #[test]
    fn test_all_is_parent_first() {
        for (idx, kind) in EntityKind::ALL.iter().enumerate() {
            if let Some(parent) = kind.parent() {
                let parent_idx = EntityKind::ALL.iter().position(|k| *k == parent).unwrap();
                assert!(parent_idx < idx, "{} listed before its parent", kind);
            }
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Version".parse::<EntityKind>().unwrap(), EntityKind::Version);
        assert_eq!(" offer ".parse::<EntityKind>().unwrap(), EntityKind::Offer);
        assert!("placement".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_url_domain() {
        assert_eq!(url_domain("https://www.example.com/offers/spring"), "www.example.com");
        assert_eq!(url_domain("example.com/a/b"), "example.com");
        assert_eq!(url_domain("example.com"), "example.com");
        assert_eq!(url_domain(""), "");
    }

    #[test]
    fn test_derivation_reads_sibling_column() {
        let columns = [
            Column::new("base_url", ColumnType::Text),
            Column::derived("domain", ColumnType::Text, Derivation::UrlDomain { from: "base_url" }),
        ];
        let values = vec![Value::from("http://shop.test/x"), Value::Null];
        let derived = columns[1].derive.unwrap().apply(&columns, &values);
        assert_eq!(derived, Value::from("shop.test"));

        let missing = vec![Value::Null, Value::Null];
        assert_eq!(columns[1].derive.unwrap().apply(&columns, &missing), Value::Null);
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(Some(5i64)), Value::Int(5));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from("x").as_text(), Some("x"));
        assert!(Value::Null.is_null());
    }
}
