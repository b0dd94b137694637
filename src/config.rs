// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the refresh engine.
//!
//! # Example
//!
//! ```
//! use hierarchy_sync::{EntityKind, MergePolicy, SyncConfig};
//!
//! // Minimal config (uses defaults)
//! let config = SyncConfig::default();
//! assert_eq!(config.log_table, "update_log");
//! assert_eq!(config.epoch_floor_ms, 946_684_800_000); // 2000-01-01
//!
//! // Typical deployment config, e.g. loaded from a JSON file
//! let config: SyncConfig = serde_json::from_str(r#"{
//!     "source_url": "postgres://reader@campaign-app/staging",
//!     "dest_url": "postgres://writer@processing/heavy",
//!     "dest_schema": "analytical_model",
//!     "entities": {
//!         "version": { "excluded_parent_ids": [1267, 1271] },
//!         "link": { "merge_policy": "upsert" }
//!     }
//! }"#).unwrap();
//! assert_eq!(
//!     config.entity(EntityKind::Link).merge_policy,
//!     Some(MergePolicy::Upsert)
//! );
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::entity::registry::MergePolicy;
use crate::entity::EntityKind;
use crate::error::SyncError;

/// Configuration for the refresh engine.
///
/// All fields have defaults. At minimum set `source_url` and `dest_url`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Operational store connection string (read-only use)
    #[serde(default)]
    pub source_url: Option<String>,

    /// Analytical store connection string
    #[serde(default)]
    pub dest_url: Option<String>,

    /// Schema qualifying every destination table (e.g. "analytical_model")
    #[serde(default)]
    pub dest_schema: Option<String>,

    /// Audit log table; also the watermark source.
    ///
    /// The table must have the columns `entity`, `ingest_start_ts`,
    /// `ingest_end_ts`, `op_kind`, `row_count` and `ids`, with both
    /// timestamps as epoch millis. A legacy log keyed by `"table"`, `"type"`
    /// and `"count"` with timestamp columns cannot be pointed at directly;
    /// reading it fails as [`ErrorKind::StoreUnavailable`](crate::ErrorKind).
    #[serde(default = "default_log_table")]
    pub log_table: String,

    /// Where validated root (campaign) IDs come from
    #[serde(default)]
    pub allowlist: AllowlistConfig,

    /// Watermark used when an entity has never been synced (epoch millis)
    #[serde(default = "default_epoch_floor_ms")]
    pub epoch_floor_ms: i64,

    /// Separator for the affected-IDs column of the audit log
    #[serde(default = "default_id_delimiter")]
    pub id_delimiter: String,

    /// Rows per multi-row INSERT statement
    #[serde(default = "default_merge_chunk_size")]
    pub merge_chunk_size: usize,

    /// Pool size per store
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Named literals bound into extraction queries. Overlays the built-in
    /// defaults (see [`default_literals`]).
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,

    /// Per-entity overrides
    #[serde(default)]
    pub entities: BTreeMap<EntityKind, EntityOverrides>,

    /// Run the validation/cleanup pass after syncing
    #[serde(default = "default_true")]
    pub cleanup_enabled: bool,
}

/// Source of the ValidatedRootSet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AllowlistConfig {
    /// A destination table or view with one ID column
    Table {
        #[serde(default = "default_allowlist_table")]
        table: String,
        #[serde(default = "default_allowlist_column")]
        column: String,
    },
    /// IDs supplied directly in configuration
    Static { ids: Vec<i64> },
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self::Table {
            table: default_allowlist_table(),
            column: default_allowlist_column(),
        }
    }
}

/// Overrides for a single entity.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityOverrides {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Replace the registry's merge policy
    #[serde(default)]
    pub merge_policy: Option<MergePolicy>,
    /// Replace the registry's extraction query template. Tokens are
    /// `{since}`, `{param:NAME}` and `{exclusion}`; write `{{` and `}}` for
    /// literal braces.
    #[serde(default)]
    pub source_query: Option<String>,
    /// Ancestor IDs whose descendants are never extracted. Empty unless
    /// configured; the `refresh_once` demo shows a full version denylist.
    #[serde(default)]
    pub excluded_parent_ids: Option<Vec<i64>>,
}

impl Default for EntityOverrides {
    fn default() -> Self {
        Self {
            enabled: true,
            merge_policy: None,
            source_query: None,
            excluded_parent_ids: None,
        }
    }
}

fn default_log_table() -> String { "update_log".to_string() }
fn default_allowlist_table() -> String { "validated_campaigns".to_string() }
fn default_allowlist_column() -> String { "id_campaign".to_string() }
fn default_epoch_floor_ms() -> i64 { 946_684_800_000 } // 2000-01-01T00:00:00Z
fn default_id_delimiter() -> String { ", ".to_string() }
fn default_merge_chunk_size() -> usize { 500 }
fn default_max_connections() -> u32 { 4 }
fn default_acquire_timeout_secs() -> u64 { 10 }
fn default_true() -> bool { true }

/// Literal values the built-in extraction queries expect.
pub fn default_literals() -> BTreeMap<String, String> {
    [
        ("campaign_primary_objective", ""),
        ("tactic_audience_prefix", "Members with upcoming arrivals at the "),
        ("tactic_objective", ""),
        ("tactic_status", "In-Market"),
        ("tactic_setup_type", "Batch"),
        ("tactic_type", "Marketing"),
        ("tactic_publisher", "PCM"),
        ("version_default_language", "English Global Default"),
        ("offer_hurdle_value", ""),
        ("offer_hurdle_type", ""),
        ("offer_promo_code", ""),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            dest_url: None,
            dest_schema: None,
            log_table: default_log_table(),
            allowlist: AllowlistConfig::default(),
            epoch_floor_ms: default_epoch_floor_ms(),
            id_delimiter: default_id_delimiter(),
            merge_chunk_size: default_merge_chunk_size(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            defaults: BTreeMap::new(),
            entities: BTreeMap::new(),
            cleanup_enabled: true,
        }
    }
}

impl SyncConfig {
    /// Overrides for `kind`, or the defaults when none are configured.
    pub fn entity(&self, kind: EntityKind) -> EntityOverrides {
        self.entities.get(&kind).cloned().unwrap_or_default()
    }

    /// Built-in literals overlaid with configured ones.
    pub fn literals(&self) -> BTreeMap<String, String> {
        let mut literals = default_literals();
        literals.extend(self.defaults.clone());
        literals
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Reject values that would produce broken SQL or a stalled engine.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.merge_chunk_size == 0 {
            return Err(SyncError::Config("merge_chunk_size must be > 0".into()));
        }
        if self.max_connections == 0 {
            return Err(SyncError::Config("max_connections must be > 0".into()));
        }
        if self.id_delimiter.is_empty() {
            return Err(SyncError::Config("id_delimiter must not be empty".into()));
        }
        check_identifier("log_table", &self.log_table)?;
        if let Some(schema) = &self.dest_schema {
            check_identifier("dest_schema", schema)?;
        }
        if let AllowlistConfig::Table { table, column } = &self.allowlist {
            check_identifier("allowlist.table", table)?;
            check_identifier("allowlist.column", column)?;
        }
        Ok(())
    }
}

/// Table and column names are formatted into SQL, so only plain identifiers
/// (optionally dotted) are accepted.
fn check_identifier(field: &str, value: &str) -> Result<(), SyncError> {
    let valid = !value.is_empty()
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    if valid {
        Ok(())
    } else {
        Err(SyncError::Config(format!("{} '{}' is not a plain identifier", field, value)))
    }
}
