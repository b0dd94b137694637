// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Hierarchy Sync
//!
//! Incremental one-way refresh of a campaign entity hierarchy from an
//! operational store into an analytical store, followed by an
//! allowlist-driven cascade cleanup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Per entity (hierarchy order)                │
//! │  • Watermark = max(ingest_start_ts) from the audit log      │
//! │  • Extract rows modified after the watermark                │
//! │  • Upsert or append + audit entry in ONE destination commit │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Validation                           │
//! │  • Allowlisted campaign IDs                                 │
//! │  • Valid tactics → versions → offers via destination FKs    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Cascade cleanup                        │
//! │  • Delete rows outside their valid set, table by table      │
//! │  • Empty valid set ⇒ table skipped                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hierarchy_sync::{RefreshEngine, SyncConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SyncConfig {
//!         source_url: Some("postgres://reader@campaign-app/staging".into()),
//!         dest_url: Some("postgres://writer@processing/heavy".into()),
//!         dest_schema: Some("analytical_model".into()),
//!         ..Default::default()
//!     };
//!
//!     let engine = RefreshEngine::connect(config).await.expect("Failed to connect");
//!     engine.ensure_schema().await.expect("Failed to prepare destination");
//!
//!     let report = engine.run().await;
//!     println!("{}", report);
//! }
//! ```
//!
//! ## Audit log
//!
//! Every commit appends one row to the log table (`update_log` by default)
//! with the columns `entity`, `ingest_start_ts`, `ingest_end_ts`, `op_kind`,
//! `row_count` and `ids`. Both timestamps are epoch millis. The layout is
//! fixed: an older log keyed by `"table"`, `"type"` and `"count"` with SQL
//! timestamp columns is not read or migrated, and configuring it as
//! `log_table` fails the watermark read with
//! [`ErrorKind::StoreUnavailable`]. Start such a deployment on a fresh log
//! table, or seed one entry per entity with the last known start time.
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`RefreshEngine`] orchestrating every phase
//! - [`entity`]: entity kinds, column declarations, registry and query templates
//! - [`sync`]: watermark, extraction, merge and audit log
//! - [`validation`]: allowlist, valid-ID sets and cascade cleanup
//! - [`storage`]: sqlx pools and SQL dialect differences

pub mod config;
pub mod coordinator;
pub mod entity;
pub mod error;
pub mod metrics;
pub mod storage;
pub mod sync;
pub mod validation;

pub use config::{AllowlistConfig, EntityOverrides, SyncConfig};
pub use coordinator::{
    system_clock, CleanupPhase, Clock, EngineState, EntityReport, EntityStatus, RefreshEngine,
    RunReport,
};
pub use entity::registry::{EntityRegistry, EntitySpec, MergePolicy, Origin};
pub use entity::{EntityKind, Row, Value};
pub use error::{ErrorKind, StoreRole, SyncError};
pub use storage::{Dialect, SqlStore};
pub use sync::{MergeResult, RunLogEntry};
pub use validation::{
    CleanupReport, RootAllowlist, StaticAllowlist, TableAllowlist, TableOutcome, ValidSets,
};
