// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Refresh engine coordinator.
//!
//! The [`RefreshEngine`] ties the phases together:
//! - per entity: watermark → extract → merge + log (one destination commit)
//! - then: allowlist → valid-ID sets → cascade cleanup
//!
//! # Lifecycle
//!
//! ```text
//! Created → Connecting → Ready → Syncing → Validating → Cleaning → Ready
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use hierarchy_sync::{EngineState, RefreshEngine, SyncConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), hierarchy_sync::SyncError> {
//! let config: SyncConfig = serde_json::from_str(r#"{
//!     "source_url": "postgres://reader@campaign-app/staging",
//!     "dest_url": "postgres://writer@processing/heavy",
//!     "dest_schema": "analytical_model"
//! }"#).unwrap();
//!
//! let engine = RefreshEngine::connect(config).await?;
//! assert_eq!(engine.state(), EngineState::Ready);
//!
//! engine.ensure_schema().await?;
//! let report = engine.run().await;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod refresh;
mod run;
mod types;

pub use types::{CleanupPhase, EngineState, EntityReport, EntityStatus, RunReport};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

use crate::config::{AllowlistConfig, SyncConfig};
use crate::entity::registry::EntityRegistry;
use crate::entity::EntityKind;
use crate::error::SyncError;
use crate::storage::SqlStore;
use crate::sync::{ChangeExtractor, MergeWriter, RunLogger, WatermarkStore};
use crate::validation::{
    CascadeCleaner, HierarchyValidator, RootAllowlist, StaticAllowlist, TableAllowlist,
};

/// Source of "now" in epoch milliseconds, used for ingest-window stamps.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Wall-clock time in epoch milliseconds.
pub fn system_clock() -> Clock {
    Arc::new(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    })
}

/// Sequential batch refresh of the entity hierarchy.
///
/// One engine owns one source and one destination pool. Runs are not
/// meant to overlap; the host scheduler invokes [`run`](Self::run).
pub struct RefreshEngine {
    pub(super) config: SyncConfig,
    pub(super) registry: EntityRegistry,

    pub(super) source: SqlStore,
    pub(super) destination: SqlStore,

    pub(super) watermarks: WatermarkStore,
    pub(super) extractor: ChangeExtractor,
    pub(super) merger: MergeWriter,
    pub(super) run_log: RunLogger,

    pub(super) allowlist: Arc<dyn RootAllowlist>,
    pub(super) validator: HierarchyValidator,
    pub(super) cleaner: CascadeCleaner,

    pub(super) clock: Clock,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,
    pub(super) state_rx: watch::Receiver<EngineState>,
}

impl RefreshEngine {
    /// Build an engine over already-open stores.
    ///
    /// Validates the configuration and entity templates; no I/O happens here.
    pub fn from_stores(
        config: SyncConfig,
        source: SqlStore,
        destination: SqlStore,
    ) -> Result<Self, SyncError> {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let engine = Self::assemble(config, source, destination, state_tx, state_rx)?;
        engine.set_state(EngineState::Ready);
        Ok(engine)
    }

    pub(super) fn assemble(
        config: SyncConfig,
        source: SqlStore,
        destination: SqlStore,
        state: watch::Sender<EngineState>,
        state_rx: watch::Receiver<EngineState>,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        let registry = EntityRegistry::from_config(&config)?;
        let schema = config.dest_schema.clone();
        let dest_dialect = destination.dialect();

        let allowlist: Arc<dyn RootAllowlist> = match &config.allowlist {
            AllowlistConfig::Table { table, column } => Arc::new(TableAllowlist::new(
                destination.clone(),
                schema.as_deref(),
                table,
                column,
            )),
            AllowlistConfig::Static { ids } => Arc::new(StaticAllowlist::new(ids.iter().copied())),
        };

        let enabled: Vec<EntityKind> = registry.iter().map(|spec| spec.kind).collect();

        Ok(Self {
            watermarks: WatermarkStore::new(
                destination.clone(),
                schema.as_deref(),
                &config.log_table,
                config.epoch_floor_ms,
            ),
            extractor: ChangeExtractor::new(source.clone(), destination.clone()),
            merger: MergeWriter::new(dest_dialect, schema.clone(), config.merge_chunk_size),
            run_log: RunLogger::new(
                dest_dialect,
                schema.as_deref(),
                &config.log_table,
                &config.id_delimiter,
            ),
            allowlist,
            validator: HierarchyValidator::new(
                destination.clone(),
                schema.clone(),
                config.merge_chunk_size,
            ),
            cleaner: CascadeCleaner::new(destination.clone(), schema, config.merge_chunk_size)
                .with_entities(&enabled),
            clock: system_clock(),
            registry,
            source,
            destination,
            config,
            state,
            state_rx,
        })
    }

    /// Replace the configured allowlist.
    #[must_use]
    pub fn with_allowlist(mut self, allowlist: Arc<dyn RootAllowlist>) -> Self {
        self.allowlist = allowlist;
        self
    }

    /// Replace the wall clock (ingest-window stamps).
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Get current engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    pub(super) fn set_state(&self, state: EngineState) {
        let _ = self.state.send(state);
        crate::metrics::set_engine_state(&state.to_string());
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn source(&self) -> &SqlStore {
        &self.source
    }

    pub fn destination(&self) -> &SqlStore {
        &self.destination
    }

    pub(super) fn now(&self) -> i64 {
        (self.clock)()
    }
}
