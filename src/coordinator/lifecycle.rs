// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Engine lifecycle: connecting to both stores and preparing the destination.

use tokio::sync::watch;
use tracing::{error, info, instrument};

use crate::config::SyncConfig;
use crate::error::{StoreRole, SyncError};
use crate::storage::SqlStore;

use super::{EngineState, RefreshEngine};

impl RefreshEngine {
    /// Open source and destination pools, then build the engine.
    ///
    /// There is no retry: an unreachable store fails the call with a
    /// connectivity error and the scheduler decides when to try again.
    #[instrument(skip(config))]
    pub async fn connect(config: SyncConfig) -> Result<Self, SyncError> {
        config.validate()?;
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let _ = state_tx.send(EngineState::Connecting);
        crate::metrics::set_engine_state(&EngineState::Connecting.to_string());

        let source_url = config
            .source_url
            .as_deref()
            .ok_or_else(|| SyncError::Config("source_url is required".into()))?;
        let dest_url = config
            .dest_url
            .as_deref()
            .ok_or_else(|| SyncError::Config("dest_url is required".into()))?;

        let timeout = config.acquire_timeout();
        let source = SqlStore::connect(source_url, StoreRole::Source, config.max_connections, timeout)
            .await
            .inspect_err(|e| {
                error!(error = %e, "Source connection failed");
                crate::metrics::record_error("connect", e.kind().as_str());
            })?;
        let destination =
            SqlStore::connect(dest_url, StoreRole::Destination, config.max_connections, timeout)
                .await
                .inspect_err(|e| {
                    error!(error = %e, "Destination connection failed");
                    crate::metrics::record_error("connect", e.kind().as_str());
                })?;

        let engine = Self::assemble(config, source, destination, state_tx, state_rx)?;
        engine.set_state(EngineState::Ready);
        info!(entities = engine.registry.len(), "Refresh engine ready");
        Ok(engine)
    }

    /// Create the audit log and any missing entity tables.
    ///
    /// Existing tables are left alone; there is no migration.
    #[instrument(skip(self))]
    pub async fn ensure_schema(&self) -> Result<(), SyncError> {
        let dialect = self.destination.dialect();
        let schema = self.config.dest_schema.as_deref();

        let mut statements = self.run_log.schema_statements();
        statements.extend(
            self.registry
                .iter()
                .map(|spec| spec.create_table_sql(dialect, schema)),
        );

        self.destination.execute_statements(&statements).await?;
        info!(statements = statements.len(), log_table = %self.run_log.table(), "Destination schema ensured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_connect_requires_urls() {
        let result = RefreshEngine::connect(SyncConfig::default()).await;
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[tokio::test]
    async fn test_connect_and_ensure_schema_twice() {
        let dir = tempdir().unwrap();
        let config = SyncConfig {
            source_url: Some(format!("sqlite://{}?mode=rwc", dir.path().join("src.db").display())),
            dest_url: Some(format!("sqlite://{}?mode=rwc", dir.path().join("dst.db").display())),
            ..Default::default()
        };

        let engine = RefreshEngine::connect(config).await.unwrap();
        assert_eq!(engine.state(), EngineState::Ready);

        engine.ensure_schema().await.unwrap();
        engine.ensure_schema().await.unwrap();

        for table in ["update_log", "campaign", "tactic", "version", "offer", "link", "treatment"] {
            assert_eq!(engine.destination().count_rows(None, table).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_unreachable_destination_is_connectivity_failure() {
        let dir = tempdir().unwrap();
        let config = SyncConfig {
            source_url: Some(format!("sqlite://{}?mode=rwc", dir.path().join("src.db").display())),
            dest_url: Some(format!("sqlite://{}?mode=ro", dir.path().join("missing.db").display())),
            acquire_timeout_secs: 1,
            ..Default::default()
        };
        let err = RefreshEngine::connect(config).await.err().unwrap();
        assert!(err.is_connectivity());
    }
}
