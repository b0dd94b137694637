// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-entity sync: watermark → extract → merge → log.

use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::entity::registry::EntitySpec;
use crate::entity::EntityKind;
use crate::error::{StoreRole, SyncError};
use crate::metrics;
use crate::sync::RunLogEntry;

use super::{EngineState, EntityReport, EntityStatus, RefreshEngine};

impl RefreshEngine {
    /// Sync one entity.
    ///
    /// Merge and log commit together or not at all. On error nothing is
    /// visible in the destination and the watermark is unchanged, so the next
    /// call re-extracts the same window.
    #[instrument(skip(self), fields(entity = %kind))]
    pub async fn sync_entity(&self, kind: EntityKind) -> Result<EntityReport, SyncError> {
        let spec = self
            .registry
            .get(kind)
            .ok_or_else(|| SyncError::Config(format!("entity '{}' is disabled", kind)))?;

        let started = Instant::now();
        let result = self.sync_spec(spec).await;
        metrics::record_sync_latency(kind.as_str(), started.elapsed());

        match &result {
            Ok(report) => {
                let status = match report.status {
                    EntityStatus::NoChanges => "empty",
                    _ => "success",
                };
                metrics::record_entity_sync(kind.as_str(), status);
            }
            Err(e) => {
                metrics::record_entity_sync(kind.as_str(), "error");
                metrics::record_error("sync", e.kind().as_str());
            }
        }
        result
    }

    async fn sync_spec(&self, spec: &EntitySpec) -> Result<EntityReport, SyncError> {
        let kind = spec.kind;
        let since = self.watermarks.high_watermark(kind).await?;
        let ingest_start = self.now();
        let lag_ms = ingest_start.saturating_sub(since).max(0) as u64;
        metrics::set_watermark_lag(kind.as_str(), Duration::from_millis(lag_ms));

        let rows = self
            .extractor
            .extract_all(spec, self.registry.params(), since)
            .await?;
        let extracted = rows.len();
        metrics::record_rows_extracted(kind.as_str(), extracted);

        if rows.is_empty() {
            info!(since, "No new or updated records");
            return Ok(EntityReport {
                entity: kind,
                since: Some(since),
                extracted: 0,
                written: 0,
                ids: Vec::new(),
                status: EntityStatus::NoChanges,
            });
        }

        let mut tx = self.destination.begin().await?;
        let merged = self.merger.apply(&mut tx, spec, rows).await?;

        let entry = RunLogEntry {
            entity: kind,
            ingest_start_ts: ingest_start,
            ingest_end_ts: self.now(),
            op_kind: spec.policy.op_kind().to_string(),
            row_count: merged.count as i64,
            ids: self.run_log.join_ids(&merged.ids),
        };
        self.run_log.record(&mut tx, &entry).await?;

        tx.commit().await.map_err(|e| {
            SyncError::from_sqlx(e, StoreRole::Destination, |message| SyncError::Merge {
                entity: kind.to_string(),
                message: format!("commit failed: {}", message),
            })
        })?;

        metrics::record_rows_merged(kind.as_str(), spec.policy.op_kind(), merged.count);
        info!(
            since,
            extracted,
            written = merged.count,
            op_kind = spec.policy.op_kind(),
            "Entity synced"
        );

        Ok(EntityReport {
            entity: kind,
            since: Some(since),
            extracted,
            written: merged.count,
            ids: merged.ids,
            status: EntityStatus::Synced,
        })
    }

    /// Watermark the next sync of `kind` would start from.
    pub async fn high_watermark(&self, kind: EntityKind) -> Result<i64, SyncError> {
        self.watermarks.high_watermark(kind).await
    }

    /// Audit log entries for `kind`, oldest first.
    pub async fn history(&self, kind: EntityKind) -> Result<Vec<RunLogEntry>, SyncError> {
        self.run_log.history(&self.destination, kind).await
    }

    /// Sync every enabled entity in hierarchy order.
    ///
    /// A failing entity is reported and the rest still run.
    pub async fn sync_all(&self) -> Vec<EntityReport> {
        self.set_state(EngineState::Syncing);
        let _timer = metrics::LatencyTimer::new("sync");

        let mut reports = Vec::with_capacity(self.registry.len());
        for spec in self.registry.iter() {
            let report = match self.sync_entity(spec.kind).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(entity = %spec.kind, error = %e, "Entity sync failed");
                    EntityReport::failed(spec.kind, None, &e)
                }
            };
            reports.push(report);
        }

        self.set_state(EngineState::Ready);
        reports
    }
}
