// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Validation, cleanup and the full refresh run.

use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::SyncError;
use crate::metrics;
use crate::validation::{CleanupReport, ValidSets};

use super::{CleanupPhase, EngineState, RefreshEngine, RunReport};

impl RefreshEngine {
    /// Read the allowlist and derive valid IDs for every level.
    pub async fn compute_valid_sets(&self) -> Result<ValidSets, SyncError> {
        self.set_state(EngineState::Validating);
        let _timer = metrics::LatencyTimer::new("validate");

        let result = async {
            let roots = self.allowlist.allowed_roots().await?;
            if roots.is_empty() {
                warn!(allowlist = %self.allowlist.describe(), "Allowlist is empty; cleanup will not delete anything");
            }
            self.validator.compute_valid_sets(&roots).await
        }
        .await;

        self.set_state(EngineState::Ready);
        result
    }

    /// Delete rows outside `valid`. Tables with an empty valid set are skipped.
    pub async fn cleanse(&self, valid: &ValidSets) -> CleanupReport {
        self.set_state(EngineState::Cleaning);
        let report = {
            let _timer = metrics::LatencyTimer::new("cleanse");
            self.cleaner.cleanse(valid).await
        };
        self.set_state(EngineState::Ready);
        report
    }

    /// One full refresh: sync every entity, then validate and cleanse.
    ///
    /// Never returns early; every failure is captured in the report.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("refresh_run", run_id = %run_id);

        async move {
            let started = Instant::now();
            let _timer = metrics::LatencyTimer::new("run");
            info!("Refresh started");

            let entities = self.sync_all().await;

            let cleanup = if !self.config.cleanup_enabled {
                CleanupPhase::Disabled
            } else {
                match self.compute_valid_sets().await {
                    Ok(valid) => {
                        let report = self.cleanse(&valid).await;
                        CleanupPhase::Completed { valid, report }
                    }
                    Err(e) => {
                        warn!(error = %e, "Validation failed; cleanup skipped");
                        metrics::record_error("validate", e.kind().as_str());
                        CleanupPhase::ValidationFailed { kind: e.kind(), message: e.to_string() }
                    }
                }
            };

            let report = RunReport {
                run_id,
                entities,
                cleanup,
                elapsed: started.elapsed(),
            };
            info!(success = report.is_success(), elapsed_ms = report.elapsed.as_millis() as u64, "Refresh finished");
            report
        }
        .instrument(span)
        .await
    }
}
