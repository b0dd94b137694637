// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for hierarchy-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `hierarchy_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `entity`: campaign, tactic, version, offer, link, treatment
//! - `table`: destination table touched by cleanup
//! - `phase`: sync, validate, cleanse, run
//! - `status`: success, error, empty

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of one entity sync
pub fn record_entity_sync(entity: &str, status: &str) {
    counter!(
        "hierarchy_sync_entity_syncs_total",
        "entity" => entity.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record rows read from the origin store
pub fn record_rows_extracted(entity: &str, count: usize) {
    counter!(
        "hierarchy_sync_rows_extracted_total",
        "entity" => entity.to_string()
    )
    .increment(count as u64);
}

/// Record rows written to the destination
pub fn record_rows_merged(entity: &str, op_kind: &str, count: usize) {
    counter!(
        "hierarchy_sync_rows_merged_total",
        "entity" => entity.to_string(),
        "op_kind" => op_kind.to_string()
    )
    .increment(count as u64);
}

/// Record end-to-end latency of one entity sync
pub fn record_sync_latency(entity: &str, duration: Duration) {
    histogram!(
        "hierarchy_sync_entity_sync_seconds",
        "entity" => entity.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Seconds between the watermark in use and now
pub fn set_watermark_lag(entity: &str, lag: Duration) {
    gauge!(
        "hierarchy_sync_watermark_lag_seconds",
        "entity" => entity.to_string()
    )
    .set(lag.as_secs_f64());
}

/// Size of a computed valid-ID set
pub fn set_valid_set_size(entity: &str, size: usize) {
    gauge!(
        "hierarchy_sync_valid_ids",
        "entity" => entity.to_string()
    )
    .set(size as f64);
}

/// Record rows removed by cleanup
pub fn record_cleanup_deleted(table: &str, count: u64) {
    counter!(
        "hierarchy_sync_cleanup_deleted_total",
        "table" => table.to_string()
    )
    .increment(count);
}

/// Record a table skipped because its valid set was empty
pub fn record_cleanup_skipped(table: &str) {
    counter!(
        "hierarchy_sync_cleanup_skipped_total",
        "table" => table.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERROR TRACKING - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(phase: &str, kind: &str) {
    counter!(
        "hierarchy_sync_errors_total",
        "phase" => phase.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Track engine state transitions
pub fn set_engine_state(state: &str) {
    counter!(
        "hierarchy_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record phase latency
pub fn record_phase_latency(phase: &str, duration: Duration) {
    histogram!(
        "hierarchy_sync_phase_seconds",
        "phase" => phase.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records phase latency when dropped.
pub struct LatencyTimer {
    phase: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(phase: &'static str) -> Self {
        Self {
            phase,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_phase_latency(self.phase, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // Without a recorder installed these are no-ops; they must not panic.
    #[test]
    fn test_entity_metrics() {
        record_entity_sync("campaign", "success");
        record_rows_extracted("campaign", 3);
        record_rows_merged("campaign", "upsert", 3);
        record_sync_latency("campaign", Duration::from_millis(12));
        set_watermark_lag("campaign", Duration::from_secs(3600));
    }

    #[test]
    fn test_cleanup_metrics() {
        set_valid_set_size("tactic", 40);
        record_cleanup_deleted("tactic", 7);
        record_cleanup_skipped("offer");
        record_error("cleanse", "cleanup");
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let _timer = LatencyTimer::new("sync");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let found = snapshot.iter().any(|(key, _, _, value)| {
            key.key().name() == "hierarchy_sync_phase_seconds"
                && matches!(value, DebugValue::Histogram(samples) if samples.len() == 1)
        });
        assert!(found, "phase latency histogram not recorded");
    }

    #[test]
    fn test_counter_labels() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_rows_merged("link", "append", 4);
            record_rows_merged("link", "append", 2);
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let total = snapshot.iter().find_map(|(key, _, _, value)| {
            let is_link = key.key().labels().any(|l| l.key() == "entity" && l.value() == "link");
            match value {
                DebugValue::Counter(n)
                    if key.key().name() == "hierarchy_sync_rows_merged_total" && is_link =>
                {
                    Some(*n)
                }
                _ => None,
            }
        });
        assert_eq!(total, Some(6));
    }
}
