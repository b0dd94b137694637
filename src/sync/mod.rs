// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-entity sync phases: watermark, extract, merge, log.

pub mod extract;
pub mod merge;
pub mod run_log;
pub mod watermark;

pub use extract::{ChangeExtractor, ExtractionPlan};
pub use merge::{collapse_by_key, MergeResult, MergeWriter};
pub use run_log::{RunLogEntry, RunLogger};
pub use watermark::WatermarkStore;
