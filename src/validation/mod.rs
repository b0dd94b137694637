// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Allowlist-driven validation and cascade cleanup.

pub mod allowlist;
pub mod cleanup;
pub mod hierarchy;

pub use allowlist::{RootAllowlist, StaticAllowlist, TableAllowlist};
pub use cleanup::{CascadeCleaner, CleanupReport, CleanupTarget, TableCleanup, TableOutcome, CLEANUP_TARGETS};
pub use hierarchy::{HierarchyValidator, ValidSets};
