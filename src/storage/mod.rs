// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Store connections shared by every phase.

pub mod dialect;
pub mod sql;

pub use dialect::{qualify, Dialect, Placeholders};
pub use sql::{bind_value, decode_value, AnyQuery, SqlStore};
