// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Valid-ID sets derived top-down from the allowlisted campaigns.
//!
//! Only destination-side foreign keys are consulted. An empty root set
//! yields empty sets everywhere, which cleanup treats as "touch nothing".

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

use crate::entity::{ColumnType, EntityKind};
use crate::error::SyncError;
use crate::metrics;
use crate::storage::{decode_value, qualify, SqlStore};

static EMPTY: BTreeSet<i64> = BTreeSet::new();

/// Per-run snapshot of valid IDs by hierarchy level. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidSets {
    sets: BTreeMap<EntityKind, BTreeSet<i64>>,
}

impl ValidSets {
    /// Valid IDs for `kind`; empty when the level was never computed.
    pub fn get(&self, kind: EntityKind) -> &BTreeSet<i64> {
        self.sets.get(&kind).unwrap_or(&EMPTY)
    }

    pub fn insert(&mut self, kind: EntityKind, ids: BTreeSet<i64>) {
        self.sets.insert(kind, ids);
    }

    /// True when no root was allowlisted.
    pub fn is_halted(&self) -> bool {
        self.get(EntityKind::Campaign).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, &BTreeSet<i64>)> {
        self.sets.iter().map(|(k, v)| (*k, v))
    }
}

impl std::fmt::Display for ValidSets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = [
            EntityKind::Campaign,
            EntityKind::Tactic,
            EntityKind::Version,
            EntityKind::Offer,
        ]
        .iter()
        .map(|k| format!("{}={}", k, self.get(*k).len()))
        .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// One downward step: child IDs whose foreign key is in the parent set.
struct Step {
    child: EntityKind,
    table: &'static str,
    select: &'static str,
    parent_column: &'static str,
    parent: EntityKind,
    extra: &'static str,
}

const STEPS: [Step; 3] = [
    Step {
        child: EntityKind::Tactic,
        table: "tactic",
        select: "id_tactic",
        parent_column: "id_campaign",
        parent: EntityKind::Campaign,
        extra: "",
    },
    Step {
        child: EntityKind::Version,
        table: "version",
        select: "id_version",
        parent_column: "id_tactic",
        parent: EntityKind::Tactic,
        extra: "",
    },
    // Offers hang off versions through version.id_offer
    Step {
        child: EntityKind::Offer,
        table: "version",
        select: "id_offer",
        parent_column: "id_version",
        parent: EntityKind::Version,
        extra: " AND id_offer IS NOT NULL",
    },
];

#[derive(Debug, Clone)]
pub struct HierarchyValidator {
    store: SqlStore,
    schema: Option<String>,
    chunk_size: usize,
}

impl HierarchyValidator {
    pub fn new(store: SqlStore, schema: Option<String>, chunk_size: usize) -> Self {
        Self {
            store,
            schema,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Walk campaign → tactic → version → offer from `allowed_roots`.
    #[instrument(skip(self, allowed_roots), fields(roots = allowed_roots.len()))]
    pub async fn compute_valid_sets(
        &self,
        allowed_roots: &BTreeSet<i64>,
    ) -> Result<ValidSets, SyncError> {
        let mut sets = ValidSets::default();
        sets.insert(EntityKind::Campaign, allowed_roots.clone());

        for step in &STEPS {
            let parents = sets.get(step.parent);
            let ids = if parents.is_empty() {
                debug!(entity = %step.child, "Parent set empty, level not queried");
                BTreeSet::new()
            } else {
                self.children(step, parents).await?
            };
            sets.insert(step.child, ids);
        }

        for (kind, ids) in sets.iter() {
            metrics::set_valid_set_size(kind.as_str(), ids.len());
        }
        info!(valid = %sets, "Computed valid ID sets");
        Ok(sets)
    }

    async fn children(&self, step: &Step, parents: &BTreeSet<i64>) -> Result<BTreeSet<i64>, SyncError> {
        let table = qualify(self.schema.as_deref(), step.table);
        let parents: Vec<i64> = parents.iter().copied().collect();
        let cleanup_err = |message: String| SyncError::Cleanup {
            table: step.table.to_string(),
            message,
        };

        let mut found = BTreeSet::new();
        for chunk in parents.chunks(self.chunk_size) {
            let mut p = self.store.dialect().placeholders();
            let sql = format!(
                "SELECT DISTINCT {select} AS child_id FROM {table} WHERE {parent} IN ({list}){extra}",
                select = step.select,
                table = table,
                parent = step.parent_column,
                list = p.list(chunk.len()),
                extra = step.extra,
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            let rows = query
                .fetch_all(self.store.pool())
                .await
                .map_err(|e| SyncError::from_sqlx(e, self.store.role(), cleanup_err))?;

            for row in &rows {
                let value = decode_value(row, "child_id", ColumnType::BigInt)
                    .map_err(|e| cleanup_err(e.to_string()))?;
                if let Some(id) = value.as_int() {
                    found.insert(id);
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sets_defaults_to_empty() {
        let sets = ValidSets::default();
        assert!(sets.is_halted());
        assert!(sets.get(EntityKind::Offer).is_empty());
        assert_eq!(sets.to_string(), "campaign=0 tactic=0 version=0 offer=0");
    }

    #[test]
    fn test_steps_descend_the_hierarchy() {
        for step in &STEPS {
            assert_eq!(step.child.parent(), Some(step.parent));
        }
    }
}
