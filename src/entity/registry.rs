// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Entity registry: one [`EntitySpec`] per synchronized table.
//!
//! Each spec fixes the destination table, key, static column list, merge
//! policy and extraction template. The engine is generic over specs, so
//! adding a table means adding a spec here, not another sync routine.
//!
//! The built-in templates expect the operational store's `*_dt`/`*_ts`
//! timestamp columns as epoch milliseconds and dates as ISO text. Deployments
//! with other column types override `entities.<name>.source_query`.

use serde::Deserialize;
use std::collections::BTreeMap;

use super::template;
use super::{Column, ColumnType, Derivation, EntityKind};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::storage::{qualify, Dialect};

use ColumnType::{BigInt, Double, Text};

/// How extracted rows are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Insert; on key collision overwrite every non-key column
    #[serde(alias = "mergeable")]
    Upsert,
    /// Insert unconditionally
    #[serde(alias = "append_only")]
    Append,
}

impl MergePolicy {
    /// Operation kind written to the audit log.
    pub fn op_kind(&self) -> &'static str {
        match self {
            Self::Upsert => "upsert",
            Self::Append => "append",
        }
    }
}

/// Which store an extraction query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Source,
    /// A staging relation that already lives next to the destination tables
    Destination,
}

#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub kind: EntityKind,
    pub table: &'static str,
    pub key: &'static str,
    pub columns: &'static [Column],
    pub policy: MergePolicy,
    pub origin: Origin,
    /// Extraction template (see [`template`])
    pub query: String,
    /// Column the `{exclusion}` token filters on
    pub exclusion_column: Option<&'static str>,
    pub excluded_ids: Vec<i64>,
}

impl EntitySpec {
    pub fn key_index(&self) -> usize {
        self.columns
            .iter()
            .position(|c| c.name == self.key)
            .unwrap_or(0)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// `CREATE TABLE IF NOT EXISTS` for the destination table. Upsert tables
    /// get a primary key on the key column; append tables get none.
    pub fn create_table_sql(&self, dialect: Dialect, schema: Option<&str>) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.name == self.key && self.policy == MergePolicy::Upsert {
                    format!("{} {} NOT NULL PRIMARY KEY", c.name, dialect.column_sql(c.ty))
                } else {
                    format!("{} {}", c.name, dialect.column_sql(c.ty))
                }
            })
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            qualify(schema, self.table),
            columns.join(", ")
        )
    }
}

/// Built-in definition before configuration is applied.
struct Builtin {
    kind: EntityKind,
    key: &'static str,
    columns: &'static [Column],
    policy: MergePolicy,
    origin: Origin,
    query: &'static str,
    exclusion_column: Option<&'static str>,
}

const CAMPAIGN_COLUMNS: &[Column] = &[
    Column::new("id_campaign", BigInt),
    Column::new("campaign_name", Text),
    Column::new("audience_desc", Text),
    Column::new("primary_objective", Text),
    Column::new("status", Text),
    Column::new("planned_start_dte", Text),
    Column::new("planned_end_dte", Text),
    Column::new("actual_start_dte", Text),
    Column::new("actual_end_dte", Text),
    Column::new("modified_ts", BigInt),
];

const CAMPAIGN_QUERY: &str = "
SELECT CAST(c.id AS BIGINT) AS id_campaign,
       c.name AS campaign_name,
       c.audience AS audience_desc,
       {param:campaign_primary_objective} AS primary_objective,
       c.current_status AS status,
       c.planned_start_dt AS planned_start_dte,
       c.planned_end_dt AS planned_end_dte,
       c.actual_start_dt AS actual_start_dte,
       c.actual_end_dt AS actual_end_dte,
       COALESCE(c.update_dt, c.created_dt) AS modified_ts
FROM paign_default_campaign c
WHERE COALESCE(c.update_dt, c.created_dt) > {since}
ORDER BY id_campaign";

const TACTIC_COLUMNS: &[Column] = &[
    Column::new("id_tactic", BigInt),
    Column::new("id_campaign", BigInt),
    Column::new("audience_desc", Text),
    Column::new("tactic_name", Text),
    Column::new("tactic_objective", Text),
    Column::new("tactic_start_dte", Text),
    Column::new("tactic_end_dte", Text),
    Column::new("tactic_status", Text),
    Column::new("tactic_channel", Text),
    Column::new("tactic_setup_type", Text),
    Column::new("tactic_type", Text),
    Column::new("tactic_publisher", Text),
    Column::new("planned_start_dte", Text),
    Column::new("planned_end_dte", Text),
    Column::new("modified_ts", BigInt),
];

const TACTIC_QUERY: &str = "
SELECT t.id AS id_tactic,
       t.campaign_id AS id_campaign,
       CASE WHEN t.audience_criteria IS NULL
            THEN {param:tactic_audience_prefix} || t.brand_name
            ELSE t.audience_criteria END AS audience_desc,
       t.name AS tactic_name,
       {param:tactic_objective} AS tactic_objective,
       t.actual_start_dt AS tactic_start_dte,
       t.actual_end_dt AS tactic_end_dte,
       {param:tactic_status} AS tactic_status,
       t.tactic_type AS tactic_channel,
       {param:tactic_setup_type} AS tactic_setup_type,
       {param:tactic_type} AS tactic_type,
       {param:tactic_publisher} AS tactic_publisher,
       t.planned_start_dt AS planned_start_dte,
       t.planned_end_dt AS planned_end_dte,
       COALESCE(t.update_dt, t.created_dt) AS modified_ts
FROM paign_default_tactic t
WHERE COALESCE(t.update_dt, t.created_dt) > {since}
ORDER BY id_tactic";

const VERSION_COLUMNS: &[Column] = &[
    Column::new("id_version", BigInt),
    Column::new("id_tactic", BigInt),
    Column::new("id_content_group", BigInt),
    Column::new("id_offer", BigInt),
    Column::new("language_desc", Text),
    Column::new("audience_segment_desc", Text),
    Column::new("version_name", Text),
    Column::new("planned_start_dte", Text),
    Column::new("planned_end_dte", Text),
    Column::new("actual_start_dte", Text),
    Column::new("actual_end_dte", Text),
    Column::new("position_row", BigInt),
    Column::new("position_column", BigInt),
    Column::new("placement_type", Text),
    Column::new("modified_ts", BigInt),
];

// Positions are ranked per audience segment; id_version breaks ties so
// reruns over the same window produce the same ordinals.
const VERSION_QUERY: &str = "
WITH ppv_data AS (
    SELECT ppv.id AS id_version,
           ppv.tactic_id AS id_tactic,
           ppv.module_id,
           ppv.vehicle_placement_position_id,
           COALESCE(ppv.language, {param:version_default_language}) AS language_desc,
           ppv.audience_segment AS audience_segment_desc,
           ppv.name AS version_name,
           ppv.start_date AS planned_start_dte,
           ppv.end_date AS planned_end_dte,
           ppv.actual_start_dt AS actual_start_dte,
           ppv.actual_end_dt AS actual_end_dte,
           COALESCE(ppv.update_dt, ppv.created_dt) AS modified_ts
    FROM paign_placement_version ppv
    WHERE COALESCE(ppv.update_dt, ppv.created_dt) > {since} {exclusion}
)
SELECT d.id_version,
       d.id_tactic,
       ccg.id AS id_content_group,
       ccg.offer_id AS id_offer,
       d.language_desc,
       d.audience_segment_desc,
       d.version_name,
       d.planned_start_dte,
       d.planned_end_dte,
       d.actual_start_dte,
       d.actual_end_dte,
       ROW_NUMBER() OVER (PARTITION BY aspv.audiencesegment_id
                          ORDER BY cvpp.placement_type_row, d.id_version) AS position_row,
       ROW_NUMBER() OVER (PARTITION BY aspv.audiencesegment_id
                          ORDER BY cvpp.placement_type_column, d.id_version) AS position_column,
       pt.placement_type_name AS placement_type,
       d.modified_ts
FROM ppv_data d
LEFT JOIN cf_modules cm ON d.module_id = cm.id
LEFT JOIN cf_content_group ccg ON cm.content_group_id = ccg.id
LEFT JOIN audience_segment_placement_versions aspv ON d.id_version = aspv.placementversion_id
LEFT JOIN cf_vehicle_placement_position cvpp ON d.vehicle_placement_position_id = cvpp.id
LEFT JOIN cf_placement_type pt ON cvpp.placement_type_id = pt.id
ORDER BY d.id_version";

const OFFER_COLUMNS: &[Column] = &[
    Column::new("id_offer", BigInt),
    Column::new("offer_name", Text),
    Column::new("offer_type", Text),
    Column::new("hurdle_value", Text),
    Column::new("hurdle_type", Text),
    Column::new("promo_code", Text),
    Column::new("award_value", Double),
    Column::new("award_type", Text),
    Column::new("status", Text),
    Column::new("offer_start_dte", Text),
    Column::new("offer_end_dte", Text),
    Column::new("modified_ts", BigInt),
];

const OFFER_QUERY: &str = "
SELECT DISTINCT o.id AS id_offer,
       o.name || '-' || o.description AS offer_name,
       o.offer_type AS offer_type,
       {param:offer_hurdle_value} AS hurdle_value,
       {param:offer_hurdle_type} AS hurdle_type,
       {param:offer_promo_code} AS promo_code,
       CAST(o.value_amount AS DOUBLE PRECISION) AS award_value,
       vat.name AS award_type,
       o.current_status AS status,
       o.actual_start_dt AS offer_start_dte,
       o.actual_end_dt AS offer_end_dte,
       COALESCE(o.update_dt, o.created_dt) AS modified_ts
FROM paign_default_offer o
LEFT JOIN paign_default_valueamounttype vat ON o.value_amount_type_id = vat.id
WHERE COALESCE(o.update_dt, o.created_dt) > {since}
ORDER BY id_offer";

const LINK_COLUMNS: &[Column] = &[
    Column::new("id_link", BigInt),
    Column::new("id_version", BigInt),
    Column::derived("domain", Text, Derivation::UrlDomain { from: "base_url" }),
    Column::new("base_url", Text),
    Column::new("final_url", Text),
    Column::new("cta_text", Text),
    Column::new("link_type", Text),
    Column::new("modified_ts", BigInt),
];

const LINK_QUERY: &str = "
SELECT DISTINCT l.id AS id_link,
       v.id AS id_version,
       l.original_url AS base_url,
       l.final_url AS final_url,
       l.linked_text AS cta_text,
       l.bit_type_name AS link_type,
       l.created_ts AS modified_ts
FROM paign_module_link_ids_prod l
JOIN paign_placement_version v ON v.tactic_id = l.tactic_id AND l.module_id = v.module_id
WHERE l.outdated_flag IS FALSE AND l.created_ts > {since}
ORDER BY id_link, id_version";

const TREATMENT_COLUMNS: &[Column] = &[
    Column::new("id", BigInt),
    Column::new("id_treatment", BigInt),
    Column::new("id_version", BigInt),
    Column::new("modified_ts", BigInt),
];

const TREATMENT_QUERY: &str = "
SELECT DISTINCT tpv.id AS id,
       tpv.treatment_id AS id_treatment,
       tpv.pv_id AS id_version,
       tpv.created_at AS modified_ts
FROM treatment_placement_versions tpv
WHERE tpv.created_at > {since}
ORDER BY id";

fn builtins() -> [Builtin; 6] {
    [
        Builtin {
            kind: EntityKind::Campaign,
            key: "id_campaign",
            columns: CAMPAIGN_COLUMNS,
            policy: MergePolicy::Upsert,
            origin: Origin::Source,
            query: CAMPAIGN_QUERY,
            exclusion_column: None,
        },
        Builtin {
            kind: EntityKind::Tactic,
            key: "id_tactic",
            columns: TACTIC_COLUMNS,
            policy: MergePolicy::Upsert,
            origin: Origin::Source,
            query: TACTIC_QUERY,
            exclusion_column: None,
        },
        Builtin {
            kind: EntityKind::Version,
            key: "id_version",
            columns: VERSION_COLUMNS,
            policy: MergePolicy::Upsert,
            origin: Origin::Source,
            query: VERSION_QUERY,
            exclusion_column: Some("ppv.tactic_id"),
        },
        Builtin {
            kind: EntityKind::Offer,
            key: "id_offer",
            columns: OFFER_COLUMNS,
            policy: MergePolicy::Upsert,
            origin: Origin::Source,
            query: OFFER_QUERY,
            exclusion_column: None,
        },
        Builtin {
            kind: EntityKind::Link,
            key: "id_link",
            columns: LINK_COLUMNS,
            policy: MergePolicy::Append,
            origin: Origin::Source,
            query: LINK_QUERY,
            exclusion_column: None,
        },
        Builtin {
            kind: EntityKind::Treatment,
            key: "id",
            columns: TREATMENT_COLUMNS,
            policy: MergePolicy::Append,
            origin: Origin::Destination,
            query: TREATMENT_QUERY,
            exclusion_column: None,
        },
    ]
}

/// Resolved specs for every enabled entity plus the literal values their
/// templates bind.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    specs: BTreeMap<EntityKind, EntitySpec>,
    params: BTreeMap<String, String>,
}

impl EntityRegistry {
    /// Build from the built-ins with configuration applied.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        let params = config.literals();
        let mut specs = BTreeMap::new();

        for builtin in builtins() {
            let overrides = config.entity(builtin.kind);
            if !overrides.enabled {
                continue;
            }

            let excluded_ids = overrides.excluded_parent_ids.unwrap_or_default();
            if !excluded_ids.is_empty() && builtin.exclusion_column.is_none() {
                return Err(SyncError::Config(format!(
                    "entity '{}' does not support excluded_parent_ids",
                    builtin.kind
                )));
            }

            let query = overrides
                .source_query
                .unwrap_or_else(|| builtin.query.to_string());
            template::validate(&query, &params).map_err(|e| {
                SyncError::Config(format!("entity '{}': {}", builtin.kind, e))
            })?;

            specs.insert(
                builtin.kind,
                EntitySpec {
                    kind: builtin.kind,
                    table: builtin.kind.as_str(),
                    key: builtin.key,
                    columns: builtin.columns,
                    policy: overrides.merge_policy.unwrap_or(builtin.policy),
                    origin: builtin.origin,
                    query,
                    exclusion_column: builtin.exclusion_column,
                    excluded_ids,
                },
            );
        }

        Ok(Self { specs, params })
    }

    pub fn get(&self, kind: EntityKind) -> Option<&EntitySpec> {
        self.specs.get(&kind)
    }

    /// Enabled specs in hierarchy order.
    pub fn iter(&self) -> impl Iterator<Item = &EntitySpec> {
        self.specs.values()
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
