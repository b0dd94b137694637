// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared fixtures: a file-backed SQLite source shaped like the campaign
//! application, and a SQLite destination.

#![allow(dead_code)]

use hierarchy_sync::{AllowlistConfig, Clock, RefreshEngine, SqlStore, StoreRole, SyncConfig};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Source rows are stamped around this instant.
pub const T0: i64 = 1_700_000_000_000;
/// First engine run happens here.
pub const T1: i64 = T0 + 600_000;

const SOURCE_DDL: &[&str] = &[
    "CREATE TABLE paign_default_campaign (id BIGINT, name TEXT, audience TEXT, current_status TEXT, \
     planned_start_dt TEXT, planned_end_dt TEXT, actual_start_dt TEXT, actual_end_dt TEXT, \
     update_dt BIGINT, created_dt BIGINT)",
    "CREATE TABLE paign_default_tactic (id BIGINT, campaign_id BIGINT, audience_criteria TEXT, \
     brand_name TEXT, name TEXT, actual_start_dt TEXT, actual_end_dt TEXT, tactic_type TEXT, \
     planned_start_dt TEXT, planned_end_dt TEXT, update_dt BIGINT, created_dt BIGINT)",
    "CREATE TABLE paign_placement_version (id BIGINT, tactic_id BIGINT, module_id BIGINT, \
     vehicle_placement_position_id BIGINT, language TEXT, audience_segment TEXT, name TEXT, \
     start_date TEXT, end_date TEXT, actual_start_dt TEXT, actual_end_dt TEXT, \
     update_dt BIGINT, created_dt BIGINT)",
    "CREATE TABLE cf_modules (id BIGINT, content_group_id BIGINT)",
    "CREATE TABLE cf_content_group (id BIGINT, offer_id BIGINT)",
    "CREATE TABLE audience_segment_placement_versions (placementversion_id BIGINT, audiencesegment_id BIGINT)",
    "CREATE TABLE cf_vehicle_placement_position (id BIGINT, placement_type_row BIGINT, \
     placement_type_column BIGINT, placement_type_id BIGINT)",
    "CREATE TABLE cf_placement_type (id BIGINT, placement_type_name TEXT)",
    "CREATE TABLE paign_default_offer (id BIGINT, name TEXT, description TEXT, offer_type TEXT, \
     value_amount REAL, value_amount_type_id BIGINT, current_status TEXT, actual_start_dt TEXT, \
     actual_end_dt TEXT, update_dt BIGINT, created_dt BIGINT)",
    "CREATE TABLE paign_default_valueamounttype (id BIGINT, name TEXT)",
    "CREATE TABLE paign_module_link_ids_prod (id BIGINT, tactic_id BIGINT, module_id BIGINT, \
     original_url TEXT, final_url TEXT, linked_text TEXT, bit_type_name TEXT, \
     outdated_flag BOOLEAN, created_ts BIGINT)",
];

const DEST_DDL: &[&str] = &[
    "CREATE TABLE treatment_placement_versions (id BIGINT, treatment_id BIGINT, pv_id BIGINT, created_at BIGINT)",
    "CREATE TABLE validated_campaigns (id_campaign BIGINT)",
];

/// Settable clock for ingest-window stamps.
#[derive(Clone)]
pub struct TestClock(Arc<AtomicI64>);

impl TestClock {
    pub fn new(start: i64) -> Self {
        Self(Arc::new(AtomicI64::new(start)))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn clock(&self) -> Clock {
        let now = self.0.clone();
        Arc::new(move || now.load(Ordering::SeqCst))
    }
}

pub struct Fixture {
    _dir: TempDir,
    pub source: SqlStore,
    pub dest: SqlStore,
    pub clock: TestClock,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let source = connect(&dir, "source.db", StoreRole::Source).await;
        let dest = connect(&dir, "dest.db", StoreRole::Destination).await;

        source.execute_statements(&ddl(SOURCE_DDL)).await.unwrap();
        prepare_destination(&dest).await;

        Self { _dir: dir, source, dest, clock: TestClock::new(T1) }
    }

    /// Engine over the fixture stores with the destination schema in place.
    pub async fn engine(&self, config: SyncConfig) -> RefreshEngine {
        let engine = RefreshEngine::from_stores(config, self.source.clone(), self.dest.clone())
            .unwrap()
            .with_clock(self.clock.clock());
        engine.ensure_schema().await.unwrap();
        engine
    }

    pub async fn source_exec(&self, sql: &str) {
        sqlx::query(sql).execute(self.source.pool()).await.unwrap();
    }

    pub async fn dest_exec(&self, sql: &str) {
        sqlx::query(sql).execute(self.dest.pool()).await.unwrap();
    }

    pub async fn count(&self, table: &str) -> u64 {
        self.dest.count_rows(None, table).await.unwrap()
    }

    /// Values of an integer destination column, NULLs dropped, sorted.
    pub async fn dest_ids(&self, table: &str, column: &str) -> Vec<i64> {
        let sql = format!("SELECT {col} AS v FROM {table} WHERE {col} IS NOT NULL ORDER BY {col}", col = column, table = table);
        let rows = sqlx::query(&sql).fetch_all(self.dest.pool()).await.unwrap();
        rows.iter()
            .map(|r| {
                hierarchy_sync::storage::decode_value(r, "v", hierarchy_sync::entity::ColumnType::BigInt)
                    .unwrap()
                    .as_int()
                    .unwrap()
            })
            .collect()
    }

    pub async fn dest_text(&self, sql: &str) -> Option<String> {
        let row = sqlx::query(sql).fetch_one(self.dest.pool()).await.unwrap();
        hierarchy_sync::storage::decode_value(&row, "v", hierarchy_sync::entity::ColumnType::Text)
            .unwrap()
            .as_text()
            .map(str::to_string)
    }

    // ── Source seeding ──────────────────────────────────────────────────

    pub async fn campaign(&self, id: i64, name: &str, modified: i64) {
        self.source_exec(&format!(
            "INSERT INTO paign_default_campaign VALUES ({id}, '{name}', 'Members', 'Active', \
             '2024-01-01', '2024-03-31', '2024-01-02', NULL, NULL, {modified})"
        ))
        .await;
    }

    pub async fn tactic(&self, id: i64, campaign: i64, modified: i64) {
        self.source_exec(&format!(
            "INSERT INTO paign_default_tactic VALUES ({id}, {campaign}, NULL, 'Harbor Inn', \
             'Tactic {id}', '2024-01-02', NULL, 'Email', '2024-01-01', '2024-03-31', NULL, {modified})"
        ))
        .await;
    }

    /// Version plus its module and content group pointing at `offer`.
    pub async fn version(&self, id: i64, tactic: i64, offer: Option<i64>, modified: i64) {
        let module = id + 10_000;
        let group = id + 20_000;
        let offer = offer.map(|o| o.to_string()).unwrap_or_else(|| "NULL".into());
        self.source_exec(&format!(
            "INSERT INTO paign_placement_version VALUES ({id}, {tactic}, {module}, 1, NULL, 'Segment A', \
             'Version {id}', '2024-01-01', '2024-02-01', NULL, NULL, NULL, {modified})"
        ))
        .await;
        self.source_exec(&format!("INSERT INTO cf_modules VALUES ({module}, {group})")).await;
        self.source_exec(&format!("INSERT INTO cf_content_group VALUES ({group}, {offer})")).await;
        self.source_exec(&format!("INSERT INTO audience_segment_placement_versions VALUES ({id}, 1)")).await;
    }

    pub async fn offer(&self, id: i64, modified: i64) {
        self.source_exec(&format!(
            "INSERT INTO paign_default_offer VALUES ({id}, 'Offer {id}', 'Spring', 'Discount', 25.0, 1, \
             'Active', '2024-01-01', NULL, NULL, {modified})"
        ))
        .await;
    }

    /// Link attached to the version's tactic and module.
    pub async fn link(&self, id: i64, version: i64, tactic: i64, url: &str, created: i64) {
        let module = version + 10_000;
        self.source_exec(&format!(
            "INSERT INTO paign_module_link_ids_prod VALUES ({id}, {tactic}, {module}, '{url}', \
             '{url}?utm=1', 'Book now', 'cta', 0, {created})"
        ))
        .await;
    }

    /// Staging row read from the destination for the treatment entity.
    pub async fn treatment_staging(&self, id: i64, treatment: i64, version: i64, created: i64) {
        self.dest_exec(&format!(
            "INSERT INTO treatment_placement_versions VALUES ({id}, {treatment}, {version}, {created})"
        ))
        .await;
    }

    /// Two campaigns (5 allowlisted, 6 not), each with one tactic, version,
    /// offer, link and treatment.
    pub async fn seed_hierarchy(&self) {
        self.source_exec("INSERT INTO cf_vehicle_placement_position VALUES (1, 1, 1, 1)").await;
        self.source_exec("INSERT INTO cf_placement_type VALUES (1, 'Hero')").await;
        self.source_exec("INSERT INTO paign_default_valueamounttype VALUES (1, 'Percent')").await;

        for (campaign, tactic, version, offer) in [(5, 20, 300, 900), (6, 21, 301, 901)] {
            self.campaign(campaign, &format!("Campaign {campaign}"), T0).await;
            self.tactic(tactic, campaign, T0).await;
            self.version(version, tactic, Some(offer), T0).await;
            self.offer(offer, T0).await;
            self.link(version + 1000, version, tactic, "https://shop.test/deal", T0).await;
            self.treatment_staging(version + 5000, 77, version, T0).await;
        }
    }
}

fn ddl(stmts: &[&str]) -> Vec<String> {
    stmts.iter().map(|s| s.to_string()).collect()
}

/// Staging and allowlist tables the destination is expected to carry.
pub async fn prepare_destination(dest: &SqlStore) {
    dest.execute_statements(&ddl(DEST_DDL)).await.unwrap();
}

async fn connect(dir: &TempDir, file: &str, role: StoreRole) -> SqlStore {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join(file).display());
    SqlStore::connect(&url, role, 2, Duration::from_secs(5)).await.unwrap()
}

/// Default config with a static allowlist and cleanup on.
pub fn config_with_roots(ids: &[i64]) -> SyncConfig {
    SyncConfig {
        allowlist: AllowlistConfig::Static { ids: ids.to_vec() },
        ..Default::default()
    }
}
