// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! One refresh run, end to end.
//!
//! Demonstrates:
//! 1. Connecting to a source and a destination store
//! 2. Creating the audit log and entity tables
//! 3. Syncing every entity, then validating and cleansing
//! 4. Reading the audit log back
//! 5. Displaying metrics
//!
//! Without `SOURCE_URL`/`DEST_URL` the example seeds two throwaway SQLite
//! databases so it runs anywhere.
//!
//! # Run
//!
//! ```bash
//! cargo run --example refresh_once
//!
//! SOURCE_URL=postgres://reader@localhost/staging \
//! DEST_URL=postgres://writer@localhost/heavy \
//! cargo run --example refresh_once
//! ```

use hierarchy_sync::{AllowlistConfig, EntityKind, EntityOverrides, RefreshEngine, SyncConfig};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

const DEMO_SOURCE: &[&str] = &[
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
    // Two campaigns; only campaign 1 is allowlisted below
    "INSERT INTO paign_default_campaign VALUES \
     (1, 'Spring Getaway', 'Members', 'Active', '2024-03-01', '2024-05-31', NULL, NULL, NULL, 1700000000000), \
     (2, 'Retired Promo', 'Members', 'Closed', '2023-01-01', '2023-02-01', NULL, NULL, NULL, 1700000000000)",
    "INSERT INTO paign_default_tactic VALUES \
     (10, 1, NULL, 'Harbor Inn', 'Spring email', NULL, NULL, 'Email', NULL, NULL, NULL, 1700000000000), \
     (20, 2, NULL, 'Harbor Inn', 'Old banner', NULL, NULL, 'Display', NULL, NULL, NULL, 1700000000000)",
    "INSERT INTO paign_placement_version VALUES \
     (100, 10, 1000, 1, NULL, 'Loyal', 'Hero A', NULL, NULL, NULL, NULL, NULL, 1700000000000), \
     (200, 20, 2000, 1, NULL, 'Loyal', 'Banner', NULL, NULL, NULL, NULL, NULL, 1700000000000)",
    "INSERT INTO cf_modules VALUES (1000, 5000), (2000, 6000)",
    "INSERT INTO cf_content_group VALUES (5000, 900), (6000, 901)",
    "INSERT INTO audience_segment_placement_versions VALUES (100, 1), (200, 1)",
    "INSERT INTO cf_vehicle_placement_position VALUES (1, 1, 1, 1)",
    "INSERT INTO cf_placement_type VALUES (1, 'Hero')",
    "INSERT INTO paign_default_valueamounttype VALUES (1, 'Percent')",
    "INSERT INTO paign_default_offer VALUES \
     (900, '20% off', 'Spring', 'Discount', 20.0, 1, 'Active', NULL, NULL, NULL, 1700000000000), \
     (901, '10% off', 'Winter', 'Discount', 10.0, 1, 'Closed', NULL, NULL, NULL, 1700000000000)",
    "INSERT INTO paign_module_link_ids_prod VALUES \
     (7, 10, 1000, 'https://harbor.test/spring', 'https://harbor.test/spring?utm=1', 'Book now', 'cta', 0, 1700000000000), \
     (8, 20, 2000, 'https://harbor.test/old', 'https://harbor.test/old?utm=1', 'See more', 'cta', 0, 1700000000000)",
];

/// Tactics whose placement versions are never extracted.
const EXCLUDED_VERSION_TACTICS: &[i64] = &[
    1267, 1271, 1277, 1280, 1285, 1270, 1279, 1274, 1272, 1265, 1261, 1264, 1262, 1275,
    1259, 1283, 1281, 1273, 1284, 1263, 1282, 1286, 1266, 1278, 1260, 1269, 1268, 1276,
];

const DEMO_DEST: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS treatment_placement_versions (id BIGINT, treatment_id BIGINT, pv_id BIGINT, created_at BIGINT)",
    "INSERT INTO treatment_placement_versions VALUES (1, 55, 100, 1700000000000), (2, 56, 200, 1700000000000)",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           hierarchy-sync: One Refresh Run                     ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and connect
    // ─────────────────────────────────────────────────────────────────────────
    let scratch = tempfile::tempdir()?;
    let seeded = std::env::var("SOURCE_URL").is_err() || std::env::var("DEST_URL").is_err();

    let (source_url, dest_url) = if seeded {
        println!("📦 No SOURCE_URL/DEST_URL set, using scratch SQLite databases");
        (
            format!("sqlite://{}?mode=rwc", scratch.path().join("source.db").display()),
            format!("sqlite://{}?mode=rwc", scratch.path().join("dest.db").display()),
        )
    } else {
        (std::env::var("SOURCE_URL")?, std::env::var("DEST_URL")?)
    };

    let mut config = SyncConfig {
        source_url: Some(source_url),
        dest_url: Some(dest_url),
        allowlist: if seeded {
            AllowlistConfig::Static { ids: vec![1] }
        } else {
            AllowlistConfig::default()
        },
        ..Default::default()
    };
    config.entities.insert(
        EntityKind::Version,
        EntityOverrides {
            excluded_parent_ids: Some(EXCLUDED_VERSION_TACTICS.to_vec()),
            ..Default::default()
        },
    );
    println!("   Version denylist: {} tactics", EXCLUDED_VERSION_TACTICS.len());

    let engine = RefreshEngine::connect(config).await?;
    println!("   State: {}", engine.state());

    if seeded {
        let statements = |stmts: &[&str]| stmts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        engine.source().execute_statements(&statements(DEMO_SOURCE)).await?;
        engine.destination().execute_statements(&statements(DEMO_DEST)).await?;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Destination schema
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🧱 Ensuring destination schema...");
    engine.ensure_schema().await?;

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Refresh
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🚀 Running refresh...\n");
    let report = engine.run().await;
    println!("\n{}", report);

    println!("\n🔁 Running again (nothing changed, nothing should be written)...\n");
    let again = engine.run().await;
    for entity in &again.entities {
        println!("   {}", entity);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Audit log
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📜 Audit log:");
    for kind in EntityKind::ALL {
        for entry in engine.history(kind).await.unwrap_or_default() {
            println!("   {}", serde_json::to_string(&entry)?);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key
                .labels()
                .map(|l| format!("{}={}", l.key(), l.value()))
                .collect();
            let labels = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
            let value = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => {
                    let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                    format!("count={} sum={:.4}", samples.len(), sum)
                }
            };
            format!("{}{} = {}", key.name(), labels, value)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
