//! Ingest Runtime - single ingestion run
//!
//! Applies the history schema, resolves the ledger range to ingest and runs
//! one session over it. Scheduling repeated runs is left to the caller
//! (cron, systemd timer, orchestrator).
//!
//! Usage:
//!   cargo run --release --bin ingest_runtime
//!
//! Environment variables:
//!   CORE_DB_PATH - upstream core SQLite database (required)
//!   HISTORY_DB_PATH - destination history SQLite database (required)
//!   INGEST_FIRST_LEDGER / INGEST_LAST_LEDGER - explicit range (optional)
//!   INGEST_CLEAR_EXISTING - delete existing rows for the range first
//!   See `IngestConfig::from_env` for the rest.

use dotenv::dotenv;
use ledger_ingest::config::IngestConfig;
use ledger_ingest::db::run_schema_migrations;
use ledger_ingest::ingest::System;
use ledger_ingest::metrics::register_metrics;
use log::{error, info, warn};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Ingest Runtime");

    let config = IngestConfig::from_env()?;
    info!("   ├─ Core DB: {}", config.core_db_path);
    info!("   ├─ History DB: {}", config.history_db_path);
    info!("   ├─ Cursor: {}", config.cursor_name);
    info!("   ├─ Asset stats: {}", config.enable_asset_stats);
    info!("   ├─ Failed transactions: {}", config.ingest_failed_transactions);
    info!("   └─ Retention: {} ledgers (0 = keep all)", config.history_retention_count);

    register_metrics();

    let system = System::new(config.clone())?;
    run_schema_migrations(&mut system.history().lock(), &config.history_schema_dir)?;

    let range = match (config.first_ledger, config.last_ledger) {
        (Some(first), Some(last)) => Some((first, last)),
        (first, last) => system.pending_range()?.map(|(pending_first, pending_last)| {
            (first.unwrap_or(pending_first), last.unwrap_or(pending_last))
        }),
    };

    let Some((first, last)) = range else {
        info!("✅ Nothing to ingest: cursor {} is up to date", config.cursor_name);
        return Ok(());
    };
    if first > last {
        warn!("⚠️  Empty range {}..={}, nothing to ingest", first, last);
        return Ok(());
    }

    let system = Arc::new(system);
    let worker = Arc::clone(&system);
    let report = tokio::task::spawn_blocking(move || {
        worker.new_session(first, last).map(|session| session.run())
    })
    .await??;

    let metrics = system.metrics();
    info!("📊 Run summary:");
    info!("   ├─ Range: {}..={}", report.first, report.last);
    info!("   ├─ Ledgers ingested: {}", report.ingested);
    info!("   ├─ Rows written: {}", report.rows_written);
    info!("   ├─ Asset stats written: {}", report.asset_stats_written);
    info!("   ├─ Cursor committed: {}", report.cursor_committed);
    info!(
        "   └─ Load: {} ledgers in {:?}, ingest {:?}, clear {:?}",
        metrics.load_ledger.count(),
        metrics.load_ledger.total(),
        metrics.ingest_ledger.total(),
        metrics.clear_ledger.total()
    );

    if let Err(e) = report.into_result() {
        error!("❌ Ingestion failed: {}", e);
        return Err(e.into());
    }

    info!("✅ Ingest runtime finished");
    Ok(())
}
