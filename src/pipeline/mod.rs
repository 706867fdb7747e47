use crate::config::Config;
use crate::domain::KpiSet;
use crate::error::Result;
use crate::report;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

pub mod bronze;
pub mod gold;
pub mod silver;

use self::bronze::{BronzeStore, LoadManifest};
use self::silver::QuarantineReport;

/// Overall run outcome. A run that completes with any rejected or
/// quarantined records is a partial success; hard failures surface as
/// errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    PartialSuccess,
}

/// Run-level quality report: everything non-fatal that happened, plus the
/// Gold output. Returned to the caller rather than only logged.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub customers_manifest: LoadManifest,
    pub orders_manifest: LoadManifest,
    pub quarantine: QuarantineReport,
    pub kpis: KpiSet,
}

impl RunReport {
    pub fn total_rejected(&self) -> usize {
        self.customers_manifest.records_rejected + self.orders_manifest.records_rejected
    }
}

/// Runs the full Bronze → Silver → Gold pipeline, strictly sequentially.
/// Each stage persists its own artifact under the configured data
/// directory before the next stage starts.
pub fn run(config: &Config, customers_path: &Path, orders_path: &Path) -> Result<RunReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    let timer = std::time::Instant::now();
    let data_dir = &config.pipeline.data_directory;
    info!("starting pipeline run {}", run_id);

    // Bronze: load raw sources and preserve them with provenance
    let store = BronzeStore::new(data_dir);
    let customers_snapshot = store.write_customers(bronze::csv_loader::load_customers(customers_path)?)?;
    let orders_snapshot = store.write_orders(bronze::xml_loader::load_orders(orders_path)?)?;

    // Silver: full recompute from the latest Bronze snapshot
    let silver = silver::refine(&customers_snapshot.records, &orders_snapshot.records);
    let silver_dir = data_dir.join("silver");
    fs::create_dir_all(&silver_dir)?;
    fs::write(
        silver_dir.join("customers.json"),
        serde_json::to_string_pretty(&silver.customers)?,
    )?;
    fs::write(
        silver_dir.join("orders.json"),
        serde_json::to_string_pretty(&silver.orders)?,
    )?;
    fs::write(
        silver_dir.join("quarantine.json"),
        serde_json::to_string_pretty(&silver.quarantine)?,
    )?;

    // Gold: KPI computation under the configured engine
    let as_of = gold::resolve_as_of(config.pipeline.as_of_override, &silver.orders);
    let kpis = gold::compute(config, &silver.customers, &silver.orders, as_of)?;
    let gold_dir = data_dir.join("gold");
    fs::create_dir_all(&gold_dir)?;
    fs::write(gold_dir.join("kpis.json"), report::export_json(&kpis)?)?;
    fs::write(gold_dir.join("kpis.txt"), report::render_tables(&kpis))?;

    let status = if silver.quarantine.is_clean()
        && customers_snapshot.manifest.records_rejected == 0
        && orders_snapshot.manifest.records_rejected == 0
    {
        RunStatus::Success
    } else {
        RunStatus::PartialSuccess
    };

    let report = RunReport {
        run_id,
        status,
        started_at,
        duration_seconds: timer.elapsed().as_secs_f64(),
        customers_manifest: customers_snapshot.manifest,
        orders_manifest: orders_snapshot.manifest,
        quarantine: silver.quarantine,
        kpis,
    };
    info!(
        "pipeline run {} finished: {:?}, {} rejected at load, {} quarantined",
        run_id,
        report.status,
        report.total_rejected(),
        report.quarantine.quarantined()
    );
    Ok(report)
}
