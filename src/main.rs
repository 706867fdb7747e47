use clap::{Parser, Subcommand};
use order_pipeline::config::Config;
use order_pipeline::error::PipelineError;
use order_pipeline::pipeline::bronze::{csv_loader, xml_loader, BronzeStore, LoadManifest};
use order_pipeline::pipeline::gold::{self, equivalence};
use order_pipeline::pipeline::{self, silver, RunStatus};
use order_pipeline::{logging, report};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "order_pipeline")]
#[command(about = "Medallion-architecture analytics pipeline for customer and order data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file (defaults to ./config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest raw sources into the Bronze layer only
    Ingest {
        /// Tabular customer file (CSV)
        #[arg(long)]
        customers: PathBuf,
        /// Markup order file (XML)
        #[arg(long)]
        orders: PathBuf,
    },
    /// Run the full Bronze → Silver → Gold pipeline
    Run {
        #[arg(long)]
        customers: PathBuf,
        #[arg(long)]
        orders: PathBuf,
        /// KPI engine: memory or relational (overrides config)
        #[arg(long)]
        engine: Option<String>,
        /// Fixed as-of timestamp, RFC 3339 (overrides config)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// Refine to Silver, then run both KPI engines and compare
    Verify {
        #[arg(long)]
        customers: PathBuf,
        #[arg(long)]
        orders: PathBuf,
        #[arg(long)]
        as_of: Option<String>,
    },
}

fn print_manifest(label: &str, manifest: &LoadManifest) {
    println!(
        "   {}: {} loaded, {} rejected (checksum {})",
        label,
        manifest.records_loaded,
        manifest.records_rejected,
        &manifest.file_checksum[..12.min(manifest.file_checksum.len())]
    );
    for warning in &manifest.warnings {
        println!("      ⚠️  {warning}");
    }
}

fn apply_overrides(
    config: &mut Config,
    engine: Option<String>,
    as_of: Option<String>,
) -> anyhow::Result<()> {
    if let Some(engine) = engine {
        config.pipeline.engine = engine.parse()?;
    }
    if let Some(as_of) = as_of {
        let parsed = chrono::DateTime::parse_from_rfc3339(&as_of)
            .map_err(|e| anyhow::anyhow!("invalid --as-of '{as_of}': {e}"))?;
        config.pipeline.as_of_override = Some(parsed.with_timezone(&chrono::Utc));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { customers, orders } => {
            println!("📥 Ingesting raw sources into Bronze...");
            let store = BronzeStore::new(&config.pipeline.data_directory);
            let customer_snapshot = store.write_customers(csv_loader::load_customers(&customers)?)?;
            let order_snapshot = store.write_orders(xml_loader::load_orders(&orders)?)?;

            println!("✅ Bronze ingestion complete");
            println!("   Customer snapshot: {}", customer_snapshot.id);
            println!("   Order snapshot:    {}", order_snapshot.id);
            print_manifest("customers", &customer_snapshot.manifest);
            print_manifest("orders", &order_snapshot.manifest);
        }
        Commands::Run {
            customers,
            orders,
            engine,
            as_of,
        } => {
            apply_overrides(&mut config, engine, as_of)?;
            println!("🚀 Running full pipeline...");
            let run = pipeline::run(&config, &customers, &orders)?;

            match run.status {
                RunStatus::Success => println!("✅ Pipeline run {} succeeded", run.run_id),
                RunStatus::PartialSuccess => println!(
                    "⚠️  Pipeline run {} completed with data-quality issues",
                    run.run_id
                ),
            }
            print_manifest("customers", &run.customers_manifest);
            print_manifest("orders", &run.orders_manifest);
            println!(
                "   Quarantined: {} records, {} duplicates dropped",
                run.quarantine.quarantined(),
                run.quarantine.duplicate_customers + run.quarantine.duplicate_orders
            );
            for entry in &run.quarantine.entries {
                println!(
                    "      ⚠️  {:?} '{}': {} ({})",
                    entry.kind, entry.business_key, entry.reason, entry.detail
                );
            }
            println!("   Engine: {}", run.kpis.engine);
            println!();
            println!("{}", report::render_tables(&run.kpis));
        }
        Commands::Verify {
            customers,
            orders,
            as_of,
        } => {
            apply_overrides(&mut config, None, as_of)?;
            println!("🔍 Verifying engine equivalence...");
            let store = BronzeStore::new(&config.pipeline.data_directory);
            let customer_snapshot = store.write_customers(csv_loader::load_customers(&customers)?)?;
            let order_snapshot = store.write_orders(xml_loader::load_orders(&orders)?)?;
            let refined = silver::refine(&customer_snapshot.records, &order_snapshot.records);

            let as_of = gold::resolve_as_of(config.pipeline.as_of_override, &refined.orders);
            let mismatches =
                equivalence::verify(&config, &refined.customers, &refined.orders, as_of)?;

            if mismatches.is_empty() {
                info!("engines agree on all KPI tables");
                println!(
                    "✅ Engines agree on all four KPI tables ({} orders)",
                    refined.orders.len()
                );
            } else {
                println!("❌ Engines disagree:");
                for m in &mismatches {
                    println!("   - {}: {}", m.kpi, m.detail);
                }
                let first = mismatches.into_iter().next().expect("non-empty mismatches");
                return Err(PipelineError::ComputationMismatch {
                    kpi: first.kpi,
                    detail: first.detail,
                }
                .into());
            }
        }
    }
    Ok(())
}
