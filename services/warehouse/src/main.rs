//! Warehouse Loader - builds the sales star schema from a flat export
//!
//! Responsibilities:
//! - Read the sales export (CSV, nine fixed columns)
//! - Build DateDim, ProductDim, RegionDim, PaymentDim with surrogate keys
//! - Resolve the four keys for every transaction and assemble FactSales
//! - Replace the stored snapshot in one transaction
//!
//! Usage:
//!   # Load (destructive: previous contents of the five tables are replaced)
//!   cargo run --bin warehouse -- --input online_sales.csv
//!
//!   # Build and report only
//!   cargo run --bin warehouse -- --input online_sales.csv --dry-run
//!
//!   # Check stored DateDim against freshly derived calendar fields
//!   cargo run --bin warehouse -- --verify

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use warehouse::verify::verify_date_dimension;
use warehouse::{load_source, plan_load, Config, EtlError, RunSummary, Warehouse};

#[derive(Parser, Debug)]
#[command(name = "warehouse", about = "Loads a sales export into a star schema")]
struct Args {
    /// Sales export to load
    #[arg(long, default_value = "online_sales.csv")]
    input: PathBuf,

    /// Dry run - build everything but don't touch the database
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Verify mode - check stored DateDim rows instead of loading
    #[arg(long, default_value = "false")]
    verify: bool,

    /// Print the run summary as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

/// Attach the failing stage to the error chain
fn staged(err: EtlError) -> anyhow::Error {
    let stage = err.stage();
    anyhow::Error::new(err).context(format!("{} failed", stage))
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("Source rows:   {}", summary.source_rows);
    println!("DateDim:       {}", summary.date_rows);
    println!("ProductDim:    {}", summary.product_rows);
    println!("RegionDim:     {}", summary.region_rows);
    println!("PaymentDim:    {}", summary.payment_rows);
    println!("FactSales:     {}", summary.fact_rows);
    println!(
        "Null keys:     {} facts ({} without a date)",
        summary.facts_with_null_key, summary.null_date_keys
    );
    println!("Units sold:    {}", summary.units_sold);
    println!("Revenue:       {}", summary.total_revenue);
    Ok(())
}

async fn run_verify(config: &Config) -> Result<()> {
    let warehouse = Warehouse::connect(config).await.map_err(staged)?;
    let rows = warehouse.load_date_dimension().await.map_err(staged);
    warehouse.close().await;
    let rows = rows?;

    let mismatches = verify_date_dimension(&rows).map_err(staged)?;
    println!("Checked {} DateDim rows", rows.len());
    for m in mismatches.iter().take(10) {
        println!(
            "  DateKey {} ({}): {} stored '{}', derived '{}'",
            m.date_key, m.full_date, m.field, m.stored, m.derived
        );
    }
    if mismatches.len() > 10 {
        println!("  ... and {} more", mismatches.len() - 10);
    }

    if !mismatches.is_empty() {
        anyhow::bail!("{} derived date fields differ from FullDate", mismatches.len());
    }
    println!("DateDim derived fields match");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries only the summary
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env().context("Failed to read configuration")?;

    if args.verify {
        return run_verify(&config).await;
    }

    // JSON output stays machine-readable: no banners
    let banner = !args.json;
    if banner {
        println!("=== Sales Warehouse Loader ===");
        println!("Input: {}", args.input.display());
        println!("Mode: {}", if args.dry_run { "dry-run" } else { "replace" });
    }

    let records = load_source(&args.input).await.map_err(staged)?;
    let plan = plan_load(&records).map_err(staged)?;
    let summary = plan.summary(records.len());

    if args.dry_run {
        if banner {
            println!("\nDry run - nothing written to the database");
        }
        return print_summary(&summary, args.json);
    }

    let warehouse = Warehouse::connect(&config).await.map_err(staged)?;
    let result = async {
        warehouse.ensure_schema().await?;
        warehouse.replace(&plan.dimensions, &plan.facts).await
    }
    .await;
    warehouse.close().await;

    let counts = result.map_err(staged)?;
    tracing::debug!(?counts, "load committed");

    if banner {
        println!("\n=== Load Complete ===");
    }
    print_summary(&summary, args.json)
}
