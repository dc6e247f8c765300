//! Completeness analysis over a merged SQLite store.

use anyhow::{bail, Context, Result};
use clap::Parser;
use cpu_spec_merge::models::Field;
use cpu_spec_merge::quality::QualityScorer;
use cpu_spec_merge::storage::{SqliteStore, StoredCpu};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "quality-report")]
#[command(about = "Per-field completeness and lowest-quality CPUs in a merged database")]
struct Args {
    db: PathBuf,

    /// Number of lowest-quality CPUs to list
    #[arg(long, default_value = "20")]
    limit: usize,
}

fn field_completeness(cpus: &[StoredCpu]) -> Vec<(Field, usize)> {
    let mut counts: Vec<(Field, usize)> = Field::ALL
        .iter()
        .map(|&field| {
            let present = cpus.iter().filter(|c| c.fields.get(field).is_some()).count();
            (field, present)
        })
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn main() -> Result<()> {
    let args = Args::parse();
    if !args.db.exists() {
        bail!("Database not found: {:?}", args.db);
    }

    let store = SqliteStore::open(&args.db).context("Failed to open database")?;
    let mut cpus = store.load_all().context("Failed to read merged CPUs")?;
    if cpus.is_empty() {
        println!("No CPUs in {:?}", args.db);
        return Ok(());
    }
    let total = cpus.len();

    println!("{:=<60}", "");
    println!("Field completeness ({} CPUs)", total);
    println!("{:=<60}", "");
    for (field, present) in field_completeness(&cpus) {
        let pct = 100.0 * present as f64 / total as f64;
        println!("  {:<22} {:>7} {:>6.1}%", field.name(), present, pct);
    }

    let mean = cpus.iter().map(|c| c.quality_score).sum::<f64>() / total as f64;
    println!("\nMean quality score: {:.3}", mean);

    cpus.sort_by(|a, b| a.quality_score.total_cmp(&b.quality_score));
    let scorer = QualityScorer::default();

    println!("\nLowest quality:");
    for cpu in cpus.iter().take(args.limit) {
        let missing = scorer.missing_fields(&cpu.to_record());
        let shown: Vec<&str> = missing.iter().take(6).copied().collect();
        println!(
            "  {:.2}  {:<40} [{}] missing {}: {}",
            cpu.quality_score,
            cpu.name,
            cpu.source,
            missing.len(),
            shown.join(", ")
        );
    }

    Ok(())
}
