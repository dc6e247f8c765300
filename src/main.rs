use anyhow::{Context, Result};
use clap::Parser;
use cpu_spec_merge::config::{ConfigFile, MergeConfig};
use cpu_spec_merge::engine::{MergeEngine, MergeOutcome};
use cpu_spec_merge::models::{CollectorBatch, Diagnostic};
use cpu_spec_merge::progress::{format_duration, Progress};
use cpu_spec_merge::safety::validate_output_path;
use cpu_spec_merge::sources::SourceCatalog;
use cpu_spec_merge::storage::{write_json_export, SqliteStore};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cpu-spec-merge")]
#[command(about = "Merge CPU specification records from multiple collectors into one record per CPU")]
struct Args {
    /// Collector batch files (JSON: {source, priority?, records: [..]})
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// TOML config file ([merge] policies, [sources] tiers)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name match threshold in [0, 1]; overrides the config file
    #[arg(long)]
    threshold: Option<f64>,

    /// SQLite database to upsert merged records into
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON export of merged records
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write run statistics as JSON
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Threads used to load input files (0 = all cores)
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Hide progress bars and print tail-friendly progress lines
    #[arg(long)]
    log_only: bool,

    /// Print up to N low-quality CPUs with their missing fields
    #[arg(long, default_value = "10")]
    show_missing: usize,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cpu_spec_merge=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<(MergeConfig, SourceCatalog)> {
    let (config, catalog) = match &args.config {
        Some(path) => {
            let file = ConfigFile::load(path)
                .with_context(|| format!("Failed to load config file {:?}", path))?;
            (
                file.merge_config().context("Invalid [merge] section")?,
                file.catalog().context("Invalid [sources] section")?,
            )
        }
        None => (MergeConfig::default(), SourceCatalog::default()),
    };

    let config = match args.threshold {
        Some(t) => config
            .with_name_match_threshold(t)
            .context("Invalid --threshold")?,
        None => config,
    };
    Ok((config, catalog))
}

fn read_batch(path: &Path) -> Result<CollectorBatch> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let mut batch: CollectorBatch = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse collector batch {:?}", path))?;
    if batch.source.trim().is_empty() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            batch.source = stem.to_string();
        }
    }
    Ok(batch)
}

fn load_batches(inputs: &[PathBuf], progress: Progress) -> Result<Vec<CollectorBatch>> {
    let spinner = progress.spinner(&format!("Loading {} collector files", inputs.len()));
    let batches = inputs
        .par_iter()
        .map(|path| read_batch(path))
        .collect::<Result<Vec<_>>>()?;
    spinner.finish_and_clear();

    for (path, batch) in inputs.iter().zip(&batches) {
        println!("  {:<20} {:>8} records  ({:?})", batch.source, batch.records.len(), path);
    }
    Ok(batches)
}

fn write_database(path: &Path, outcome: &MergeOutcome, progress: Progress) -> Result<()> {
    println!("Writing database: {:?}", path);
    let mut store = SqliteStore::open(path).context("Failed to open output database")?;

    let total = outcome.records.len() as u64;
    let pb = progress.bar(total, "Upserting CPUs");
    let mut written = 0u64;
    let summary = store
        .upsert_batched(&outcome.records, || {
            written += 1;
            pb.inc(1);
            progress.log("WRITE", written, total, 1_000);
        })
        .context("Failed to write merged records")?;
    pb.finish_and_clear();

    println!("  Inserted: {}, updated: {}", summary.inserted, summary.updated);
    Ok(())
}

fn print_review_list(outcome: &MergeOutcome, threshold: f64, limit: usize) {
    if limit == 0 {
        return;
    }
    let mut low: Vec<_> = outcome.needs_review(threshold).collect();
    if low.is_empty() {
        return;
    }
    low.sort_by(|a, b| a.quality_score.total_cmp(&b.quality_score));

    println!("\nLowest quality ({} below {:.2}):", low.len(), threshold);
    for record in low.iter().take(limit) {
        let missing: Vec<&str> = record.missing_fields.iter().take(5).copied().collect();
        println!(
            "  {:.2}  {:<40} missing: {}",
            record.quality_score,
            record.record.name,
            missing.join(", ")
        );
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    if args.workers > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(args.workers)
            .build_global()
            .context("Failed to set thread pool size")?;
    }

    let input_refs: Vec<&Path> = args.inputs.iter().map(PathBuf::as_path).collect();
    if let Some(db) = &args.db {
        validate_output_path(db, &input_refs, &["sqlite3", "sqlite", "db"])?;
    }
    for json in [&args.json, &args.stats].into_iter().flatten() {
        validate_output_path(json, &input_refs, &["json"])?;
    }

    let start = Instant::now();
    let progress = Progress::new(args.log_only);
    let (config, catalog) = load_config(&args)?;
    let review_threshold = config.review_threshold();

    let batches = load_batches(&args.inputs, progress)?;
    let engine = MergeEngine::with_catalog(config, catalog);

    let spinner = progress.spinner("Merging");
    let outcome = engine.merge_batches(batches);
    spinner.finish_and_clear();
    outcome.stats.log_phase("merge");

    let conflicts = outcome
        .diagnostics
        .iter()
        .filter(|d| matches!(d, Diagnostic::SignificantConflict { .. }))
        .count();

    if let Some(db) = &args.db {
        write_database(db, &outcome, progress)?;
    }
    if let Some(json) = &args.json {
        println!("Writing JSON export: {:?}", json);
        write_json_export(json, &outcome.records).context("Failed to write JSON export")?;
    }
    if let Some(stats) = &args.stats {
        outcome
            .stats
            .write_to_file(stats)
            .context("Failed to write stats file")?;
    }

    print_review_list(&outcome, review_threshold, args.show_missing);

    let stats = &outcome.stats;
    println!("\n{:=<60}", "");
    println!("Merge complete!");
    println!("  Input records: {}", stats.total_input);
    println!("  Skipped (malformed): {}", stats.skipped);
    println!("  CPUs: {}", stats.groups);
    println!("  Multi-source: {} ({:.1}%)", stats.merged, stats.merge_rate());
    println!("  Gaps filled: {}", stats.gaps_filled);
    println!("  Conflicts resolved: {} ({} significant)", stats.conflicts_resolved, conflicts);
    println!("  Low quality: {}", stats.low_quality);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");

    Ok(())
}
