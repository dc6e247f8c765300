//! Inspect how the matcher sees CPU names.
//!
//! With no candidates, prints the normalized form and model key of `name`.
//! With candidates, scores each one and reports the best match.

use anyhow::{bail, Result};
use clap::Parser;
use cpu_spec_merge::config::DEFAULT_NAME_MATCH_THRESHOLD;
use cpu_spec_merge::scoring::{detect_manufacturer, CpuMatcher, ScoreDetail};

#[derive(Parser, Debug)]
#[command(name = "match-names")]
#[command(about = "Show normalization, model keys and similarity scores for CPU names")]
struct Args {
    name: String,

    candidates: Vec<String>,

    #[arg(long, default_value_t = DEFAULT_NAME_MATCH_THRESHOLD)]
    threshold: f64,
}

fn describe(matcher: &CpuMatcher, name: &str) {
    let key = matcher.extract_model_key(name).unwrap_or_else(|| "-".to_string());
    let vendor = detect_manufacturer(name).map_or_else(|| "-".to_string(), |m| m.to_string());
    println!("{:?}", name);
    println!("  normalized:   {:?}", matcher.normalize(name));
    println!("  model key:    {}", key);
    println!("  manufacturer: {}", vendor);
}

fn format_detail(detail: &ScoreDetail) -> String {
    match detail.exact {
        Some(kind) => format!("{:.3} (exact: {:?})", detail.total, kind),
        None => format!(
            "{:.3} (char {:.3}, sort {:.3}, set {:.3}, blended {:.3}, bonus {:.2})",
            detail.total,
            detail.char_ratio,
            detail.token_sort,
            detail.token_set,
            detail.blended,
            detail.bonus
        ),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    if !(0.0..=1.0).contains(&args.threshold) {
        bail!("--threshold must be within [0, 1], got {}", args.threshold);
    }

    let matcher = CpuMatcher::default();
    describe(&matcher, &args.name);

    if args.candidates.is_empty() {
        return Ok(());
    }

    println!();
    for candidate in &args.candidates {
        let detail = matcher.score_detail(&args.name, candidate);
        let mark = if detail.total >= args.threshold { "*" } else { " " };
        println!("{} {:<40} {}", mark, candidate, format_detail(&detail));
    }

    println!();
    match matcher.find_best_match(&args.name, &args.candidates, args.threshold) {
        Some(best) => println!("Best match: {:?} ({:.3})", best.candidate, best.score),
        None => println!("No candidate reaches {:.2}", args.threshold),
    }
    Ok(())
}
