mod config;

use clap::{Parser, Subcommand, ValueEnum};
use common::{Insanity, InsanityType, ReaderKey};
use config::Config;
use sanity::{descendant_reader_keys, render_report, SanityChecker};
use serde::Serialize;
use snapshot::{DeclaredSizeEstimator, Snapshot};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cache-sanity")]
#[command(about = "Detect insane field-cache usage in a cache snapshot", long_about = None)]
struct Cli {
    /// Log filter directive (overrides CACHE_SANITY_LOG).
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a snapshot for value mismatches and subreader overlaps.
    Check {
        /// Snapshot file (`.json` or `.json.gz`).
        snapshot: PathBuf,
        /// Attach size estimates to every entry (also CACHE_SANITY_ESTIMATE_RAM).
        #[arg(long)]
        estimate_ram: bool,
        /// Output format.
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Exit with an error when any finding is reported.
        #[arg(long)]
        strict: bool,
    },
    /// Print the reader hierarchy with descendant counts and cached fields.
    Tree {
        /// Snapshot file (`.json` or `.json.gz`).
        snapshot: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();

    let directive = cli.log_level.as_deref().unwrap_or(&config.log_filter);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if let Err(e) = dotenv {
        debug!("no .env loaded: {}", e);
    }

    match &cli.command {
        Commands::Check {
            snapshot,
            estimate_ram,
            format,
            strict,
        } => cmd_check(snapshot, *estimate_ram || config.estimate_ram, *format, *strict)?,
        Commands::Tree { snapshot } => cmd_tree(snapshot)?,
    }

    Ok(())
}

fn load(path: &Path) -> anyhow::Result<Snapshot> {
    use anyhow::Context;
    Snapshot::load(path).with_context(|| format!("Failed to load snapshot: {}", path.display()))
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

/// JSON shape of one finding.
#[derive(Debug, Serialize)]
struct FindingReport {
    kind: InsanityType,
    message: String,
    entries: Vec<String>,
}

impl From<&Insanity> for FindingReport {
    fn from(insanity: &Insanity) -> Self {
        Self {
            kind: insanity.kind(),
            message: insanity.message().to_string(),
            entries: insanity.entries().iter().map(ToString::to_string).collect(),
        }
    }
}

fn cmd_check(path: &Path, estimate_ram: bool, format: Format, strict: bool) -> anyhow::Result<()> {
    let snapshot = load(path)?;

    let mut checker = SanityChecker::new();
    if estimate_ram {
        checker.set_size_estimator(Some(Arc::new(DeclaredSizeEstimator)));
    }
    let insanity = checker.check_source(&snapshot)?;
    info!(
        snapshot = %path.display(),
        findings = insanity.len(),
        "sanity check finished"
    );

    match format {
        Format::Text => print_summary(&snapshot, &insanity),
        Format::Json => {
            let reports: Vec<FindingReport> = insanity.iter().map(FindingReport::from).collect();
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
    }

    if strict && !insanity.is_empty() {
        anyhow::bail!("{} insane cache usage pattern(s) found", insanity.len());
    }

    Ok(())
}

fn count_kind(insanity: &[Insanity], kind: InsanityType) -> usize {
    insanity.iter().filter(|i| i.kind() == kind).count()
}

fn print_summary(snapshot: &Snapshot, insanity: &[Insanity]) {
    println!("+------------------------------------------+");
    println!("| CACHE SANITY                             |");
    println!("+------------------------------------------+");
    println!("| Readers        : {:>22} |", snapshot.readers.len());
    println!("| Entries        : {:>22} |", snapshot.entries.len());
    println!(
        "| Value mismatch : {:>22} |",
        count_kind(insanity, InsanityType::ValueMismatch)
    );
    println!(
        "| Subreader      : {:>22} |",
        count_kind(insanity, InsanityType::Subreader)
    );
    println!("+------------------------------------------+");

    if insanity.is_empty() {
        println!("No insane cache usage detected.");
    } else {
        println!("\nFINDINGS:");
        print!("{}", render_report(insanity));
    }
}

// ---------------------------------------------------------------------------
// tree
// ---------------------------------------------------------------------------

fn cmd_tree(path: &Path) -> anyhow::Result<()> {
    let snapshot = load(path)?;

    let children: HashSet<ReaderKey> = snapshot
        .readers
        .values()
        .flat_map(ReaderKey::sub_reader_keys)
        .collect();
    let roots: Vec<&ReaderKey> = snapshot
        .readers
        .values()
        .filter(|key| !children.contains(*key))
        .collect();

    if roots.is_empty() {
        println!("No readers in snapshot.");
        return Ok(());
    }
    for root in roots {
        print_reader(&snapshot, root, 0);
    }

    Ok(())
}

fn print_reader(snapshot: &Snapshot, key: &ReaderKey, depth: usize) {
    let fields = snapshot.fields_of(key);
    println!(
        "{:indent$}{}  descendants={} fields=[{}]",
        "",
        key,
        descendant_reader_keys(key).len(),
        fields.join(", "),
        indent = depth * 2
    );
    for child in key.sub_reader_keys() {
        print_reader(snapshot, &child, depth + 1);
    }
}
