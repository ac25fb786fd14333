//! planmerge-flatten: Flatten one nested JSON collection into a table
//!
//! Usage:
//!   # Offerings of every plan in a document, as CSV on stdout
//!   planmerge-flatten plans.json --parents pbp \
//!       --record-path benefitOfferings.medicare.medicareBenefitOfferingDetails \
//!       --meta contractId,planId --coded categoryCode --lookup codes.yaml
//!
//!   # Every JSON entry of an archive, written as JSON lines
//!   planmerge-flatten pbp_json.zip --entry-pattern 'H\d+.*\.json$' \
//!       --parents pbp --record-path benefitOfferings.nonMedicare.nonMedicareBenefitOfferingDetails \
//!       --output offerings.jsonl

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use planmerge::flatten::{path::split_dotted, select_parents};
use planmerge::load::{self, EntrySelection};
use planmerge::{write_atomic, CodeLookup, FlattenSpec, Flattener, OutputFormat, OutputTarget, TableWriter};
use serde_json::Value;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "planmerge-flatten")]
#[command(about = "Flatten a nested JSON collection into rows", long_about = None)]
struct Args {
    /// JSON, JSON lines or zip archive of JSON documents
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Dotted path from each parent record to the nested array
    #[arg(long)]
    record_path: String,

    /// Dotted path from each document to its parent records
    #[arg(long)]
    parents: Option<String>,

    /// Comma-separated dotted parent fields copied onto every row
    #[arg(long)]
    meta: Option<String>,

    /// Child field whose code gets a `description` column
    #[arg(long)]
    coded: Option<String>,

    /// Code lookup file (YAML, JSON or CSV)
    #[arg(long, requires = "coded")]
    lookup: Option<PathBuf>,

    /// Regex selecting archive entries; every match is loaded
    #[arg(long)]
    entry_pattern: Option<String>,

    /// Output format (default: from the output extension, else csv)
    #[arg(long, value_parser = ["csv", "json", "jsonl"])]
    format: Option<String>,

    /// Output file (stdout if omitted)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let lookup = match &args.lookup {
        Some(path) => CodeLookup::from_path(path)?.install(),
        None => CodeLookup::global(),
    };

    let mut spec = FlattenSpec::new(split_dotted(&args.record_path));
    if let Some(meta) = &args.meta {
        spec = spec.with_meta(meta.split(',').map(str::trim).filter(|s| !s.is_empty()));
    }
    if let Some(field) = &args.coded {
        spec = spec.with_coded_field(field.as_str(), "description");
    }

    let documents = read_documents(&args)?;
    let parents_path = args.parents.as_deref().map(split_dotted).unwrap_or_default();
    let parents = select_parents(&documents, &parents_path)?;
    let table = Flattener::new(&spec, lookup).flatten_all(parents.iter().copied())?;
    info!(parents = parents.len(), rows = table.len(), "flattened");

    let format = match args.format.as_deref() {
        Some("json") => OutputFormat::Json,
        Some("jsonl") => OutputFormat::Jsonl,
        Some(_) => OutputFormat::Csv,
        None => args
            .output
            .as_deref()
            .and_then(OutputFormat::from_path)
            .unwrap_or(OutputFormat::Csv),
    };

    match args.output {
        Some(path) => write_atomic(&table, &OutputTarget::new(path, format))?,
        None => {
            let stdout = std::io::stdout();
            let mut writer = TableWriter::new(BufWriter::new(stdout.lock()), format);
            writer.write_table(&table)?;
            writer.flush()?;
        }
    }

    Ok(())
}

fn read_documents(args: &Args) -> Result<Vec<Value>> {
    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let documents = match extension.as_deref() {
        Some("zip") => {
            let selection = match &args.entry_pattern {
                Some(pattern) => EntrySelection::pattern(pattern.as_str()),
                None => EntrySelection::default(),
            }
            .batch();
            let loaded = load::load_archive_json(&args.input, &selection)?;
            for diagnostic in &loaded.diagnostics {
                warn!("skipped {}", diagnostic);
            }
            loaded.into_values()
        }
        Some("jsonl") | Some("ndjson") => load::load_json_lines(&args.input)?,
        _ => vec![load::load_json(&args.input)?],
    };

    if documents.is_empty() {
        let mut stderr = std::io::stderr();
        writeln!(stderr, "⚠ Warning: no JSON documents read from {}", args.input.display())
            .context("Failed to write to stderr")?;
    }
    Ok(documents)
}
