//! planmerge: Merge plan directory tables with nested benefit package JSON
//!
//! Usage:
//!   # Run the merge described by a config file
//!   planmerge --config merge.yaml
//!
//!   # Load, flatten and join without writing outputs
//!   planmerge --config merge.yaml --dry-run
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "planmerge")]
#[command(about = "Merge plan directory tables with nested plan benefit JSON", long_about = None)]
struct Args {
    /// Pipeline configuration (YAML)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Run every stage except writing outputs
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let report = planmerge::run_config(&args.config, args.dry_run)?;

    for diagnostic in &report.diagnostics {
        warn!("skipped {}", diagnostic);
    }
    info!(
        left = report.left_rows,
        right = report.right_rows,
        rows = report.rows,
        columns = report.columns.len(),
        "merge finished"
    );
    for path in &report.outputs {
        println!("{}", path.display());
    }

    Ok(())
}
