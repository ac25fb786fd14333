//! # planmerge - Plan Benefit Data Merger
//!
//! Loads plan directory tables and nested plan-benefit-package JSON, flattens
//! the nested benefit offerings into rows, joins the two on shared identifier
//! columns and writes the merged table.
//!
//! ## Modules
//!
//! - **load**: delimited text, JSON and JSON lines, standalone or inside zip archives
//! - **flatten**: expand nested arrays into rows, copying parent meta fields
//! - **join**: inner/left joins with suffixing and cardinality checks
//! - **write**: CSV, JSON and JSON lines output, written atomically
//! - **pipeline**: the YAML-configured run wiring the stages together
//!
//! ## Quick Start
//!
//! ```rust
//! use planmerge::{join, Cardinality, JoinMode, JoinSpec, KeyPair, Table};
//!
//! # fn main() -> anyhow::Result<()> {
//! let plans = Table::from_records(vec![vec![
//!     ("id".to_string(), Some("A".to_string())),
//!     ("name".to_string(), Some("Plan A".to_string())),
//! ]]);
//! let extras = Table::from_records(vec![
//!     vec![("id".to_string(), Some("A".to_string())), ("extra".to_string(), Some("X".to_string()))],
//!     vec![("id".to_string(), Some("B".to_string())), ("extra".to_string(), Some("Y".to_string()))],
//! ]);
//!
//! let spec = JoinSpec::new(JoinMode::Left, vec![KeyPair::same("id")], Cardinality::ManyToOne);
//! let merged = join(&plans, &extras, &spec)?;
//!
//! assert_eq!(merged.columns(), ["id", "name", "extra"]);
//! assert_eq!(merged.len(), 1);
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

pub mod error;
pub mod flatten;
pub mod join;
pub mod load;
pub mod lookup;
pub mod pipeline;
pub mod table;
pub mod write;

// Re-export commonly used types for convenience
pub use error::MergeError;
pub use flatten::{flatten_collections, FlattenSpec, Flattener};
pub use join::{join, Cardinality, JoinMode, JoinSpec, KeyPair};
pub use load::{Diagnostic, EntrySelection, InputFormat};
pub use lookup::CodeLookup;
pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use table::{Cell, ColumnAliases, Table};
pub use write::{write_atomic, OutputFormat, OutputTarget, TableWriter};

/// Main entry point: run the pipeline described by a YAML config file.
///
/// The config's code lookup is installed as the process-wide table before
/// any source is loaded.
pub fn run_config<P: AsRef<Path>>(config_path: P, dry_run: bool) -> Result<RunReport> {
    let config_path = config_path.as_ref();
    let config = PipelineConfig::from_path(config_path)?;

    let lookup = config
        .code_lookup()
        .context("Failed to load code lookup")?
        .install();
    info!(codes = lookup.len(), config = %config_path.display(), "starting merge");

    Pipeline::new(&config, lookup).run(dry_run)
}
