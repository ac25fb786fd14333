//! Load -> flatten -> join -> write, driven by a [`PipelineConfig`]
//!
//! Every stage runs to completion before the next starts, and outputs are
//! only written once the joined table exists, so a fatal error never leaves
//! output files behind.

pub mod config;

pub use config::{PipelineConfig, SourceConfig};

use crate::error::Result;
use crate::flatten::{flatten_collections, select_parents, FlattenSpec, Flattener};
use crate::join::join;
use crate::load::{self, Diagnostic, InputFormat};
use crate::lookup::CodeLookup;
use crate::table::Table;
use crate::write::write_atomic;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// A loaded, flattened and aliased source
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub table: Table,
    pub diagnostics: Vec<Diagnostic>,
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub left_rows: usize,
    pub right_rows: usize,
    pub rows: usize,
    pub columns: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub outputs: Vec<PathBuf>,
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    lookup: &'a CodeLookup,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig, lookup: &'a CodeLookup) -> Self {
        Pipeline { config, lookup }
    }

    /// Load both sides and join them, without writing anything
    pub fn merge(&self) -> Result<(Table, RunReport)> {
        let left = load_source(&self.config.left, self.lookup, "left")?;
        let right = load_source(&self.config.right, self.lookup, "right")?;

        let merged = join(&left.table, &right.table, &self.config.join)?;
        info!(rows = merged.len(), columns = ?merged.columns(), "merged");

        let mut diagnostics = left.diagnostics;
        diagnostics.extend(right.diagnostics);

        let report = RunReport {
            left_rows: left.table.len(),
            right_rows: right.table.len(),
            rows: merged.len(),
            columns: merged.columns().to_vec(),
            diagnostics,
            outputs: Vec::new(),
        };
        Ok((merged, report))
    }

    /// Merge and write every configured output; `dry_run` skips the writes
    #[instrument(level = "info", skip(self))]
    pub fn run(&self, dry_run: bool) -> anyhow::Result<RunReport> {
        let (merged, mut report) = self.merge()?;

        if !report.diagnostics.is_empty() {
            warn!(
                skipped = report.diagnostics.len(),
                "some archive entries could not be parsed and were skipped"
            );
        }

        if dry_run {
            info!(rows = report.rows, "dry run, no outputs written");
            return Ok(report);
        }

        for target in &self.config.outputs {
            write_atomic(&merged, target)?;
            report.outputs.push(target.path.clone());
        }
        info!(rows = report.rows, outputs = report.outputs.len(), "done");
        Ok(report)
    }
}

/// Load one side of the join: read, flatten when JSON, alias, select
#[instrument(level = "info", skip(source, lookup), fields(path = %source.path.display()))]
pub fn load_source(source: &SourceConfig, lookup: &CodeLookup, side: &str) -> Result<LoadedSource> {
    let format = source.resolved_format()?;
    let selection = source.archive_selection();
    let mut diagnostics = Vec::new();

    let mut table = match format {
        InputFormat::Csv => {
            let delimiter = source.delimiter_byte()?;
            match &selection {
                Some(selection) => {
                    let mut loaded = load::load_archive_delimited(&source.path, selection, delimiter)?;
                    diagnostics = std::mem::take(&mut loaded.diagnostics);
                    Table::concat(loaded.into_values())
                }
                None => load::load_delimited(&source.path, delimiter)?,
            }
        }
        InputFormat::Json => {
            let documents = match &selection {
                Some(selection) => {
                    let mut loaded = load::load_archive_json(&source.path, selection)?;
                    diagnostics = std::mem::take(&mut loaded.diagnostics);
                    loaded.into_values()
                }
                None => vec![load::load_json(&source.path)?],
            };
            documents_to_table(&documents, source, lookup)?
        }
        InputFormat::Jsonl => {
            let documents = load::load_json_lines(&source.path)?;
            documents_to_table(&documents, source, lookup)?
        }
    };

    info!(side, rows = table.len(), columns = ?table.columns(), "loaded source");

    source.aliases.apply(&mut table)?;
    if let Some(columns) = &source.select {
        table = table.select(columns)?;
    }

    Ok(LoadedSource { table, diagnostics })
}

/// Flatten the configured collections, or take each parent as one row
fn documents_to_table(documents: &[Value], source: &SourceConfig, lookup: &CodeLookup) -> Result<Table> {
    let parents = select_parents(documents, &source.parents)?;
    if parents.is_empty() && !documents.is_empty() && !source.parents.is_empty() {
        warn!(path = ?source.parents, "no parent records found");
    }

    if source.collections.is_empty() {
        let whole = FlattenSpec::default();
        Flattener::new(&whole, lookup).flatten_all(parents.iter().copied())
    } else {
        flatten_collections(&parents, &source.collections, lookup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MergeError;
    use crate::join::{Cardinality, JoinMode, JoinSpec, KeyPair};
    use crate::write::{OutputFormat, OutputTarget};
    use serde_json::json;
    use tempfile::tempdir;

    fn config(left: SourceConfig, right: SourceConfig, join: JoinSpec, outputs: Vec<OutputTarget>) -> PipelineConfig {
        PipelineConfig {
            code_lookup: None,
            codes: Default::default(),
            left,
            right,
            join,
            outputs,
        }
    }

    #[test]
    fn test_json_array_source_becomes_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extras.json");
        std::fs::write(
            &path,
            json!([{"id": "A", "extra": "X"}, {"id": "B", "extra": "Y"}]).to_string(),
        )
        .unwrap();

        let loaded = load_source(&SourceConfig::new(&path), &CodeLookup::default(), "right").unwrap();
        assert_eq!(loaded.table.columns(), ["id", "extra"]);
        assert_eq!(loaded.table.len(), 2);
    }

    #[test]
    fn test_merge_left_join_scenario() {
        let dir = tempdir().unwrap();
        let left_path = dir.path().join("plans.csv");
        std::fs::write(&left_path, "id,name\nA,Plan A\n").unwrap();
        let right_path = dir.path().join("extras.jsonl");
        std::fs::write(
            &right_path,
            "{\"id\": \"A\", \"extra\": \"X\"}\n{\"id\": \"B\", \"extra\": \"Y\"}\n",
        )
        .unwrap();

        let output = dir.path().join("merged.json");
        let cfg = config(
            SourceConfig::new(&left_path),
            SourceConfig::new(&right_path),
            JoinSpec::new(JoinMode::Left, vec![KeyPair::same("id")], Cardinality::ManyToOne),
            vec![OutputTarget::new(&output, OutputFormat::Json)],
        );
        let lookup = CodeLookup::default();

        let report = Pipeline::new(&cfg, &lookup).run(true).unwrap();
        assert_eq!(report.rows, 1);
        assert!(!output.exists());

        let report = Pipeline::new(&cfg, &lookup).run(false).unwrap();
        assert_eq!(report.outputs, vec![output.clone()]);
        let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written, json!([{"id": "A", "name": "Plan A", "extra": "X"}]));
    }

    #[test]
    fn test_fatal_error_writes_nothing() {
        let dir = tempdir().unwrap();
        let left_path = dir.path().join("plans.csv");
        std::fs::write(&left_path, "id,name\nA,Plan A\n").unwrap();
        let right_path = dir.path().join("extras.csv");
        std::fs::write(&right_path, "id,extra\nA,X\nA,Z\n").unwrap();

        let output = dir.path().join("merged.csv");
        let cfg = config(
            SourceConfig::new(&left_path),
            SourceConfig::new(&right_path),
            JoinSpec::new(JoinMode::Left, vec![KeyPair::same("id")], Cardinality::ManyToOne),
            vec![OutputTarget::new(&output, OutputFormat::Csv)],
        );
        let lookup = CodeLookup::default();

        let err = Pipeline::new(&cfg, &lookup).run(false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MergeError>(),
            Some(MergeError::CardinalityViolation { .. })
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_tsv_source_splits_on_tabs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("plans.tsv");
        std::fs::write(&path, "id\tname\nA\tPlan A\n").unwrap();

        let loaded = load_source(&SourceConfig::new(&path), &CodeLookup::default(), "left").unwrap();
        assert_eq!(loaded.table.columns(), ["id", "name"]);
        assert_eq!(loaded.table.get(0, "name"), Some("Plan A"));
    }

    #[test]
    fn test_zipped_csv_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pbp.zip");
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        for (name, body) in [
            ("pbp/plans.json", "{}"),
            ("pbp/BasicBenefits.csv", "PLAN_ID,LIS_FLAG\n001,Y\n002,N\n"),
        ] {
            zip.start_file(name, zip::write::SimpleFileOptions::default()).unwrap();
            std::io::Write::write_all(&mut zip, body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();

        let mut source = SourceConfig::new(&path);
        source.format = Some(InputFormat::Csv);

        let loaded = load_source(&source, &CodeLookup::default(), "right").unwrap();
        assert_eq!(loaded.table.columns(), ["PLAN_ID", "LIS_FLAG"]);
        assert_eq!(loaded.table.len(), 2);
    }

    #[test]
    fn test_select_after_aliases() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("BasicBenefits.csv");
        std::fs::write(&path, "PLAN_ID,LIS_FLAG,NOISE\n001,Y,x\n").unwrap();

        let mut source = SourceConfig::new(&path);
        source.aliases.renames.insert("PLAN_ID".into(), "plan_id".into());
        source.select = Some(vec!["plan_id".into(), "LIS_FLAG".into()]);

        let loaded = load_source(&source, &CodeLookup::default(), "right").unwrap();
        assert_eq!(loaded.table.columns(), ["plan_id", "LIS_FLAG"]);

        source.select = Some(vec!["PLAN_ID".into()]);
        let err = load_source(&source, &CodeLookup::default(), "right").unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch(_)));
    }
}
