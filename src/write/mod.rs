//! Table output
//!
//! [`TableWriter`] serializes a table to any `Write` in column and row order.
//! [`write_atomic`] writes a target file through a temporary file in the
//! same directory that only replaces the destination once the write has
//! completed, so a failed run never leaves truncated output behind.

use crate::table::{Record, Table};
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::info;

/// Serialization format of an output target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Header row then one line per row; nulls are empty fields
    Csv,
    /// A single JSON array of flat objects
    Json,
    /// One JSON object per line
    Jsonl,
}

impl OutputFormat {
    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(OutputFormat::Csv),
            "json" => Some(OutputFormat::Json),
            "jsonl" | "ndjson" => Some(OutputFormat::Jsonl),
            _ => None,
        }
    }
}

/// One output file
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputTarget {
    pub path: PathBuf,

    /// Defaults to the format implied by the extension
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

impl OutputTarget {
    pub fn new(path: impl Into<PathBuf>, format: OutputFormat) -> Self {
        OutputTarget {
            path: path.into(),
            format: Some(format),
        }
    }

    pub fn resolved_format(&self) -> Result<OutputFormat> {
        self.format
            .or_else(|| OutputFormat::from_path(&self.path))
            .ok_or_else(|| anyhow!("Cannot infer output format of {}", self.path.display()))
    }
}

/// Serializes tables to a single writer
pub struct TableWriter<W: Write> {
    writer: W,
    format: OutputFormat,
}

impl<W: Write> TableWriter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        TableWriter { writer, format }
    }

    pub fn write_table(&mut self, table: &Table) -> Result<()> {
        match self.format {
            OutputFormat::Csv => self.write_csv(table),
            OutputFormat::Json => {
                let records: Vec<Record<'_>> = table.records().collect();
                serde_json::to_writer(&mut self.writer, &records).context("Failed to serialize table")?;
                writeln!(self.writer).context("Failed to write table")
            }
            OutputFormat::Jsonl => {
                for record in table.records() {
                    let json = serde_json::to_string(&record).context("Failed to serialize row")?;
                    writeln!(self.writer, "{}", json).context("Failed to write row")?;
                }
                Ok(())
            }
        }
    }

    fn write_csv(&mut self, table: &Table) -> Result<()> {
        let mut csv = csv::Writer::from_writer(&mut self.writer);
        csv.write_record(table.columns()).context("Failed to write header")?;
        for row in table.rows() {
            csv.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))
                .context("Failed to write row")?;
        }
        csv.flush().context("Failed to flush CSV writer")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Write `table` to `target`, replacing the destination only on success
pub fn write_atomic(table: &Table, target: &OutputTarget) -> Result<()> {
    let format = target.resolved_format()?;
    let path = &target.path;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create directory {}", dir.display()))?;

    // dropped (and deleted) on any early return below
    let mut tmp = NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
    {
        let mut writer = TableWriter::new(BufWriter::new(&mut tmp), format);
        writer.write_table(table)?;
        writer.flush()?;
    }
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync {}", path.display()))?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to move output into place at {}", path.display()))?;

    info!(path = %path.display(), ?format, rows = table.len(), "wrote output");
    Ok(())
}
