//! Delimited text loading
//!
//! Every field loads as text; empty fields load as null.

use crate::error::{MergeError, Result};
use crate::load::ensure_exists;
use crate::table::{Cell, Table};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, instrument};

/// Load a delimited file with a header row
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_delimited<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Table> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let file = File::open(path).map_err(|e| MergeError::io(path, e))?;
    let table = read_delimited(BufReader::new(file), delimiter, &path.display().to_string())?;
    info!(rows = table.len(), columns = ?table.columns(), "loaded delimited file");
    Ok(table)
}

/// Parse delimited text from any reader; `entry` names the source in errors
pub fn read_delimited<R: Read>(reader: R, delimiter: u8, entry: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| MergeError::parse(entry, e))?
        .iter()
        .map(str::to_string)
        .collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(MergeError::parse(entry, "no header row"));
    }

    let mut table = Table::new(dedupe_headers(headers))?;
    let width = table.width();

    for record in reader.records() {
        let record = record.map_err(|e| MergeError::parse(entry, e))?;
        if record.len() > width {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            return Err(MergeError::parse(
                entry,
                format!("line {}: expected {} fields, saw {}", line, width, record.len()),
            ));
        }

        let mut row: Vec<Cell> = record
            .iter()
            .map(|field| (!field.is_empty()).then(|| field.to_string()))
            .collect();
        row.resize(width, None);
        table.push_row(row)?;
    }

    Ok(table)
}

/// Rename repeated header names to `name.1`, `name.2`, ...
fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(headers.len());
    let mut out = Vec::with_capacity(headers.len());
    for header in headers {
        let mut name = header.clone();
        let mut n = 0;
        while taken.contains(&name) {
            n += 1;
            name = format!("{}.{}", header, n);
        }
        taken.insert(name.clone());
        out.push(name);
    }
    out
}
