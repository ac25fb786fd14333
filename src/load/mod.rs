//! Input loading
//!
//! Delimited text becomes a [`Table`](crate::table::Table) straight away.
//! JSON stays a `serde_json::Value` tree until the flattener turns it into
//! rows. Either can come from a plain file or from entries of a zip archive.

pub mod archive;
pub mod delimited;

pub use archive::{load_archive_delimited, load_archive_json, ArchiveLoad, Diagnostic, EntrySelection};
pub use delimited::{load_delimited, read_delimited};

use crate::error::{MergeError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, instrument};

/// Declared format of an input file or of the entries inside an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Json,
    Jsonl,
}

pub(crate) fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(MergeError::MissingFile(path.to_path_buf()))
    }
}

/// Load a standalone JSON document
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let file = File::open(path).map_err(|e| MergeError::io(path, e))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| MergeError::parse(path.display().to_string(), e))?;
    info!("loaded JSON document");
    Ok(value)
}

/// Load newline-delimited JSON, one document per non-blank line
#[instrument(level = "info", skip(path), fields(path = %path.as_ref().display()))]
pub fn load_json_lines<P: AsRef<Path>>(path: P) -> Result<Vec<Value>> {
    let path = path.as_ref();
    ensure_exists(path)?;
    let file = File::open(path).map_err(|e| MergeError::io(path, e))?;

    let mut documents = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| MergeError::io(path, e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value = serde_json::from_str(line).map_err(|e| {
            MergeError::parse(format!("{}:{}", path.display(), idx + 1), e)
        })?;
        documents.push(value);
    }

    info!(documents = documents.len(), "loaded JSON lines");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_load_json_keeps_key_order_and_literals() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pbp.json");
        std::fs::write(&path, r#"{"zeta": 1.10, "alpha": "001"}"#).unwrap();

        let value = load_json(&path).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha"]);
        assert_eq!(value["zeta"].to_string(), "1.10");
    }

    #[test]
    fn test_load_json_parse_error_names_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{\"pbp\": [").unwrap();
        let err = load_json(&path).unwrap_err();
        assert!(matches!(err, MergeError::Parse { entry, .. } if entry.ends_with("broken.json")));
    }

    #[test]
    fn test_load_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phase1.jsonl");
        std::fs::write(&path, "{\"planId\": \"001\"}\n\n{\"planId\": \"002\"}\n").unwrap();

        let documents = load_json_lines(&path).unwrap();
        assert_eq!(documents, vec![json!({"planId": "001"}), json!({"planId": "002"})]);

        std::fs::write(&path, "{\"planId\": \"001\"}\nnope\n").unwrap();
        let err = load_json_lines(&path).unwrap_err();
        assert!(matches!(err, MergeError::Parse { entry, .. } if entry.ends_with(":2")));
    }

    #[test]
    fn test_missing_json() {
        let dir = tempdir().unwrap();
        let err = load_json(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, MergeError::MissingFile(_)));
    }
}
