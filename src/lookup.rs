//! Code to description enrichment table
//!
//! Benefit offerings carry short category codes (`1a`, `7b`, `16`). The
//! lookup maps them to readable descriptions and is loaded once from a file
//! at process start.

use crate::error::{MergeError, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

static GLOBAL: OnceCell<CodeLookup> = OnceCell::new();

/// Static code -> description mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct CodeLookup {
    codes: HashMap<String, String>,
}

impl CodeLookup {
    pub fn new(codes: HashMap<String, String>) -> Self {
        CodeLookup { codes }
    }

    /// Description for `code`, or an empty string when the code is unknown
    pub fn describe(&self, code: &str) -> &str {
        self.codes.get(code).map(String::as_str).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Load a lookup file.
    ///
    /// `.yaml`/`.yml` and `.json` files hold a flat mapping; anything else is
    /// read as delimited text whose first two columns are code and description.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MergeError::MissingFile(path.to_path_buf()));
        }
        let entry = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|e| MergeError::io(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        let lookup = match extension.as_deref() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_slice(&bytes).map_err(|e| MergeError::parse(&entry, e))?
            }
            Some("json") => {
                serde_json::from_slice(&bytes).map_err(|e| MergeError::parse(&entry, e))?
            }
            _ => Self::from_delimited(&bytes, &entry)?,
        };

        info!(path = %entry, codes = lookup.len(), "loaded code lookup");
        Ok(lookup)
    }

    fn from_delimited(bytes: &[u8], entry: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let mut codes = HashMap::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record.map_err(|e| MergeError::parse(entry, e))?;
            match (record.get(0), record.get(1)) {
                (Some(code), Some(description)) => {
                    codes.insert(code.trim().to_string(), description.trim().to_string());
                }
                _ => {
                    return Err(MergeError::parse(
                        entry,
                        format!("line {}: expected code and description", idx + 2),
                    ))
                }
            }
        }
        Ok(CodeLookup { codes })
    }

    /// Install `self` as the process-wide lookup.
    ///
    /// The first installation wins; later calls keep the existing table.
    pub fn install(self) -> &'static CodeLookup {
        let mut fresh = Some(self);
        let installed = GLOBAL.get_or_init(|| fresh.take().unwrap_or_default());
        if fresh.is_some() {
            warn!("code lookup already installed, keeping the existing table");
        }
        installed
    }

    /// The process-wide lookup, empty when none was installed
    pub fn global() -> &'static CodeLookup {
        static EMPTY: OnceCell<CodeLookup> = OnceCell::new();
        GLOBAL
            .get()
            .unwrap_or_else(|| EMPTY.get_or_init(CodeLookup::default))
    }
}

impl FromIterator<(String, String)> for CodeLookup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        CodeLookup {
            codes: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CodeLookup {
    type Item = (String, String);
    type IntoIter = std::collections::hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.codes.into_iter()
    }
}
