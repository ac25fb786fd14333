//! YAML pipeline configuration
//!
//! ```yaml
//! code_lookup: codes.yaml
//! left:
//!   path: phase1.csv
//!   aliases:
//!     normalize_whitespace: true
//!     renames: { "Contract Number": contractId }
//! right:
//!   path: pbp_json.zip
//!   format: json
//!   archive: { batch: true }
//!   parents: [pbp]
//!   collections:
//!     - record_path: [benefitOfferings, medicare, medicareBenefitOfferingDetails]
//!       meta: [contractId, planId, planCharacteristics.planName]
//!       coded_fields: [{ field: categoryCode }]
//! join:
//!   mode: left
//!   keys: [{ left: contractId, right: contractId }]
//!   validate: many_to_many
//! outputs:
//!   - { path: merged.csv }
//! ```

use crate::error::MergeError;
use crate::flatten::FlattenSpec;
use crate::join::JoinSpec;
use crate::load::{EntrySelection, InputFormat};
use crate::lookup::CodeLookup;
use crate::table::ColumnAliases;
use crate::write::OutputTarget;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A full merge run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// File holding the code -> description table
    #[serde(default)]
    pub code_lookup: Option<PathBuf>,

    /// Inline codes, taking precedence over `code_lookup`
    #[serde(default)]
    pub codes: HashMap<String, String>,

    pub left: SourceConfig,
    pub right: SourceConfig,
    pub join: JoinSpec,

    #[serde(default)]
    pub outputs: Vec<OutputTarget>,
}

/// One side of the join
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub path: PathBuf,

    /// Format of the file, or of the selected entries when `path` is an archive.
    /// Inferred from the extension when omitted.
    #[serde(default)]
    pub format: Option<InputFormat>,

    /// Field delimiter; a tab for `.tsv` paths, a comma otherwise
    #[serde(default)]
    pub delimiter: Option<char>,

    /// Entry selection; implied with defaults for `.zip` paths
    #[serde(default)]
    pub archive: Option<EntrySelection>,

    /// Path to the parent records inside each JSON document
    #[serde(default)]
    pub parents: Vec<String>,

    /// Nested collections to flatten out of each parent
    #[serde(default)]
    pub collections: Vec<FlattenSpec>,

    #[serde(default)]
    pub aliases: ColumnAliases,

    /// Columns to keep, in order, after aliasing
    #[serde(default)]
    pub select: Option<Vec<String>>,
}

impl SourceConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SourceConfig {
            path: path.into(),
            format: None,
            delimiter: None,
            archive: None,
            parents: Vec::new(),
            collections: Vec::new(),
            aliases: ColumnAliases::default(),
            select: None,
        }
    }

    fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
    }

    /// Entry selection when the source is an archive
    pub fn archive_selection(&self) -> Option<EntrySelection> {
        match (&self.archive, self.extension().as_deref()) {
            (Some(selection), _) => Some(selection.clone()),
            (None, Some("zip")) => Some(EntrySelection::default()),
            _ => None,
        }
    }

    pub fn resolved_format(&self) -> std::result::Result<InputFormat, MergeError> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        match self.extension().as_deref() {
            Some("csv") | Some("tsv") | Some("txt") => Ok(InputFormat::Csv),
            Some("json") => Ok(InputFormat::Json),
            Some("jsonl") | Some("ndjson") => Ok(InputFormat::Jsonl),
            Some("zip") => Ok(InputFormat::Json),
            _ => Err(MergeError::Config(format!(
                "cannot infer the format of {}, set `format`",
                self.path.display()
            ))),
        }
    }

    pub fn delimiter_byte(&self) -> std::result::Result<u8, MergeError> {
        let delimiter = match (self.delimiter, self.extension().as_deref()) {
            (Some(delimiter), _) => delimiter,
            (None, Some("tsv")) => '\t',
            (None, _) => ',',
        };
        u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| MergeError::Config(format!("delimiter {:?} is not ASCII", delimiter)))
    }

    fn validate(&self, side: &str) -> std::result::Result<(), MergeError> {
        let format = self.resolved_format()?;
        if format == InputFormat::Csv && (!self.parents.is_empty() || !self.collections.is_empty()) {
            return Err(MergeError::Config(format!(
                "{} source is delimited, `parents` and `collections` only apply to JSON",
                side
            )));
        }
        if format == InputFormat::Jsonl && self.archive_selection().is_some() {
            return Err(MergeError::Config(format!(
                "{} source: JSON lines inside archives are not supported",
                side
            )));
        }
        self.delimiter_byte()?;
        Ok(())
    }
}

impl PipelineConfig {
    /// Read a config file; relative paths resolve against its directory
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_yaml_str(&text, base)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config: PipelineConfig = serde_yaml::from_str(text).context("Failed to parse YAML")?;
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(lookup) = self.code_lookup.as_mut() {
            resolve(lookup);
        }
        resolve(&mut self.left.path);
        resolve(&mut self.right.path);
        for output in &mut self.outputs {
            resolve(&mut output.path);
        }
    }

    pub fn validate(&self) -> std::result::Result<(), MergeError> {
        self.left.validate("left")?;
        self.right.validate("right")?;
        if self.join.keys.is_empty() {
            return Err(MergeError::Config(String::from("join needs at least one key column")));
        }
        for output in &self.outputs {
            output
                .resolved_format()
                .map_err(|e| MergeError::Config(e.to_string()))?;
        }
        Ok(())
    }

    /// Build the code lookup from the file and the inline codes
    pub fn code_lookup(&self) -> std::result::Result<CodeLookup, MergeError> {
        let mut codes = HashMap::new();
        if let Some(path) = &self.code_lookup {
            let from_file = CodeLookup::from_path(path)?;
            codes.extend(from_file.into_iter());
        }
        codes.extend(self.codes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(CodeLookup::new(codes))
    }
}
