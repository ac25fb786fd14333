//! Loading entries out of zip archives
//!
//! Entries are picked by a regex on their name. A single-entry selection
//! must resolve to exactly one entry and any parse failure is fatal. A
//! batch selection parses every matching entry on its own and skips the
//! ones that fail, recording a [`Diagnostic`] for each.

use crate::error::{MergeError, Result};
use crate::load::delimited::read_delimited;
use crate::load::ensure_exists;
use crate::table::Table;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

/// Default pattern for JSON loads: any `.json` entry, case-insensitive
pub const JSON_ENTRY_PATTERN: &str = r"(?i)\.json$";

/// Default pattern for delimited loads
pub const DELIMITED_ENTRY_PATTERN: &str = r"(?i)\.(csv|tsv|txt)$";

// Preallocation hint cap; the declared size of an entry is not trusted
const MAX_SIZE_HINT: u64 = 1 << 26;

/// Which archive entries to load
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySelection {
    /// Regex matched against entry names. Defaults to the pattern of the
    /// format being loaded.
    #[serde(default)]
    pub pattern: Option<String>,

    /// Exact entry name, overriding the pattern when several entries match
    #[serde(default)]
    pub entry: Option<String>,

    /// Load every matching entry instead of exactly one
    #[serde(default)]
    pub batch: bool,
}

impl EntrySelection {
    pub fn pattern(pattern: impl Into<String>) -> Self {
        EntrySelection {
            pattern: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn batch(mut self) -> Self {
        self.batch = true;
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// The configured pattern, or `default` when none was set
    pub fn pattern_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.pattern.as_deref().unwrap_or(default)
    }
}

/// A recovered failure on one archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub entry: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.entry, self.message)
    }
}

/// Parsed entries in archive order plus the entries that were skipped
#[derive(Debug, Clone)]
pub struct ArchiveLoad<T> {
    pub items: Vec<(String, T)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl<T> ArchiveLoad<T> {
    pub fn into_values(self) -> Vec<T> {
        self.items.into_iter().map(|(_, value)| value).collect()
    }
}

/// Load JSON documents from an archive
#[instrument(level = "info", skip(path), fields(archive = %path.as_ref().display()))]
pub fn load_archive_json<P: AsRef<Path>>(path: P, selection: &EntrySelection) -> Result<ArchiveLoad<Value>> {
    load_entries(path.as_ref(), selection, JSON_ENTRY_PATTERN, |_, bytes| {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    })
}

/// Load delimited tables from an archive, one per matching entry
#[instrument(level = "info", skip(path), fields(archive = %path.as_ref().display()))]
pub fn load_archive_delimited<P: AsRef<Path>>(
    path: P,
    selection: &EntrySelection,
    delimiter: u8,
) -> Result<ArchiveLoad<Table>> {
    load_entries(path.as_ref(), selection, DELIMITED_ENTRY_PATTERN, |name, bytes| {
        read_delimited(bytes, delimiter, name).map_err(|e| match e {
            MergeError::Parse { message, .. } => message,
            other => other.to_string(),
        })
    })
}

/// Indices of the entries `selection` resolves to, in archive order
pub fn select_entries<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_path: &Path,
    selection: &EntrySelection,
    default_pattern: &str,
) -> Result<Vec<usize>> {
    let pattern_text = selection.pattern_or(default_pattern);
    let pattern = Regex::new(pattern_text)?;

    let mut all = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        all.push((i, entry.name().to_string()));
    }

    let matching: Vec<&(usize, String)> = all.iter().filter(|(_, name)| pattern.is_match(name)).collect();

    let ambiguous = |candidates: Vec<String>| MergeError::AmbiguousSource {
        archive: archive_path.to_path_buf(),
        pattern: pattern_text.to_string(),
        candidates,
    };
    let names = |entries: &[&(usize, String)]| entries.iter().map(|(_, n)| n.clone()).collect::<Vec<_>>();

    if let Some(wanted) = &selection.entry {
        return match all.iter().find(|(_, name)| name == wanted) {
            Some((index, _)) => Ok(vec![*index]),
            None => Err(ambiguous(names(&matching))),
        };
    }

    if matching.is_empty() || (!selection.batch && matching.len() > 1) {
        return Err(ambiguous(names(&matching)));
    }

    Ok(matching.iter().map(|(index, _)| *index).collect())
}

/// Buffer preallocation for an entry of the declared uncompressed size
fn size_hint(declared: u64) -> usize {
    declared.min(MAX_SIZE_HINT) as usize
}

fn load_entries<T, F>(
    path: &Path,
    selection: &EntrySelection,
    default_pattern: &str,
    mut parse: F,
) -> Result<ArchiveLoad<T>>
where
    F: FnMut(&str, &[u8]) -> std::result::Result<T, String>,
{
    ensure_exists(path)?;
    let file = File::open(path).map_err(|e| MergeError::io(path, e))?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let indices = select_entries(&mut archive, path, selection, default_pattern)?;
    let total = indices.len();

    let mut items = Vec::with_capacity(total);
    let mut diagnostics = Vec::new();

    for (n, index) in indices.into_iter().enumerate() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        debug!("[{}/{}] {}", n + 1, total, name);

        let mut bytes = Vec::with_capacity(size_hint(entry.size()));
        let read = entry
            .read_to_end(&mut bytes)
            .map_err(|e| e.to_string())
            .and_then(|_| parse(&name, &bytes));

        match read {
            Ok(value) => items.push((name, value)),
            Err(message) if selection.batch => {
                warn!(entry = %name, error = %message, "skipping unreadable entry");
                diagnostics.push(Diagnostic { entry: name, message });
            }
            Err(message) => return Err(MergeError::Parse { entry: name, message }),
        }
    }

    info!(
        entries = items.len(),
        skipped = diagnostics.len(),
        "loaded archive entries"
    );
    Ok(ArchiveLoad { items, diagnostics })
}
