//! Error types for the merge pipeline.
//!
//! Loader, flattener, joiner and writer all return [`MergeError`]. Only
//! [`MergeError::Parse`] is ever recovered from, and only for individual
//! archive entries in batch mode; everything else aborts the run before any
//! output is written.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Merge Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum MergeError {
    /// Input path does not exist.
    #[error("Input file not found: {}", .0.display())]
    MissingFile(PathBuf),

    /// Archive selection matched zero or several entries.
    #[error(
        "Archive {} has {} entries matching `{pattern}`, expected exactly one: {candidates:?}",
        archive.display(),
        candidates.len()
    )]
    AmbiguousSource {
        archive: PathBuf,
        pattern: String,
        candidates: Vec<String>,
    },

    /// Content is not valid in its declared format.
    #[error("Failed to parse {entry}: {message}")]
    Parse { entry: String, message: String },

    /// A join key declared unique on one side maps to several rows.
    #[error("Join key {key:?} maps to {count} rows on the {side} side, expected at most one")]
    CardinalityViolation {
        side: &'static str,
        key: Vec<String>,
        count: usize,
    },

    /// A join key, selected column or flatten path is absent or has the wrong shape.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A child column of a flattened record has the same name as a meta column.
    #[error("Conflicting metadata column `{0}`, set a record or meta prefix")]
    ConflictingMetadata(String),

    /// A rename would leave two columns with the same name.
    #[error("Duplicate column `{0}`")]
    DuplicateColumn(String),

    /// Filesystem error with the path it happened on.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The zip container itself is unreadable.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Entry name pattern does not compile.
    #[error("Invalid entry pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MergeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(entry: impl Into<String>, message: impl ToString) -> Self {
        MergeError::Parse {
            entry: entry.into(),
            message: message.to_string(),
        }
    }
}

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
