//! Column aliasing applied to every source before a join
//!
//! Sources disagree on header spelling (`Contract\nNumber`, `contractId`,
//! `PLAN_ID`, `plan_id`). Aliases bring them onto one vocabulary so join
//! keys line up.

use crate::error::{MergeError, Result};
use crate::table::Table;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Rename rules for one source
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnAliases {
    /// Collapse whitespace runs (including embedded newlines) to one space and trim
    #[serde(default)]
    pub normalize_whitespace: bool,

    /// Old name -> new name. Keys may be written raw or normalized.
    #[serde(default)]
    pub renames: HashMap<String, String>,
}

impl ColumnAliases {
    pub fn is_empty(&self) -> bool {
        !self.normalize_whitespace && self.renames.is_empty()
    }

    /// Resolve the final name for a single column
    pub fn resolve(&self, name: &str) -> String {
        if let Some(target) = self.renames.get(name) {
            return target.clone();
        }
        let name = if self.normalize_whitespace {
            normalize_header(name)
        } else {
            name.to_string()
        };
        self.renames.get(&name).cloned().unwrap_or(name)
    }

    /// Rename every column of `table` at once.
    ///
    /// All names are resolved against the original header, so swaps work; a
    /// result with two equal names fails with [`MergeError::DuplicateColumn`].
    pub fn apply(&self, table: &mut Table) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let renamed: Vec<String> = table.columns().iter().map(|c| self.resolve(c)).collect();
        let mut seen = HashSet::with_capacity(renamed.len());
        for name in &renamed {
            if !seen.insert(name.as_str()) {
                return Err(MergeError::DuplicateColumn(name.clone()));
            }
        }

        table.replace_columns(renamed);
        Ok(())
    }
}

/// Collapse every whitespace run to a single space and trim the ends
pub fn normalize_header(name: &str) -> String {
    WHITESPACE_RUN.replace_all(name.trim(), " ").into_owned()
}

impl Table {
    /// Swap in a new header of the same width; callers check uniqueness
    pub(crate) fn replace_columns(&mut self, columns: Vec<String>) {
        debug_assert_eq!(columns.len(), self.width());
        self.columns = columns;
    }
}
