//! Relational join of two tables
//!
//! Keys are compared as exact strings, so callers align names and clean
//! values first (see [`ColumnAliases`](crate::table::ColumnAliases)). A null
//! key cell never matches anything.

use crate::error::{MergeError, Result};
use crate::table::{Cell, Table};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Which left rows survive the join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinMode {
    /// Only rows with a match on both sides
    Inner,
    /// Every left row; unmatched rows get null right columns
    Left,
}

/// Expected key multiplicity, checked before joining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    #[serde(alias = "1:1")]
    OneToOne,
    #[serde(alias = "1:m")]
    OneToMany,
    #[serde(alias = "m:1")]
    ManyToOne,
    #[serde(alias = "m:m")]
    ManyToMany,
}

impl Cardinality {
    fn left_unique(self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::OneToMany)
    }

    fn right_unique(self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ManyToOne)
    }
}

/// A left column matched against a right column
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyPair {
    pub left: String,
    pub right: String,
}

impl KeyPair {
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        KeyPair {
            left: left.into(),
            right: right.into(),
        }
    }

    /// Same column name on both sides
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        KeyPair {
            left: name.clone(),
            right: name,
        }
    }
}

fn default_suffixes() -> (String, String) {
    (String::from("_x"), String::from("_y"))
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinSpec {
    pub mode: JoinMode,
    pub keys: Vec<KeyPair>,

    /// Required: there is no safe default for key multiplicity
    pub validate: Cardinality,

    /// Appended to colliding non-key column names, left then right
    #[serde(default = "default_suffixes")]
    pub suffixes: (String, String),
}

impl JoinSpec {
    pub fn new(mode: JoinMode, keys: Vec<KeyPair>, validate: Cardinality) -> Self {
        JoinSpec {
            mode,
            keys,
            validate,
            suffixes: default_suffixes(),
        }
    }

    pub fn with_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.suffixes = (left.into(), right.into());
        self
    }
}

/// Join `left` with `right`.
///
/// Output columns are the left columns followed by the right columns, minus
/// right key columns that share their left key's name. Rows follow left
/// order; each left row repeats once per matching right row, in right order.
pub fn join(left: &Table, right: &Table, spec: &JoinSpec) -> Result<Table> {
    if spec.keys.is_empty() {
        return Err(MergeError::Config(String::from("join needs at least one key column")));
    }

    let left_keys = spec
        .keys
        .iter()
        .map(|k| left.require_column(&k.left, "left"))
        .collect::<Result<Vec<_>>>()?;
    let right_keys = spec
        .keys
        .iter()
        .map(|k| right.require_column(&k.right, "right"))
        .collect::<Result<Vec<_>>>()?;

    let merged: HashSet<usize> = spec
        .keys
        .iter()
        .zip(&right_keys)
        .filter(|(k, _)| k.left == k.right)
        .map(|(_, &idx)| idx)
        .collect();
    let right_kept: Vec<usize> = (0..right.width()).filter(|i| !merged.contains(i)).collect();

    let columns = output_columns(left, right, &right_kept, &spec.suffixes);

    if spec.validate.left_unique() {
        check_unique(left, &left_keys, "left")?;
    }
    if spec.validate.right_unique() {
        check_unique(right, &right_keys, "right")?;
    }

    let mut index: HashMap<Vec<&str>, Vec<usize>> = HashMap::new();
    for (row_idx, row) in right.rows().iter().enumerate() {
        if let Some(key) = key_of(row, &right_keys) {
            index.entry(key).or_default().push(row_idx);
        }
    }

    let mut out = Table::new(columns)?;
    let mut matched = 0usize;
    for row in left.rows() {
        let hits = key_of(row, &left_keys).and_then(|key| index.get(&key));
        match hits {
            Some(hits) => {
                matched += 1;
                for &r in hits {
                    let right_row = &right.rows()[r];
                    let mut cells: Vec<Cell> = row.clone();
                    cells.extend(right_kept.iter().map(|&i| right_row[i].clone()));
                    out.push_row(cells)?;
                }
            }
            None if spec.mode == JoinMode::Left => {
                let mut cells: Vec<Cell> = row.clone();
                cells.resize(row.len() + right_kept.len(), None);
                out.push_row(cells)?;
            }
            None => {}
        }
    }

    info!(
        mode = ?spec.mode,
        left_rows = left.len(),
        right_rows = right.len(),
        matched_left_rows = matched,
        rows = out.len(),
        "joined tables"
    );
    Ok(out)
}

/// Key cells of `row`, or `None` when any of them is null
fn key_of<'t>(row: &'t [Cell], indices: &[usize]) -> Option<Vec<&'t str>> {
    indices.iter().map(|&i| row[i].as_deref()).collect()
}

fn check_unique(table: &Table, indices: &[usize], side: &'static str) -> Result<()> {
    let mut counts: HashMap<Vec<&str>, usize> = HashMap::new();
    for row in table.rows() {
        if let Some(key) = key_of(row, indices) {
            *counts.entry(key).or_insert(0) += 1;
        }
    }

    // report the first duplicated key in row order
    for row in table.rows() {
        if let Some(key) = key_of(row, indices) {
            let count = counts[&key];
            if count > 1 {
                return Err(MergeError::CardinalityViolation {
                    side,
                    key: key.into_iter().map(str::to_string).collect(),
                    count,
                });
            }
        }
    }
    Ok(())
}

fn output_columns(left: &Table, right: &Table, right_kept: &[usize], suffixes: &(String, String)) -> Vec<String> {
    let left_names: HashSet<&str> = left.columns().iter().map(String::as_str).collect();
    let right_names: HashSet<&str> = right_kept.iter().map(|&i| right.columns()[i].as_str()).collect();

    let mut columns: Vec<String> = left
        .columns()
        .iter()
        .map(|name| {
            if right_names.contains(name.as_str()) {
                format!("{}{}", name, suffixes.0)
            } else {
                name.clone()
            }
        })
        .collect();

    columns.extend(right_kept.iter().map(|&i| {
        let name = &right.columns()[i];
        if left_names.contains(name.as_str()) {
            format!("{}{}", name, suffixes.1)
        } else {
            name.clone()
        }
    }));
    columns
}
