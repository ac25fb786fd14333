//! In-memory tables
//!
//! A [`Table`] is the rectangular form every stage hands to the next: named
//! columns in source order and rows in source order. Cells are text or null;
//! nothing is type-inferred, so identifiers such as `H1234` or `001` survive
//! loading and joining byte for byte.

pub mod alias;

pub use alias::ColumnAliases;

use crate::error::{MergeError, Result};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{HashMap, HashSet};

/// A single value: text, or null when missing
pub type Cell = Option<String>;

/// Ordered columns plus ordered rows sharing one schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given column names
    pub fn new(columns: Vec<String>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(MergeError::DuplicateColumn(name.clone()));
            }
        }
        Ok(Table {
            columns,
            rows: Vec::new(),
        })
    }

    /// Build a table from name/value rows.
    ///
    /// The schema is the union of all names in first-seen order; names a row
    /// does not carry are null in that row.
    pub fn from_records(records: Vec<Vec<(String, Cell)>>) -> Self {
        Self::from_records_seeded(&[], records)
    }

    /// Like [`Table::from_records`], with `seed` columns placed first even when
    /// no record carries them
    pub fn from_records_seeded(seed: &[String], records: Vec<Vec<(String, Cell)>>) -> Self {
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut columns = Vec::new();
        for name in seed {
            if !positions.contains_key(name) {
                positions.insert(name.clone(), columns.len());
                columns.push(name.clone());
            }
        }
        for record in &records {
            for (name, _) in record {
                if !positions.contains_key(name) {
                    positions.insert(name.clone(), columns.len());
                    columns.push(name.clone());
                }
            }
        }

        let rows = records
            .into_iter()
            .map(|record| {
                let mut row = vec![None; columns.len()];
                for (name, value) in record {
                    row[positions[&name]] = value;
                }
                row
            })
            .collect();

        Table { columns, rows }
    }

    /// Concatenate tables row-wise under a superset schema.
    ///
    /// Columns keep first-seen order across the inputs; a column missing
    /// from one input is null in that input's rows.
    pub fn concat(tables: impl IntoIterator<Item = Table>) -> Self {
        let tables: Vec<Table> = tables.into_iter().collect();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut columns = Vec::new();
        for table in &tables {
            for name in &table.columns {
                if !positions.contains_key(name) {
                    positions.insert(name.clone(), columns.len());
                    columns.push(name.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(tables.iter().map(Table::len).sum());
        for table in tables {
            let targets: Vec<usize> = table.columns.iter().map(|c| positions[c]).collect();
            for source in table.rows {
                let mut row = vec![None; columns.len()];
                for (idx, value) in source.into_iter().enumerate() {
                    row[targets[idx]] = value;
                }
                rows.push(row);
            }
        }

        Table { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Like [`Table::column_index`], failing with a schema mismatch naming `table`
    pub fn require_column(&self, name: &str, table: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            MergeError::SchemaMismatch(format!(
                "column `{}` not found in {} table (columns: {:?})",
                name, table, self.columns
            ))
        })
    }

    /// Append a row; its width must match the schema
    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(MergeError::SchemaMismatch(format!(
                "row has {} cells, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Value at `row` in column `name`; `None` for null cells and unknown columns
    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Keep only `names`, in the given order
    pub fn select(&self, names: &[String]) -> Result<Table> {
        let indices = names
            .iter()
            .map(|name| self.require_column(name, "selected"))
            .collect::<Result<Vec<_>>>()?;

        let mut table = Table::new(names.to_vec())?;
        table.rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(table)
    }

    /// Rename column `from` to `to`. Returns false when `from` is absent.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<bool> {
        let Some(idx) = self.column_index(from) else {
            return Ok(false);
        };
        if from == to {
            return Ok(true);
        }
        if self.column_index(to).is_some() {
            return Err(MergeError::DuplicateColumn(to.to_string()));
        }
        self.columns[idx] = to.to_string();
        Ok(true)
    }

    /// Iterate rows as name/value records
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(move |cells| Record {
            columns: &self.columns,
            cells,
        })
    }
}

/// Borrowed view of one row together with its column names
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    cells: &'a [Cell],
}

impl<'a> Record<'a> {
    pub fn get(&self, name: &str) -> Option<&'a str> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.cells[idx].as_deref()
    }
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(s: &str) -> Cell {
        Some(s.to_string())
    }

    #[test]
    fn test_from_records_superset_schema() {
        let table = Table::from_records(vec![
            vec![("id".into(), cell("A")), ("name".into(), cell("Plan A"))],
            vec![("id".into(), cell("B")), ("extra".into(), cell("X"))],
        ]);

        assert_eq!(table.columns(), ["id", "name", "extra"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "extra"), None);
        assert_eq!(table.get(1, "name"), None);
        assert_eq!(table.get(1, "extra"), Some("X"));
    }

    #[test]
    fn test_concat_fills_missing_columns_with_null() {
        let medicare = Table::from_records(vec![vec![
            ("planId".into(), cell("001")),
            ("inNetwork".into(), cell("1")),
        ]]);
        let non_medicare = Table::from_records(vec![vec![
            ("planId".into(), cell("002")),
            ("inNetworkOption".into(), cell("2")),
            ("inNetwork".into(), cell("0")),
        ]]);

        let table = Table::concat([medicare, non_medicare]);
        assert_eq!(table.columns(), ["planId", "inNetwork", "inNetworkOption"]);
        assert_eq!(table.rows()[0], vec![cell("001"), cell("1"), None]);
        assert_eq!(table.rows()[1], vec![cell("002"), cell("0"), cell("2")]);
    }

    #[test]
    fn test_new_rejects_duplicate_columns() {
        let err = Table::new(vec!["a".into(), "a".into()]).unwrap_err();
        assert!(matches!(err, MergeError::DuplicateColumn(name) if name == "a"));
    }

    #[test]
    fn test_push_row_checks_width() {
        let mut table = Table::new(vec!["a".into(), "b".into()]).unwrap();
        assert!(table.push_row(vec![cell("1")]).is_err());
        table.push_row(vec![cell("1"), None]).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_select_and_rename() {
        let mut table = Table::from_records(vec![vec![
            ("PLAN_ID".into(), cell("7")),
            ("LIS_FLAG".into(), cell("Y")),
            ("OTHER".into(), cell("z")),
        ]]);

        assert!(table.rename("PLAN_ID", "plan_id").unwrap());
        assert!(!table.rename("missing", "whatever").unwrap());
        assert!(table.rename("LIS_FLAG", "OTHER").is_err());

        let selected = table
            .select(&["OTHER".to_string(), "plan_id".to_string()])
            .unwrap();
        assert_eq!(selected.columns(), ["OTHER", "plan_id"]);
        assert_eq!(selected.rows()[0], vec![cell("z"), cell("7")]);

        let err = table.select(&["nope".to_string()]).unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch(_)));
    }

    #[test]
    fn test_record_serializes_in_column_order() {
        let table = Table::from_records(vec![vec![
            ("z".into(), cell("1")),
            ("a".into(), None),
        ]]);
        let record = table.records().next().unwrap();
        assert_eq!(record.get("z"), Some("1"));
        assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"z":"1","a":null}"#);
    }
}
