//! Nested JSON flattening
//!
//! Expands one nested array of each parent record into flat rows. Every row
//! carries the parent's meta fields, the child element's own fields and a
//! description column for each coded field.
//!
//! ```rust
//! use planmerge::flatten::{FlattenSpec, Flattener};
//! use planmerge::CodeLookup;
//! use serde_json::json;
//!
//! let record = json!({
//!     "contractId": "C1",
//!     "pbp": {"offerings": [{"code": "16"}, {"code": "zz"}]}
//! });
//! let lookup: CodeLookup = [("16".to_string(), "Dental benefits".to_string())]
//!     .into_iter()
//!     .collect();
//!
//! let spec = FlattenSpec::new(["pbp", "offerings"])
//!     .with_meta(["contractId"])
//!     .with_coded_field("code", "description");
//! let table = Flattener::new(&spec, &lookup).flatten(&record).unwrap();
//!
//! assert_eq!(table.columns(), ["contractId", "code", "description"]);
//! assert_eq!(table.get(1, "description"), Some(""));
//! ```

pub mod path;

pub use path::Node;

use crate::error::{MergeError, Result};
use crate::lookup::CodeLookup;
use crate::table::{Cell, Table};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Column used for array elements that are scalars rather than objects
pub const SCALAR_COLUMN: &str = "value";

fn default_description_column() -> String {
    String::from("description")
}

fn default_separator() -> String {
    String::from(".")
}

/// A child field whose code gets a looked-up description column
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodedField {
    /// Child field holding the code, e.g. `categoryCode`
    pub field: String,

    /// Output column for the description
    #[serde(default = "default_description_column")]
    pub description_column: String,
}

/// How to flatten one nested collection
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlattenSpec {
    /// Keys leading from the parent record to the nested array
    #[serde(default)]
    pub record_path: Vec<String>,

    /// Dotted paths of parent fields copied onto every child row
    #[serde(default)]
    pub meta: Vec<String>,

    /// Child fields enriched through the code lookup
    #[serde(default)]
    pub coded_fields: Vec<CodedField>,

    /// Prefix for child columns
    #[serde(default)]
    pub record_prefix: Option<String>,

    /// Prefix for meta columns
    #[serde(default)]
    pub meta_prefix: Option<String>,

    /// Fail when no record contains the record path at all
    #[serde(default)]
    pub required: bool,

    /// Joins nested object keys into column names
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for FlattenSpec {
    fn default() -> Self {
        FlattenSpec {
            record_path: Vec::new(),
            meta: Vec::new(),
            coded_fields: Vec::new(),
            record_prefix: None,
            meta_prefix: None,
            required: false,
            separator: default_separator(),
        }
    }
}

impl FlattenSpec {
    pub fn new<I, S>(record_path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FlattenSpec {
            record_path: record_path.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_meta<I, S>(mut self, meta: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.meta.extend(meta.into_iter().map(Into::into));
        self
    }

    pub fn with_coded_field(mut self, field: impl Into<String>, description_column: impl Into<String>) -> Self {
        self.coded_fields.push(CodedField {
            field: field.into(),
            description_column: description_column.into(),
        });
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    fn meta_column(&self, meta: &str) -> String {
        match &self.meta_prefix {
            Some(prefix) => format!("{}{}", prefix, meta),
            None => meta.to_string(),
        }
    }

    fn record_column(&self, name: &str) -> String {
        match &self.record_prefix {
            Some(prefix) => format!("{}{}", prefix, name),
            None => name.to_string(),
        }
    }

    fn record_path_display(&self) -> String {
        if self.record_path.is_empty() {
            String::from("<root>")
        } else {
            self.record_path.join(".")
        }
    }
}

/// Flattens records according to one [`FlattenSpec`]
pub struct Flattener<'a> {
    spec: &'a FlattenSpec,
    lookup: &'a CodeLookup,
}

impl<'a> Flattener<'a> {
    pub fn new(spec: &'a FlattenSpec, lookup: &'a CodeLookup) -> Self {
        Flattener { spec, lookup }
    }

    /// Flatten a single parent record
    pub fn flatten(&self, record: &Value) -> Result<Table> {
        self.flatten_all(std::iter::once(record))
    }

    /// Flatten a sequence of parent records into one table, in input order
    pub fn flatten_all<'v, I>(&self, records: I) -> Result<Table>
    where
        I: IntoIterator<Item = &'v Value>,
    {
        let mut rows = Vec::new();
        let mut parents = 0usize;
        let mut resolved = 0usize;

        for record in records {
            parents += 1;
            if self.flatten_record(record, &mut rows)? {
                resolved += 1;
            }
        }

        if self.spec.required && resolved == 0 {
            return Err(MergeError::SchemaMismatch(format!(
                "record path `{}` not found in any of {} records",
                self.spec.record_path_display(),
                parents
            )));
        }

        debug!(
            path = %self.spec.record_path_display(),
            parents,
            resolved,
            rows = rows.len(),
            "flattened collection"
        );

        let seed: Vec<String> = self.spec.meta.iter().map(|m| self.spec.meta_column(m)).collect();
        Ok(Table::from_records_seeded(&seed, rows))
    }

    /// Append the rows for one parent; returns whether the record path resolved
    fn flatten_record(&self, record: &Value, rows: &mut Vec<Vec<(String, Cell)>>) -> Result<bool> {
        let node = Node::walk(record, &self.spec.record_path);
        let elements: &[Value] = match node.value() {
            None => return Ok(node.is_present()),
            Some(Value::Array(items)) => items,
            Some(object @ Value::Object(_)) => std::slice::from_ref(object),
            Some(other) => {
                return Err(MergeError::SchemaMismatch(format!(
                    "record path `{}` leads to {} instead of an array",
                    self.spec.record_path_display(),
                    kind_of(other)
                )))
            }
        };

        let meta: Vec<(String, Cell)> = self
            .spec
            .meta
            .iter()
            .map(|m| {
                let value = Node::walk(record, &path::split_dotted(m)).value();
                (self.spec.meta_column(m), value.and_then(cell_text))
            })
            .collect();

        for element in elements {
            rows.push(self.build_row(&meta, element)?);
        }
        Ok(true)
    }

    fn build_row(&self, meta: &[(String, Cell)], element: &Value) -> Result<Vec<(String, Cell)>> {
        let mut child = Vec::new();
        match element {
            Value::Object(map) => flatten_object(map, "", &self.spec.separator, &mut child),
            other => child.push((SCALAR_COLUMN.to_string(), cell_text(other))),
        }

        let mut row = meta.to_vec();
        for (name, value) in &child {
            let column = self.spec.record_column(name);
            if meta.iter().any(|(m, _)| *m == column) {
                return Err(MergeError::ConflictingMetadata(column));
            }
            row.push((column, value.clone()));
        }

        for coded in &self.spec.coded_fields {
            let code = child
                .iter()
                .find(|(name, _)| *name == coded.field)
                .and_then(|(_, value)| value.as_deref())
                .unwrap_or("");
            if row.iter().any(|(name, _)| *name == coded.description_column) {
                return Err(MergeError::ConflictingMetadata(coded.description_column.clone()));
            }
            row.push((
                coded.description_column.clone(),
                Some(self.lookup.describe(code).to_string()),
            ));
        }

        Ok(row)
    }
}

/// Flatten several collections out of the same records and stack the results.
///
/// Each spec is flattened independently; the tables are concatenated in spec
/// order under a superset schema.
pub fn flatten_collections(records: &[&Value], specs: &[FlattenSpec], lookup: &CodeLookup) -> Result<Table> {
    let tables = specs
        .iter()
        .map(|spec| Flattener::new(spec, lookup).flatten_all(records.iter().copied()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Table::concat(tables))
}

/// Resolve the parent records inside each document.
///
/// An empty `parents` path yields the documents themselves; an array expands
/// to its elements; absent or `null` yields nothing.
pub fn select_parents<'v, S: AsRef<str>>(documents: &'v [Value], parents: &[S]) -> Result<Vec<&'v Value>> {
    let mut selected = Vec::new();
    for document in documents {
        match Node::walk(document, parents).value() {
            None => {}
            Some(Value::Array(items)) => selected.extend(items.iter()),
            Some(object @ Value::Object(_)) => selected.push(object),
            Some(other) => {
                let joined: Vec<&str> = parents.iter().map(AsRef::as_ref).collect();
                return Err(MergeError::SchemaMismatch(format!(
                    "parent path `{}` leads to {} instead of an array",
                    joined.join("."),
                    kind_of(other)
                )));
            }
        }
    }
    Ok(selected)
}

/// Flatten a JSON object into dotted columns, nested objects included
fn flatten_object(map: &Map<String, Value>, prefix: &str, separator: &str, out: &mut Vec<(String, Cell)>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}{}{}", prefix, separator, key)
        };
        match value {
            Value::Object(nested) => flatten_object(nested, &name, separator, out),
            other => out.push((name, cell_text(other))),
        }
    }
}

/// Text form of a JSON value. Numbers keep their literal text, arrays and
/// objects become compact JSON.
pub fn cell_text(value: &Value) -> Cell {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dental_lookup() -> CodeLookup {
        [("16".to_string(), "Dental benefits".to_string())]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_offerings_with_lookup() {
        let record = json!({
            "contractId": "C1",
            "pbp": {"offerings": [{"code": "16"}, {"code": "zz"}]}
        });
        let spec = FlattenSpec::new(["pbp", "offerings"])
            .with_meta(["contractId"])
            .with_coded_field("code", "description");
        let lookup = dental_lookup();

        let table = Flattener::new(&spec, &lookup).flatten(&record).unwrap();

        assert_eq!(table.columns(), ["contractId", "code", "description"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.rows()[0],
            vec![Some("C1".into()), Some("16".into()), Some("Dental benefits".into())]
        );
        assert_eq!(
            table.rows()[1],
            vec![Some("C1".into()), Some("zz".into()), Some("".into())]
        );
    }

    #[test]
    fn test_absent_or_empty_path_yields_no_rows() {
        let spec = FlattenSpec::new(["benefitOfferings", "medicare", "details"]).with_meta(["planId"]);
        let lookup = CodeLookup::default();
        let flattener = Flattener::new(&spec, &lookup);

        for record in [
            json!({"planId": "001"}),
            json!({"planId": "001", "benefitOfferings": null}),
            json!({"planId": "001", "benefitOfferings": {"medicare": {}}}),
            json!({"planId": "001", "benefitOfferings": {"medicare": {"details": []}}}),
            json!({"planId": "001", "benefitOfferings": {"medicare": {"details": null}}}),
        ] {
            let table = flattener.flatten(&record).unwrap();
            assert!(table.is_empty());
            // meta columns are known even without rows
            assert_eq!(table.columns(), ["planId"]);
        }
    }

    #[test]
    fn test_scalar_at_record_path_is_schema_mismatch() {
        let spec = FlattenSpec::new(["pbp"]);
        let lookup = CodeLookup::default();
        let err = Flattener::new(&spec, &lookup)
            .flatten(&json!({"pbp": "oops"}))
            .unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch(msg) if msg.contains("a string")));
    }

    #[test]
    fn test_required_path_missing_everywhere() {
        let spec = FlattenSpec::new(["pbp"]).required();
        let lookup = CodeLookup::default();
        let flattener = Flattener::new(&spec, &lookup);
        let records = [json!({"other": 1}), json!({"other": 2})];

        let err = flattener.flatten_all(records.iter()).unwrap_err();
        assert!(matches!(err, MergeError::SchemaMismatch(_)));

        // one record with an empty array is enough
        let records = [json!({"other": 1}), json!({"pbp": []})];
        assert!(flattener.flatten_all(records.iter()).unwrap().is_empty());
    }

    #[test]
    fn test_meta_paths_nested_objects_and_literals() {
        // parsed from text so the numeric literal keeps its trailing zero
        let blob: Value = serde_json::from_str(
            r#"{
                "contractYear": 2025,
                "section": "B",
                "pbp": [
                    {
                        "contractId": "H1234",
                        "planId": "001",
                        "planCharacteristics": {"planName": "Gold", "snp": {"type": "D"}},
                        "boMinValue": 10.50,
                        "tags": ["a", "b"],
                        "vbid": false
                    }
                ]
            }"#,
        )
        .unwrap();
        let spec = FlattenSpec::new(["pbp"]).with_meta(["contractYear", "section"]);
        let lookup = CodeLookup::default();
        let table = Flattener::new(&spec, &lookup).flatten(&blob).unwrap();

        assert_eq!(
            table.columns(),
            [
                "contractYear",
                "section",
                "contractId",
                "planId",
                "planCharacteristics.planName",
                "planCharacteristics.snp.type",
                "boMinValue",
                "tags",
                "vbid"
            ]
        );
        assert_eq!(table.get(0, "contractYear"), Some("2025"));
        assert_eq!(table.get(0, "planCharacteristics.snp.type"), Some("D"));
        assert_eq!(table.get(0, "boMinValue"), Some("10.50"));
        assert_eq!(table.get(0, "tags"), Some(r#"["a","b"]"#));
        assert_eq!(table.get(0, "vbid"), Some("false"));
    }

    #[test]
    fn test_missing_meta_is_null() {
        let record = json!({"pbp": {"offerings": [{"code": "1a"}]}});
        let spec = FlattenSpec::new(["pbp", "offerings"])
            .with_meta(["contractId", "planCharacteristics.planName"]);
        let lookup = CodeLookup::default();
        let table = Flattener::new(&spec, &lookup).flatten(&record).unwrap();
        assert_eq!(table.rows()[0], vec![None, None, Some("1a".into())]);
    }

    #[test]
    fn test_meta_conflict_and_prefix() {
        let record = json!({"id": "P", "items": [{"id": "C"}]});
        let lookup = CodeLookup::default();

        let spec = FlattenSpec::new(["items"]).with_meta(["id"]);
        let err = Flattener::new(&spec, &lookup).flatten(&record).unwrap_err();
        assert!(matches!(err, MergeError::ConflictingMetadata(name) if name == "id"));

        let mut spec = FlattenSpec::new(["items"]).with_meta(["id"]);
        spec.meta_prefix = Some("parent_".into());
        let table = Flattener::new(&spec, &lookup).flatten(&record).unwrap();
        assert_eq!(table.columns(), ["parent_id", "id"]);
        assert_eq!(table.get(0, "parent_id"), Some("P"));
    }

    #[test]
    fn test_scalar_elements_use_value_column() {
        let record = json!({"id": "P", "tags": ["rust", 7]});
        let spec = FlattenSpec::new(["tags"]).with_meta(["id"]);
        let lookup = CodeLookup::default();
        let table = Flattener::new(&spec, &lookup).flatten(&record).unwrap();
        assert_eq!(table.columns(), ["id", "value"]);
        assert_eq!(table.get(1, "value"), Some("7"));
    }

    #[test]
    fn test_collections_share_superset_schema() {
        let blob = json!({
            "pbp": [
                {
                    "contractId": "H1",
                    "benefitOfferings": {
                        "medicare": {"medicareBenefitOfferingDetails": [
                            {"categoryCode": "16", "boInNetwork": "1", "vbidEPSDT": "N"}
                        ]},
                        "nonMedicare": {"nonMedicareBenefitOfferingDetails": [
                            {"categoryCode": "17", "inNetworkOptionSelected": "2"},
                            {"categoryCode": "99"}
                        ]}
                    }
                },
                {"contractId": "H2"}
            ]
        });
        let documents = vec![blob];
        let parents = select_parents(&documents, &["pbp"]).unwrap();
        assert_eq!(parents.len(), 2);

        let specs = vec![
            FlattenSpec::new(["benefitOfferings", "medicare", "medicareBenefitOfferingDetails"])
                .with_meta(["contractId"])
                .with_coded_field("categoryCode", "description"),
            FlattenSpec::new(["benefitOfferings", "nonMedicare", "nonMedicareBenefitOfferingDetails"])
                .with_meta(["contractId"])
                .with_coded_field("categoryCode", "description"),
        ];
        let lookup = dental_lookup();
        let table = flatten_collections(&parents, &specs, &lookup).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(
            table.columns(),
            [
                "contractId",
                "categoryCode",
                "boInNetwork",
                "vbidEPSDT",
                "description",
                "inNetworkOptionSelected"
            ]
        );
        assert_eq!(table.get(0, "description"), Some("Dental benefits"));
        assert_eq!(table.get(1, "vbidEPSDT"), None);
        assert_eq!(table.get(1, "inNetworkOptionSelected"), Some("2"));
        assert_eq!(table.get(2, "description"), Some(""));
    }

    #[test]
    fn test_select_parents_rejects_scalar() {
        let documents = vec![json!({"pbp": 3})];
        assert!(select_parents(&documents, &["pbp"]).is_err());
        let documents = vec![json!({"other": []})];
        assert!(select_parents(&documents, &["pbp"]).unwrap().is_empty());
    }
}
