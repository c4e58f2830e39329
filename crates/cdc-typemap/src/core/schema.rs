//! Column and table snapshot types shared by the checker, mapper and resolver.
//!
//! These are read-only views of what the schema-introspection collaborator
//! reported for one table on one engine.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TypeMapError};

/// Compare two identifiers ignoring case, with Unicode case folding.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// One column as declared on its engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,

    /// Declared type spelling (e.g., "int", "varchar(50)", "double precision").
    #[serde(rename = "type", alias = "data_type")]
    pub data_type: String,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub nullable: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,

    /// Whether the column has a default value.
    #[serde(default)]
    pub has_default: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnDefinition {
    /// Create a nullable, non-key column without a default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            primary_key: false,
            has_default: false,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Mark the column as a primary key column (implies NOT NULL).
    pub fn as_primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Mark the column as having a default value.
    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    /// A required column must receive a value from replication.
    pub fn is_required(&self) -> bool {
        (self.primary_key || !self.nullable) && !self.has_default
    }
}

/// The full, name-keyed column list of one table on one engine.
///
/// Column order is preserved as reported; names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ColumnDefinition>", into = "Vec<ColumnDefinition>")]
pub struct TableColumnSet {
    columns: Vec<ColumnDefinition>,
}

impl TableColumnSet {
    /// Build a column set, rejecting duplicate column names.
    pub fn new(columns: Vec<ColumnDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(TypeMapError::config(format!(
                    "duplicate column name '{}' in column set",
                    col.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// Find a column by exact name, then by case-insensitive name.
    pub fn get(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| names_match(&c.name, name)))
    }

    /// Check whether a column exists (same matching rules as [`get`](Self::get)).
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Column names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Iterate columns in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter()
    }

    /// Columns that must be populated.
    pub fn required(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.is_required())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_columns(self) -> Vec<ColumnDefinition> {
        self.columns
    }
}

impl TryFrom<Vec<ColumnDefinition>> for TableColumnSet {
    type Error = TypeMapError;

    fn try_from(columns: Vec<ColumnDefinition>) -> Result<Self> {
        Self::new(columns)
    }
}

impl From<TableColumnSet> for Vec<ColumnDefinition> {
    fn from(set: TableColumnSet) -> Self {
        set.columns
    }
}

/// A user-declared source column → sink column pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExplicitMapping {
    pub source_column: String,
    pub sink_column: String,
}

impl ExplicitMapping {
    pub fn new(source_column: impl Into<String>, sink_column: impl Into<String>) -> Self {
        Self {
            source_column: source_column.into(),
            sink_column: sink_column.into(),
        }
    }
}

impl FromStr for ExplicitMapping {
    type Err = TypeMapError;

    /// Parse `source=sink`.
    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((src, sink)) if !src.trim().is_empty() && !sink.trim().is_empty() => {
                Ok(Self::new(src.trim(), sink.trim()))
            }
            _ => Err(TypeMapError::config(format!(
                "invalid column mapping '{}': expected source=sink",
                s
            ))),
        }
    }
}

impl fmt::Display for ExplicitMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.source_column, self.sink_column)
    }
}

/// Identifies one physical source column, used to scope type overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnContext {
    /// Table key (e.g., "dbo.AdgangLinjer").
    pub table: String,
    /// Column name.
    pub column: String,
}

impl ColumnContext {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// A sink column currently fed from a given source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkUsage {
    pub target_engine: String,
    pub target_table: String,
    pub target_column: String,
    pub target_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rules() {
        assert!(ColumnDefinition::new("id", "uuid").as_primary_key().is_required());
        assert!(ColumnDefinition::new("name", "text").not_null().is_required());
        assert!(!ColumnDefinition::new("name", "text").is_required());
        assert!(!ColumnDefinition::new("created", "timestamptz")
            .not_null()
            .with_default()
            .is_required());
        assert!(!ColumnDefinition::new("id", "bigint")
            .as_primary_key()
            .with_default()
            .is_required());
    }

    #[test]
    fn test_column_set_rejects_duplicates() {
        let cols = vec![
            ColumnDefinition::new("id", "int"),
            ColumnDefinition::new("id", "bigint"),
        ];
        assert!(TableColumnSet::new(cols).is_err());
    }

    #[test]
    fn test_column_set_lookup_prefers_exact_name() {
        let set = TableColumnSet::new(vec![
            ColumnDefinition::new("Status", "int"),
            ColumnDefinition::new("status", "text"),
        ])
        .unwrap();
        assert_eq!(set.get("status").unwrap().data_type, "text");
        assert_eq!(set.get("STATUS").unwrap().data_type, "int");
        assert!(set.get("missing").is_none());
    }

    #[test]
    fn test_column_set_from_yaml() {
        let yaml = r#"
- name: id
  type: uuid
  nullable: false
  primary_key: true
- name: note
  type: text
"#;
        let set: TableColumnSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.required().count(), 1);
        assert!(set.get("note").unwrap().nullable);
    }

    #[test]
    fn test_explicit_mapping_parse() {
        let m: ExplicitMapping = "name = full_name".parse().unwrap();
        assert_eq!(m, ExplicitMapping::new("name", "full_name"));
        assert!("name".parse::<ExplicitMapping>().is_err());
        assert!("=x".parse::<ExplicitMapping>().is_err());
    }
}
