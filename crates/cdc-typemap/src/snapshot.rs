//! File-backed schema snapshot.
//!
//! The introspection step dumps table column lists and the current sink
//! consumers of source columns to one YAML file:
//!
//! ```yaml
//! tables:
//!   mssql:
//!     dbo.AdgangLinjer:
//!       - { name: Id, type: int, nullable: false, primary_key: true }
//!       - { name: Adgangkode, type: int }
//!   postgres:
//!     public.adgang_linjer:
//!       - { name: id, type: integer, nullable: false, primary_key: true }
//! sink_usages:
//!   - source_table: dbo.AdgangLinjer
//!     source_column: Adgangkode
//!     target_engine: postgres
//!     target_table: public.adgang_linjer
//!     target_column: adgangkode
//!     target_type: smallint
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::schema::{names_match, SinkUsage, TableColumnSet};
use crate::core::traits::{SchemaProvider, SinkUsageLister};
use crate::dialect::canonical::normalize_engine;
use crate::error::{Result, TypeMapError};

/// One sink column fed from a source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSinkUsage {
    pub source_table: String,
    pub source_column: String,
    #[serde(flatten)]
    pub usage: SinkUsage,
}

/// Introspected schema: engine → table → columns, plus sink consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default)]
    tables: BTreeMap<String, BTreeMap<String, TableColumnSet>>,

    #[serde(default)]
    sink_usages: Vec<SnapshotSinkUsage>,
}

impl SchemaSnapshot {
    /// Parse a snapshot, reporting shape errors against `origin`.
    pub fn from_yaml(yaml: &str, origin: &str) -> Result<Self> {
        let raw: SchemaSnapshot = serde_yaml::from_str(yaml).map_err(|e| {
            TypeMapError::artifact(format!("malformed schema snapshot: {}", e), origin)
        })?;

        let mut snapshot = SchemaSnapshot {
            tables: BTreeMap::new(),
            sink_usages: raw.sink_usages,
        };
        for (engine, tables) in raw.tables {
            for (table, columns) in tables {
                snapshot.insert_table(&engine, table, columns);
            }
        }
        for usage in &mut snapshot.sink_usages {
            usage.usage.target_engine = normalize_engine(&usage.usage.target_engine);
        }
        Ok(snapshot)
    }

    /// Load a snapshot file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let snapshot = Self::from_yaml(&content, &path.display().to_string())?;
        debug!(
            "Loaded schema snapshot {}: {} table(s), {} sink usage(s)",
            path.display(),
            snapshot.table_count(),
            snapshot.sink_usages.len()
        );
        Ok(snapshot)
    }

    /// Add or replace a table's column list.
    pub fn insert_table(
        &mut self,
        engine: &str,
        table: impl Into<String>,
        columns: TableColumnSet,
    ) {
        self.tables
            .entry(normalize_engine(engine))
            .or_default()
            .insert(table.into(), columns);
    }

    pub fn add_sink_usage(
        &mut self,
        source_table: &str,
        source_column: &str,
        mut usage: SinkUsage,
    ) {
        usage.target_engine = normalize_engine(&usage.target_engine);
        self.sink_usages.push(SnapshotSinkUsage {
            source_table: source_table.to_string(),
            source_column: source_column.to_string(),
            usage,
        });
    }

    pub fn table_count(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }
}

impl SchemaProvider for SchemaSnapshot {
    /// Table names match exactly first, then case-insensitively.
    fn get_columns(&self, engine: &str, table: &str) -> Result<TableColumnSet> {
        let engine = normalize_engine(engine);
        self.tables
            .get(&engine)
            .and_then(|tables| {
                tables.get(table).or_else(|| {
                    tables
                        .iter()
                        .find(|(name, _)| names_match(name, table))
                        .map(|(_, columns)| columns)
                })
            })
            .cloned()
            .ok_or_else(|| TypeMapError::UnknownTable {
                engine,
                table: table.to_string(),
            })
    }
}

impl SinkUsageLister for SchemaSnapshot {
    fn list_sink_usages_of_source_column(
        &self,
        source_table: &str,
        source_column: &str,
    ) -> Result<Vec<SinkUsage>> {
        Ok(self
            .sink_usages
            .iter()
            .filter(|u| {
                names_match(&u.source_table, source_table)
                    && names_match(&u.source_column, source_column)
            })
            .map(|u| u.usage.clone())
            .collect())
    }
}
