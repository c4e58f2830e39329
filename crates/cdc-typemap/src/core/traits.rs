//! Collaborator interfaces consumed by the type system.
//!
//! The type system never talks to a database or the filesystem directly.
//! Schema introspection happens before it runs and persistence happens after;
//! both are reached through these traits:
//!
//! - [`SchemaProvider`]: column lists of live tables
//! - [`SinkUsageLister`]: which sink columns a source column currently feeds
//! - [`OverrideStore`]: load and persist one source group's override artifact
//! - [`MappingStore`]: persist the applied column mapping of an attachment
//!
//! All calls are synchronous.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::overrides::OverrideDocument;

use super::schema::{SinkUsage, TableColumnSet};

/// Read table column lists from a schema-introspection source.
pub trait SchemaProvider {
    /// Get the full column list of a table on an engine.
    ///
    /// Returns [`TypeMapError::UnknownTable`](crate::TypeMapError::UnknownTable)
    /// when the table does not exist.
    fn get_columns(&self, engine: &str, table: &str) -> Result<TableColumnSet>;
}

/// List every sink column fed from a physical source column.
pub trait SinkUsageLister {
    fn list_sink_usages_of_source_column(
        &self,
        source_table: &str,
        source_column: &str,
    ) -> Result<Vec<SinkUsage>>;
}

/// Load and persist source-override artifacts.
///
/// Persistence replaces the whole artifact; partial updates are never
/// observable.
pub trait OverrideStore {
    /// Load a source group's overrides; `None` when the group has no artifact yet.
    fn load_overrides(&self, group: &str) -> Result<Option<OverrideDocument>>;

    /// Replace a source group's override artifact.
    fn persist_override(&self, group: &str, document: &OverrideDocument) -> Result<()>;
}

/// Persist the applied explicit mappings (sink column → source column) of a
/// table attachment.
pub trait MappingStore {
    fn persist_column_mapping(
        &self,
        source_table: &str,
        sink_engine: &str,
        sink_table: &str,
        mappings: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Sink-usage lister for a source column with no known consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSinkUsages;

impl SinkUsageLister for NoSinkUsages {
    fn list_sink_usages_of_source_column(
        &self,
        _source_table: &str,
        _source_column: &str,
    ) -> Result<Vec<SinkUsage>> {
        Ok(Vec::new())
    }
}
