//! Column-scoped source type overrides.
//!
//! An override reinterprets the effective type of one physical source column
//! (for example a SQL Server `int` column known to only hold `smallint`
//! values) without re-running schema introspection. Overrides are scoped to a
//! source group and persisted as one artifact per group:
//!
//! ```yaml
//! metadata:
//!   version: 1
//! overrides:
//!   dbo.AdgangLinjer:
//!     Adgangkode: smallint
//! ```
//!
//! Table and column matching is ASCII case-insensitive. A
//! [`SourceOverrideRegistry`] is immutable; [`OverrideManager`] produces a new
//! registry for every accepted mutation after persisting the full artifact.

mod store;

pub use store::FileOverrideStore;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::catalog::ArtifactCatalog;
use crate::core::schema::{names_match, SinkUsage};
use crate::core::traits::{OverrideStore, SchemaProvider, SinkUsageLister};
use crate::dialect::canonical::normalize_spelling;
use crate::dialect::CompatibilityChecker;
use crate::error::{Result, TypeMapError};

/// Current override artifact format version.
pub const OVERRIDE_FORMAT_VERSION: u32 = 1;

fn default_version() -> u32 {
    OVERRIDE_FORMAT_VERSION
}

/// `metadata` section of an override artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideMetadata {
    #[serde(default = "default_version")]
    pub version: u32,

    /// When the artifact was last written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for OverrideMetadata {
    fn default() -> Self {
        Self {
            version: OVERRIDE_FORMAT_VERSION,
            updated_at: None,
        }
    }
}

/// One source group's override artifact.
///
/// Tables and columns are kept in `BTreeMap`s so the persisted form is sorted
/// deterministically.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideDocument {
    #[serde(default)]
    pub metadata: OverrideMetadata,

    /// table key → column name → override type
    #[serde(default)]
    pub overrides: BTreeMap<String, BTreeMap<String, String>>,
}

impl OverrideDocument {
    /// Parse and validate an override artifact.
    pub fn from_yaml(yaml: &str, origin: &str) -> Result<Self> {
        let document: Self = serde_yaml::from_str(yaml).map_err(|e| {
            TypeMapError::artifact(format!("malformed override artifact: {}", e), origin)
        })?;
        document.validate(origin)?;
        Ok(document)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn validate(&self, origin: &str) -> Result<()> {
        if self.metadata.version != OVERRIDE_FORMAT_VERSION {
            return Err(TypeMapError::artifact(
                format!(
                    "unsupported override format version {} (expected {})",
                    self.metadata.version, OVERRIDE_FORMAT_VERSION
                ),
                origin,
            ));
        }

        let mut seen: HashMap<(String, String), &str> = HashMap::new();
        for (table, columns) in &self.overrides {
            for (column, override_type) in columns {
                if table.trim().is_empty()
                    || column.trim().is_empty()
                    || override_type.trim().is_empty()
                {
                    return Err(TypeMapError::artifact(
                        format!("empty table, column or type in override {}.{}", table, column),
                        origin,
                    ));
                }
                let key = (table.to_lowercase(), column.to_lowercase());
                if let Some(previous) = seen.insert(key, override_type) {
                    return Err(TypeMapError::artifact(
                        format!(
                            "override for {}.{} is declared more than once ('{}' and '{}')",
                            table, column, previous, override_type
                        ),
                        origin,
                    ));
                }
            }
        }
        Ok(())
    }

    /// Look up an override (case-insensitive on table and column).
    pub fn get(&self, table: &str, column: &str) -> Option<&str> {
        self.overrides
            .iter()
            .filter(|(t, _)| names_match(t, table))
            .flat_map(|(_, cols)| cols.iter())
            .find(|(c, _)| names_match(c, column))
            .map(|(_, ty)| ty.as_str())
    }

    /// Insert or replace an override, reusing existing key spellings.
    pub fn insert(&mut self, table: &str, column: &str, override_type: &str) {
        let table_key = self
            .overrides
            .keys()
            .find(|t| names_match(t, table))
            .cloned()
            .unwrap_or_else(|| table.to_string());
        let columns = self.overrides.entry(table_key).or_default();
        let column_key = columns
            .keys()
            .find(|c| names_match(c, column))
            .cloned()
            .unwrap_or_else(|| column.to_string());
        columns.insert(column_key, override_type.trim().to_string());
    }

    /// Remove an override, returning its type. Empty tables are dropped.
    pub fn remove(&mut self, table: &str, column: &str) -> Option<String> {
        let table_key = self
            .overrides
            .keys()
            .find(|t| names_match(t, table))
            .cloned()?;
        let columns = self.overrides.get_mut(&table_key)?;
        let column_key = columns
            .keys()
            .find(|c| names_match(c, column))
            .cloned()?;
        let removed = columns.remove(&column_key);
        if columns.is_empty() {
            self.overrides.remove(&table_key);
        }
        removed
    }

    /// All overrides, sorted by table then column.
    pub fn entries(&self) -> Vec<SourceOverrideEntry> {
        self.overrides
            .iter()
            .flat_map(|(table, cols)| {
                cols.iter().map(move |(column, ty)| SourceOverrideEntry {
                    table: table.clone(),
                    column: column.clone(),
                    override_type: ty.clone(),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.overrides.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single (table, column, override type) entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOverrideEntry {
    pub table: String,
    pub column: String,
    pub override_type: String,
}

/// Immutable, indexed view of one source group's overrides.
#[derive(Debug, Clone)]
pub struct SourceOverrideRegistry {
    group: String,
    source_engine: String,
    document: OverrideDocument,
    index: HashMap<(String, String), String>,
}

impl SourceOverrideRegistry {
    pub fn new(
        group: impl Into<String>,
        source_engine: impl Into<String>,
        document: OverrideDocument,
    ) -> Self {
        let index = document
            .entries()
            .into_iter()
            .map(|e| {
                (
                    (e.table.to_lowercase(), e.column.to_lowercase()),
                    e.override_type,
                )
            })
            .collect();

        Self {
            group: group.into(),
            source_engine: source_engine.into(),
            document,
            index,
        }
    }

    /// Empty registry for a group with no override artifact.
    pub fn empty(group: impl Into<String>, source_engine: impl Into<String>) -> Self {
        Self::new(group, source_engine, OverrideDocument::default())
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn source_engine(&self) -> &str {
        &self.source_engine
    }

    pub fn document(&self) -> &OverrideDocument {
        &self.document
    }

    /// The override for a column, if any.
    pub fn get(&self, table: &str, column: &str) -> Option<&str> {
        self.index
            .get(&(table.to_lowercase(), column.to_lowercase()))
            .map(String::as_str)
    }

    /// The type in effect for a column: its override, or the declared type.
    pub fn effective_type<'a>(
        &'a self,
        table: &str,
        column: &str,
        declared_type: &'a str,
    ) -> &'a str {
        self.get(table, column).unwrap_or(declared_type)
    }

    /// All overrides, sorted by table then column.
    pub fn list(&self) -> Vec<SourceOverrideEntry> {
        self.document.entries()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Applies override mutations: conflict checks, consumer re-validation and
/// full-artifact persistence.
pub struct OverrideManager<'a> {
    catalog: &'a ArtifactCatalog,
    store: &'a dyn OverrideStore,
    usages: &'a dyn SinkUsageLister,
    schema: Option<&'a dyn SchemaProvider>,
}

impl<'a> OverrideManager<'a> {
    pub fn new(
        catalog: &'a ArtifactCatalog,
        store: &'a dyn OverrideStore,
        usages: &'a dyn SinkUsageLister,
    ) -> Self {
        Self {
            catalog,
            store,
            usages,
            schema: None,
        }
    }

    /// Look up declared source types, so removals can report sink columns
    /// the restored type no longer fits.
    pub fn with_schema(mut self, schema: &'a dyn SchemaProvider) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Load a group's registry; a group without an artifact has no overrides.
    pub fn load(&self, group: &str, source_engine: &str) -> Result<SourceOverrideRegistry> {
        match self.store.load_overrides(group)? {
            Some(document) => {
                debug!("Loaded {} override(s) for source group {}", document.len(), group);
                Ok(SourceOverrideRegistry::new(group, source_engine, document))
            }
            None => Ok(SourceOverrideRegistry::empty(group, source_engine)),
        }
    }

    /// Set an override for one source column.
    ///
    /// Fails if a different override already exists, or if any sink column
    /// currently fed from this source column could not accept the new type.
    /// Setting the same override again is a no-op.
    pub fn set_override(
        &self,
        registry: &SourceOverrideRegistry,
        table: &str,
        column: &str,
        override_type: &str,
    ) -> Result<SourceOverrideRegistry> {
        let override_type = override_type.trim();
        if table.trim().is_empty() || column.trim().is_empty() || override_type.is_empty() {
            return Err(TypeMapError::config(
                "override table, column and type must be non-empty",
            ));
        }

        if let Some(existing) = registry.get(table, column) {
            if normalize_spelling(existing) == normalize_spelling(override_type) {
                debug!("Override {}.{} already set to '{}'", table, column, existing);
                return Ok(registry.clone());
            }
            return Err(TypeMapError::OverrideConflict {
                table: table.to_string(),
                column: column.to_string(),
                existing: existing.to_string(),
                requested: override_type.to_string(),
            });
        }

        self.validate_consumers(registry.source_engine(), table, column, override_type)?;

        let mut document = registry.document().clone();
        document.insert(table, column, override_type);
        document.metadata.updated_at = Some(Utc::now());
        self.store.persist_override(registry.group(), &document)?;

        info!(
            "Set override {}.{} = '{}' in source group {}",
            table,
            column,
            override_type,
            registry.group()
        );
        Ok(SourceOverrideRegistry::new(
            registry.group(),
            registry.source_engine(),
            document,
        ))
    }

    /// Remove an existing override.
    ///
    /// The declared type takes effect again. With a schema attached, sink
    /// columns it cannot populate are logged as warnings; removal proceeds.
    pub fn remove_override(
        &self,
        registry: &SourceOverrideRegistry,
        table: &str,
        column: &str,
    ) -> Result<SourceOverrideRegistry> {
        let mut document = registry.document().clone();
        let removed = document
            .remove(table, column)
            .ok_or_else(|| TypeMapError::OverrideNotFound {
                table: table.to_string(),
                column: column.to_string(),
            })?;

        if let Some(declared) = self.declared_type(registry.source_engine(), table, column) {
            let broken =
                self.incompatible_consumers(registry.source_engine(), table, column, &declared)?;
            for usage in &broken {
                warn!(
                    "Removing override {}.{} restores '{}', which cannot populate sink column {}:{}.{} ({})",
                    table,
                    column,
                    declared,
                    usage.target_engine,
                    usage.target_table,
                    usage.target_column,
                    usage.target_type
                );
            }
        }
        document.metadata.updated_at = Some(Utc::now());
        self.store.persist_override(registry.group(), &document)?;

        info!(
            "Removed override {}.{} (was '{}') from source group {}",
            table,
            column,
            removed,
            registry.group()
        );
        Ok(SourceOverrideRegistry::new(
            registry.group(),
            registry.source_engine(),
            document,
        ))
    }

    /// Sink columns fed from a source column that `source_type` cannot populate.
    pub fn incompatible_consumers(
        &self,
        source_engine: &str,
        table: &str,
        column: &str,
        source_type: &str,
    ) -> Result<Vec<SinkUsage>> {
        let usages = self.usages.list_sink_usages_of_source_column(table, column)?;
        debug!(
            "Re-validating {} sink consumer(s) of {}.{} against '{}'",
            usages.len(),
            table,
            column,
            source_type
        );

        let mut broken = Vec::new();
        for usage in usages {
            let checker =
                CompatibilityChecker::new(self.catalog, source_engine, &usage.target_engine)?;
            if !checker.is_compatible(source_type, &usage.target_type, None) {
                broken.push(usage);
            }
        }
        Ok(broken)
    }

    fn declared_type(&self, source_engine: &str, table: &str, column: &str) -> Option<String> {
        let schema = self.schema?;
        match schema.get_columns(source_engine, table) {
            Ok(columns) => columns.get(column).map(|c| c.data_type.clone()),
            Err(e) => {
                debug!("No declared type for {}.{}: {}", table, column, e);
                None
            }
        }
    }

    fn validate_consumers(
        &self,
        source_engine: &str,
        table: &str,
        column: &str,
        override_type: &str,
    ) -> Result<()> {
        let broken = self.incompatible_consumers(source_engine, table, column, override_type)?;
        let Some(usage) = broken.first() else {
            return Ok(());
        };

        let checker = CompatibilityChecker::new(self.catalog, source_engine, &usage.target_engine)?;
        let candidates = checker.sink_candidates(override_type, None);
        let mut guidance = vec![format!(
            "remap or drop sink column {}.{} before overriding {}.{}",
            usage.target_table, usage.target_column, table, column
        )];
        if !candidates.is_empty() {
            guidance.push(format!(
                "'{}' can populate: {}",
                override_type,
                candidates.join(", ")
            ));
        }
        Err(TypeMapError::compatibility(
            format!(
                "override {}.{} = '{}' would break sink column {}:{}.{} ({})",
                table,
                column,
                override_type,
                usage.target_engine,
                usage.target_table,
                usage.target_column,
                usage.target_type
            ),
            guidance,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArtifactsConfig;
    use crate::core::schema::{ColumnDefinition, TableColumnSet};
    use crate::dialect::CompatibilityMap;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        persisted: Mutex<Vec<(String, OverrideDocument)>>,
    }

    impl OverrideStore for MemoryStore {
        fn load_overrides(&self, group: &str) -> Result<Option<OverrideDocument>> {
            Ok(self
                .persisted
                .lock()
                .iter()
                .rev()
                .find(|(g, _)| g == group)
                .map(|(_, d)| d.clone()))
        }

        fn persist_override(&self, group: &str, document: &OverrideDocument) -> Result<()> {
            self.persisted
                .lock()
                .push((group.to_string(), document.clone()));
            Ok(())
        }
    }

    struct FixedUsages(Vec<SinkUsage>);

    impl SinkUsageLister for FixedUsages {
        fn list_sink_usages_of_source_column(
            &self,
            source_table: &str,
            source_column: &str,
        ) -> Result<Vec<SinkUsage>> {
            if names_match(source_table, "dbo.AdgangLinjer")
                && names_match(source_column, "Adgangkode")
            {
                Ok(self.0.clone())
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn usage(ty: &str) -> SinkUsage {
        SinkUsage {
            target_engine: "postgres".into(),
            target_table: "public.adgang_linjer".into(),
            target_column: "adgangkode".into(),
            target_type: ty.into(),
        }
    }

    fn catalog() -> ArtifactCatalog {
        let catalog = ArtifactCatalog::new(ArtifactsConfig::default());
        let yaml = r#"
mappings:
  int: integer
  smallint: smallint
  varchar: text
compatibility:
  int: [integer, bigint]
  smallint: [smallint, integer, bigint]
  "*": [text]
"#;
        catalog.register_compatibility_map(
            CompatibilityMap::from_yaml(yaml, "mssql", "postgres", "test.yaml", true).unwrap(),
        );
        catalog
    }

    #[test]
    fn test_document_roundtrip_is_sorted() {
        let mut doc = OverrideDocument::default();
        doc.insert("dbo.Zeta", "b", "smallint");
        doc.insert("dbo.Alpha", "z", "bigint");
        doc.insert("dbo.Alpha", "a", "text");
        let yaml = doc.to_yaml().unwrap();
        let alpha = yaml.find("dbo.Alpha").unwrap();
        let zeta = yaml.find("dbo.Zeta").unwrap();
        assert!(alpha < zeta);

        let parsed = OverrideDocument::from_yaml(&yaml, "x.yaml").unwrap();
        assert_eq!(parsed, doc);
        let entries = parsed.entries();
        assert_eq!(entries[0].column, "a");
        assert_eq!(entries[2].table, "dbo.Zeta");
    }

    #[test]
    fn test_document_rejects_case_insensitive_duplicates() {
        let yaml = r#"
overrides:
  dbo.T:
    Col: smallint
  DBO.t:
    col: bigint
"#;
        let err = OverrideDocument::from_yaml(yaml, "erp.yaml").unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_document_rejects_unknown_version() {
        let yaml = "metadata:\n  version: 9\noverrides: {}\n";
        assert!(OverrideDocument::from_yaml(yaml, "erp.yaml").is_err());
    }

    #[test]
    fn test_effective_type() {
        let mut doc = OverrideDocument::default();
        doc.insert("dbo.AdgangLinjer", "Adgangkode", "smallint");
        let registry = SourceOverrideRegistry::new("erp", "mssql", doc);
        assert_eq!(registry.effective_type("dbo.adganglinjer", "adgangkode", "int"), "smallint");
        assert_eq!(registry.effective_type("dbo.AdgangLinjer", "Other", "int"), "int");
    }

    #[test]
    fn test_non_ascii_names_fold_case() {
        let mut doc = OverrideDocument::default();
        doc.insert("dbo.Bøger", "Længde", "smallint");
        doc.insert("DBO.BØGER", "LÆNGDE", "bigint");
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.get("dbo.bøger", "længde"), Some("bigint"));

        let registry = SourceOverrideRegistry::new("erp", "mssql", doc.clone());
        assert_eq!(registry.effective_type("DBO.BØGER", "LÆNGDE", "int"), "bigint");

        assert_eq!(doc.remove("Dbo.Bøger", "længDE").as_deref(), Some("bigint"));
        assert!(doc.is_empty());

        let yaml = "overrides:\n  dbo.Bøger:\n    Længde: smallint\n  DBO.BØGER:\n    LÆNGDE: bigint\n";
        assert!(OverrideDocument::from_yaml(yaml, "erp.yaml").is_err());
    }

    #[test]
    fn test_set_override_persists_and_returns_new_registry() {
        let catalog = catalog();
        let store = MemoryStore::default();
        let usages = FixedUsages(vec![usage("smallint")]);
        let manager = OverrideManager::new(&catalog, &store, &usages);

        let registry = manager.load("erp", "mssql").unwrap();
        assert!(registry.is_empty());

        let updated = manager
            .set_override(&registry, "dbo.AdgangLinjer", "Adgangkode", "smallint")
            .unwrap();
        assert_eq!(updated.get("dbo.AdgangLinjer", "Adgangkode"), Some("smallint"));
        assert!(registry.is_empty());

        let persisted = store.persisted.lock();
        assert_eq!(persisted.len(), 1);
        assert!(persisted[0].1.metadata.updated_at.is_some());
    }

    #[test]
    fn test_set_same_override_is_noop() {
        let catalog = catalog();
        let store = MemoryStore::default();
        let manager = OverrideManager::new(&catalog, &store, &crate::core::traits::NoSinkUsages);

        let registry = manager.load("erp", "mssql").unwrap();
        let updated = manager.set_override(&registry, "dbo.T", "c", "smallint").unwrap();
        let again = manager.set_override(&updated, "DBO.t", "C", "SMALLINT").unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(store.persisted.lock().len(), 1);
    }

    #[test]
    fn test_conflicting_override_rejected() {
        let catalog = catalog();
        let store = MemoryStore::default();
        let manager = OverrideManager::new(&catalog, &store, &crate::core::traits::NoSinkUsages);

        let registry = manager.load("erp", "mssql").unwrap();
        let updated = manager.set_override(&registry, "dbo.T", "c", "smallint").unwrap();
        let err = manager.set_override(&updated, "dbo.T", "c", "bigint").unwrap_err();
        assert!(matches!(err, TypeMapError::OverrideConflict { .. }));
    }

    #[test]
    fn test_override_breaking_consumer_rejected() {
        let catalog = catalog();
        let store = MemoryStore::default();
        // The sink column is smallint; overriding the source as varchar cannot feed it.
        let usages = FixedUsages(vec![usage("text"), usage("smallint")]);
        let manager = OverrideManager::new(&catalog, &store, &usages);

        let registry = manager.load("erp", "mssql").unwrap();
        let err = manager
            .set_override(&registry, "dbo.AdgangLinjer", "Adgangkode", "varchar")
            .unwrap_err();
        match err {
            TypeMapError::Compatibility { message, guidance } => {
                assert!(message.contains("public.adgang_linjer.adgangkode"));
                assert!(message.contains("smallint"));
                assert!(!guidance.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(store.persisted.lock().is_empty());
    }

    #[test]
    fn test_remove_override() {
        let catalog = catalog();
        let store = MemoryStore::default();
        let manager = OverrideManager::new(&catalog, &store, &crate::core::traits::NoSinkUsages);

        let registry = manager.load("erp", "mssql").unwrap();
        assert!(matches!(
            manager.remove_override(&registry, "dbo.T", "c"),
            Err(TypeMapError::OverrideNotFound { .. })
        ));

        let updated = manager.set_override(&registry, "dbo.T", "c", "smallint").unwrap();
        let removed = manager.remove_override(&updated, "DBO.T", "C").unwrap();
        assert!(removed.is_empty());
        assert!(removed.document().overrides.is_empty());
    }

    #[test]
    fn test_remove_override_rechecks_consumers_against_declared_type() {
        let catalog = catalog();
        let store = MemoryStore::default();
        let usages = FixedUsages(vec![usage("smallint")]);
        let mut schema = crate::snapshot::SchemaSnapshot::default();
        schema.insert_table(
            "mssql",
            "dbo.AdgangLinjer",
            TableColumnSet::new(vec![ColumnDefinition::new("Adgangkode", "int")]).unwrap(),
        );
        let manager = OverrideManager::new(&catalog, &store, &usages).with_schema(&schema);

        let registry = manager.load("erp", "mssql").unwrap();
        let updated = manager
            .set_override(&registry, "dbo.AdgangLinjer", "Adgangkode", "smallint")
            .unwrap();

        let broken = manager
            .incompatible_consumers("mssql", "dbo.AdgangLinjer", "Adgangkode", "int")
            .unwrap();
        assert_eq!(broken, vec![usage("smallint")]);
        assert!(manager
            .incompatible_consumers("mssql", "dbo.AdgangLinjer", "Adgangkode", "smallint")
            .unwrap()
            .is_empty());

        // Removal still succeeds; the broken consumer is only reported.
        let removed = manager
            .remove_override(&updated, "dbo.AdgangLinjer", "Adgangkode")
            .unwrap();
        assert!(removed.is_empty());
        assert_eq!(store.persisted.lock().len(), 2);
    }
}
