//! Artifact-driven type translation for cloning tables.
//!
//! A [`TypeMapper`] turns a source column type into a sink column type when a
//! source table's structure is copied into a brand-new sink table. There is no
//! existing sink column to reconcile against, so the mapper always produces a
//! usable type: unknown source types resolve to the artifact's fallback.
//!
//! Translation artifacts look like:
//!
//! ```yaml
//! source_engine: mssql
//! sink_engine: postgres
//! fallback: text
//! mappings:
//!   int: integer
//!   nvarchar: text
//!   uniqueidentifier: uuid
//! ```
//!
//! When only the reverse artifact (sink → source) exists, its `mappings` are
//! inverted. Inversion keeps the first occurrence of a duplicated target, in
//! document order, so the result is deterministic. Mapping through an inverted
//! artifact is lossy by nature; round trips are not guaranteed.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::catalog::ArtifactCatalog;
use crate::core::schema::{ColumnDefinition, TableColumnSet};
use crate::error::{Result, TypeMapError};

use super::canonical::{normalize_engine, normalize_spelling, strip_parameters};

/// Fallback sink type when an artifact does not declare one.
pub const DEFAULT_FALLBACK: &str = "text";

fn default_fallback() -> String {
    DEFAULT_FALLBACK.to_string()
}

/// Raw type-translation artifact as written on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeTranslationDocument {
    #[serde(default)]
    pub source_engine: Option<String>,

    #[serde(default)]
    pub sink_engine: Option<String>,

    /// Source type → sink type, in document order.
    #[serde(default)]
    pub mappings: serde_yaml::Mapping,

    /// Sink type used for unrecognized source types.
    #[serde(default = "default_fallback")]
    pub fallback: String,

    /// Fallback used when this artifact is inverted; defaults to `fallback`.
    #[serde(default)]
    pub reverse_fallback: Option<String>,
}

impl TypeTranslationDocument {
    /// Parse an artifact, reporting shape errors against `origin`.
    pub fn from_yaml(yaml: &str, origin: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TypeMapError::artifact(format!("malformed type-translation artifact: {}", e), origin)
        })
    }

    /// Load an artifact from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, &path.display().to_string())
    }
}

/// Validated translation table for one ordered engine pair.
#[derive(Debug, Clone)]
pub struct TypeTranslation {
    source_engine: String,
    sink_engine: String,
    origin: String,
    entries: Vec<(String, String)>,
    exact: HashMap<String, usize>,
    folded: HashMap<String, usize>,
    fallback: String,
    reverse_fallback: String,
    inverted: bool,
}

impl TypeTranslation {
    /// Validate a parsed artifact for the given pair.
    ///
    /// Engine names declared inside the artifact must match the pair it was
    /// loaded for.
    pub fn from_document(
        document: TypeTranslationDocument,
        source_engine: &str,
        sink_engine: &str,
        origin: impl Into<String>,
    ) -> Result<Self> {
        let origin = origin.into();
        let source_engine = normalize_engine(source_engine);
        let sink_engine = normalize_engine(sink_engine);

        for (declared, expected, field) in [
            (&document.source_engine, &source_engine, "source_engine"),
            (&document.sink_engine, &sink_engine, "sink_engine"),
        ] {
            if let Some(declared) = declared {
                if normalize_engine(declared) != *expected {
                    return Err(TypeMapError::artifact(
                        format!(
                            "{} is '{}' but the artifact was loaded for '{}'",
                            field, declared, expected
                        ),
                        origin.as_str(),
                    ));
                }
            }
        }

        if document.fallback.trim().is_empty() {
            return Err(TypeMapError::artifact("fallback may not be empty", origin.as_str()));
        }
        let reverse_fallback = match document.reverse_fallback {
            Some(f) if f.trim().is_empty() => {
                return Err(TypeMapError::artifact(
                    "reverse_fallback may not be empty",
                    origin.as_str(),
                ));
            }
            Some(f) => f,
            None => document.fallback.clone(),
        };

        let mut entries = Vec::with_capacity(document.mappings.len());
        for (key, value) in &document.mappings {
            match (key.as_str(), value.as_str()) {
                (Some(k), Some(v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
                    entries.push((k.to_string(), v.to_string()));
                }
                _ => {
                    return Err(TypeMapError::artifact(
                        format!(
                            "mappings entries must be non-empty strings (found {:?}: {:?})",
                            key, value
                        ),
                        origin.as_str(),
                    ));
                }
            }
        }

        Ok(Self::from_entries(
            source_engine,
            sink_engine,
            origin,
            entries,
            (document.fallback, reverse_fallback),
            false,
        ))
    }

    fn from_entries(
        source_engine: String,
        sink_engine: String,
        origin: String,
        entries: Vec<(String, String)>,
        (fallback, reverse_fallback): (String, String),
        inverted: bool,
    ) -> Self {
        let mut exact = HashMap::with_capacity(entries.len());
        let mut folded = HashMap::with_capacity(entries.len());
        for (idx, (source, _)) in entries.iter().enumerate() {
            exact.entry(source.clone()).or_insert(idx);
            folded.entry(normalize_spelling(source)).or_insert(idx);
        }

        Self {
            source_engine,
            sink_engine,
            origin,
            entries,
            exact,
            folded,
            fallback,
            reverse_fallback,
            inverted,
        }
    }

    /// Parse and validate an artifact from YAML text.
    pub fn from_yaml(
        yaml: &str,
        source_engine: &str,
        sink_engine: &str,
        origin: &str,
    ) -> Result<Self> {
        let document = TypeTranslationDocument::from_yaml(yaml, origin)?;
        Self::from_document(document, source_engine, sink_engine, origin)
    }

    /// Invert this translation to serve the opposite direction.
    ///
    /// On duplicate target values the first occurrence wins.
    pub fn invert(&self) -> Self {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.entries.len());
        for (source, sink) in &self.entries {
            if seen.insert(sink.as_str()) {
                entries.push((sink.clone(), source.clone()));
            }
        }

        Self::from_entries(
            self.sink_engine.clone(),
            self.source_engine.clone(),
            format!("{} (inverted)", self.origin),
            entries,
            (self.reverse_fallback.clone(), self.fallback.clone()),
            !self.inverted,
        )
    }

    /// Look up a source type: exact match, then case-insensitive, then the
    /// unparameterized spelling.
    pub fn lookup(&self, source_type: &str) -> Option<&str> {
        let idx = self.exact.get(source_type).copied().or_else(|| {
            let spelling = normalize_spelling(source_type);
            self.folded
                .get(&spelling)
                .or_else(|| self.folded.get(&strip_parameters(&spelling)))
                .copied()
        })?;
        Some(self.entries[idx].1.as_str())
    }

    pub fn source_engine(&self) -> &str {
        &self.source_engine
    }

    pub fn sink_engine(&self) -> &str {
        &self.sink_engine
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Whether this translation was derived from the reverse artifact.
    pub fn is_inverted(&self) -> bool {
        self.inverted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of mapping a type from source to sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeMapping {
    /// Sink type string (e.g., "integer", "text").
    pub target_type: String,
    /// Whether the fallback was used because the source type is unknown.
    pub is_lossy: bool,
    /// Warning message for lossy mappings.
    pub warning: Option<String>,
}

impl TypeMapping {
    /// Create a lossless type mapping.
    pub fn lossless(target_type: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: false,
            warning: None,
        }
    }

    /// Create a lossy type mapping with a warning.
    pub fn lossy(target_type: impl Into<String>, warning: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            is_lossy: true,
            warning: Some(warning.into()),
        }
    }
}

/// Deterministic source → sink type translator for table cloning.
#[derive(Debug, Clone)]
pub struct TypeMapper {
    translation: Arc<TypeTranslation>,
}

impl TypeMapper {
    /// Create a mapper for a source→sink pair from the catalog.
    ///
    /// Uses the direct artifact when present, otherwise the inverted reverse
    /// artifact. Fails only when neither exists.
    pub fn new(catalog: &ArtifactCatalog, source_engine: &str, sink_engine: &str) -> Result<Self> {
        let translation = catalog.type_translation(source_engine, sink_engine)?;
        Ok(Self::from_translation(translation))
    }

    pub fn from_translation(translation: Arc<TypeTranslation>) -> Self {
        Self { translation }
    }

    pub fn source_engine(&self) -> &str {
        self.translation.source_engine()
    }

    pub fn sink_engine(&self) -> &str {
        self.translation.sink_engine()
    }

    /// Map a source type to a sink type. Never fails.
    pub fn map(&self, source_type: &str) -> String {
        self.map_type(source_type).target_type
    }

    /// Map a source type, reporting whether the fallback was used.
    pub fn map_type(&self, source_type: &str) -> TypeMapping {
        match self.translation.lookup(source_type) {
            Some(target) => TypeMapping::lossless(target),
            None => {
                let fallback = self.translation.fallback();
                warn!(
                    "No {} → {} translation for type '{}', using fallback '{}'",
                    self.translation.source_engine(),
                    self.translation.sink_engine(),
                    source_type,
                    fallback
                );
                TypeMapping::lossy(
                    fallback,
                    format!(
                        "Unrecognized {} type '{}' mapped to fallback '{}'",
                        self.translation.source_engine(),
                        source_type,
                        fallback
                    ),
                )
            }
        }
    }

    /// Map one column, keeping its name and nullability/key flags.
    pub fn map_column(&self, col: &ColumnDefinition) -> ColumnDefinition {
        ColumnDefinition {
            name: col.name.clone(),
            data_type: self.map(&col.data_type),
            nullable: col.nullable,
            primary_key: col.primary_key,
            has_default: false,
        }
    }

    /// Map every usable column; entries without a name or type are dropped.
    pub fn batch_map(&self, columns: &[ColumnDefinition]) -> Vec<ColumnDefinition> {
        columns
            .iter()
            .filter(|c| {
                let usable = !c.name.trim().is_empty() && !c.data_type.trim().is_empty();
                if !usable {
                    debug!("Skipping column without a usable name or type: {:?}", c);
                }
                usable
            })
            .map(|c| self.map_column(c))
            .collect()
    }

    /// Clone a source table's structure into a sink column set.
    pub fn clone_table(&self, columns: &[ColumnDefinition]) -> Result<TableColumnSet> {
        TableColumnSet::new(self.batch_map(columns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSSQL_TO_PG: &str = r#"
source_engine: mssql
sink_engine: postgres
mappings:
  int: integer
  bigint: bigint
  nvarchar: text
  varchar: text
  NText: text
  uniqueidentifier: uuid
  datetime2: timestamp
"#;

    fn translation() -> TypeTranslation {
        TypeTranslation::from_yaml(MSSQL_TO_PG, "mssql", "postgres", "t.yaml").unwrap()
    }

    #[test]
    fn test_lookup_exact_then_case_insensitive() {
        let t = translation();
        assert_eq!(t.lookup("int"), Some("integer"));
        assert_eq!(t.lookup("INT"), Some("integer"));
        assert_eq!(t.lookup("ntext"), Some("text"));
        assert_eq!(t.lookup("nvarchar(50)"), Some("text"));
        assert_eq!(t.lookup("geography"), None);
    }

    #[test]
    fn test_map_unknown_type_uses_fallback() {
        let mapper = TypeMapper::from_translation(Arc::new(translation()));
        assert_eq!(mapper.map("geography"), "text");

        let mapping = mapper.map_type("hierarchyid");
        assert!(mapping.is_lossy);
        assert!(mapping.warning.unwrap().contains("hierarchyid"));
        assert!(!mapper.map_type("int").is_lossy);
    }

    #[test]
    fn test_declared_fallback() {
        let yaml = "mappings:\n  int: Int32\nfallback: String\n";
        let t = TypeTranslation::from_yaml(yaml, "mssql", "clickhouse", "t.yaml").unwrap();
        let mapper = TypeMapper::from_translation(Arc::new(t));
        assert_eq!(mapper.map("money"), "String");
    }

    #[test]
    fn test_invert_first_occurrence_wins() {
        let inverted = translation().invert();
        assert_eq!(inverted.source_engine(), "postgres");
        assert_eq!(inverted.sink_engine(), "mssql");
        assert!(inverted.is_inverted());
        // nvarchar, varchar and NText all map to text; nvarchar appears first.
        assert_eq!(inverted.lookup("text"), Some("nvarchar"));
        assert_eq!(inverted.lookup("uuid"), Some("uniqueidentifier"));
        assert_eq!(inverted.lookup("integer"), Some("int"));
        assert_eq!(inverted.fallback(), "text");
    }

    #[test]
    fn test_invert_uses_reverse_fallback() {
        let yaml = "mappings:\n  int: integer\nreverse_fallback: nvarchar(max)\n";
        let t = TypeTranslation::from_yaml(yaml, "mssql", "postgres", "t.yaml").unwrap();
        assert_eq!(t.fallback(), "text");
        let inverted = t.invert();
        assert_eq!(inverted.fallback(), "nvarchar(max)");
        assert_eq!(inverted.invert().fallback(), "text");
    }

    #[test]
    fn test_batch_map_preserves_flags_and_drops_unusable() {
        let mapper = TypeMapper::from_translation(Arc::new(translation()));
        let columns = vec![
            ColumnDefinition::new("id", "uniqueidentifier").as_primary_key(),
            ColumnDefinition::new("", "int"),
            ColumnDefinition::new("note", " "),
            ColumnDefinition::new("name", "NVARCHAR(100)").not_null(),
            ColumnDefinition::new("shape", "geometry"),
        ];

        let mapped = mapper.batch_map(&columns);
        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0].name, "id");
        assert_eq!(mapped[0].data_type, "uuid");
        assert!(mapped[0].primary_key);
        assert!(!mapped[0].nullable);
        assert_eq!(mapped[1].data_type, "text");
        assert!(!mapped[1].nullable);
        assert_eq!(mapped[2].data_type, "text");
        assert!(mapped[2].nullable);
    }

    #[test]
    fn test_engine_mismatch_rejected() {
        let err =
            TypeTranslation::from_yaml(MSSQL_TO_PG, "mysql", "postgres", "t.yaml").unwrap_err();
        assert!(err.to_string().contains("source_engine"));
    }

    #[test]
    fn test_non_string_mapping_rejected() {
        let yaml = "mappings:\n  int: [integer]\n";
        assert!(TypeTranslation::from_yaml(yaml, "a", "b", "t.yaml").is_err());
    }
}
