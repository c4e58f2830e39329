//! Compatibility-map artifacts.
//!
//! One artifact per ordered (source engine, sink engine) pair:
//!
//! ```yaml
//! metadata:
//!   description: SQL Server → PostgreSQL
//! aliases:
//!   source:
//!     integer: int
//!   sink:
//!     int4: integer
//! mappings:
//!   int: integer
//!   smallint: smallint
//! compatibility:
//!   int: [integer, bigint, numeric, real, double precision]
//!   "*": [text]
//! ```
//!
//! [`CompatibilityMapDocument`] is the raw serde shape; [`CompatibilityMap`] is
//! the validated, normalized form used for lookups. All shape errors surface
//! while parsing, never during a lookup.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TypeMapError};

use super::canonical::{canonical_spelling, AliasTable, CanonicalType, Side};

/// Reserved compatibility key: sink types acceptable from any source type.
pub const WILDCARD: &str = "*";

/// `aliases` section of a compatibility-map artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasSections {
    #[serde(default)]
    pub source: BTreeMap<String, String>,
    #[serde(default)]
    pub sink: BTreeMap<String, String>,
}

/// Raw compatibility-map artifact as written on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatibilityMapDocument {
    /// Free-form metadata (description, author, version...).
    #[serde(default)]
    pub metadata: serde_yaml::Value,

    #[serde(default)]
    pub aliases: AliasSections,

    /// Direct/conventional casts: source type → sink type.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,

    /// Additional safe widenings: source type → sink types, plus the `"*"` key.
    #[serde(default)]
    pub compatibility: BTreeMap<String, Vec<String>>,
}

impl CompatibilityMapDocument {
    /// Parse an artifact, reporting shape errors against `origin`.
    pub fn from_yaml(yaml: &str, origin: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TypeMapError::artifact(format!("malformed compatibility map: {}", e), origin)
        })
    }

    /// Load an artifact from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content, &path.display().to_string())
    }
}

/// Validated compatibility map for one ordered engine pair.
#[derive(Debug, Clone)]
pub struct CompatibilityMap {
    source_engine: String,
    sink_engine: String,
    origin: String,
    source_aliases: AliasTable,
    sink_aliases: AliasTable,
    mappings: HashMap<CanonicalType, CanonicalType>,
    compatibility: HashMap<CanonicalType, BTreeSet<CanonicalType>>,
    wildcard: BTreeSet<CanonicalType>,
    strip_params: bool,
}

impl CompatibilityMap {
    /// Validate and normalize a parsed artifact.
    ///
    /// # Arguments
    ///
    /// * `origin` - Artifact path or builtin name, cited in errors
    /// * `strip_params` - Whether parenthesized type parameters are ignored
    pub fn from_document(
        document: CompatibilityMapDocument,
        source_engine: impl Into<String>,
        sink_engine: impl Into<String>,
        origin: impl Into<String>,
        strip_params: bool,
    ) -> Result<Self> {
        let origin = origin.into();

        let source_aliases = AliasTable::from_entries(
            &document.aliases.source,
            strip_params,
            Side::Source,
            &origin,
        )?;
        let sink_aliases =
            AliasTable::from_entries(&document.aliases.sink, strip_params, Side::Sink, &origin)?;

        let mut mappings = HashMap::with_capacity(document.mappings.len());
        for (source, sink) in &document.mappings {
            if source.trim() == WILDCARD {
                return Err(TypeMapError::artifact(
                    "mappings may not use the reserved '*' key (use compatibility instead)",
                    origin.as_str(),
                ));
            }
            let s = canonical(source, strip_params, "mappings", &origin)?;
            let k = canonical(sink, strip_params, "mappings", &origin)?;
            if let Some(existing) = mappings.get(&s) {
                if existing != &k {
                    return Err(TypeMapError::artifact(
                        format!(
                            "mappings: '{}' maps to both '{}' and '{}'",
                            s, existing, k
                        ),
                        origin.as_str(),
                    ));
                }
            }
            mappings.insert(s, k);
        }

        let mut compatibility: HashMap<CanonicalType, BTreeSet<CanonicalType>> = HashMap::new();
        let mut wildcard = BTreeSet::new();
        for (source, sinks) in &document.compatibility {
            let targets = sinks
                .iter()
                .map(|t| canonical(t, strip_params, "compatibility", &origin))
                .collect::<Result<Vec<_>>>()?;

            if source.trim() == WILDCARD {
                wildcard.extend(targets);
            } else {
                let s = canonical(source, strip_params, "compatibility", &origin)?;
                compatibility.entry(s).or_default().extend(targets);
            }
        }

        let map = Self {
            source_engine: source_engine.into(),
            sink_engine: sink_engine.into(),
            origin,
            source_aliases,
            sink_aliases,
            mappings,
            compatibility,
            wildcard,
            strip_params,
        };

        debug!(
            "Parsed compatibility map {} → {} from {}: {} mappings, {} widening entries, {} wildcard types",
            map.source_engine,
            map.sink_engine,
            map.origin,
            map.mappings.len(),
            map.compatibility.len(),
            map.wildcard.len()
        );

        Ok(map)
    }

    /// Parse and validate an artifact from YAML text.
    pub fn from_yaml(
        yaml: &str,
        source_engine: &str,
        sink_engine: &str,
        origin: &str,
        strip_params: bool,
    ) -> Result<Self> {
        let document = CompatibilityMapDocument::from_yaml(yaml, origin)?;
        Self::from_document(document, source_engine, sink_engine, origin, strip_params)
    }

    pub fn source_engine(&self) -> &str {
        &self.source_engine
    }

    pub fn sink_engine(&self) -> &str {
        &self.sink_engine
    }

    /// Artifact path or builtin name this map was loaded from.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether type parameters are dropped when canonicalizing.
    pub fn strips_parameters(&self) -> bool {
        self.strip_params
    }

    /// Canonicalize a raw type spelling for one side of the pair.
    pub fn normalize(&self, raw: &str, side: Side) -> CanonicalType {
        match side {
            Side::Source => self.source_aliases.resolve(raw),
            Side::Sink => self.sink_aliases.resolve(raw),
        }
    }

    /// Whether `source` casts directly to `sink` according to `mappings`.
    pub fn is_direct_cast(&self, source: &CanonicalType, sink: &CanonicalType) -> bool {
        self.mappings.get(source) == Some(sink)
    }

    /// Whether `sink` is a listed widening of `source`, or accepted from any type.
    pub fn is_widening_compatible(&self, source: &CanonicalType, sink: &CanonicalType) -> bool {
        self.compatibility
            .get(source)
            .map_or(false, |targets| targets.contains(sink))
            || self.is_wildcard(sink)
    }

    /// Whether `sink` accepts values from any source type.
    pub fn is_wildcard(&self, sink: &CanonicalType) -> bool {
        self.wildcard.contains(sink)
    }

    /// Direct-cast target of a canonical source type, if any.
    pub fn direct_target(&self, source: &CanonicalType) -> Option<&CanonicalType> {
        self.mappings.get(source)
    }

    /// Listed widenings of a canonical source type (excluding the wildcard).
    pub fn widenings(&self, source: &CanonicalType) -> impl Iterator<Item = &CanonicalType> {
        self.compatibility.get(source).into_iter().flatten()
    }

    /// Sink types acceptable from any source type.
    pub fn wildcard(&self) -> impl Iterator<Item = &CanonicalType> {
        self.wildcard.iter()
    }
}

fn canonical(raw: &str, strip_params: bool, section: &str, origin: &str) -> Result<CanonicalType> {
    let spelling = canonical_spelling(raw, strip_params);
    if spelling.is_empty() {
        return Err(TypeMapError::artifact(
            format!("{} contains an empty type name", section),
            origin,
        ));
    }
    Ok(CanonicalType::from_normalized(spelling))
}
