//! Directional source → sink type compatibility.
//!
//! A [`CompatibilityChecker`] answers whether a source column type may populate
//! a sink column type for one ordered engine pair:
//!
//! 1. If a column context is given and the source group overrides that
//!    column, the override replaces the declared source type.
//! 2. Both spellings are canonicalized with their side's alias table.
//! 3. The pair is compatible if it is a direct cast, a listed widening, or the
//!    sink type is accepted from any source (`"*"`).
//! 4. When the map ignores type parameters and both spellings carry sizes,
//!    a sink with a smaller length, precision or scale rejects the cast.
//!
//! Compatibility is strictly directional; narrowing is never inferred.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::core::catalog::ArtifactCatalog;
use crate::core::schema::ColumnContext;
use crate::error::Result;
use crate::overrides::SourceOverrideRegistry;

use super::canonical::{narrows_parameters, CanonicalType, Side};
use super::compat::CompatibilityMap;

/// Why a source type may (or may not) populate a sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatibilityVerdict {
    /// `mappings[source] == sink`.
    DirectCast,
    /// `sink` is listed in `compatibility[source]`.
    Widening,
    /// `sink` is listed in `compatibility["*"]`.
    Wildcard,
    /// The types match but the sink declares a smaller length, precision or scale.
    Narrowing,
    Incompatible,
}

impl CompatibilityVerdict {
    pub fn is_compatible(self) -> bool {
        matches!(
            self,
            CompatibilityVerdict::DirectCast
                | CompatibilityVerdict::Widening
                | CompatibilityVerdict::Wildcard
        )
    }
}

impl fmt::Display for CompatibilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompatibilityVerdict::DirectCast => write!(f, "direct cast"),
            CompatibilityVerdict::Widening => write!(f, "widening cast"),
            CompatibilityVerdict::Wildcard => write!(f, "accepted from any type"),
            CompatibilityVerdict::Narrowing => write!(f, "narrows length or precision"),
            CompatibilityVerdict::Incompatible => write!(f, "incompatible"),
        }
    }
}

/// Compatibility checks for one ordered (source engine, sink engine) pair.
#[derive(Debug, Clone)]
pub struct CompatibilityChecker {
    map: Arc<CompatibilityMap>,
    overrides: Option<Arc<SourceOverrideRegistry>>,
}

impl CompatibilityChecker {
    /// Create a checker for a source→sink pair.
    ///
    /// A missing compatibility map is a configuration error; the reverse
    /// artifact is never consulted.
    pub fn new(catalog: &ArtifactCatalog, source_engine: &str, sink_engine: &str) -> Result<Self> {
        let map = catalog.compatibility_map(source_engine, sink_engine)?;
        Ok(Self::from_map(map))
    }

    pub fn from_map(map: Arc<CompatibilityMap>) -> Self {
        Self {
            map,
            overrides: None,
        }
    }

    /// Apply a source group's column overrides to context-scoped checks.
    pub fn with_overrides(mut self, overrides: Arc<SourceOverrideRegistry>) -> Self {
        self.overrides = Some(overrides);
        self
    }

    pub fn source_engine(&self) -> &str {
        self.map.source_engine()
    }

    pub fn sink_engine(&self) -> &str {
        self.map.sink_engine()
    }

    pub fn compatibility_map(&self) -> &CompatibilityMap {
        &self.map
    }

    /// The source type actually in effect for a column.
    pub fn effective_source_type(
        &self,
        source_type: &str,
        context: Option<&ColumnContext>,
    ) -> String {
        match (context, &self.overrides) {
            (Some(ctx), Some(registry)) => registry
                .effective_type(&ctx.table, &ctx.column, source_type)
                .to_string(),
            _ => source_type.to_string(),
        }
    }

    /// Classify a source → sink cast.
    pub fn check(
        &self,
        source_type: &str,
        sink_type: &str,
        context: Option<&ColumnContext>,
    ) -> CompatibilityVerdict {
        let effective = self.effective_source_type(source_type, context);
        let source = self.map.normalize(&effective, Side::Source);
        let sink = self.map.normalize(sink_type, Side::Sink);

        let mut verdict = self.classify(&source, &sink);
        if verdict.is_compatible()
            && self.map.strips_parameters()
            && narrows_parameters(&effective, sink_type)
        {
            verdict = CompatibilityVerdict::Narrowing;
        }
        debug!(
            "{} '{}' → {} '{}': {}{}",
            self.map.source_engine(),
            source,
            self.map.sink_engine(),
            sink,
            verdict,
            if effective != source_type {
                format!(" (override of '{}')", source_type)
            } else {
                String::new()
            }
        );
        verdict
    }

    /// Whether a source type may populate a sink type.
    pub fn is_compatible(
        &self,
        source_type: &str,
        sink_type: &str,
        context: Option<&ColumnContext>,
    ) -> bool {
        self.check(source_type, sink_type, context).is_compatible()
    }

    fn classify(&self, source: &CanonicalType, sink: &CanonicalType) -> CompatibilityVerdict {
        if self.map.is_direct_cast(source, sink) {
            CompatibilityVerdict::DirectCast
        } else if self.map.widenings(source).any(|t| t == sink) {
            CompatibilityVerdict::Widening
        } else if self.map.is_wildcard(sink) {
            CompatibilityVerdict::Wildcard
        } else {
            CompatibilityVerdict::Incompatible
        }
    }

    /// Every sink type a source type may populate, in a stable order:
    /// direct cast first, then widenings, then wildcard types.
    pub fn sink_candidates(
        &self,
        source_type: &str,
        context: Option<&ColumnContext>,
    ) -> Vec<String> {
        let effective = self.effective_source_type(source_type, context);
        let source = self.map.normalize(&effective, Side::Source);

        let mut out: Vec<String> = Vec::new();
        let mut push = |t: &CanonicalType| {
            if !out.iter().any(|o| o == t.as_str()) {
                out.push(t.to_string());
            }
        };

        if let Some(direct) = self.map.direct_target(&source) {
            push(direct);
        }
        self.map.widenings(&source).for_each(&mut push);
        self.map.wildcard().for_each(&mut push);
        out
    }
}
