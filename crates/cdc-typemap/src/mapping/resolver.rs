//! Column mapping resolution for attaching a source table to an existing sink table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::schema::{ColumnContext, ColumnDefinition, ExplicitMapping, TableColumnSet};
use crate::dialect::CompatibilityChecker;
use crate::error::{MappingViolation, Result, TypeMapError};

/// Maximum number of source column names listed in guidance.
pub const MAX_SUGGESTED_SOURCES: usize = 5;

/// A same-named source/sink column pair whose types are not compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompatibleIdentity {
    pub sink_column: String,
    pub source_type: String,
    pub sink_type: String,
}

/// Operator guidance for one unresolved required sink column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingGuidance {
    /// A same-named source column exists but its type cannot populate the sink.
    IncompatibleIdentity {
        sink_column: String,
        sink_type: String,
        source_type: String,
        candidates: Vec<String>,
    },
    /// No source column shares the sink column's name.
    NoIdentityCandidate {
        sink_column: String,
        sink_type: String,
        available_sources: Vec<String>,
    },
}

impl MappingGuidance {
    pub fn sink_column(&self) -> &str {
        match self {
            MappingGuidance::IncompatibleIdentity { sink_column, .. }
            | MappingGuidance::NoIdentityCandidate { sink_column, .. } => sink_column,
        }
    }
}

impl fmt::Display for MappingGuidance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingGuidance::IncompatibleIdentity {
                sink_column,
                sink_type,
                source_type,
                candidates,
            } => {
                write!(
                    f,
                    "required sink column '{}' ({}) has a same-named source column of type {}, which cannot populate it; add an explicit mapping from a compatible source column",
                    sink_column, sink_type, source_type
                )?;
                if !candidates.is_empty() {
                    write!(f, " (e.g. {})", candidates.join(", "))?;
                }
                Ok(())
            }
            MappingGuidance::NoIdentityCandidate {
                sink_column,
                sink_type,
                available_sources,
            } => {
                write!(
                    f,
                    "required sink column '{}' ({}) has no source column of the same name; map one explicitly",
                    sink_column, sink_type
                )?;
                if available_sources.is_empty() {
                    write!(f, " (the source table has no columns)")
                } else {
                    write!(f, " (available: {})", available_sources.join(", "))
                }
            }
        }
    }
}

/// Complete outcome of resolving one source table against one sink table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingResolution {
    /// Explicit mappings, sink column → source column, with the tables' own
    /// spellings. One source column may feed several sink columns.
    pub applied_mappings: BTreeMap<String, String>,
    /// Sink columns populated by the same-named source column.
    pub identity_covered_sink_cols: BTreeSet<String>,
    /// Same-named pairs that were not auto-mapped because their types clash.
    pub incompatible_identity_cols: Vec<IncompatibleIdentity>,
    /// Required sink columns nothing populates, in sink column order.
    pub unmapped_required_sink_cols: Vec<String>,
    pub valid: bool,
    pub guidance: Vec<MappingGuidance>,
}

/// A downgraded validation finding on the modify path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingWarning {
    pub sink_column: String,
    pub message: String,
}

impl fmt::Display for MappingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// A resolution accepted by one of the call-site policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingOutcome {
    pub resolution: MappingResolution,
    pub warnings: Vec<MappingWarning>,
}

/// Computes column mappings between a source table and an existing sink table.
#[derive(Debug, Clone, Copy)]
pub struct MappingResolver<'a> {
    checker: &'a CompatibilityChecker,
}

impl<'a> MappingResolver<'a> {
    pub fn new(checker: &'a CompatibilityChecker) -> Self {
        Self { checker }
    }

    /// Resolve the full column mapping.
    ///
    /// Invalid explicit mappings fail with the complete violation report.
    /// Otherwise the resolution is returned, with `valid` telling whether
    /// every required sink column is populated.
    pub fn resolve(
        &self,
        source_table: &str,
        source: &TableColumnSet,
        sink: &TableColumnSet,
        explicit: &[ExplicitMapping],
    ) -> Result<MappingResolution> {
        let applied = self.validate_explicit(source_table, source, sink, explicit)?;
        let explicit_sinks: BTreeSet<&str> = applied.keys().map(String::as_str).collect();

        let mut identity_covered = BTreeSet::new();
        let mut incompatible = Vec::new();
        for sink_col in sink.iter() {
            if explicit_sinks.contains(sink_col.name.as_str()) {
                continue;
            }
            let Some(source_col) = source.get(&sink_col.name) else {
                continue;
            };
            let ctx = ColumnContext::new(source_table, &source_col.name);
            if self
                .checker
                .is_compatible(&source_col.data_type, &sink_col.data_type, Some(&ctx))
            {
                identity_covered.insert(sink_col.name.clone());
            } else {
                incompatible.push(IncompatibleIdentity {
                    sink_column: sink_col.name.clone(),
                    source_type: self
                        .checker
                        .effective_source_type(&source_col.data_type, Some(&ctx)),
                    sink_type: sink_col.data_type.clone(),
                });
            }
        }

        let unmapped: Vec<&ColumnDefinition> = sink
            .required()
            .filter(|c| {
                !explicit_sinks.contains(c.name.as_str()) && !identity_covered.contains(&c.name)
            })
            .collect();

        let required_incompatible = incompatible.iter().any(|i| {
            sink.get(&i.sink_column)
                .map_or(false, ColumnDefinition::is_required)
        });
        let valid = unmapped.is_empty() && !required_incompatible;

        let guidance = unmapped
            .iter()
            .map(|col| self.guidance_for(source_table, source, col, &incompatible))
            .collect();

        debug!(
            "Resolved {}: {} explicit, {} identity, {} incompatible identity, {} unmapped required, valid={}",
            source_table,
            applied.len(),
            identity_covered.len(),
            incompatible.len(),
            unmapped.len(),
            valid
        );

        Ok(MappingResolution {
            applied_mappings: applied,
            identity_covered_sink_cols: identity_covered,
            incompatible_identity_cols: incompatible,
            unmapped_required_sink_cols: unmapped.iter().map(|c| c.name.clone()).collect(),
            valid,
            guidance,
        })
    }

    /// Resolve for a first-time attachment: an invalid resolution is rejected.
    pub fn resolve_for_attach(
        &self,
        source_table: &str,
        source: &TableColumnSet,
        sink: &TableColumnSet,
        explicit: &[ExplicitMapping],
    ) -> Result<MappingOutcome> {
        let resolution = self.resolve(source_table, source, sink, explicit)?;
        if !resolution.valid {
            return Err(TypeMapError::compatibility(
                format!(
                    "cannot attach {}: required sink column(s) not populated: {}",
                    source_table,
                    resolution.unmapped_required_sink_cols.join(", ")
                ),
                resolution.guidance.iter().map(|g| g.to_string()).collect(),
            ));
        }
        Ok(MappingOutcome {
            resolution,
            warnings: Vec::new(),
        })
    }

    /// Resolve for modifying an attached table's mappings.
    ///
    /// Only explicit-mapping violations fail; unpopulated required columns
    /// become warnings since the sink may already be filled by other means.
    pub fn resolve_for_modify(
        &self,
        source_table: &str,
        source: &TableColumnSet,
        sink: &TableColumnSet,
        explicit: &[ExplicitMapping],
    ) -> Result<MappingOutcome> {
        let resolution = self.resolve(source_table, source, sink, explicit)?;
        let warnings: Vec<MappingWarning> = resolution
            .guidance
            .iter()
            .map(|g| MappingWarning {
                sink_column: g.sink_column().to_string(),
                message: g.to_string(),
            })
            .collect();
        for w in &warnings {
            warn!("{}: {}", source_table, w);
        }
        Ok(MappingOutcome {
            resolution,
            warnings,
        })
    }

    /// Validate explicit mappings, returning them keyed by sink column.
    fn validate_explicit(
        &self,
        source_table: &str,
        source: &TableColumnSet,
        sink: &TableColumnSet,
        explicit: &[ExplicitMapping],
    ) -> Result<BTreeMap<String, String>> {
        let mut violations = Vec::new();
        let mut by_sink: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for mapping in explicit {
            let source_col = source.get(&mapping.source_column);
            let sink_col = sink.get(&mapping.sink_column);

            if source_col.is_none() {
                violations.push(MappingViolation::UnknownSourceColumn {
                    column: mapping.source_column.clone(),
                    available: source.names(),
                });
            }
            if sink_col.is_none() {
                violations.push(MappingViolation::UnknownSinkColumn {
                    column: mapping.sink_column.clone(),
                    available: sink.names(),
                });
            }
            let (Some(source_col), Some(sink_col)) = (source_col, sink_col) else {
                continue;
            };

            let ctx = ColumnContext::new(source_table, &source_col.name);
            if !self
                .checker
                .is_compatible(&source_col.data_type, &sink_col.data_type, Some(&ctx))
            {
                violations.push(MappingViolation::TypeMismatch {
                    source_column: source_col.name.clone(),
                    source_type: self
                        .checker
                        .effective_source_type(&source_col.data_type, Some(&ctx)),
                    sink_column: sink_col.name.clone(),
                    sink_type: sink_col.data_type.clone(),
                });
            }

            push_unique(by_sink.entry(sink_col.name.clone()).or_default(), &source_col.name);
        }

        for (sink_column, sources) in &by_sink {
            if sources.len() > 1 {
                violations.push(MappingViolation::DuplicateSinkColumn {
                    sink_column: sink_column.clone(),
                    source_columns: sources.clone(),
                });
            }
        }

        if !violations.is_empty() {
            return Err(TypeMapError::MappingViolations(violations));
        }

        Ok(by_sink
            .into_iter()
            .filter_map(|(sink, mut sources)| sources.pop().map(|source| (sink, source)))
            .collect())
    }

    fn guidance_for(
        &self,
        source_table: &str,
        source: &TableColumnSet,
        sink_col: &ColumnDefinition,
        incompatible: &[IncompatibleIdentity],
    ) -> MappingGuidance {
        let compatible: Vec<String> = source
            .iter()
            .filter(|c| {
                let ctx = ColumnContext::new(source_table, &c.name);
                self.checker
                    .is_compatible(&c.data_type, &sink_col.data_type, Some(&ctx))
            })
            .map(|c| c.name.clone())
            .take(MAX_SUGGESTED_SOURCES)
            .collect();

        match incompatible.iter().find(|i| i.sink_column == sink_col.name) {
            Some(identity) => MappingGuidance::IncompatibleIdentity {
                sink_column: sink_col.name.clone(),
                sink_type: sink_col.data_type.clone(),
                source_type: identity.source_type.clone(),
                candidates: compatible,
            },
            None => {
                let mut available = compatible;
                for name in source.names() {
                    if available.len() >= MAX_SUGGESTED_SOURCES {
                        break;
                    }
                    if !available.contains(&name) {
                        available.push(name);
                    }
                }
                MappingGuidance::NoIdentityCandidate {
                    sink_column: sink_col.name.clone(),
                    sink_type: sink_col.data_type.clone(),
                    available_sources: available,
                }
            }
        }
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::CompatibilityMap;
    use crate::overrides::{OverrideDocument, SourceOverrideRegistry};
    use std::sync::Arc;

    const MAP: &str = r#"
aliases:
  sink:
    int4: integer
mappings:
  uuid: uuid
  text: text
  integer: integer
  int: integer
  smallint: smallint
compatibility:
  int: [integer, bigint]
  smallint: [smallint, integer, bigint]
  "*": [text]
"#;

    fn checker() -> CompatibilityChecker {
        let map =
            CompatibilityMap::from_yaml(MAP, "postgres", "postgres", "test.yaml", true).unwrap();
        CompatibilityChecker::from_map(Arc::new(map))
    }

    fn cols(columns: Vec<ColumnDefinition>) -> TableColumnSet {
        TableColumnSet::new(columns).unwrap()
    }

    fn scenario_a() -> (TableColumnSet, TableColumnSet) {
        let source = cols(vec![
            ColumnDefinition::new("id", "uuid").as_primary_key(),
            ColumnDefinition::new("name", "text"),
        ]);
        let sink = cols(vec![
            ColumnDefinition::new("id", "uuid").as_primary_key(),
            ColumnDefinition::new("full_name", "text").not_null(),
        ]);
        (source, sink)
    }

    #[test]
    fn test_scenario_unmapped_required_column() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let r = MappingResolver::new(&checker)
            .resolve("public.people", &source, &sink, &[])
            .unwrap();

        assert_eq!(r.unmapped_required_sink_cols, vec!["full_name"]);
        assert!(!r.valid);
        assert!(r.identity_covered_sink_cols.contains("id"));
        match &r.guidance[0] {
            MappingGuidance::NoIdentityCandidate {
                sink_column,
                available_sources,
                ..
            } => {
                assert_eq!(sink_column, "full_name");
                assert_eq!(available_sources, &vec!["id".to_string(), "name".to_string()]);
            }
            other => panic!("unexpected guidance: {:?}", other),
        }
    }

    #[test]
    fn test_scenario_explicit_mapping_resolves() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let explicit = vec![ExplicitMapping::new("name", "full_name")];
        let r = MappingResolver::new(&checker)
            .resolve("public.people", &source, &sink, &explicit)
            .unwrap();

        assert!(r.valid);
        assert_eq!(
            r.applied_mappings,
            BTreeMap::from([("full_name".to_string(), "name".to_string())])
        );
        assert_eq!(r.identity_covered_sink_cols, BTreeSet::from(["id".to_string()]));
        assert!(r.guidance.is_empty());
    }

    #[test]
    fn test_scenario_identity_via_wildcard() {
        let checker = checker();
        let source = cols(vec![ColumnDefinition::new("status", "integer")]);
        let sink = cols(vec![ColumnDefinition::new("status", "text")]);
        let r = MappingResolver::new(&checker)
            .resolve("public.orders", &source, &sink, &[])
            .unwrap();

        assert!(r.valid);
        assert!(r.applied_mappings.is_empty());
        assert!(r.identity_covered_sink_cols.contains("status"));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let resolver = MappingResolver::new(&checker);
        let first = resolver.resolve("public.people", &source, &sink, &[]).unwrap();
        let second = resolver.resolve("public.people", &source, &sink, &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_explicit_violations_are_reported_together() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let explicit = vec![
            ExplicitMapping::new("nme", "full_name"),
            ExplicitMapping::new("name", "fullname"),
        ];
        let err = MappingResolver::new(&checker)
            .resolve("public.people", &source, &sink, &explicit)
            .unwrap_err();

        match err {
            TypeMapError::MappingViolations(v) => {
                assert_eq!(v.len(), 2);
                assert!(matches!(
                    &v[0],
                    MappingViolation::UnknownSourceColumn { column, .. } if column == "nme"
                ));
                assert!(matches!(
                    &v[1],
                    MappingViolation::UnknownSinkColumn { column, .. } if column == "fullname"
                ));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_explicit_type_mismatch() {
        let checker = checker();
        let source = cols(vec![ColumnDefinition::new("code", "int")]);
        let sink = cols(vec![ColumnDefinition::new("code_small", "smallint")]);
        let err = MappingResolver::new(&checker)
            .resolve("dbo.t", &source, &sink, &[ExplicitMapping::new("code", "code_small")])
            .unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
        assert_eq!(err.exit_code(), crate::error::EXIT_COMPATIBILITY_ERROR);
    }

    #[test]
    fn test_override_applies_to_explicit_mapping() {
        let mut doc = OverrideDocument::default();
        doc.insert("dbo.t", "code", "smallint");
        let registry = SourceOverrideRegistry::new("erp", "postgres", doc);
        let checker = checker().with_overrides(Arc::new(registry));

        let source = cols(vec![ColumnDefinition::new("code", "int")]);
        let sink = cols(vec![ColumnDefinition::new("code_small", "smallint").not_null()]);
        let r = MappingResolver::new(&checker)
            .resolve("dbo.t", &source, &sink, &[ExplicitMapping::new("code", "code_small")])
            .unwrap();
        assert!(r.valid);
    }

    #[test]
    fn test_duplicate_sink_column_rejected() {
        let checker = checker();
        let source = cols(vec![
            ColumnDefinition::new("a", "text"),
            ColumnDefinition::new("b", "text"),
        ]);
        let sink = cols(vec![ColumnDefinition::new("c", "text")]);
        let explicit = vec![ExplicitMapping::new("a", "c"), ExplicitMapping::new("b", "c")];
        let err = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &explicit)
            .unwrap_err();
        assert!(err.to_string().contains("mapped more than once"));
    }

    #[test]
    fn test_repeated_identical_mapping_is_harmless() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let explicit = vec![
            ExplicitMapping::new("name", "full_name"),
            ExplicitMapping::new("NAME", "Full_Name"),
        ];
        let r = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &explicit)
            .unwrap();
        assert_eq!(r.applied_mappings.len(), 1);
    }

    #[test]
    fn test_source_column_may_feed_several_sink_columns() {
        let checker = checker();
        let source = cols(vec![ColumnDefinition::new("id", "uuid").as_primary_key()]);
        let sink = cols(vec![
            ColumnDefinition::new("pk", "uuid").as_primary_key(),
            ColumnDefinition::new("legacy_id", "uuid").not_null(),
        ]);
        let explicit = vec![
            ExplicitMapping::new("id", "pk"),
            ExplicitMapping::new("id", "legacy_id"),
        ];
        let r = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &explicit)
            .unwrap();

        assert!(r.valid);
        assert_eq!(
            r.applied_mappings,
            BTreeMap::from([
                ("legacy_id".to_string(), "id".to_string()),
                ("pk".to_string(), "id".to_string()),
            ])
        );
        assert!(r.unmapped_required_sink_cols.is_empty());
    }

    #[test]
    fn test_identity_matches_non_ascii_names_case_insensitively() {
        let checker = checker();
        let source = cols(vec![ColumnDefinition::new("ÆBLE", "int")]);
        let sink = cols(vec![ColumnDefinition::new("æble", "integer").not_null()]);
        let r = MappingResolver::new(&checker)
            .resolve("dbo.Frugt", &source, &sink, &[])
            .unwrap();

        assert!(r.valid);
        assert!(r.identity_covered_sink_cols.contains("æble"));
    }

    #[test]
    fn test_override_context_matches_non_ascii_case() {
        let mut doc = OverrideDocument::default();
        doc.insert("dbo.Bøger", "Længde", "smallint");
        let registry = SourceOverrideRegistry::new("erp", "postgres", doc);
        let checker = checker().with_overrides(Arc::new(registry));

        let ctx = ColumnContext::new("DBO.BØGER", "LÆNGDE");
        assert!(checker.is_compatible("int", "smallint", Some(&ctx)));

        let source = cols(vec![ColumnDefinition::new("LÆNGDE", "int")]);
        let sink = cols(vec![ColumnDefinition::new("længde", "smallint").not_null()]);
        let r = MappingResolver::new(&checker)
            .resolve("DBO.BØGER", &source, &sink, &[])
            .unwrap();
        assert!(r.valid);
    }

    #[test]
    fn test_incompatible_identity_only_matters_when_required() {
        let checker = checker();
        let source = cols(vec![
            ColumnDefinition::new("id", "uuid").as_primary_key(),
            ColumnDefinition::new("code", "int"),
            ColumnDefinition::new("level", "int"),
        ]);
        let sink = cols(vec![
            ColumnDefinition::new("id", "uuid").as_primary_key(),
            ColumnDefinition::new("code", "smallint"),
            ColumnDefinition::new("level", "smallint").not_null(),
        ]);
        let r = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &[])
            .unwrap();

        assert_eq!(r.incompatible_identity_cols.len(), 2);
        assert_eq!(r.unmapped_required_sink_cols, vec!["level"]);
        assert!(!r.valid);
        assert!(matches!(
            &r.guidance[0],
            MappingGuidance::IncompatibleIdentity { sink_column, source_type, .. }
                if sink_column == "level" && source_type == "int"
        ));
    }

    #[test]
    fn test_default_makes_column_optional() {
        let checker = checker();
        let source = cols(vec![ColumnDefinition::new("id", "uuid").as_primary_key()]);
        let sink = cols(vec![
            ColumnDefinition::new("id", "uuid").as_primary_key(),
            ColumnDefinition::new("created", "timestamptz").not_null().with_default(),
        ]);
        let r = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &[])
            .unwrap();
        assert!(r.valid);
    }

    #[test]
    fn test_identity_matches_case_insensitively() {
        let checker = checker();
        let source = cols(vec![ColumnDefinition::new("CustomerId", "uuid")]);
        let sink = cols(vec![ColumnDefinition::new("customerid", "uuid").not_null()]);
        let r = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &[])
            .unwrap();
        assert!(r.valid);
        assert!(r.identity_covered_sink_cols.contains("customerid"));
    }

    #[test]
    fn test_guidance_lists_at_most_five_sources() {
        let checker = checker();
        let source = cols(
            (0..8)
                .map(|i| ColumnDefinition::new(format!("c{}", i), "uuid"))
                .collect(),
        );
        let sink = cols(vec![ColumnDefinition::new("target", "bytea").not_null()]);
        let r = MappingResolver::new(&checker)
            .resolve("t", &source, &sink, &[])
            .unwrap();
        match &r.guidance[0] {
            MappingGuidance::NoIdentityCandidate { available_sources, .. } => {
                assert_eq!(available_sources.len(), MAX_SUGGESTED_SOURCES);
            }
            other => panic!("unexpected guidance: {:?}", other),
        }
    }

    #[test]
    fn test_attach_rejects_invalid_resolution() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let err = MappingResolver::new(&checker)
            .resolve_for_attach("public.people", &source, &sink, &[])
            .unwrap_err();
        match err {
            TypeMapError::Compatibility { message, guidance } => {
                assert!(message.contains("full_name"));
                assert_eq!(guidance.len(), 1);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_modify_downgrades_to_warnings() {
        let checker = checker();
        let (source, sink) = scenario_a();
        let outcome = MappingResolver::new(&checker)
            .resolve_for_modify("public.people", &source, &sink, &[])
            .unwrap();
        assert!(!outcome.resolution.valid);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].sink_column, "full_name");

        let bad = vec![ExplicitMapping::new("missing", "full_name")];
        assert!(MappingResolver::new(&checker)
            .resolve_for_modify("public.people", &source, &sink, &bad)
            .is_err());
    }
}
