//! # cdc-typemap
//!
//! Cross-engine column type system for change-data-capture replication.
//!
//! This library decides whether a source column type may populate a sink
//! column of a possibly different engine, and computes column mappings when
//! a source table is attached to an existing sink table:
//!
//! - **Compatibility maps** per ordered engine pair, with side-specific aliases
//! - **Directional widening** rules plus a universal wildcard entry
//! - **Column overrides** per source group, validated against current consumers
//! - **Type translation** for cloning a source table into a new sink table
//! - **Mapping resolution** with identity coverage and actionable guidance
//!
//! ## Example
//!
//! ```rust,no_run
//! use cdc_typemap::{
//!     ArtifactCatalog, ColumnDefinition, CompatibilityChecker, Config, MappingResolver,
//!     TableColumnSet,
//! };
//!
//! fn main() -> cdc_typemap::Result<()> {
//!     let config = Config::load("cdc-typemap.yaml")?;
//!     let catalog = ArtifactCatalog::new(config.artifacts.clone());
//!     let checker = CompatibilityChecker::new(&catalog, "mssql", "postgres")?;
//!
//!     let source = TableColumnSet::new(vec![ColumnDefinition::new("id", "int").as_primary_key()])?;
//!     let sink = TableColumnSet::new(vec![ColumnDefinition::new("id", "bigint").as_primary_key()])?;
//!     let resolution = MappingResolver::new(&checker).resolve("dbo.orders", &source, &sink, &[])?;
//!     println!("valid: {}", resolution.valid);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod dialect;
pub mod error;
pub mod mapping;
pub mod overrides;
pub mod snapshot;

// Re-exports for convenient access
pub use config::{ArtifactsConfig, Config, SourceGroupConfig};
pub use self::core::{
    names_match, ArtifactCatalog, ColumnContext, ColumnDefinition, ExplicitMapping, MappingStore,
    NoSinkUsages, OverrideStore, SchemaProvider, SinkUsage, SinkUsageLister, TableColumnSet,
};
pub use dialect::{
    CanonicalType, CompatibilityChecker, CompatibilityMap, CompatibilityVerdict, Side, TypeMapper,
    TypeMapping, TypeTranslation,
};
pub use error::{MappingViolation, Result, TypeMapError};
pub use mapping::{
    FileMappingStore, MappingGuidance, MappingOutcome, MappingResolution, MappingResolver,
    MappingWarning,
};
pub use overrides::{
    FileOverrideStore, OverrideDocument, OverrideManager, SourceOverrideEntry,
    SourceOverrideRegistry,
};
pub use snapshot::SchemaSnapshot;
