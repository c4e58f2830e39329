//! Core abstractions shared by the type system.
//!
//! - [`schema`]: column metadata, explicit mappings and sink usages
//! - [`traits`]: collaborator interfaces for introspection and persistence
//! - [`catalog`]: artifact registry for dependency injection
//!
//! Nothing in `core` performs database I/O. Schema snapshots and override
//! artifacts reach the type system through the traits in [`traits`], so the
//! checker and resolver can be exercised with in-memory implementations.

pub mod catalog;
pub mod schema;
pub mod traits;

// Re-export commonly used types for convenience
pub use catalog::ArtifactCatalog;
pub use schema::{
    names_match, ColumnContext, ColumnDefinition, ExplicitMapping, SinkUsage, TableColumnSet,
};
pub use traits::{MappingStore, NoSinkUsages, OverrideStore, SchemaProvider, SinkUsageLister};
