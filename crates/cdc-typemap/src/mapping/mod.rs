//! Column mapping between a source table and an existing sink table.
//!
//! [`MappingResolver`] validates user-declared explicit mappings, infers
//! identity coverage for same-named columns and reports required sink columns
//! nothing populates. Two call-site policies decide severity:
//!
//! - [`MappingResolver::resolve_for_attach`]: an invalid resolution is rejected
//! - [`MappingResolver::resolve_for_modify`]: unpopulated required columns are warnings
//!
//! Persisting the applied mappings is left to a [`MappingStore`](crate::core::traits::MappingStore).

mod resolver;
mod store;

pub use resolver::{
    IncompatibleIdentity, MappingGuidance, MappingOutcome, MappingResolution, MappingResolver,
    MappingWarning, MAX_SUGGESTED_SOURCES,
};
pub use store::{FileMappingStore, MappingDocument};
