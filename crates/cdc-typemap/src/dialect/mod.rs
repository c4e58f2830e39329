//! Cross-engine column type system.
//!
//! - [`canonical`]: spelling normalization and per-side alias tables
//! - [`compat`]: compatibility-map artifacts for one ordered engine pair
//! - [`checker`]: directional source → sink compatibility decisions
//! - [`typemap`]: forward / inverted type translation for cloning tables
//!
//! ```rust,ignore
//! let catalog = ArtifactCatalog::new(config.artifacts.clone());
//! let checker = CompatibilityChecker::new(&catalog, "mssql", "postgres")?;
//! assert!(checker.is_compatible("smallint", "integer", None));
//!
//! let mapper = TypeMapper::new(&catalog, "postgres", "mssql")?;
//! let sink_type = mapper.map("uuid");
//! ```

pub(crate) mod builtin;
pub mod canonical;
pub mod checker;
pub mod compat;
pub mod typemap;

pub use canonical::{normalize_engine, AliasTable, CanonicalType, Side};
pub use checker::{CompatibilityChecker, CompatibilityVerdict};
pub use compat::{CompatibilityMap, CompatibilityMapDocument, WILDCARD};
pub use typemap::{TypeMapper, TypeMapping, TypeTranslation, TypeTranslationDocument};
