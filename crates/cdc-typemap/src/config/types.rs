//! Configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where compatibility-map and type-translation artifacts are found.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    /// Directory holding one override artifact per source group.
    #[serde(default = "default_overrides_dir")]
    pub overrides_dir: PathBuf,

    /// Directory receiving persisted applied mappings.
    #[serde(default = "default_mappings_dir")]
    pub mappings_dir: PathBuf,

    /// Schema snapshot produced by the introspection step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PathBuf>,

    /// Source groups: which services share one set of column overrides.
    #[serde(default)]
    pub source_groups: Vec<SourceGroupConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig::default(),
            overrides_dir: default_overrides_dir(),
            mappings_dir: default_mappings_dir(),
            snapshot: None,
            source_groups: Vec::new(),
        }
    }
}

/// Artifact search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Directories searched for `<source>_to_<sink>.yaml` compatibility maps.
    #[serde(default)]
    pub compatibility_paths: Vec<PathBuf>,

    /// Directories searched for `<source>_to_<sink>.typemap.yaml` translations.
    #[serde(default)]
    pub typemap_paths: Vec<PathBuf>,

    /// Ignore parenthesized type parameters during alias lookup (default: true).
    #[serde(default = "default_true")]
    pub strip_type_parameters: bool,

    /// Fall back to the bundled artifacts (default: true).
    #[serde(default = "default_true")]
    pub use_builtins: bool,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            compatibility_paths: Vec::new(),
            typemap_paths: Vec::new(),
            strip_type_parameters: true,
            use_builtins: true,
        }
    }
}

/// A named group of services reading from the same source database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceGroupConfig {
    pub name: String,

    /// Source engine of every service in the group.
    pub engine: String,

    #[serde(default)]
    pub services: Vec<String>,
}

fn default_overrides_dir() -> PathBuf {
    PathBuf::from("overrides")
}

fn default_mappings_dir() -> PathBuf {
    PathBuf::from("mappings")
}

fn default_true() -> bool {
    true
}
