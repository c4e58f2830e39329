//! Error types for the type system and mapping resolver.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Exit code for configuration errors (missing/malformed artifacts, bad config).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for compatibility and mapping failures.
pub const EXIT_COMPATIBILITY_ERROR: u8 = 2;
/// Exit code for override state errors (conflicts, missing entries).
pub const EXIT_OVERRIDE_ERROR: u8 = 3;
/// Exit code for unknown tables in the schema snapshot.
pub const EXIT_SCHEMA_ERROR: u8 = 4;
/// Exit code for I/O errors.
pub const EXIT_IO_ERROR: u8 = 7;

/// A single explicit-mapping violation found while resolving a table mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingViolation {
    /// The mapping names a source column the source table does not have.
    UnknownSourceColumn {
        column: String,
        available: Vec<String>,
    },
    /// The mapping names a sink column the sink table does not have.
    UnknownSinkColumn {
        column: String,
        available: Vec<String>,
    },
    /// The source column type cannot populate the sink column type.
    TypeMismatch {
        source_column: String,
        source_type: String,
        sink_column: String,
        sink_type: String,
    },
    /// More than one explicit mapping targets the same sink column.
    DuplicateSinkColumn {
        sink_column: String,
        source_columns: Vec<String>,
    },
}

impl fmt::Display for MappingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingViolation::UnknownSourceColumn { column, available } => write!(
                f,
                "unknown source column '{}' (available: {})",
                column,
                available.join(", ")
            ),
            MappingViolation::UnknownSinkColumn { column, available } => write!(
                f,
                "unknown sink column '{}' (available: {})",
                column,
                available.join(", ")
            ),
            MappingViolation::TypeMismatch {
                source_column,
                source_type,
                sink_column,
                sink_type,
            } => write!(
                f,
                "type mismatch: source column '{}' ({}) cannot populate sink column '{}' ({})",
                source_column, source_type, sink_column, sink_type
            ),
            MappingViolation::DuplicateSinkColumn {
                sink_column,
                source_columns,
            } => write!(
                f,
                "sink column '{}' mapped more than once (from: {})",
                sink_column,
                source_columns.join(", ")
            ),
        }
    }
}

/// Main error type for type-system operations.
#[derive(Error, Debug)]
pub enum TypeMapError {
    /// Configuration error (missing or malformed artifact, ambiguous source group, bad config)
    #[error("Configuration error: {message}{}", path_suffix(.path))]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// No artifact exists for an ordered engine pair
    #[error(
        "Configuration error: no artifact for {source_engine} → {sink_engine} (expected one of: {}; searched: {})",
        join_names(.expected),
        display_paths(.search_paths)
    )]
    ArtifactNotFound {
        source_engine: String,
        sink_engine: String,
        expected: Vec<String>,
        search_paths: Vec<PathBuf>,
    },

    /// A cast or mapping is not allowed; carries guidance for the operator
    #[error("Compatibility error: {message}")]
    Compatibility {
        message: String,
        guidance: Vec<String>,
    },

    /// One or more explicit mappings are invalid
    #[error("Invalid explicit mappings: {}", join_violations(.0))]
    MappingViolations(Vec<MappingViolation>),

    /// An override already exists for the column with a different type
    #[error(
        "Override for {table}.{column} already set to '{existing}' (requested '{requested}'); remove it first"
    )]
    OverrideConflict {
        table: String,
        column: String,
        existing: String,
        requested: String,
    },

    /// No override exists for the column
    #[error("No override exists for {table}.{column}")]
    OverrideNotFound { table: String, column: String },

    /// The schema collaborator has no such table
    #[error("Unknown table {table} on engine {engine}")]
    UnknownTable { engine: String, table: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn path_suffix(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" ({})", p.display()),
        None => String::new(),
    }
}

fn join_names(names: &[String]) -> String {
    names.join(", ")
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<none>".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_violations(violations: &[MappingViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl TypeMapError {
    /// Create a Config error without an artifact path.
    pub fn config(message: impl Into<String>) -> Self {
        TypeMapError::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a Config error citing the offending artifact.
    pub fn artifact(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        TypeMapError::Config {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    /// Create a Compatibility error with operator guidance.
    pub fn compatibility(message: impl Into<String>, guidance: Vec<String>) -> Self {
        TypeMapError::Compatibility {
            message: message.into(),
            guidance,
        }
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            TypeMapError::Config { .. }
            | TypeMapError::ArtifactNotFound { .. }
            | TypeMapError::Yaml(_)
            | TypeMapError::Json(_) => EXIT_CONFIG_ERROR,
            TypeMapError::Compatibility { .. } | TypeMapError::MappingViolations(_) => {
                EXIT_COMPATIBILITY_ERROR
            }
            TypeMapError::OverrideConflict { .. } | TypeMapError::OverrideNotFound { .. } => {
                EXIT_OVERRIDE_ERROR
            }
            TypeMapError::UnknownTable { .. } => EXIT_SCHEMA_ERROR,
            TypeMapError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including guidance and error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        match self {
            TypeMapError::Compatibility { guidance, .. } if !guidance.is_empty() => {
                output.push_str("\nSuggestions:");
                for hint in guidance {
                    output.push_str(&format!("\n  - {}", hint));
                }
                output.push('\n');
            }
            TypeMapError::MappingViolations(violations) => {
                output.push_str("\nViolations:");
                for v in violations {
                    output.push_str(&format!("\n  - {}", v));
                }
                output.push('\n');
            }
            _ => {}
        }

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for type-system operations.
pub type Result<T> = std::result::Result<T, TypeMapError>;
