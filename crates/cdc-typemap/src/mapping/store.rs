//! File-based persistence of applied column mappings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::schema::ExplicitMapping;
use crate::core::traits::MappingStore;
use crate::error::{Result, TypeMapError};

/// Persisted explicit mappings of one source table → sink table attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingDocument {
    pub source_table: String,
    pub sink_engine: String,
    pub sink_table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Sink column → source column.
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

impl MappingDocument {
    /// The stored mappings as explicit mappings, in sink column order.
    pub fn explicit_mappings(&self) -> Vec<ExplicitMapping> {
        self.mappings
            .iter()
            .map(|(sink, source)| ExplicitMapping::new(source, sink))
            .collect()
    }
}

/// Stores mappings at `<dir>/<source_table>__<sink_engine>.<sink_table>.yaml`.
#[derive(Debug, Clone)]
pub struct FileMappingStore {
    dir: PathBuf,
}

impl FileMappingStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(
        &self,
        source_table: &str,
        sink_engine: &str,
        sink_table: &str,
    ) -> Result<PathBuf> {
        for part in [source_table, sink_engine, sink_table] {
            if part.is_empty() || part.contains(['/', '\\']) || part == "." || part == ".." {
                return Err(TypeMapError::config(format!(
                    "invalid name '{}' for a mapping artifact",
                    part
                )));
            }
        }
        Ok(self
            .dir
            .join(format!("{}__{}.{}.yaml", source_table, sink_engine, sink_table)))
    }

    /// Load previously persisted mappings, if any.
    pub fn load(
        &self,
        source_table: &str,
        sink_engine: &str,
        sink_table: &str,
    ) -> Result<Option<MappingDocument>> {
        let path = self.path_for(source_table, sink_engine, sink_table)?;
        if !path.exists() {
            debug!("No mapping artifact at {}", path.display());
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let document = serde_yaml::from_str(&content).map_err(|e| {
            TypeMapError::artifact(format!("malformed mapping artifact: {}", e), &path)
        })?;
        Ok(Some(document))
    }
}

impl MappingStore for FileMappingStore {
    fn persist_column_mapping(
        &self,
        source_table: &str,
        sink_engine: &str,
        sink_table: &str,
        mappings: &BTreeMap<String, String>,
    ) -> Result<()> {
        let path = self.path_for(source_table, sink_engine, sink_table)?;
        std::fs::create_dir_all(&self.dir)?;

        let document = MappingDocument {
            source_table: source_table.to_string(),
            sink_engine: sink_engine.to_string(),
            sink_table: sink_table.to_string(),
            updated_at: Some(Utc::now()),
            mappings: mappings.clone(),
        };
        let content = serde_yaml::to_string(&document)?;

        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &path)?;

        info!(
            "Persisted {} mapping(s) for {} → {}.{} to {}",
            mappings.len(),
            source_table,
            sink_engine,
            sink_table,
            path.display()
        );
        Ok(())
    }
}
