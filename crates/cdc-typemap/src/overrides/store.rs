//! File-based override persistence: one YAML artifact per source group.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::traits::OverrideStore;
use crate::error::{Result, TypeMapError};

use super::OverrideDocument;

/// Stores each source group's overrides at `<dir>/<group>.yaml`.
#[derive(Debug, Clone)]
pub struct FileOverrideStore {
    dir: PathBuf,
}

impl FileOverrideStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact path for a source group.
    pub fn path_for(&self, group: &str) -> Result<PathBuf> {
        if group.is_empty()
            || group.contains(['/', '\\'])
            || group == "."
            || group == ".."
        {
            return Err(TypeMapError::config(format!(
                "invalid source group name '{}'",
                group
            )));
        }
        Ok(self.dir.join(format!("{}.yaml", group)))
    }
}

impl OverrideStore for FileOverrideStore {
    fn load_overrides(&self, group: &str) -> Result<Option<OverrideDocument>> {
        let path = self.path_for(group)?;
        if !path.exists() {
            debug!("No override artifact at {}", path.display());
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        OverrideDocument::from_yaml(&content, &path.display().to_string()).map(Some)
    }

    /// Replace the artifact atomically: write to a temp file, then rename.
    fn persist_override(&self, group: &str, document: &OverrideDocument) -> Result<()> {
        let path = self.path_for(group)?;
        std::fs::create_dir_all(&self.dir)?;

        let content = document.to_yaml()?;
        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &path)?;

        debug!("Wrote {} override(s) to {}", document.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_artifact_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FileOverrideStore::new(dir.path());
        assert!(store.load_overrides("erp").unwrap().is_none());
    }

    #[test]
    fn test_persist_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileOverrideStore::new(dir.path().join("overrides"));

        let mut doc = OverrideDocument::default();
        doc.insert("dbo.AdgangLinjer", "Adgangkode", "smallint");
        store.persist_override("erp", &doc).unwrap();

        let loaded = store.load_overrides("erp").unwrap().unwrap();
        assert_eq!(loaded.get("dbo.adganglinjer", "adgangkode"), Some("smallint"));
        assert!(!dir.path().join("overrides/erp.yaml.tmp").exists());
    }

    #[test]
    fn test_malformed_artifact_cites_path() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("erp.yaml"), "overrides: [1, 2]\n").unwrap();
        let store = FileOverrideStore::new(dir.path());

        let err = store.load_overrides("erp").unwrap_err();
        assert!(err.to_string().contains("erp.yaml"));
    }

    #[test]
    fn test_group_names_cannot_escape_directory() {
        let store = FileOverrideStore::new("/tmp/overrides");
        assert!(store.path_for("../etc").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.path_for("erp").is_ok());
    }
}
