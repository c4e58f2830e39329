//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::core::schema::names_match;
use crate::dialect::canonical::normalize_engine;
use crate::error::{Result, TypeMapError};
use std::path::{Path, PathBuf};

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// Relative paths in the file are resolved against its directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content).map_err(|e| {
            TypeMapError::artifact(format!("malformed configuration: {}", e), path)
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Rewrite every relative path as `base.join(path)`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        self.artifacts.compatibility_paths.iter_mut().for_each(rebase);
        self.artifacts.typemap_paths.iter_mut().for_each(rebase);
        rebase(&mut self.overrides_dir);
        rebase(&mut self.mappings_dir);
        if let Some(snapshot) = self.snapshot.as_mut() {
            rebase(snapshot);
        }
    }

    /// Resolve the source group a service reads from.
    ///
    /// No group means no overrides apply. A service listed in more than one
    /// group cannot be resolved deterministically and is an error.
    pub fn resolve_source_group(&self, service: &str) -> Result<Option<&SourceGroupConfig>> {
        let matches: Vec<&SourceGroupConfig> = self
            .source_groups
            .iter()
            .filter(|g| g.services.iter().any(|s| names_match(s, service)))
            .collect();

        match matches.as_slice() {
            [] => Ok(None),
            [group] => Ok(Some(group)),
            many => Err(TypeMapError::config(format!(
                "service '{}' belongs to more than one source group ({})",
                service,
                many.iter()
                    .map(|g| g.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Look up a source group by name.
    pub fn source_group(&self, name: &str) -> Option<&SourceGroupConfig> {
        self.source_groups
            .iter()
            .find(|g| names_match(&g.name, name))
    }
}

impl SourceGroupConfig {
    /// Normalized source engine name.
    pub fn engine_name(&self) -> String {
        normalize_engine(&self.engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
artifacts:
  compatibility_paths: [compat]
  typemap_paths: [/opt/typemaps]
overrides_dir: overrides
snapshot: schema.yaml
source_groups:
  - name: erp
    engine: sqlserver
    services: [billing, crm]
  - name: shop
    engine: mysql
    services: [storefront, crm]
"#;

    #[test]
    fn test_from_yaml_defaults() {
        let config = Config::from_yaml("source_groups: []\n").unwrap();
        assert!(config.artifacts.use_builtins);
        assert!(config.artifacts.strip_type_parameters);
        assert_eq!(config.overrides_dir, PathBuf::from("overrides"));
        assert_eq!(config.mappings_dir, PathBuf::from("mappings"));
        assert!(config.snapshot.is_none());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cdc-typemap.yaml");
        std::fs::write(&path, CONFIG).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.artifacts.compatibility_paths[0], dir.path().join("compat"));
        assert_eq!(config.artifacts.typemap_paths[0], PathBuf::from("/opt/typemaps"));
        assert_eq!(config.overrides_dir, dir.path().join("overrides"));
        assert_eq!(config.snapshot, Some(dir.path().join("schema.yaml")));
    }

    #[test]
    fn test_load_malformed_cites_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "source_groups: 12\n").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, TypeMapError::Config { .. }));
        assert!(err.to_string().contains("bad.yaml"));
    }

    #[test]
    fn test_resolve_source_group() {
        let config = Config::from_yaml(CONFIG).unwrap();

        let group = config.resolve_source_group("Billing").unwrap().unwrap();
        assert_eq!(group.name, "erp");
        assert_eq!(group.engine_name(), "mssql");

        assert!(config.resolve_source_group("reporting").unwrap().is_none());

        let err = config.resolve_source_group("crm").unwrap_err();
        assert!(err.to_string().contains("erp, shop"));
    }
}
