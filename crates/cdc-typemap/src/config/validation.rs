//! Configuration validation.

use std::collections::HashSet;

use super::Config;
use crate::error::{Result, TypeMapError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let artifacts = &config.artifacts;
    if !artifacts.use_builtins
        && artifacts.compatibility_paths.is_empty()
        && artifacts.typemap_paths.is_empty()
    {
        return Err(TypeMapError::config(
            "artifacts: builtins are disabled and no search path is configured",
        ));
    }

    if config.overrides_dir.as_os_str().is_empty() {
        return Err(TypeMapError::config("overrides_dir must not be empty"));
    }
    if config.mappings_dir.as_os_str().is_empty() {
        return Err(TypeMapError::config("mappings_dir must not be empty"));
    }

    let mut names = HashSet::new();
    for group in &config.source_groups {
        if group.name.trim().is_empty() {
            return Err(TypeMapError::config("source_groups: name is required"));
        }
        if !names.insert(group.name.to_lowercase()) {
            return Err(TypeMapError::config(format!(
                "source_groups: duplicate group '{}'",
                group.name
            )));
        }
        if group.engine.trim().is_empty() {
            return Err(TypeMapError::config(format!(
                "source_groups.{}: engine is required",
                group.name
            )));
        }
        if group.services.iter().any(|s| s.trim().is_empty()) {
            return Err(TypeMapError::config(format!(
                "source_groups.{}: services must not contain empty names",
                group.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceGroupConfig;

    fn group(name: &str, engine: &str, services: &[&str]) -> SourceGroupConfig {
        SourceGroupConfig {
            name: name.to_string(),
            engine: engine.to_string(),
            services: services.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_no_artifact_source() {
        let mut config = Config::default();
        config.artifacts.use_builtins = false;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("builtins are disabled"));

        config.artifacts.compatibility_paths.push("compat".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_duplicate_group_names() {
        let mut config = Config::default();
        config.source_groups = vec![
            group("erp", "mssql", &["billing"]),
            group("ERP", "mssql", &["crm"]),
        ];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_group_requires_engine() {
        let mut config = Config::default();
        config.source_groups = vec![group("erp", " ", &["billing"])];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("engine is required"));
    }

    #[test]
    fn test_empty_service_name() {
        let mut config = Config::default();
        config.source_groups = vec![group("erp", "mssql", &["billing", ""])];
        assert!(validate(&config).is_err());
    }
}
