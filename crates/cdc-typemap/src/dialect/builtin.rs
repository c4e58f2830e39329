//! Artifacts compiled into the library.
//!
//! Consulted after the configured search paths when `use_builtins` is on.

/// Bundled compatibility maps, by artifact file name.
const COMPATIBILITY_MAPS: &[(&str, &str)] = &[
    (
        "mssql_to_postgres.yaml",
        include_str!("../../artifacts/compat/mssql_to_postgres.yaml"),
    ),
    (
        "postgres_to_postgres.yaml",
        include_str!("../../artifacts/compat/postgres_to_postgres.yaml"),
    ),
    (
        "mysql_to_postgres.yaml",
        include_str!("../../artifacts/compat/mysql_to_postgres.yaml"),
    ),
];

/// Bundled type-translation tables, by artifact file name.
const TYPE_TRANSLATIONS: &[(&str, &str)] = &[
    (
        "mssql_to_postgres.typemap.yaml",
        include_str!("../../artifacts/typemaps/mssql_to_postgres.typemap.yaml"),
    ),
    (
        "mysql_to_postgres.typemap.yaml",
        include_str!("../../artifacts/typemaps/mysql_to_postgres.typemap.yaml"),
    ),
];

/// Name under which a bundled artifact is reported.
pub fn origin(file: &str) -> String {
    format!("builtin:{}", file)
}

pub fn compatibility_map(file: &str) -> Option<&'static str> {
    find(COMPATIBILITY_MAPS, file)
}

pub fn type_translation(file: &str) -> Option<&'static str> {
    find(TYPE_TRANSLATIONS, file)
}

fn find(table: &[(&'static str, &'static str)], file: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == file)
        .map(|(_, content)| *content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{CompatibilityMap, TypeTranslation};

    #[test]
    fn test_bundled_compatibility_maps_parse() {
        for (file, content) in COMPATIBILITY_MAPS {
            let (source, sink) = file
                .trim_end_matches(".yaml")
                .split_once("_to_")
                .unwrap();
            CompatibilityMap::from_yaml(content, source, sink, &origin(file), true)
                .unwrap_or_else(|e| panic!("{}: {}", file, e));
        }
    }

    #[test]
    fn test_bundled_type_translations_parse() {
        for (file, content) in TYPE_TRANSLATIONS {
            let (source, sink) = file
                .trim_end_matches(".typemap.yaml")
                .split_once("_to_")
                .unwrap();
            let translation = TypeTranslation::from_yaml(content, source, sink, &origin(file))
                .unwrap_or_else(|e| panic!("{}: {}", file, e));
            assert!(!translation.is_empty());
        }
    }

    #[test]
    fn test_lookup_by_file_name() {
        assert!(compatibility_map("mssql_to_postgres.yaml").is_some());
        assert!(compatibility_map("postgres_to_mssql.yaml").is_none());
        assert!(type_translation("mssql_to_postgres.typemap.yaml").is_some());
    }
}
