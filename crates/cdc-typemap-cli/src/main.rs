//! cdc-typemap CLI - cross-engine column type checks and mapping resolution.

use cdc_typemap::{
    names_match, ArtifactCatalog, ColumnContext, CompatibilityChecker, Config, ExplicitMapping,
    FileMappingStore, FileOverrideStore, MappingResolver, MappingStore, NoSinkUsages,
    OverrideManager, SchemaProvider, SchemaSnapshot, SinkUsageLister, SourceOverrideRegistry,
    TypeMapError, TypeMapper,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Configuration file used when `--config` is not given.
const DEFAULT_CONFIG: &str = "cdc-typemap.yaml";

#[derive(Parser)]
#[command(name = "cdc-typemap")]
#[command(about = "Cross-engine column type checks and mapping resolution for CDC replication")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: cdc-typemap.yaml]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check whether a source type may populate a sink type
    Check {
        #[arg(long)]
        source_engine: String,

        #[arg(long)]
        sink_engine: String,

        #[arg(long)]
        source_type: String,

        #[arg(long)]
        sink_type: String,

        /// Service whose source group overrides apply
        #[arg(long)]
        service: Option<String>,

        /// Source table of the column (requires --column)
        #[arg(long, requires = "column")]
        table: Option<String>,

        /// Source column (requires --table)
        #[arg(long, requires = "table")]
        column: Option<String>,
    },

    /// Translate source types for cloning into a new sink table
    Map {
        #[arg(long)]
        source_engine: String,

        #[arg(long)]
        sink_engine: String,

        /// Source types to translate
        #[arg(required = true)]
        types: Vec<String>,
    },

    /// Clone a source table's structure from the schema snapshot
    CloneTable {
        #[arg(long)]
        source_engine: String,

        #[arg(long)]
        sink_engine: String,

        /// Source table key (e.g. dbo.Orders)
        #[arg(long)]
        table: String,
    },

    /// Resolve the column mapping of a source table onto an existing sink table
    Resolve {
        #[arg(long)]
        source_engine: String,

        #[arg(long)]
        sink_engine: String,

        #[arg(long)]
        source_table: String,

        #[arg(long)]
        sink_table: String,

        /// Explicit mapping, repeatable
        #[arg(long = "map", value_name = "SOURCE=SINK")]
        mappings: Vec<ExplicitMapping>,

        /// Modify an attached table: unmapped required columns only warn
        #[arg(long)]
        modify: bool,

        /// Persist the applied mappings
        #[arg(long)]
        apply: bool,

        /// Service whose source group overrides apply
        #[arg(long)]
        service: Option<String>,
    },

    /// Manage column type overrides of a source group
    Override {
        #[command(subcommand)]
        action: OverrideCommand,
    },
}

#[derive(Subcommand)]
enum OverrideCommand {
    /// Override the effective type of one source column
    Set {
        #[arg(long)]
        service: String,

        #[arg(long)]
        table: String,

        #[arg(long)]
        column: String,

        #[arg(long = "type")]
        override_type: String,
    },

    /// Remove an existing override
    Remove {
        #[arg(long)]
        service: String,

        #[arg(long)]
        table: String,

        #[arg(long)]
        column: String,
    },

    /// List the overrides of a service's source group
    List {
        #[arg(long)]
        service: String,
    },
}

#[derive(Serialize)]
struct CheckResult {
    source_engine: String,
    sink_engine: String,
    source_type: String,
    effective_source_type: String,
    sink_type: String,
    verdict: String,
    compatible: bool,
}

#[derive(Serialize)]
struct MapResult {
    source_type: String,
    #[serde(flatten)]
    mapping: cdc_typemap::TypeMapping,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

fn run() -> Result<(), TypeMapError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(TypeMapError::config)?;

    let config = load_config(cli.config.as_deref())?;
    let catalog = ArtifactCatalog::new(config.artifacts.clone());

    match cli.command {
        Commands::Check {
            source_engine,
            sink_engine,
            source_type,
            sink_type,
            service,
            table,
            column,
        } => {
            let mut checker = CompatibilityChecker::new(&catalog, &source_engine, &sink_engine)?;
            if let Some(service) = service.as_deref() {
                if let Some(registry) =
                    load_registry(&config, &catalog, service, checker.source_engine())?
                {
                    checker = checker.with_overrides(Arc::new(registry));
                }
            }

            let context = match (table, column) {
                (Some(table), Some(column)) => Some(ColumnContext::new(table, column)),
                _ => None,
            };
            let verdict = checker.check(&source_type, &sink_type, context.as_ref());
            let result = CheckResult {
                source_engine: checker.source_engine().to_string(),
                sink_engine: checker.sink_engine().to_string(),
                effective_source_type: checker
                    .effective_source_type(&source_type, context.as_ref()),
                source_type,
                sink_type,
                verdict: verdict.to_string(),
                compatible: verdict.is_compatible(),
            };

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                let via = if result.effective_source_type != result.source_type {
                    format!(" (overridden to {})", result.effective_source_type)
                } else {
                    String::new()
                };
                println!(
                    "{} {}{} → {} {}: {}",
                    result.source_engine,
                    result.source_type,
                    via,
                    result.sink_engine,
                    result.sink_type,
                    result.verdict
                );
            }

            if !result.compatible {
                let candidates = checker.sink_candidates(&result.source_type, context.as_ref());
                let guidance = if candidates.is_empty() {
                    Vec::new()
                } else {
                    vec![format!("compatible sink types: {}", candidates.join(", "))]
                };
                return Err(TypeMapError::compatibility(
                    format!(
                        "{} '{}' cannot populate {} '{}'",
                        result.source_engine,
                        result.effective_source_type,
                        result.sink_engine,
                        result.sink_type
                    ),
                    guidance,
                ));
            }
        }

        Commands::Map {
            source_engine,
            sink_engine,
            types,
        } => {
            let mapper = TypeMapper::new(&catalog, &source_engine, &sink_engine)?;
            let results: Vec<MapResult> = types
                .into_iter()
                .map(|t| MapResult {
                    mapping: mapper.map_type(&t),
                    source_type: t,
                })
                .collect();

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for r in &results {
                    let note = if r.mapping.is_lossy { "  (fallback)" } else { "" };
                    println!("{} → {}{}", r.source_type, r.mapping.target_type, note);
                }
            }
        }

        Commands::CloneTable {
            source_engine,
            sink_engine,
            table,
        } => {
            let snapshot = require_snapshot(&config)?;
            let columns = snapshot.get_columns(&source_engine, &table)?;
            let mapper = TypeMapper::new(&catalog, &source_engine, &sink_engine)?;
            let cloned = mapper.clone_table(&columns.into_columns())?;
            info!("Cloned {} column(s) of {}", cloned.len(), table);

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&cloned)?);
            } else {
                for col in cloned.iter() {
                    let mut flags = Vec::new();
                    if col.primary_key {
                        flags.push("primary key");
                    } else if !col.nullable {
                        flags.push("not null");
                    }
                    let flags = if flags.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", flags.join(", "))
                    };
                    println!("  {} {}{}", col.name, col.data_type, flags);
                }
            }
        }

        Commands::Resolve {
            source_engine,
            sink_engine,
            source_table,
            sink_table,
            mappings,
            modify,
            apply,
            service,
        } => {
            let snapshot = require_snapshot(&config)?;
            let source = snapshot.get_columns(&source_engine, &source_table)?;
            let sink = snapshot.get_columns(&sink_engine, &sink_table)?;

            let mut checker = CompatibilityChecker::new(&catalog, &source_engine, &sink_engine)?;
            if let Some(service) = service.as_deref() {
                if let Some(registry) =
                    load_registry(&config, &catalog, service, checker.source_engine())?
                {
                    checker = checker.with_overrides(Arc::new(registry));
                }
            }

            let store = FileMappingStore::new(&config.mappings_dir);
            let resolver = MappingResolver::new(&checker);
            let outcome = if modify {
                let existing = store
                    .load(&source_table, checker.sink_engine(), &sink_table)?
                    .map(|doc| doc.explicit_mappings())
                    .unwrap_or_default();
                let merged = merge_mappings(existing, mappings);
                resolver.resolve_for_modify(&source_table, &source, &sink, &merged)?
            } else {
                resolver.resolve_for_attach(&source_table, &source, &sink, &mappings)?
            };

            if apply {
                store.persist_column_mapping(
                    &source_table,
                    checker.sink_engine(),
                    &sink_table,
                    &outcome.resolution.applied_mappings,
                )?;
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                let r = &outcome.resolution;
                println!("{} → {}", source_table, sink_table);
                for (sink_col, source_col) in &r.applied_mappings {
                    println!("  {} → {} (explicit)", source_col, sink_col);
                }
                for sink_col in &r.identity_covered_sink_cols {
                    println!("  {} (identity)", sink_col);
                }
                for i in &r.incompatible_identity_cols {
                    println!(
                        "  {} not mapped: {} cannot populate {}",
                        i.sink_column, i.source_type, i.sink_type
                    );
                }
                for w in &outcome.warnings {
                    println!("  warning: {}", w);
                }
                println!("  Valid: {}", r.valid);
                if apply {
                    println!("  Applied mappings persisted to {}", store.dir().display());
                }
            }
        }

        Commands::Override { action } => {
            let overrides = FileOverrideStore::new(&config.overrides_dir);
            let snapshot = match config.snapshot.as_deref() {
                Some(path) => Some(SchemaSnapshot::load(path)?),
                None => None,
            };

            match action {
                OverrideCommand::Set {
                    service,
                    table,
                    column,
                    override_type,
                } => {
                    let (group, engine) = require_group(&config, &service)?;
                    let usages: &dyn SinkUsageLister = match snapshot.as_ref() {
                        Some(s) => s,
                        None => {
                            warn!(
                                "No schema snapshot configured; sink consumers are not re-validated"
                            );
                            &NoSinkUsages
                        }
                    };
                    let manager = OverrideManager::new(&catalog, &overrides, usages);
                    let registry = manager.load(&group, &engine)?;
                    let updated = manager.set_override(&registry, &table, &column, &override_type)?;
                    print_overrides(&updated, cli.output_json)?;
                }
                OverrideCommand::Remove {
                    service,
                    table,
                    column,
                } => {
                    let (group, engine) = require_group(&config, &service)?;
                    let manager = match snapshot.as_ref() {
                        Some(s) => OverrideManager::new(&catalog, &overrides, s).with_schema(s),
                        None => OverrideManager::new(&catalog, &overrides, &NoSinkUsages),
                    };
                    let registry = manager.load(&group, &engine)?;
                    let updated = manager.remove_override(&registry, &table, &column)?;
                    print_overrides(&updated, cli.output_json)?;
                }
                OverrideCommand::List { service } => {
                    let (group, engine) = require_group(&config, &service)?;
                    let manager = OverrideManager::new(&catalog, &overrides, &NoSinkUsages);
                    let registry = manager.load(&group, &engine)?;
                    print_overrides(&registry, cli.output_json)?;
                }
            }
        }
    }

    Ok(())
}

/// Load the configuration; a missing default file means built-in defaults.
fn load_config(path: Option<&Path>) -> Result<Config, TypeMapError> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            let config = Config::load(DEFAULT_CONFIG)?;
            info!("Loaded configuration from {}", DEFAULT_CONFIG);
            Ok(config)
        }
        None => {
            info!("No {} found; using built-in artifacts only", DEFAULT_CONFIG);
            Ok(Config::default())
        }
    }
}

fn require_snapshot(config: &Config) -> Result<SchemaSnapshot, TypeMapError> {
    let path = config
        .snapshot
        .as_deref()
        .ok_or_else(|| TypeMapError::config("snapshot is not configured"))?;
    SchemaSnapshot::load(path)
}

/// Source group (name, normalized engine) of a service; the service must have one.
fn require_group(config: &Config, service: &str) -> Result<(String, String), TypeMapError> {
    let group = config.resolve_source_group(service)?.ok_or_else(|| {
        TypeMapError::config(format!(
            "service '{}' does not belong to any source group",
            service
        ))
    })?;
    Ok((group.name.clone(), group.engine_name()))
}

/// Overrides in effect for a service reading from `source_engine`, if any.
fn load_registry(
    config: &Config,
    catalog: &ArtifactCatalog,
    service: &str,
    source_engine: &str,
) -> Result<Option<SourceOverrideRegistry>, TypeMapError> {
    let Some(group) = config.resolve_source_group(service)? else {
        info!("Service {} has no source group; no overrides apply", service);
        return Ok(None);
    };
    if group.engine_name() != source_engine {
        return Err(TypeMapError::config(format!(
            "source group '{}' reads from {}, not {}",
            group.name,
            group.engine_name(),
            source_engine
        )));
    }

    let store = FileOverrideStore::new(&config.overrides_dir);
    let manager = OverrideManager::new(catalog, &store, &NoSinkUsages);
    manager.load(&group.name, source_engine).map(Some)
}

/// Combine persisted mappings with new ones; a new mapping replaces any
/// persisted mapping into the same sink column.
fn merge_mappings(
    existing: Vec<ExplicitMapping>,
    new: Vec<ExplicitMapping>,
) -> Vec<ExplicitMapping> {
    let mut merged: Vec<ExplicitMapping> = existing
        .into_iter()
        .filter(|old| !new.iter().any(|m| names_match(&m.sink_column, &old.sink_column)))
        .collect();
    merged.extend(new);
    merged
}

fn print_overrides(
    registry: &SourceOverrideRegistry,
    output_json: bool,
) -> Result<(), TypeMapError> {
    let entries = registry.list();
    if output_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No overrides in source group {}", registry.group());
    } else {
        println!("Overrides in source group {}:", registry.group());
        for e in &entries {
            println!("  {}.{} = {}", e.table, e.column, e.override_type);
        }
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_mappings_replaces_by_sink_column() {
        let existing = vec![
            ExplicitMapping::new("name", "full_name"),
            ExplicitMapping::new("code", "legacy_code"),
            ExplicitMapping::new("city", "BY"),
        ];
        let new = vec![
            ExplicitMapping::new("display_name", "FULL_NAME"),
            ExplicitMapping::new("code", "code_v2"),
            ExplicitMapping::new("town", "by"),
        ];
        let merged = merge_mappings(existing, new);
        assert_eq!(
            merged,
            vec![
                ExplicitMapping::new("code", "legacy_code"),
                ExplicitMapping::new("display_name", "FULL_NAME"),
                ExplicitMapping::new("code", "code_v2"),
                ExplicitMapping::new("town", "by"),
            ]
        );
    }

    #[test]
    fn test_cli_parses_repeated_mappings() {
        let cli = Cli::parse_from([
            "cdc-typemap",
            "resolve",
            "--source-engine",
            "mssql",
            "--sink-engine",
            "postgres",
            "--source-table",
            "dbo.People",
            "--sink-table",
            "public.contacts",
            "--map",
            "Name=full_name",
            "--map",
            "City=town",
        ]);
        match cli.command {
            Commands::Resolve { mappings, apply, .. } => {
                assert_eq!(mappings.len(), 2);
                assert_eq!(mappings[0], ExplicitMapping::new("Name", "full_name"));
                assert!(!apply);
            }
            _ => panic!("expected resolve"),
        }
    }
}
