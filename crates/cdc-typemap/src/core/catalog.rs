//! Artifact catalog for explicit dependency injection.
//!
//! The [`ArtifactCatalog`] is the per-run registry of loaded compatibility maps
//! and type translations. It is constructed once at the composition root and
//! passed by reference into [`CompatibilityChecker`], [`TypeMapper`] and the
//! override manager, instead of living in process-wide state.
//!
//! Artifacts are resolved per ordered (source engine, sink engine) pair:
//!
//! 1. each configured search directory, in order
//! 2. the bundled artifacts, when `use_builtins` is on
//!
//! Parsed artifacts are cached behind a lock so the catalog can be shared
//! across threads; [`ArtifactCatalog::invalidate`] drops the cache.
//!
//! [`CompatibilityChecker`]: crate::dialect::CompatibilityChecker
//! [`TypeMapper`]: crate::dialect::TypeMapper

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::ArtifactsConfig;
use crate::dialect::builtin;
use crate::dialect::canonical::normalize_engine;
use crate::dialect::compat::{CompatibilityMap, CompatibilityMapDocument};
use crate::dialect::typemap::{TypeTranslation, TypeTranslationDocument};
use crate::error::{Result, TypeMapError};

type PairKey = (String, String);

/// Registry of loaded artifacts keyed by ordered engine pair.
#[derive(Debug, Default)]
pub struct ArtifactCatalog {
    config: ArtifactsConfig,

    /// Compatibility maps loaded from disk or builtins.
    compatibility: RwLock<HashMap<PairKey, Arc<CompatibilityMap>>>,

    /// Type translations, including inverted reverse artifacts.
    translations: RwLock<HashMap<PairKey, Arc<TypeTranslation>>>,

    /// In-memory artifacts; take precedence over anything on the search path.
    registered_compatibility: RwLock<HashMap<PairKey, Arc<CompatibilityMap>>>,
    registered_translations: RwLock<HashMap<PairKey, Arc<TypeTranslation>>>,
}

impl ArtifactCatalog {
    /// Create a catalog over the given search configuration.
    pub fn new(config: ArtifactsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &ArtifactsConfig {
        &self.config
    }

    /// Register an in-memory compatibility map for its engine pair.
    pub fn register_compatibility_map(&self, map: CompatibilityMap) {
        let key = pair_key(map.source_engine(), map.sink_engine());
        debug!("Registered compatibility map {} → {} ({})", key.0, key.1, map.origin());
        self.registered_compatibility.write().insert(key, Arc::new(map));
    }

    /// Register an in-memory type translation for its engine pair.
    pub fn register_type_translation(&self, translation: TypeTranslation) {
        let key = pair_key(translation.source_engine(), translation.sink_engine());
        debug!("Registered type translation {} → {} ({})", key.0, key.1, translation.origin());
        self.registered_translations
            .write()
            .insert(key, Arc::new(translation));
    }

    /// Compatibility map for an ordered engine pair.
    ///
    /// Only the artifact for exactly this direction is considered.
    pub fn compatibility_map(
        &self,
        source_engine: &str,
        sink_engine: &str,
    ) -> Result<Arc<CompatibilityMap>> {
        let key = pair_key(source_engine, sink_engine);

        if let Some(map) = self.registered_compatibility.read().get(&key) {
            return Ok(Arc::clone(map));
        }
        if let Some(map) = self.compatibility.read().get(&key) {
            debug!("Compatibility map cache hit for {} → {}", key.0, key.1);
            return Ok(Arc::clone(map));
        }

        let map = Arc::new(self.load_compatibility_map(&key.0, &key.1)?);
        let mut cache = self.compatibility.write();
        Ok(Arc::clone(cache.entry(key).or_insert(map)))
    }

    /// Type translation for an ordered engine pair.
    ///
    /// Falls back to inverting the reverse pair's artifact when no direct
    /// artifact exists.
    pub fn type_translation(
        &self,
        source_engine: &str,
        sink_engine: &str,
    ) -> Result<Arc<TypeTranslation>> {
        let key = pair_key(source_engine, sink_engine);
        let reverse = (key.1.clone(), key.0.clone());

        if let Some(translation) = self.registered_translations.read().get(&key) {
            return Ok(Arc::clone(translation));
        }
        if let Some(translation) = self.translations.read().get(&key) {
            debug!("Type translation cache hit for {} → {}", key.0, key.1);
            return Ok(Arc::clone(translation));
        }

        let translation = match self.find_translation(&key.0, &key.1)? {
            Some(direct) => direct,
            None => {
                let registered = self
                    .registered_translations
                    .read()
                    .get(&reverse)
                    .map(|t| t.invert());
                let inverted = match registered {
                    Some(t) => Some(t),
                    None => self
                        .find_translation(&reverse.0, &reverse.1)?
                        .map(|t| t.invert()),
                };
                match inverted {
                    Some(t) => {
                        info!(
                            "No direct type translation for {} → {}; inverted {}",
                            key.0,
                            key.1,
                            t.origin()
                        );
                        t
                    }
                    None => {
                        let mut expected = typemap_names(&key.0, &key.1);
                        expected.extend(typemap_names(&reverse.0, &reverse.1));
                        return Err(TypeMapError::ArtifactNotFound {
                            source_engine: key.0,
                            sink_engine: key.1,
                            expected,
                            search_paths: self.config.typemap_paths.clone(),
                        });
                    }
                }
            }
        };

        let translation = Arc::new(translation);
        let mut cache = self.translations.write();
        Ok(Arc::clone(cache.entry(key).or_insert(translation)))
    }

    /// Drop every cached artifact; registered in-memory artifacts are kept.
    pub fn invalidate(&self) {
        self.compatibility.write().clear();
        self.translations.write().clear();
        debug!("Artifact cache invalidated");
    }

    /// Engine pairs with a loaded artifact of either kind, sorted.
    pub fn cached_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: BTreeSet<PairKey> = BTreeSet::new();
        pairs.extend(self.compatibility.read().keys().cloned());
        pairs.extend(self.translations.read().keys().cloned());
        pairs.into_iter().collect()
    }

    fn load_compatibility_map(&self, source: &str, sink: &str) -> Result<CompatibilityMap> {
        let strip = self.config.strip_type_parameters;
        let names = compatibility_names(source, sink);

        if let Some(path) = find_on_path(&self.config.compatibility_paths, &names) {
            let document = CompatibilityMapDocument::load(&path)?;
            let map = CompatibilityMap::from_document(
                document,
                source,
                sink,
                path.display().to_string(),
                strip,
            )?;
            info!("Loaded compatibility map {} → {} from {}", source, sink, path.display());
            return Ok(map);
        }

        if self.config.use_builtins {
            for name in &names {
                if let Some(content) = builtin::compatibility_map(name) {
                    let origin = builtin::origin(name);
                    let map = CompatibilityMap::from_yaml(content, source, sink, &origin, strip)?;
                    info!("Loaded compatibility map {} → {} from {}", source, sink, map.origin());
                    return Ok(map);
                }
            }
        }

        Err(TypeMapError::ArtifactNotFound {
            source_engine: source.to_string(),
            sink_engine: sink.to_string(),
            expected: names,
            search_paths: self.config.compatibility_paths.clone(),
        })
    }

    fn find_translation(&self, source: &str, sink: &str) -> Result<Option<TypeTranslation>> {
        let names = typemap_names(source, sink);

        if let Some(path) = find_on_path(&self.config.typemap_paths, &names) {
            let document = TypeTranslationDocument::load(&path)?;
            let translation =
                TypeTranslation::from_document(document, source, sink, path.display().to_string())?;
            info!("Loaded type translation {} → {} from {}", source, sink, path.display());
            return Ok(Some(translation));
        }

        if self.config.use_builtins {
            for name in &names {
                if let Some(content) = builtin::type_translation(name) {
                    let translation =
                        TypeTranslation::from_yaml(content, source, sink, &builtin::origin(name))?;
                    info!(
                        "Loaded type translation {} → {} from {}",
                        source,
                        sink,
                        translation.origin()
                    );
                    return Ok(Some(translation));
                }
            }
        }

        Ok(None)
    }
}

fn pair_key(source_engine: &str, sink_engine: &str) -> PairKey {
    (normalize_engine(source_engine), normalize_engine(sink_engine))
}

fn compatibility_names(source: &str, sink: &str) -> Vec<String> {
    vec![
        format!("{}_to_{}.yaml", source, sink),
        format!("{}_to_{}.yml", source, sink),
    ]
}

fn typemap_names(source: &str, sink: &str) -> Vec<String> {
    vec![
        format!("{}_to_{}.typemap.yaml", source, sink),
        format!("{}_to_{}.typemap.yml", source, sink),
    ]
}

fn find_on_path(dirs: &[PathBuf], names: &[String]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| names.iter().map(move |name| dir.join(name)))
        .find(|path| is_artifact(path))
}

fn is_artifact(path: &Path) -> bool {
    let found = path.is_file();
    if !found {
        debug!("No artifact at {}", path.display());
    }
    found
}
