//! Storage-facing facade.
//!
//! [`AtlasLoader`] is what downstream agents call. Every write runs
//! validate -> compute metadata -> persist -> sync; a failure before persist
//! leaves the disk untouched. Metadata sync goes through the injected
//! [`MetadataSink`] and never fails the call.

use std::sync::Arc;

use chrono::Utc;

use crate::batch::{with_recorded_regime, BatchLoader};
use crate::config::AtlasConfig;
use crate::pyramid::{Pyramid, PyramidEngine};
use crate::sink::{sync_metadata, MetadataSink, OfflineSink};
use crate::store::{CacheStats, CachedMap, FileStamp, MapCache, MapStore, StoreError};
use crate::types::{BatchTensor, DomainStats, EnergyMap, EnergyMapMetadata, ShapeValidator};

/// Timestamp format of generated map ids.
pub const MAP_ID_TIME_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";

/// Generate `<domain>_<timestamp>` in UTC.
pub fn generate_map_id(domain: &str) -> String {
    format!("{domain}_{}", Utc::now().format(MAP_ID_TIME_FORMAT))
}

/// Energy atlas loader.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use energy_atlas::{AtlasConfig, AtlasLoader, EnergyMap, OfflineSink};
///
/// let loader = AtlasLoader::new(AtlasConfig::with_root("./data"), Arc::new(OfflineSink))?;
/// let id = loader.save_map(&EnergyMap::filled(64, 64, 1.0), "solar", None, None)?;
/// let (map, meta) = loader.load_map("solar", Some(&id), 256)?;
/// ```
pub struct AtlasLoader {
    config: AtlasConfig,
    store: MapStore,
    engine: PyramidEngine,
    sink: Arc<dyn MetadataSink>,
    cache: Option<MapCache>,
}

impl AtlasLoader {
    /// Create a loader over `config.data_root` with an injected sink.
    pub fn new(config: AtlasConfig, sink: Arc<dyn MetadataSink>) -> Result<Self, StoreError> {
        let store = MapStore::open(&config.data_root)?;
        let cache = MapCache::from_config(&config.cache);
        tracing::info!(
            data_root = %config.data_root.display(),
            sink = sink.name(),
            cache = cache.is_some(),
            "Atlas loader ready"
        );
        Ok(Self {
            config,
            store,
            engine: PyramidEngine::new(),
            sink,
            cache,
        })
    }

    /// Create a loader from environment variables.
    ///
    /// Uses the Neo4j sink when built with the `neo4j` feature and
    /// `NEO4J_URI` is set, otherwise the offline sink.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::new(AtlasConfig::from_env(), sink_from_env())
    }

    /// Replace the pyramid engine.
    pub fn with_engine(mut self, engine: PyramidEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &AtlasConfig {
        &self.config
    }

    /// Underlying store.
    pub fn store(&self) -> &MapStore {
        &self.store
    }

    /// Pyramid engine in use.
    pub fn engine(&self) -> &PyramidEngine {
        &self.engine
    }

    /// Load a stored map and compute its metadata.
    ///
    /// With `map_id = None` the latest file is used. The field is returned as
    /// stored; `scale` only keys the cache. Use [`Self::load_map_scaled`] to
    /// resample.
    pub fn load_map(
        &self,
        domain: &str,
        map_id: Option<&str>,
        scale: u32,
    ) -> Result<(EnergyMap, EnergyMapMetadata), StoreError> {
        let file = self.store.locate(domain, map_id)?;
        let stamp = FileStamp::of(&file.path)?;

        if let Some(hit) = self
            .cache
            .as_ref()
            .and_then(|c| c.get(domain, &file.map_id, scale, &stamp))
        {
            return Ok((hit.map, hit.metadata));
        }

        let map = self.store.read_map(&file)?;
        let metadata = EnergyMapMetadata::compute(&map, file.map_id.as_str(), domain);
        let metadata = with_recorded_regime(&self.store, metadata);

        tracing::debug!(
            domain,
            map_id = %file.map_id,
            format = file.codec.extension(),
            height = map.height(),
            width = map.width(),
            "Map loaded"
        );

        sync_metadata(self.sink.as_ref(), &metadata);
        self.remember(scale, stamp, &map, &metadata);
        Ok((map, metadata))
    }

    /// Load a map and resample it to `scale` if its stored scale differs.
    ///
    /// Metadata describes the delivered field. Bypasses the cache, whose
    /// entries hold stored fields.
    pub fn load_map_scaled(
        &self,
        domain: &str,
        map_id: Option<&str>,
        scale: u32,
    ) -> Result<(EnergyMap, EnergyMapMetadata), StoreError> {
        let file = self.store.locate(domain, map_id)?;
        let stored = self.store.read_map(&file)?;
        let map = if stored.scale() as u32 == scale {
            stored
        } else {
            self.engine.rescale(&stored, scale)?
        };
        let metadata = EnergyMapMetadata::compute(&map, file.map_id.as_str(), domain);
        let metadata = with_recorded_regime(&self.store, metadata);

        sync_metadata(self.sink.as_ref(), &metadata);
        Ok((map, metadata))
    }

    /// Load a `[window, H, W]` batch; see [`BatchLoader::load_batch`].
    pub fn load_batch(
        &self,
        domain: &str,
        window: usize,
        scale: u32,
        stride: usize,
    ) -> Result<(BatchTensor, Vec<EnergyMapMetadata>), StoreError> {
        BatchLoader::new(&self.store, &self.engine).load_batch(domain, window, scale, stride)
    }

    /// Validate and persist a map, returning its id.
    ///
    /// When `metadata` is given it is stored with `map_id` and `domain`
    /// rewritten to the storage location; otherwise it is computed.
    pub fn save_map(
        &self,
        map: &EnergyMap,
        domain: &str,
        map_id: Option<&str>,
        metadata: Option<EnergyMapMetadata>,
    ) -> Result<String, StoreError> {
        ShapeValidator::validate_shape(&map.shape())?;

        let map_id = match map_id {
            Some(id) => id.to_string(),
            None => generate_map_id(domain),
        };

        let metadata = match metadata {
            Some(mut supplied) => {
                supplied.map_id = map_id.clone();
                supplied.domain = domain.to_string();
                supplied
            }
            None => EnergyMapMetadata::compute(map, map_id.as_str(), domain),
        };

        let path = self.store.write_map(domain, &map_id, map)?;
        self.store.write_metadata(&metadata)?;
        if let Some(cache) = &self.cache {
            cache.invalidate(domain, &map_id);
        }

        tracing::info!(
            domain,
            map_id = %map_id,
            path = %path.display(),
            scale = metadata.scale,
            "Map saved"
        );

        sync_metadata(self.sink.as_ref(), &metadata);
        Ok(map_id)
    }

    /// Overwrite the map stored under `map_id`.
    pub fn update_map(&self, domain: &str, map: &EnergyMap, map_id: &str) -> Result<String, StoreError> {
        self.save_map(map, domain, Some(map_id), None)
    }

    /// Aggregate energy and entropy over every map file of a domain.
    pub fn get_domain_stats(&self, domain: &str) -> Result<DomainStats, StoreError> {
        let files = self.store.map_files(domain)?;
        let mut records = Vec::with_capacity(files.len());
        for file in &files {
            let map = self.store.read_map(file)?;
            records.push(EnergyMapMetadata::compute(&map, file.map_id.as_str(), domain));
        }
        Ok(DomainStats::from_metadata(&records))
    }

    /// Build a pyramid for `map` with the configured engine.
    pub fn precompute_pyramids(&self, map: &EnergyMap, target_scales: &[u32]) -> Result<Pyramid, StoreError> {
        Ok(self.engine.precompute_pyramids(map, target_scales)?)
    }

    /// Domain names.
    pub fn list_domains(&self) -> Result<Vec<String>, StoreError> {
        self.store.list_domains()
    }

    /// Map ids of a domain.
    pub fn list_maps(&self, domain: &str) -> Result<Vec<String>, StoreError> {
        self.store.list_maps(domain)
    }

    /// Stored sidecar for a map.
    pub fn read_metadata(&self, domain: &str, map_id: &str) -> Result<Option<EnergyMapMetadata>, StoreError> {
        self.store.read_metadata(domain, map_id)
    }

    /// Cache statistics, `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(MapCache::stats)
    }

    /// Drop all cached maps.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn remember(&self, scale: u32, stamp: FileStamp, map: &EnergyMap, metadata: &EnergyMapMetadata) {
        if let Some(cache) = &self.cache {
            cache.put(
                scale,
                CachedMap {
                    domain: metadata.domain.clone(),
                    map_id: metadata.map_id.clone(),
                    map: map.clone(),
                    metadata: metadata.clone(),
                    stamp,
                },
            );
        }
    }
}

/// Metadata sink selected by the environment.
///
/// Neo4j when built with the `neo4j` feature and `NEO4J_URI` is set,
/// otherwise [`OfflineSink`].
#[cfg(feature = "neo4j")]
pub fn sink_from_env() -> Arc<dyn MetadataSink> {
    use crate::config::GraphConfig;
    use crate::sink::Neo4jSink;

    match GraphConfig::from_env().map(Neo4jSink::new) {
        Some(Ok(sink)) => Arc::new(sink),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Could not build Neo4j sink, running offline");
            Arc::new(OfflineSink)
        }
        None => Arc::new(OfflineSink),
    }
}

/// Metadata sink selected by the environment; always offline in this build.
#[cfg(not(feature = "neo4j"))]
pub fn sink_from_env() -> Arc<dyn MetadataSink> {
    Arc::new(OfflineSink)
}
