//! Environment-driven configuration.
//!
//! ## Configuration
//!
//! Atlas settings:
//! - `ATLAS_DATA_ROOT`: root directory holding `energy_maps/` (default: `./data`)
//! - `ATLAS_DEFAULT_SCALE`: scale the `energy_atlas` CLI loads maps at (default: 256)
//! - `ATLAS_CACHE_ENTRIES`: loaded-map cache capacity, 0 disables (default: 128)
//!
//! Metadata graph settings:
//! - `NEO4J_URI`: bolt URI; unset means the offline sink is used
//! - `NEO4J_USER` / `NEO4J_PASSWORD`: optional credentials
//! - `NEO4J_TIMEOUT_SECS`: bound on connect and write calls (default: 5)

use std::path::PathBuf;
use std::time::Duration;

use crate::store::cache::CacheConfig;
use crate::DEFAULT_SCALE;

/// Configuration for the atlas loader.
#[derive(Debug, Clone)]
pub struct AtlasConfig {
    /// Directory containing `energy_maps/`.
    pub data_root: PathBuf,
    /// Scale the `energy_atlas` CLI passes to `load_map`. Library calls
    /// always take an explicit scale.
    pub default_scale: u32,
    /// Loaded-map cache settings.
    pub cache: CacheConfig,
}

impl AtlasConfig {
    /// Load configuration from environment variables with defaults.
    pub fn from_env() -> Self {
        let cache_entries = env_parse("ATLAS_CACHE_ENTRIES").unwrap_or(128usize);
        Self {
            data_root: std::env::var("ATLAS_DATA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            default_scale: env_parse("ATLAS_DEFAULT_SCALE").unwrap_or(DEFAULT_SCALE),
            cache: CacheConfig {
                max_entries: cache_entries,
                enabled: cache_entries > 0,
            },
        }
    }

    /// Configuration rooted at `data_root` with all other defaults.
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            default_scale: DEFAULT_SCALE,
            cache: CacheConfig::default(),
        }
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Connection settings for the metadata graph.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Bolt URI, e.g. `bolt://localhost:7687`.
    pub uri: String,
    /// Username, if the server requires one.
    pub username: Option<String>,
    /// Password, if the server requires one.
    pub password: Option<String>,
    /// Bound applied to connect and each write.
    pub timeout: Duration,
}

impl GraphConfig {
    /// Load from the environment; `None` when `NEO4J_URI` is unset.
    pub fn from_env() -> Option<Self> {
        let uri = std::env::var("NEO4J_URI").ok().filter(|s| !s.is_empty())?;
        Some(Self {
            uri,
            username: std::env::var("NEO4J_USER").ok(),
            password: std::env::var("NEO4J_PASSWORD").ok(),
            timeout: Duration::from_secs(env_parse("NEO4J_TIMEOUT_SECS").unwrap_or(5)),
        })
    }

    /// Settings for `uri` without credentials.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
