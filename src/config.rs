//! Configuration management

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::detect::{LengthBounds, NetworkTag};
use crate::{Error, Result};

/// Environment variable prefix for overrides (`CA_LENS_UPSTREAM__BASE_URL=...`)
pub const ENV_PREFIX: &str = "CA_LENS_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address detection configuration
    pub detection: DetectionConfig,
    /// Upstream data providers
    pub upstream: UpstreamConfig,
    /// Popover behaviour and geometry
    pub popover: PopoverConfig,
    /// Analysis record cache
    pub cache: CacheConfig,
    /// Persistent history
    pub history: HistoryConfig,
}

/// Address detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Enabled networks in priority order. The first entry wins when two
    /// networks match overlapping text.
    pub networks: Vec<NetworkTag>,
    /// Per-network length bounds overriding the registry defaults
    pub bounds: HashMap<NetworkTag, LengthBounds>,
    /// Extra denylisted addresses per network
    pub denylist: HashMap<NetworkTag, Vec<String>>,
    /// Marker identifying content containers in the page tree
    pub container: ContainerConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            networks: NetworkTag::DEFAULT_PRIORITY.to_vec(),
            bounds: HashMap::new(),
            denylist: HashMap::new(),
            container: ContainerConfig::default(),
        }
    }
}

/// Attribute marker for content containers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Attribute name
    pub attribute: String,
    /// Attribute value
    pub value: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            attribute: "data-testid".to_string(),
            value: "tweetText".to_string(),
        }
    }
}

/// Upstream data provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the token API proxy (`{base_url}/token/{address}`)
    pub base_url: String,
    /// DexScreener search endpoint used as the redundant price source
    pub dex_search_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Optional User-Agent header
    pub user_agent: Option<String>,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".to_string(),
            dex_search_url: "https://api.dexscreener.com/latest/dex/search".to_string(),
            timeout_ms: 10_000,
            user_agent: None,
        }
    }
}

impl UpstreamConfig {
    /// Per-request timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Popover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopoverConfig {
    /// Delay before a hover-leave closes the popover
    pub grace_delay_ms: u64,
    /// Vertical gap between anchor and popover
    pub anchor_gap: f64,
    /// Distance kept from the viewport's right edge after a shift
    pub viewport_margin: f64,
    /// Rendered popover width
    pub width: f64,
    /// Rendered popover height
    pub height: f64,
}

impl Default for PopoverConfig {
    fn default() -> Self {
        Self {
            grace_delay_ms: 300,
            anchor_gap: 4.0,
            viewport_margin: 10.0,
            width: 280.0,
            height: 220.0,
        }
    }
}

impl PopoverConfig {
    /// Grace delay as a duration
    #[must_use]
    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }
}

/// Analysis record cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching of completed analyses
    pub enabled: bool,
    /// Time-to-live in seconds
    pub ttl_secs: u64,
    /// Maximum number of cached addresses
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            max_entries: 1_000,
        }
    }
}

impl CacheConfig {
    /// TTL as a duration
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// History configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Store file. Defaults to `<data dir>/contract-lens/store.json`.
    /// Supports `~` expansion.
    pub path: Option<String>,
    /// Maximum history entries kept
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            capacity: 10,
        }
    }
}

impl HistoryConfig {
    /// Resolve the store path
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => expand_home(p),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("contract-lens")
                .join("store.json"),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest.trim_start_matches('/'));
        }
    }
    PathBuf::from(path)
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.detection.networks.is_empty() {
            return Err(Error::Config(
                "detection.networks must enable at least one network".to_string(),
            ));
        }
        for (network, bounds) in &self.detection.bounds {
            if bounds.min > bounds.max {
                return Err(Error::pattern(
                    network,
                    format!("length bounds {}..={} are inverted", bounds.min, bounds.max),
                ));
            }
        }
        if self.upstream.timeout_ms == 0 {
            return Err(Error::Config("upstream.timeout_ms must be > 0".to_string()));
        }
        if self.history.capacity == 0 {
            return Err(Error::Config("history.capacity must be > 0".to_string()));
        }
        if self.detection.container.attribute.is_empty() {
            return Err(Error::Config(
                "detection.container.attribute must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
