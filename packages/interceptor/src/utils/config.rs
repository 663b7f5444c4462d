// packages/interceptor/src/utils/config.rs
//! Process configuration
//!
//! Loaded from an optional YAML/TOML file layered under `HTTP_INTERCEPTOR__*`
//! environment variables, e.g. `HTTP_INTERCEPTOR__SERVER__LISTEN_ADDR`.

use crate::utils::errors::Result;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "HTTP_INTERCEPTOR_CONFIG";

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "http-interceptor.yaml";

const ENV_PREFIX: &str = "HTTP_INTERCEPTOR";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,

    /// Static URL mappings installed at startup
    pub mappings: Vec<MappingConfig>,

    /// Header rules installed as preprocessors at startup
    pub headers: Vec<HeaderRule>,
}

/// Proxy server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Proxy listen address
    pub listen_addr: SocketAddr,

    /// Largest request body the proxy buffers (bytes)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Dispatch core settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a claiming interceptor may take to respond (None = forever)
    pub interception_timeout_ms: Option<u64>,
}

impl DispatchConfig {
    pub fn interception_timeout(&self) -> Option<Duration> {
        self.interception_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,

    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            filter: "info,http_interceptor=debug".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus scrape endpoint; metrics stay in-process when unset
    pub listen_addr: Option<SocketAddr>,
}

/// A canonical URL served from a local file or folder
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MappingConfig {
    pub url: String,
    pub local_path: PathBuf,
}

/// Header added to passthrough requests, optionally only for one host
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeaderRule {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub host: Option<String>,
}

impl InterceptorConfig {
    /// Load from the file named by `HTTP_INTERCEPTOR_CONFIG` (or the default
    /// path) plus environment overrides. A missing file is not an error.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&path)
    }

    /// Load from an explicit file path plus environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {:?}", path);

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
