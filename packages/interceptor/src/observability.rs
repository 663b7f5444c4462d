// packages/interceptor/src/observability.rs
//! Logging and metrics setup

use crate::utils::config::{LoggingConfig, MetricsConfig};
use crate::utils::errors::{InterceptError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured filter.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };

    installed.map_err(|e| InterceptError::ConfigError(format!("tracing: {}", e)))
}

/// Expose a Prometheus scrape endpoint when an address is configured.
/// Must run inside the tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    let Some(addr) = config.listen_addr else {
        return Ok(());
    };

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| InterceptError::ConfigError(format!("metrics: {}", e)))?;

    info!("Prometheus metrics on http://{}/metrics", addr);
    Ok(())
}
