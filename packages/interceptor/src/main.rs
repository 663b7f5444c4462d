// packages/interceptor/src/main.rs
//! HTTP interception proxy
//!
//! Serves configured URL mappings and header rules through a local forward
//! proxy. Point clients at it with `http_proxy=http://127.0.0.1:8888`.

use anyhow::{Context, Result};
use http_interceptor::interception::{self, rules, Dispatcher, HyperTransport, ProxyServer};
use http_interceptor::observability::{init_metrics, init_tracing};
use http_interceptor::utils::config::InterceptorConfig;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = InterceptorConfig::load().context("loading configuration")?;

    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    info!("Starting HTTP interceptor v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let table = interception::global();
    rules::install(&table, &config).context("installing configured rules")?;

    let dispatcher = Dispatcher::new(table, Arc::new(HyperTransport::new()))
        .with_interception_timeout(config.dispatch.interception_timeout());
    let proxy = Arc::new(ProxyServer::new(config.server.clone(), Arc::new(dispatcher)));

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal, cleaning up...");
    };

    proxy.run(shutdown_signal).await?;
    info!("Proxy stopped gracefully");
    Ok(())
}
