//! capauthd - capability delegation authority daemon.

use capauthd::caps::CapabilityAuthority;
use capauthd::config::{self, Config};
use capauthd::{http, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "capauthd.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = config::validate(&config) {
        for e in &errors {
            error!(path = %config_path, error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s)",
            errors.len()
        ));
    }

    info!(
        server = %config.server.name,
        listen = %config.server.listen,
        roots = config.authority.roots.len(),
        "Starting capauthd"
    );

    let authority = Arc::new(CapabilityAuthority::new(config.authority_params()));

    let metrics_port = config.server.metrics_port;
    // metrics_port = 0 disables the metrics listener.
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        tokio::spawn(async move {
            http::run_metrics_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let app = http::router(authority, config.server.cors_allow_any_origin);
    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .map_err(|e| {
            error!(addr = %config.server.listen, error = %e, "Failed to bind API listener");
            e
        })?;
    info!(addr = %config.server.listen, "Capability API listening");

    http::serve_api(listener, app).await?;
    info!("capauthd stopped");
    Ok(())
}
