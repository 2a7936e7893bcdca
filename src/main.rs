use admitr::config::loader::load_config_or_default;
use admitr::config::watcher::watch_config_file;
use admitr::metrics_server::start_metrics_server;
use admitr::{GateSet, RuntimeConfig};
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "admitr=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Admission controller starting...");

    let runtime = RuntimeConfig::from_env();
    let config = load_config_or_default(&runtime.config_path).await?;

    let gates = GateSet::from_config(&config)?;
    gates.start_all()?;
    tracing::info!("Admission gates active: {}", gates.names().join(", "));

    let shared_gates = Arc::new(ArcSwap::from_pointee(gates));

    let metrics_port = runtime.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_port).await {
            tracing::error!("Metrics server failed: {}", e);
        }
    });

    if runtime.watch_config && runtime.config_path.exists() {
        let path = runtime.config_path.clone();
        let watched = Arc::clone(&shared_gates);
        tokio::spawn(async move {
            if let Err(e) = watch_config_file(path, watched).await {
                tracing::error!("Config watcher failed: {}", e);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, stopping sweepers");
    shared_gates.load().stop_all();

    Ok(())
}
