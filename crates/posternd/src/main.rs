#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use posternd::config::{Args, ServerConfig};
use posternd::metrics::{serve_ops, HealthState};
use posternd::run;
use posternd::server::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posternd=info,warn".into()),
        )
        .init();

    let args = Args::parse();
    let config: ServerConfig = args.into();

    if let Err(e) = config.validate() {
        anyhow::bail!("invalid configuration: {}", e);
    }

    let listener = TcpListener::bind(config.listen).await?;
    info!("listening on {}", config.listen);

    let metrics_addr = config.metrics_addr;
    let state = Arc::new(ServerState::new(config));

    let health_state = HealthState::new();
    tokio::spawn({
        let health_state = health_state.clone();
        async move {
            if let Err(e) = serve_ops(metrics_addr, health_state).await {
                warn!("ops endpoint error: {}", e);
            }
        }
    });

    tokio::select! {
        result = run(listener, state) => {
            if let Err(e) = result {
                tracing::error!("relay error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            health_state.set_ready(false);
            info!("shutdown signal received");
        }
    }

    Ok(())
}
