//! Cloudgate API - Main Entry Point

use anyhow::Context;
use cloudgate_api::{
    build_router, ApiState, InMemorySystemDirectory, PluginServiceListing, ServiceConfig,
};
use cloudgate_core::{
    ArtifactProbe, FsArtifactProbe, HttpVerificationClient, InMemoryArtifactProbe,
    InMemoryVerificationCache, VerificationGate,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Cloudgate API v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| "/etc/cloudgate/cloudgate.toml".into());
    let config = ServiceConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let systems = match &config.systems_file {
        Some(path) => InMemorySystemDirectory::load(path)?,
        None => {
            tracing::warn!("No systems file configured, every request will be unauthorized");
            InMemorySystemDirectory::new()
        }
    };
    tracing::info!("Loaded {} registered systems", systems.len());

    let client = HttpVerificationClient::from_config(&config.gate)
        .context("building verification client")?;
    let cache = Arc::new(InMemoryVerificationCache::new(config.gate.validity_window()));
    let artifacts: Arc<dyn ArtifactProbe> = match &config.gate.artifact_root {
        Some(root) => Arc::new(FsArtifactProbe::new(root)),
        None => Arc::new(InMemoryArtifactProbe::new()),
    };
    let gate = VerificationGate::new(Arc::new(client), cache.clone(), artifacts);

    // Expired-record sweeper
    let sweeper = {
        let cache = cache.clone();
        let interval = config.gate.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        })
    };

    let state = ApiState::new(
        Arc::new(gate),
        Arc::new(systems),
        Arc::new(PluginServiceListing::new(config.listing.clone())),
    )
    .with_trusted_proxy(config.trust_forwarded_for);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!("Cloudgate API listening on {}", config.bind_addr);

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    tracing::info!("Cloudgate API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
