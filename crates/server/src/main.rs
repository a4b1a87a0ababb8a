//! Depot server binary.

use anyhow::{Context, Result};
use clap::Parser;
use depot_core::config::AppConfig;
use depot_server::{AppState, create_router};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// depot - a multi-tenant file-distribution portal
#[derive(Parser, Debug)]
#[command(name = "depotd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "DEPOT_CONFIG",
        default_value = "config/server.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "depot_server=info,depot_storage=info,depot_metadata=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config: AppConfig = Figment::new()
        .merge(Toml::file(&args.config))
        .merge(Env::prefixed("DEPOT_").split("__"))
        .extract()
        .with_context(|| format!("failed to load configuration from {}", args.config))?;

    tracing::info!(config_path = %args.config, "Configuration loaded");

    let storage = depot_storage::from_config(&config.storage)
        .await
        .context("failed to initialize object storage")?;
    storage
        .health_check()
        .await
        .context("object storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Object storage ready");

    let metadata = depot_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;
    tracing::info!("Metadata store ready");

    depot_server::metrics::register_metrics();

    let bind: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;

    let state = AppState::new(config, storage, metadata);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %bind, "depot server listening");

    axum::serve(listener, router)
        .await
        .context("server error")?;

    Ok(())
}
