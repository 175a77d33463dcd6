//! ordinary protocol server binary.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use ordinary_core::config::{AppConfig, CacheConfig};
use ordinary_server::{AppState, create_router};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ordinaryd - Nix binary cache proxy over a remote keyed cache
#[derive(Parser, Debug)]
#[command(name = "ordinaryd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "ORDINARY_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address, overrides `server.bind`
    #[arg(long)]
    bind: Option<String>,

    /// Working directory, overrides `server.work_dir`
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Remote cache backend, overrides `cache.type`
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Backend {
    Memory,
    Actions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ordinaryd v{}", env!("CARGO_PKG_VERSION"));

    let mut config =
        AppConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = args.dir {
        config.server.work_dir = dir;
    }
    match args.backend {
        Some(Backend::Memory) => config.cache = CacheConfig::Memory,
        Some(Backend::Actions) if !matches!(config.cache, CacheConfig::Actions { .. }) => {
            config.cache = CacheConfig::default();
        }
        _ => {}
    }

    let cache =
        ordinary_cache::from_config(&config.cache).context("failed to initialize remote cache")?;
    if cache.available() {
        tracing::info!(backend = cache.backend_name(), "remote cache initialized");
    } else {
        // Keep serving so readyz and quit work; protocol routes answer 503.
        tracing::error!(
            backend = cache.backend_name(),
            "remote cache is not available, protocol requests will fail"
        );
    }

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    let state = AppState::new(config, cache);
    state
        .prepare_work_dir()
        .await
        .with_context(|| format!("failed to create {}", state.work_dir().display()))?;
    tracing::info!(work_dir = %state.work_dir().display(), "working directory ready");

    let shutdown = state.shutdown.clone();
    tokio::spawn(watch_signals(shutdown.clone()));

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
