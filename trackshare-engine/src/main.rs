//! trackshare-engine - membership and track-lifecycle reconciliation service
//!
//! Serves the billing webhook, the cron sweep trigger and internal operator
//! routes, and runs the periodic expiration sweep in-process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackshare_common::config::{resolve_config_path, EngineConfig};
use trackshare_common::db::init_database;
use trackshare_engine::services::{
    BillingProvider, LogNotifier, MailRelayNotifier, Notifier, ObjectStore, StorageClient,
    StripeClient, SweepScheduler,
};
use trackshare_engine::{build_router, AppState, Collaborators};

/// Command-line arguments for trackshare-engine
#[derive(Parser, Debug)]
#[command(name = "trackshare-engine")]
#[command(about = "Membership and track-lifecycle reconciliation service")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, env = "TRACKSHARE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides server.bind_addr
    #[arg(short, long, env = "TRACKSHARE_BIND")]
    bind: Option<String>,

    /// SQLite database path, overrides database.path
    #[arg(short, long, env = "TRACKSHARE_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is loaded before tracing so the configured level applies from the start
    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    if let Some(database) = args.database {
        config.database.path = database;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},tower_http=info", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting trackshare-engine v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match resolve_config_path(args.config.as_deref()) {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: none (compiled defaults)"),
    }

    let db = init_database(&config.database.path)
        .await
        .context("Failed to initialize database")?;
    info!("Database: {}", config.database.path.display());

    let billing: Arc<dyn BillingProvider> =
        Arc::new(StripeClient::new(&config.billing).context("Failed to build billing client")?);
    let store: Arc<dyn ObjectStore> =
        Arc::new(StorageClient::new(&config.storage).context("Failed to build storage client")?);
    let notifier: Arc<dyn Notifier> = match &config.notifications.endpoint {
        Some(endpoint) => Arc::new(
            MailRelayNotifier::new(endpoint.clone(), &config.notifications)
                .context("Failed to build notification client")?,
        ),
        None => {
            info!("No notification endpoint configured; expiration notices will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::new(
        db.clone(),
        &config,
        Collaborators {
            billing,
            store,
            notifier,
        },
    )
    .context("Failed to build application state")?;

    let scheduler = SweepScheduler::new(
        Arc::clone(&state.sweeper),
        Duration::from_secs(config.sweep.interval_secs),
    );
    if config.sweep.enabled {
        scheduler.start().await;
    } else {
        info!("Sweep scheduler disabled; relying on the HTTP trigger");
    }

    let shutdown = state.shutdown.clone();
    let dispatcher = Arc::clone(&state.dispatcher);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind_addr))?;
    info!("Listening on http://{}", config.server.bind_addr);
    info!("Health check: http://{}/health", config.server.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    scheduler.stop().await;
    info!(pending = dispatcher.pending(), "Flushing expiration notices");
    dispatcher.flush().await;
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, cancelling `shutdown` so running sweeps stop early
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }

    shutdown.cancel();
}
