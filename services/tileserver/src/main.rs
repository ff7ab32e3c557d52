//! Multi-tenant geospatial tile server control plane.
//!
//! Wires together the credential lifecycle (`identity`), the connection
//! pool manager (`dbpool`), the catalog service (`catalog`), and the
//! per-request reader context (`reader_context`) into a running axum
//! binary: C3's auth middleware on the request path, C6's background
//! refresher as a long-lived task, and C7's health/readiness/diagnostics
//! endpoints alongside the tile/metadata handlers.

mod auth;
mod config;
mod error;
mod handlers;
mod health;
mod metrics;
mod refresher;
mod state;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use catalog::CatalogService;
use common::Config;
use dbpool::{PoolManager, PoolSettings};
use identity::{DatabaseProvider, DatabaseProviderSettings, StorageProvider};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // CLI: simple --config flag parsing, same shape as the template this
    // workspace was generalized from (no external CLI-parsing crate).
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    init_tracing(&config.server.log_level);
    info!(path = %config_path.display(), "configuration loaded");

    let hostname: Arc<str> = std::env::var("HOSTNAME")
        .unwrap_or_else(|_| "tileserver".to_string())
        .into();

    let storage_provider = if config.storage.storage_auth_enabled {
        Some(Arc::new(StorageProvider::new(
            config.storage.storage_account.clone(),
            config.storage.dev_mode_credential,
        )))
    } else {
        None
    };

    let database_provider = Arc::new(DatabaseProvider::new(DatabaseProviderSettings {
        mode: config.database.pg_auth_mode,
        mi_client_id: config.database.pg_mi_client_id.clone(),
        secret_store_name: config.database.secret_store_name.clone(),
        secret_store_key: config.database.secret_store_key.clone(),
        static_password: config
            .database
            .pg_password
            .as_ref()
            .map(|s| s.expose().to_string()),
    })?);

    let pool_settings = PoolSettings {
        host: config.database.pg_host.clone(),
        port: config.database.pg_port,
        database: config.database.pg_db.clone(),
        user: config.database.pg_user.clone(),
        pool_min: config.database.pool_min,
        pool_max: config.database.pool_max,
        connect_timeout: Duration::from_secs(config.database.connect_timeout_sec),
    };
    let pool_manager = Arc::new(PoolManager::new(
        pool_settings,
        Duration::from_secs(config.refresh.pool_drain_window_sec),
    ));

    // A failed initial credential/pool acquisition does not abort startup
    // (§4.4) — the pool manager reports degraded via `status()` until the
    // background refresher's next pass succeeds.
    match database_provider
        .acquire_async(Duration::from_secs(config.refresh.min_token_ttl_sec))
        .await
    {
        Ok(token) => {
            if let Err(e) = pool_manager.initialize(token.value()).await {
                warn!(error = %e, "initial pool construction failed, starting degraded");
            }
        }
        Err(e) => {
            warn!(error = %e, "initial database credential acquisition failed, starting degraded")
        }
    }

    let vector_schemas = if config.vector.enable_vector_api {
        config.vector.vector_schemas.clone()
    } else {
        Vec::new()
    };
    let catalog_service = Arc::new(CatalogService::new(
        Arc::clone(&pool_manager),
        vector_schemas,
    ));
    if let Err(e) = catalog_service.refresh().await {
        warn!(error = %e, "initial catalog load failed, starting with an empty catalog");
    }

    let metrics_handle = metrics::install_recorder();
    let listen_addr = config.server.listen_addr;

    let state = AppState {
        config: Arc::new(config),
        storage_provider,
        database_provider,
        pool_manager: Arc::clone(&pool_manager),
        catalog_service,
        metrics_handle,
        started_at: Instant::now(),
        hostname,
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher_handle = refresher::spawn(state.clone(), shutdown_rx);

    let app = build_router(state);

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .context("server error")?;

    // Bound the shutdown wait the same way the refresher itself bounds a
    // single refresh pass (§4.6).
    if tokio::time::timeout(Duration::from_secs(60), refresher_handle)
        .await
        .is_err()
    {
        warn!("background refresher did not stop within the shutdown timeout");
    }
    pool_manager.close().await;

    info!("shutdown complete");
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .route("/health", get(health::health))
        .route("/dashboard", get(health::dashboard))
        .route("/metrics", get(health::metrics))
        .route("/cog/info", get(handlers::cog_info))
        .route("/vector/collections", get(handlers::list_collections))
        .route("/vector/collections/{id}", get(handlers::get_collection))
        .route(
            "/vector/collections/{id}/items",
            get(handlers::collection_items),
        )
        .layer(axum::middleware::from_fn(metrics::track_request))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth::inject_storage_credential,
        ))
        .with_state(state)
}

fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new(log_level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
