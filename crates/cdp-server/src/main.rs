//! CDP Server - Main entry point

use anyhow::Result;
use cdp_common::logging::{init_logging, LogConfig};
use cdp_ingest::catalog::SchemaCatalog;
use cdp_ingest::postgres::{self, PgAnalyticalStore, PgControlStore};
use cdp_ingest::IngestionController;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use cdp_server::{
    api::{create_router, AppState},
    auth::AdminToken,
    config::Config,
    features::FeatureState,
    storage::{config::StorageConfig, Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment variables take precedence over these defaults
    let log_config = LogConfig::builder()
        .log_file_prefix("cdp-server")
        .filter_directives("cdp_server=debug,cdp_ingest=debug,tower_http=debug,sqlx=info")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting CDP Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = postgres::create_pool(&config.database.pool_config()).await?;
    info!("Database connection pool established");

    postgres::migrate(&db_pool).await?;
    info!("Database migrations completed");

    let storage = Storage::new(StorageConfig::from_env()?).await?;

    let catalog = Arc::new(SchemaCatalog::standard(config.ingest.dataset.clone()));
    let controller = IngestionController::new(
        Arc::new(PgControlStore::new(db_pool.clone())),
        Arc::new(PgAnalyticalStore::new(db_pool.clone(), catalog.clone())),
        Arc::new(storage),
        catalog,
    )
    .with_raw_prefix(config.ingest.raw_prefix.clone())
    .with_batch_size(config.ingest.batch_size);

    info!(
        dataset = %config.ingest.dataset,
        raw_prefix = %controller.raw_prefix(),
        batch_size = config.ingest.batch_size,
        "Ingestion controller ready"
    );

    let state = AppState {
        features: FeatureState {
            controller: Arc::new(controller),
            admin: AdminToken::new(config.ingest.admin_token.as_deref()),
        },
        db: Some(db_pool),
    };

    let app = create_router(state, &config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Background ingestions get a short grace period
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
