use std::sync::Arc;
use stockledger::application::handlers::router;
use stockledger::application::services::ledger_service::{LedgerDependencies, StockLedgerService};
use stockledger::config::{LedgerConfig, StaticSettings};
use stockledger::domain::repositories::{InventorySource, OrderSource};
use stockledger::infrastructure::in_memory::InMemoryCatalog;
use stockledger::infrastructure::storefront_client::{StorefrontClient, StorefrontConfig};
use stockledger::persistence::{
    init_database_with, SqliteMovementRepository, SqliteReconciliationRepository,
    SqliteWatermarkStore,
};
use stockledger::task_runner::run_order_sync;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("No .env file loaded: {}", e);
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockledger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LedgerConfig::from_env();
    info!("Stock ledger starting (database: {})", config.database_url);

    let pool = init_database_with(&config.database_url, config.database_max_connections).await?;

    let (inventory, orders): (Arc<dyn InventorySource>, Arc<dyn OrderSource>) =
        match StorefrontConfig::from_ledger_config(&config) {
            Some(storefront) => {
                info!("Using storefront at {}", storefront.api_base);
                let client = Arc::new(StorefrontClient::new(storefront)?);
                (
                    client.clone() as Arc<dyn InventorySource>,
                    client as Arc<dyn OrderSource>,
                )
            }
            None => {
                warn!("STOREFRONT_URL/KEY/SECRET not set, using an empty in-memory catalog");
                let catalog = Arc::new(InMemoryCatalog::new());
                (
                    catalog.clone() as Arc<dyn InventorySource>,
                    catalog as Arc<dyn OrderSource>,
                )
            }
        };

    let deps = LedgerDependencies {
        movements: Arc::new(SqliteMovementRepository::new(pool.clone())),
        reconciliations: Arc::new(SqliteReconciliationRepository::new(pool.clone())),
        inventory,
        orders,
        settings: Arc::new(StaticSettings::from_config(&config)),
        watermarks: Arc::new(SqliteWatermarkStore::new(pool.clone())),
    };
    let service = Arc::new(StockLedgerService::new(deps, &config));

    let sync_handle = if config.order_sync_enabled {
        let service = service.clone();
        let interval = config.order_sync_interval();
        let max_failures = config.order_sync_max_failures;
        info!("Order sync every {:?}", interval);
        Some(tokio::spawn(async move {
            let last_error = run_order_sync(service, interval, max_failures).await;
            error!("Order sync disabled until restart: {}", last_error);
        }))
    } else {
        info!("Order sync disabled");
        None
    };

    let app = router(service);

    info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    let server = axum::serve(listener, app);

    let shutdown_signal = async move {
        let ctrl_c = async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C signal"),
                Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                    info!("Received SIGTERM signal");
                }
                Err(e) => error!("Failed to install SIGTERM handler: {}", e),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    };

    info!("Server started successfully. Press Ctrl+C to stop.");
    server.with_graceful_shutdown(shutdown_signal).await?;

    info!("Server shutting down gracefully...");
    if let Some(handle) = sync_handle {
        handle.abort();
    }
    pool.close().await;

    info!("Shutdown complete");
    Ok(())
}
