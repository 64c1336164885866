//! # Wallet Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the ledger store adapter
//! - Create the converter, publisher and wallet service
//! - Start the stale-wallet sweeper and the HTTP server

mod config;

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_hex::outbound::{HttpTransactionPublisher, LogPublisher, RateTableConverter};
use wallet_hex::{WalletService, inbound::HttpServer};
use wallet_repo::{StaleWalletSweeper, build_repo};
use wallet_types::TransactionPublisher;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,wallet_app=debug,wallet_hex=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting wallet server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build store (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;
    tracing::info!(backend = repo.backend(), "Ledger store ready");

    let converter = Arc::new(RateTableConverter::new(config.rate_table()?));
    let publisher: Arc<dyn TransactionPublisher> = match &config.publish_url {
        Some(url) => {
            tracing::info!(url = %url, "Publishing transactions over HTTP");
            Arc::new(HttpTransactionPublisher::new(url.clone(), config.publish_timeout)?)
        }
        None => Arc::new(LogPublisher),
    };

    // Background sweeper, stopped once the server has drained
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = StaleWalletSweeper::new(repo.clone(), config.sweeper_config());
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    // Create the wallet service and run the HTTP server
    let service = WalletService::new(repo, converter, publisher, config.service_config());
    let server = HttpServer::new(service);
    let addr = format!("0.0.0.0:{}", config.port);

    let served = server.run(&addr).await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper_handle.await {
        tracing::warn!(error = %e, "Sweeper task ended abnormally");
    }

    served
}
