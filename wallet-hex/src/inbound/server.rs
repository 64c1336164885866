//! HTTP Server configuration and startup.

use std::future::Future;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use wallet_types::LedgerStore;

use super::auth::owner_middleware;
use super::handlers::{self, AppState};
use crate::WalletService;

/// HTTP Server for the Wallet API.
pub struct HttpServer<S: LedgerStore> {
    state: Arc<AppState<S>>,
}

impl<S: LedgerStore> HttpServer<S> {
    /// Creates a new HTTP server with the given service.
    pub fn new(service: WalletService<S>) -> Self {
        Self {
            state: Arc::new(AppState { service }),
        }
    }

    /// Builds the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/owners/me", put(handlers::register_owner::<S>))
            .route("/api/wallets", post(handlers::create_wallet::<S>))
            .route(
                "/api/wallets/{id}",
                get(handlers::get_wallet::<S>)
                    .patch(handlers::update_wallet::<S>)
                    .delete(handlers::delete_wallet::<S>),
            )
            .route(
                "/api/wallets/{id}/transactions",
                get(handlers::list_transactions::<S>),
            )
            .route("/api/transactions/deposit", post(handlers::deposit::<S>))
            .route("/api/transactions/withdraw", post(handlers::withdraw::<S>))
            .route("/api/transactions/transfer", post(handlers::transfer::<S>))
            .layer(middleware::from_fn(owner_middleware))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address until Ctrl+C or SIGTERM.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        self.run_with_shutdown(addr, shutdown_signal()).await
    }

    /// Runs the server until `shutdown` resolves, then drains in-flight requests.
    pub async fn run_with_shutdown(
        self,
        addr: &str,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
