//! HTTP Inbound Adapter
//!
//! Axum-based HTTP server that drives the wallet service.

mod auth;
mod handlers;
mod server;

pub use auth::OWNER_HEADER;
pub use handlers::ApiError;
pub use server::HttpServer;
