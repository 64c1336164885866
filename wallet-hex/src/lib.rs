//! # Wallet Hex
//!
//! Application service layer and adapters for the wallet ledger.
//!
//! ## Architecture
//!
//! - `service` - Application service (orchestrates ledger operations)
//! - `inbound/` - HTTP adapter (Axum server)
//! - `outbound/` - Currency converter and transaction publisher adapters
//!
//! The service is generic over `S: LedgerStore`, allowing different store
//! implementations to be injected.

pub mod inbound;
pub mod outbound;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use service::{Movement, ServiceConfig, WalletService};
