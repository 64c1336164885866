//! # Wallet Types
//!
//! Domain types and port traits for the wallet ledger.
//! This crate has no IO of its own - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate is the **innermost core** of the hexagonal layout:
//! - `domain/` - Pure domain types (Money, Wallet, Transaction)
//! - `ports/` - Traits the store, converter and publisher adapters implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain, store and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    Conversion, Currency, MAX_WALLET_NAME_LEN, Money, OperationKind, OwnerId, Transaction,
    TransactionId, Wallet, WalletId, validate_name,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    BoxFuture, CurrencyConverter, ExchangeError, LedgerStore, PublishError, TransactionPublisher,
    WalletUpdate, run_in_transaction,
};
