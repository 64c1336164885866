//! Error types for the wallet ledger.

use crate::domain::{OwnerId, WalletId};
use crate::ports::ExchangeError;

/// Domain-level errors (business rule violations).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("Amount cannot be negative")]
    NegativeAmount,

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("Amount overflows the balance range")]
    AmountOverflow,

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("Operation not allowed: {0}")]
    OperationNotAllowed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Store-level errors. Constraint violations get their own variants so the
/// service can tell a missing wallet from a failed check.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Owner not found: {0}")]
    OwnerNotFound(OwnerId),

    #[error("Wallet already exists: {0}")]
    DuplicateWallet(String),

    #[error("Balance of wallet {0} cannot go below zero")]
    BelowZero(WalletId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Application-level errors returned by the wallet service.
///
/// Each variant maps to one HTTP status code.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(WalletId),

    #[error("Owner not found: {0}")]
    OwnerNotFound(OwnerId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Currency not allowed: {0}")]
    CurrencyNotAllowed(String),

    #[error("Currency conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            e @ DomainError::InsufficientFunds { .. } => AppError::InsufficientFunds(e.to_string()),
            e => AppError::ValidationFailed(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::WalletNotFound(id) => AppError::WalletNotFound(id),
            RepoError::OwnerNotFound(id) => AppError::OwnerNotFound(id),
            RepoError::DuplicateWallet(name) => {
                AppError::Conflict(format!("Wallet name already in use: {}", name))
            }
            e @ RepoError::BelowZero(_) => AppError::InsufficientFunds(e.to_string()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
        }
    }
}

impl From<ExchangeError> for AppError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::UnsupportedCurrency(code) => AppError::CurrencyNotAllowed(code),
            e => AppError::ConversionFailed(e.to_string()),
        }
    }
}
