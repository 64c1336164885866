//! Wallet domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::{Currency, Money};
use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for a Wallet.
    WalletId
}

uuid_id! {
    /// Identity of the authenticated principal that owns wallets.
    OwnerId
}

/// Longest wallet label accepted.
pub const MAX_WALLET_NAME_LEN: usize = 100;

/// An owned, currency-denominated balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub owner: OwnerId,
    /// Human-readable label, unique per owner among live wallets
    pub name: String,
    /// Current balance (includes currency information)
    pub balance: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-deleted wallets are invisible to every read and mutation
    pub deleted: bool,
}

impl Wallet {
    /// Creates a new wallet with zero balance.
    pub fn new(owner: OwnerId, name: String, currency: Currency) -> Result<Self, DomainError> {
        let name = validate_name(&name)?;
        if owner.is_nil() {
            return Err(DomainError::ValidationError("Owner is empty".into()));
        }

        let now = Utc::now();
        Ok(Self {
            id: WalletId::new(),
            owner,
            name,
            balance: Money::zero(currency),
            created_at: now,
            updated_at: now,
            deleted: false,
        })
    }

    /// Returns the currency of this wallet.
    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }
}

/// Trims and checks a wallet label.
pub fn validate_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::ValidationError(
            "Wallet name cannot be empty".into(),
        ));
    }
    if name.chars().count() > MAX_WALLET_NAME_LEN {
        return Err(DomainError::ValidationError(format!(
            "Wallet name cannot exceed {} characters",
            MAX_WALLET_NAME_LEN
        )));
    }
    Ok(name.to_string())
}
