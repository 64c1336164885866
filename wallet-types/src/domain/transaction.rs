//! Transaction history record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Money;
use super::wallet::{OwnerId, WalletId};
use crate::error::DomainError;

uuid_id! {
    /// Unique identifier for a history record.
    TransactionId
}

/// Longest caller-supplied operation label.
pub const MAX_LABEL_LEN: usize = 32;

/// The kind of balance-affecting operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Money coming into a wallet from outside the ledger
    Deposit,
    /// Money leaving a wallet to outside the ledger
    Withdraw,
    /// Money moving between two wallets
    Transfer,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Transfer => "transfer",
        }
    }

    pub fn all() -> &'static [OperationKind] {
        &[
            OperationKind::Deposit,
            OperationKind::Withdraw,
            OperationKind::Transfer,
        ]
    }

    /// Reads a stored label, tolerating subject-specific prefixes such as
    /// `ATM_withdraw`.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|kind| label == kind.label() || label.ends_with(&format!("_{}", kind.label())))
    }

    /// Checks a caller-supplied label such as `ATM_withdraw` against this
    /// kind and returns it trimmed. No label means the kind's own.
    pub fn accept_label(self, label: Option<&str>) -> Result<String, DomainError> {
        let Some(raw) = label else {
            return Ok(self.label().to_string());
        };
        let label = raw.trim();
        let well_formed = !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !well_formed || Self::from_label(label) != Some(self) {
            return Err(DomainError::OperationNotAllowed(raw.to_string()));
        }
        Ok(label.to_string())
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.label() == wanted)
            .ok_or_else(|| DomainError::OperationNotAllowed(s.to_string()))
    }
}

/// Result of converting a flow amount into a wallet's currency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// Converted amount in minor units of the target currency
    pub amount: i64,
    /// Effective rate: target units per requested unit
    pub rate: f64,
}

impl Conversion {
    /// Derives the effective rate from a converter result.
    pub fn from_amounts(requested: i64, converted: i64) -> Self {
        let rate = if requested == 0 {
            0.0
        } else {
            converted as f64 / requested as f64
        };
        Self {
            amount: converted,
            rate,
        }
    }
}

/// An immutable audit entry for one balance-affecting operation.
///
/// `amount` is what the caller asked for, in the currency they named.
/// `converted_amount` is set only when that currency differed from the
/// wallet currency it was applied to (for transfers: the target wallet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Source wallet (the only wallet for deposits and withdrawals)
    pub wallet_id: WalletId,
    pub owner_id: OwnerId,
    /// Set only for transfers
    pub target_wallet_id: Option<WalletId>,
    /// Requested amount and currency
    pub amount: Money,
    pub converted_amount: Option<i64>,
    pub exchange_rate: Option<f64>,
    pub operation: OperationKind,
    /// Stored label; `operation` itself or a subtype of it
    pub label: String,
    pub executed_at: DateTime<Utc>,
}

impl Transaction {
    pub fn deposit(
        wallet_id: WalletId,
        owner_id: OwnerId,
        amount: Money,
        conversion: Option<Conversion>,
    ) -> Self {
        Self::build(wallet_id, owner_id, None, amount, conversion, OperationKind::Deposit)
    }

    pub fn withdrawal(
        wallet_id: WalletId,
        owner_id: OwnerId,
        amount: Money,
        conversion: Option<Conversion>,
    ) -> Self {
        Self::build(wallet_id, owner_id, None, amount, conversion, OperationKind::Withdraw)
    }

    /// `conversion` describes the credit applied to the target wallet.
    pub fn transfer(
        source: WalletId,
        target: WalletId,
        owner_id: OwnerId,
        amount: Money,
        conversion: Option<Conversion>,
    ) -> Self {
        Self::build(
            source,
            owner_id,
            Some(target),
            amount,
            conversion,
            OperationKind::Transfer,
        )
    }

    fn build(
        wallet_id: WalletId,
        owner_id: OwnerId,
        target_wallet_id: Option<WalletId>,
        amount: Money,
        conversion: Option<Conversion>,
        operation: OperationKind,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            wallet_id,
            owner_id,
            target_wallet_id,
            amount,
            converted_amount: conversion.map(|c| c.amount),
            exchange_rate: conversion.map(|c| c.rate),
            operation,
            label: operation.label().to_string(),
            executed_at: Utc::now(),
        }
    }

    /// Replaces the default label with one accepted by [`OperationKind::accept_label`].
    pub fn with_label(mut self, label: String) -> Self {
        self.label = label;
        self
    }

    /// Reconstructs a record from stored fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: TransactionId,
        wallet_id: WalletId,
        owner_id: OwnerId,
        target_wallet_id: Option<WalletId>,
        amount: Money,
        converted_amount: Option<i64>,
        exchange_rate: Option<f64>,
        operation: OperationKind,
        label: String,
        executed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            wallet_id,
            owner_id,
            target_wallet_id,
            amount,
            converted_amount,
            exchange_rate,
            operation,
            label,
            executed_at,
        }
    }

    /// Amount that actually moved, in the currency of the wallet it was applied to.
    pub fn applied_amount(&self) -> i64 {
        self.converted_amount.unwrap_or(self.amount.amount())
    }
}
