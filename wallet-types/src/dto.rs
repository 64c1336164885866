//! Data Transfer Objects (DTOs) for requests and responses.
//!
//! Currencies arrive as plain strings so an unknown code surfaces as
//! `CurrencyNotAllowed` from the service instead of a body rejection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Currency, OperationKind, OwnerId, Transaction, TransactionId, Wallet, WalletId};
use crate::error::DomainError;

/// Default page size for history listings.
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
/// Largest page size a caller may request.
pub const MAX_HISTORY_LIMIT: u32 = 500;

// ─────────────────────────────────────────────────────────────────────────────
// Wallet DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a new wallet. Any balance the client sends is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
    pub currency: String,
}

/// Partial update: absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWalletRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletResponse {
    pub id: WalletId,
    pub owner: OwnerId,
    pub name: String,
    pub currency: Currency,
    /// Balance in minor units (kopecks, fen, ...)
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletResponse {
    fn from(wallet: Wallet) -> Self {
        Self {
            id: wallet.id,
            owner: wallet.owner,
            currency: wallet.currency(),
            balance: wallet.balance.amount(),
            name: wallet.name,
            created_at: wallet.created_at,
            updated_at: wallet.updated_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Money movement DTOs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub wallet_id: WalletId,
    /// Amount in minor units of `currency`
    pub amount: i64,
    pub currency: String,
    /// Optional subtype label, e.g. `ATM_withdraw`
    #[serde(default)]
    pub operation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub wallet_id: WalletId,
    /// Amount in minor units of `currency`
    pub amount: i64,
    pub currency: String,
    /// Optional subtype label, e.g. `ATM_withdraw`
    #[serde(default)]
    pub operation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_wallet_id: WalletId,
    pub to_wallet_id: WalletId,
    /// Amount in minor units of `currency`
    pub amount: i64,
    pub currency: String,
    /// Optional subtype label, e.g. `ATM_withdraw`
    #[serde(default)]
    pub operation: Option<String>,
}

/// A history record as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub owner_id: OwnerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_wallet_id: Option<WalletId>,
    pub amount: i64,
    pub currency: Currency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub converted_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<f64>,
    pub operation: OperationKind,
    pub label: String,
    pub executed_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            wallet_id: tx.wallet_id,
            owner_id: tx.owner_id,
            target_wallet_id: tx.target_wallet_id,
            amount: tx.amount.amount(),
            currency: tx.amount.currency(),
            converted_amount: tx.converted_amount,
            exchange_rate: tx.exchange_rate,
            operation: tx.operation,
            label: tx.label,
            executed_at: tx.executed_at,
        }
    }
}

/// Response after a committed deposit, withdrawal or transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub transaction: TransactionResponse,
    /// The caller's wallet after the operation (the source for transfers)
    pub wallet: WalletResponse,
}

// ─────────────────────────────────────────────────────────────────────────────
// History listing
// ─────────────────────────────────────────────────────────────────────────────

/// Columns a history listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySort {
    #[default]
    ExecutedAt,
    Amount,
}

impl HistorySort {
    pub fn column(&self) -> &'static str {
        match self {
            HistorySort::ExecutedAt => "executed_at",
            HistorySort::Amount => "amount",
        }
    }
}

impl std::str::FromStr for HistorySort {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "executed_at" => Ok(HistorySort::ExecutedAt),
            "amount" => Ok(HistorySort::Amount),
            other => Err(DomainError::ValidationError(format!(
                "Cannot sort history by '{}'",
                other
            ))),
        }
    }
}

/// Raw query string of `GET /api/wallets/{id}/transactions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub offset: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub descending: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<String>,
}

/// Validated history listing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFilter {
    pub offset: u32,
    pub limit: u32,
    pub sort: HistorySort,
    pub descending: bool,
    /// Inclusive lower bound on `executed_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `executed_at`
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<OperationKind>,
}

impl Default for HistoryFilter {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: DEFAULT_HISTORY_LIMIT,
            sort: HistorySort::default(),
            descending: true,
            from: None,
            to: None,
            kind: None,
        }
    }
}

impl HistoryQuery {
    pub fn into_filter(self) -> Result<HistoryFilter, DomainError> {
        let limit = self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(DomainError::ValidationError(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::ValidationError(
                    "'from' must not be after 'to'".into(),
                ));
            }
        }

        let sort = match self.sort.as_deref() {
            Some(s) => s.parse()?,
            None => HistorySort::default(),
        };
        let kind = match self.kind.as_deref() {
            Some(k) => Some(k.parse::<OperationKind>()?),
            None => None,
        };

        Ok(HistoryFilter {
            offset: self.offset.unwrap_or(0),
            limit,
            sort,
            descending: self.descending.unwrap_or(true),
            from: self.from,
            to: self.to,
            kind,
        })
    }
}
