//! Database row types and error mapping shared by the SQL adapters.
//!
//! Postgres stores native UUID / TIMESTAMPTZ columns; SQLite stores both as
//! TEXT, so each backend gets its own row structs.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::error::ErrorKind;
use uuid::Uuid;

use wallet_types::{
    Currency, Money, OperationKind, OwnerId, RepoError, Transaction, TransactionId, Wallet,
    WalletId,
};

/// Column list every wallet query selects, in row-struct order.
pub const WALLET_COLUMNS: &str =
    "id, owner_id, name, currency, balance, created_at, updated_at, deleted";

/// Column list every history query selects, in row-struct order.
pub const HISTORY_COLUMNS: &str = "id, wallet_id, owner_id, target_wallet_id, amount, currency, \
     converted_amount, exchange_rate, transaction_type, executed_at";

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Identifies the wallet a failing write was about, so constraint
/// violations can name it.
pub struct WriteTarget<'a> {
    pub wallet: WalletId,
    pub owner: OwnerId,
    pub name: &'a str,
}

/// Maps constraint violations to their own error kinds; everything else is
/// an opaque database error.
pub fn map_write_error(err: sqlx::Error, target: &WriteTarget<'_>) -> RepoError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.kind() {
            ErrorKind::UniqueViolation => {
                return RepoError::DuplicateWallet(target.name.to_string());
            }
            ErrorKind::ForeignKeyViolation => return RepoError::OwnerNotFound(target.owner),
            ErrorKind::CheckViolation => return RepoError::BelowZero(target.wallet),
            _ => {}
        }
    }
    RepoError::Database(err.to_string())
}

pub fn db_error(err: sqlx::Error) -> RepoError {
    RepoError::Database(err.to_string())
}

pub fn tx_error(err: sqlx::Error) -> RepoError {
    RepoError::Transaction(err.to_string())
}

/// `LIKE` pattern matching subtype labels of `kind`, e.g. `ATM_withdraw`.
/// Compare against `LOWER(transaction_type)` with `ESCAPE '\'`.
pub fn subtype_pattern(kind: OperationKind) -> String {
    format!("%\\_{}", kind.label())
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared conversions
// ─────────────────────────────────────────────────────────────────────────────

fn parse_currency(code: &str) -> Result<Currency, RepoError> {
    code.parse().map_err(RepoError::Database)
}

fn parse_kind(label: &str) -> Result<OperationKind, RepoError> {
    OperationKind::from_label(label)
        .ok_or_else(|| RepoError::Database(format!("Unknown operation label: {}", label)))
}

#[allow(clippy::too_many_arguments)]
fn wallet_from_parts(
    id: Uuid,
    owner: Uuid,
    name: String,
    currency: &str,
    balance: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted: bool,
) -> Result<Wallet, RepoError> {
    Ok(Wallet {
        id: WalletId::from_uuid(id),
        owner: OwnerId::from_uuid(owner),
        name,
        balance: Money::new(balance, parse_currency(currency)?)?,
        created_at,
        updated_at,
        deleted,
    })
}

#[allow(clippy::too_many_arguments)]
fn transaction_from_parts(
    id: Uuid,
    wallet_id: Uuid,
    owner_id: Uuid,
    target_wallet_id: Option<Uuid>,
    amount: i64,
    currency: &str,
    converted_amount: Option<i64>,
    exchange_rate: Option<f64>,
    kind: &str,
    executed_at: DateTime<Utc>,
) -> Result<Transaction, RepoError> {
    Ok(Transaction::from_parts(
        TransactionId::from_uuid(id),
        WalletId::from_uuid(wallet_id),
        OwnerId::from_uuid(owner_id),
        target_wallet_id.map(WalletId::from_uuid),
        Money::new(amount, parse_currency(currency)?)?,
        converted_amount,
        exchange_rate,
        parse_kind(kind)?,
        kind.to_string(),
        executed_at,
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
#[derive(FromRow)]
pub struct PgWalletRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub currency: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[cfg(feature = "postgres")]
impl PgWalletRow {
    pub fn into_domain(self) -> Result<Wallet, RepoError> {
        wallet_from_parts(
            self.id,
            self.owner_id,
            self.name,
            &self.currency,
            self.balance,
            self.created_at,
            self.updated_at,
            self.deleted,
        )
    }
}

#[cfg(feature = "postgres")]
#[derive(FromRow)]
pub struct PgHistoryRow {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub owner_id: Uuid,
    pub target_wallet_id: Option<Uuid>,
    pub amount: i64,
    pub currency: String,
    pub converted_amount: Option<i64>,
    pub exchange_rate: Option<f64>,
    pub transaction_type: String,
    pub executed_at: DateTime<Utc>,
}

#[cfg(feature = "postgres")]
impl PgHistoryRow {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        transaction_from_parts(
            self.id,
            self.wallet_id,
            self.owner_id,
            self.target_wallet_id,
            self.amount,
            &self.currency,
            self.converted_amount,
            self.exchange_rate,
            &self.transaction_type,
            self.executed_at,
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite rows
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-width RFC 3339 (microseconds, `Z`) so TEXT comparison orders correctly.
#[cfg(feature = "sqlite")]
pub fn sqlite_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

#[cfg(feature = "sqlite")]
fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(s).map_err(|e| RepoError::Database(e.to_string()))
}

#[cfg(feature = "sqlite")]
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RepoError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| RepoError::Database(e.to_string()))?
        .with_timezone(&Utc))
}

#[cfg(feature = "sqlite")]
#[derive(FromRow)]
pub struct SqliteWalletRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub currency: String,
    pub balance: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted: bool,
}

#[cfg(feature = "sqlite")]
impl SqliteWalletRow {
    pub fn into_domain(self) -> Result<Wallet, RepoError> {
        wallet_from_parts(
            parse_uuid(&self.id)?,
            parse_uuid(&self.owner_id)?,
            self.name,
            &self.currency,
            self.balance,
            parse_timestamp(&self.created_at)?,
            parse_timestamp(&self.updated_at)?,
            self.deleted,
        )
    }
}

#[cfg(feature = "sqlite")]
#[derive(FromRow)]
pub struct SqliteHistoryRow {
    pub id: String,
    pub wallet_id: String,
    pub owner_id: String,
    pub target_wallet_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub converted_amount: Option<i64>,
    pub exchange_rate: Option<f64>,
    pub transaction_type: String,
    pub executed_at: String,
}

#[cfg(feature = "sqlite")]
impl SqliteHistoryRow {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        let target = match self.target_wallet_id.as_deref() {
            Some(s) => Some(parse_uuid(s)?),
            None => None,
        };
        transaction_from_parts(
            parse_uuid(&self.id)?,
            parse_uuid(&self.wallet_id)?,
            parse_uuid(&self.owner_id)?,
            target,
            self.amount,
            &self.currency,
            self.converted_amount,
            self.exchange_rate,
            &self.transaction_type,
            parse_timestamp(&self.executed_at)?,
        )
    }
}
