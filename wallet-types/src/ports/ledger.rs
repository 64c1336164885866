//! Ledger store port.
//!
//! This is the primary port of the hexagon. Adapters (Postgres, SQLite,
//! in-memory) implement it.
//!
//! Operations that must be atomic take the transaction handle explicitly as
//! `&mut Self::Tx`. Everything done through the same handle shares one
//! connection and one lock scope, and becomes visible only on [`LedgerStore::commit`].
//! Dropping a handle without committing rolls it back.

use chrono::{DateTime, Utc};

use crate::domain::{Money, OwnerId, Transaction, Wallet, WalletId};
use crate::dto::HistoryFilter;
use crate::error::RepoError;

pub use futures::future::BoxFuture;

/// New metadata for a locked wallet. The balance is already re-denominated
/// when the currency changes.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletUpdate {
    pub name: String,
    pub balance: Money,
}

#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Explicit transaction handle.
    type Tx: Send + 'static;

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction scope
    // ─────────────────────────────────────────────────────────────────────────────

    async fn begin(&self) -> Result<Self::Tx, RepoError>;

    async fn commit(&self, tx: Self::Tx) -> Result<(), RepoError>;

    async fn rollback(&self, tx: Self::Tx) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Operations inside a scope
    // ─────────────────────────────────────────────────────────────────────────────

    /// Reads a live wallet and holds its row lock until the scope ends.
    ///
    /// With `Some(owner)` the wallet must belong to that owner; `None` is
    /// reserved for transfer targets.
    async fn lock_wallet(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: Option<OwnerId>,
    ) -> Result<Wallet, RepoError>;

    /// Adds `delta` to the balance. Fails with `BelowZero` if the result
    /// would be negative and `WalletNotFound` if no live row matched.
    async fn adjust_balance(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: OwnerId,
        delta: i64,
    ) -> Result<Wallet, RepoError>;

    async fn append_history(
        &self,
        tx: &mut Self::Tx,
        record: &Transaction,
    ) -> Result<(), RepoError>;

    /// Persists new metadata for a wallet locked in this scope.
    async fn update_wallet(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: OwnerId,
        update: &WalletUpdate,
    ) -> Result<Wallet, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Single-statement operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Unlocked read of a live wallet owned by `owner`.
    async fn get_wallet(&self, id: WalletId, owner: OwnerId) -> Result<Wallet, RepoError>;

    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, RepoError>;

    async fn soft_delete_wallet(&self, id: WalletId, owner: OwnerId) -> Result<(), RepoError>;

    /// Registers an owner so wallets can reference it. Idempotent.
    async fn upsert_owner(&self, owner: OwnerId) -> Result<(), RepoError>;

    /// History rows where `wallet` is the source or the transfer target.
    async fn list_transactions(
        &self,
        wallet: WalletId,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Soft-deletes live wallets not updated since `cutoff`. Returns how many.
    async fn sweep_stale_wallets(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError>;
}

/// Runs `f` inside one transaction scope of `store`.
///
/// Commits when `f` returns `Ok` and rolls back when it returns `Err`. If the
/// returned future is dropped mid-flight (timeout, client gone, panic) the
/// handle is dropped with it, which rolls back.
///
/// `ctx` is handed to `f` with the scope's lifetime so the closure does not
/// have to capture borrowed state.
pub async fn run_in_transaction<S, C, T, E, F>(store: &S, ctx: &C, f: F) -> Result<T, E>
where
    S: LedgerStore + ?Sized,
    C: Sync + ?Sized,
    E: From<RepoError>,
    F: for<'t> FnOnce(&'t mut S::Tx, &'t C) -> BoxFuture<'t, Result<T, E>>,
{
    let mut tx = store.begin().await?;

    match f(&mut tx, ctx).await {
        Ok(value) => {
            store.commit(tx).await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = store.rollback(tx).await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
