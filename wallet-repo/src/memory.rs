//! In-memory ledger store for development and tests.
//!
//! A transaction takes the single state mutex and works on a staged copy.
//! Commit swaps the copy in; rollback (or drop) discards it. Transactions
//! therefore serialize globally, which also gives the per-wallet ordering
//! the SQL adapters get from row locks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use wallet_types::{
    DomainError, HistoryFilter, HistorySort, LedgerStore, OwnerId, RepoError, Transaction,
    Wallet, WalletId, WalletUpdate,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    owners: HashSet<OwnerId>,
    wallets: HashMap<WalletId, Wallet>,
    history: Vec<Transaction>,
}

impl MemoryState {
    fn live_wallet(&self, id: WalletId, owner: Option<OwnerId>) -> Result<&Wallet, RepoError> {
        self.wallets
            .get(&id)
            .filter(|w| !w.deleted && owner.is_none_or(|o| w.owner == o))
            .ok_or(RepoError::WalletNotFound(id))
    }

    fn live_wallet_mut(&mut self, id: WalletId, owner: OwnerId) -> Result<&mut Wallet, RepoError> {
        self.wallets
            .get_mut(&id)
            .filter(|w| !w.deleted && w.owner == owner)
            .ok_or(RepoError::WalletNotFound(id))
    }

    fn name_taken(&self, owner: OwnerId, name: &str, except: Option<WalletId>) -> bool {
        self.wallets.values().any(|w| {
            !w.deleted && w.owner == owner && w.name == name && Some(w.id) != except
        })
    }
}

/// Handle for one in-memory transaction.
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every history record, oldest first, regardless of owner.
    pub async fn history(&self) -> Vec<Transaction> {
        self.state.lock().await.history.clone()
    }

    /// Reads a wallet even when soft-deleted.
    pub async fn wallet_for_audit(&self, id: WalletId) -> Option<Wallet> {
        self.state.lock().await.wallets.get(&id).cloned()
    }

    /// Overwrites `updated_at`, letting tests age a wallet.
    pub async fn set_updated_at(&self, id: WalletId, at: DateTime<Utc>) -> bool {
        match self.state.lock().await.wallets.get_mut(&id) {
            Some(wallet) => {
                wallet.updated_at = at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, RepoError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryTx { guard, staged })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), RepoError> {
        let MemoryTx { mut guard, staged } = tx;
        *guard = staged;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), RepoError> {
        drop(tx);
        Ok(())
    }

    async fn lock_wallet(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: Option<OwnerId>,
    ) -> Result<Wallet, RepoError> {
        tx.staged.live_wallet(id, owner).cloned()
    }

    async fn adjust_balance(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: OwnerId,
        delta: i64,
    ) -> Result<Wallet, RepoError> {
        let wallet = tx.staged.live_wallet_mut(id, owner)?;
        wallet.balance = wallet.balance.checked_adjust(delta).map_err(|e| match e {
            DomainError::InsufficientFunds { .. } => RepoError::BelowZero(id),
            other => RepoError::Domain(other),
        })?;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn append_history(
        &self,
        tx: &mut Self::Tx,
        record: &Transaction,
    ) -> Result<(), RepoError> {
        tx.staged.history.push(record.clone());
        Ok(())
    }

    async fn update_wallet(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: OwnerId,
        update: &WalletUpdate,
    ) -> Result<Wallet, RepoError> {
        if tx.staged.name_taken(owner, &update.name, Some(id)) {
            return Err(RepoError::DuplicateWallet(update.name.clone()));
        }
        let wallet = tx.staged.live_wallet_mut(id, owner)?;
        wallet.name = update.name.clone();
        wallet.balance = update.balance;
        wallet.updated_at = Utc::now();
        Ok(wallet.clone())
    }

    async fn get_wallet(&self, id: WalletId, owner: OwnerId) -> Result<Wallet, RepoError> {
        self.state.lock().await.live_wallet(id, Some(owner)).cloned()
    }

    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, RepoError> {
        let mut state = self.state.lock().await;
        if !state.owners.contains(&wallet.owner) {
            return Err(RepoError::OwnerNotFound(wallet.owner));
        }
        if state.wallets.contains_key(&wallet.id)
            || state.name_taken(wallet.owner, &wallet.name, None)
        {
            return Err(RepoError::DuplicateWallet(wallet.name.clone()));
        }
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet.clone())
    }

    async fn soft_delete_wallet(&self, id: WalletId, owner: OwnerId) -> Result<(), RepoError> {
        let mut state = self.state.lock().await;
        let wallet = state.live_wallet_mut(id, owner)?;
        wallet.deleted = true;
        wallet.updated_at = Utc::now();
        Ok(())
    }

    async fn upsert_owner(&self, owner: OwnerId) -> Result<(), RepoError> {
        self.state.lock().await.owners.insert(owner);
        Ok(())
    }

    async fn list_transactions(
        &self,
        wallet: WalletId,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, RepoError> {
        let state = self.state.lock().await;
        let mut rows: Vec<Transaction> = state
            .history
            .iter()
            .filter(|t| t.wallet_id == wallet || t.target_wallet_id == Some(wallet))
            .filter(|t| filter.from.is_none_or(|from| t.executed_at >= from))
            .filter(|t| filter.to.is_none_or(|to| t.executed_at <= to))
            .filter(|t| filter.kind.is_none_or(|kind| t.operation == kind))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match filter.sort {
                HistorySort::ExecutedAt => a.executed_at.cmp(&b.executed_at),
                HistorySort::Amount => a.amount.amount().cmp(&b.amount.amount()),
            }
            .then_with(|| a.id.cmp(&b.id));
            if filter.descending {
                ordering.reverse()
            } else {
                ordering
            }
        });

        Ok(rows
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn sweep_stale_wallets(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut swept = 0;
        for wallet in state.wallets.values_mut() {
            if !wallet.deleted && wallet.updated_at < cutoff {
                wallet.deleted = true;
                wallet.updated_at = now;
                swept += 1;
            }
        }
        Ok(swept)
    }
}
