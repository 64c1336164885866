//! Wallet Application Service
//!
//! Orchestrates money movement through the ledger store, converter and
//! publisher ports. Contains NO infrastructure logic.
//!
//! Every deposit, withdrawal, transfer and currency change runs inside one
//! store transaction bounded by `operation_timeout`. Input is validated
//! before the transaction opens; any failure inside it rolls the whole
//! operation back. Publishing happens after commit on a detached task and
//! never changes the outcome reported to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use wallet_types::{
    AppError, Conversion, CreateWalletRequest, Currency, CurrencyConverter, DepositRequest,
    HistoryQuery, LedgerStore, Money, OperationKind, OwnerId, Transaction, TransactionPublisher,
    TransferRequest, UpdateWalletRequest, Wallet, WalletId, WalletUpdate, WithdrawRequest,
    run_in_transaction, validate_name,
};

/// Timeouts applied by [`WalletService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound on one transactional operation, converter calls included
    pub operation_timeout: Duration,
    /// Upper bound on one publish attempt
    pub publish_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(5000),
            publish_timeout: Duration::from_millis(2000),
        }
    }
}

/// Outcome of a committed money movement.
#[derive(Debug, Clone)]
pub struct Movement {
    pub transaction: Transaction,
    /// The caller's wallet after the operation (the source for transfers)
    pub wallet: Wallet,
}

/// Application service for wallet operations.
///
/// Generic over `S: LedgerStore`; converter and publisher are trait objects
/// so they can be swapped at startup.
pub struct WalletService<S: LedgerStore> {
    store: S,
    converter: Arc<dyn CurrencyConverter>,
    publisher: Arc<dyn TransactionPublisher>,
    config: ServiceConfig,
}

impl<S: LedgerStore> WalletService<S> {
    pub fn new(
        store: S,
        converter: Arc<dyn CurrencyConverter>,
        publisher: Arc<dyn TransactionPublisher>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            converter,
            publisher,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Owners & wallets
    // ─────────────────────────────────────────────────────────────────────────────

    /// Registers the caller so it can own wallets.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn register_owner(&self, owner: OwnerId) -> Result<(), AppError> {
        ensure_owner(owner)?;
        self.store.upsert_owner(owner).await?;
        Ok(())
    }

    /// Creates a zero-balance wallet.
    #[instrument(skip(self, req), fields(owner = %owner, currency = %req.currency))]
    pub async fn create_wallet(
        &self,
        owner: OwnerId,
        req: CreateWalletRequest,
    ) -> Result<Wallet, AppError> {
        ensure_owner(owner)?;
        let currency = parse_currency(&req.currency)?;
        let wallet = Wallet::new(owner, req.name, currency)?;

        let wallet = self.store.create_wallet(&wallet).await?;
        info!(wallet_id = %wallet.id, "Wallet created");
        Ok(wallet)
    }

    #[instrument(skip(self), fields(owner = %owner, wallet_id = %id))]
    pub async fn get_wallet(&self, owner: OwnerId, id: WalletId) -> Result<Wallet, AppError> {
        ensure_owner(owner)?;
        Ok(self.store.get_wallet(id, owner).await?)
    }

    /// Renames a wallet and/or changes its currency.
    ///
    /// A currency change re-denominates the current balance through the
    /// converter under the wallet's row lock. No history record is written.
    #[instrument(skip(self, req), fields(owner = %owner, wallet_id = %id))]
    pub async fn update_wallet(
        &self,
        owner: OwnerId,
        id: WalletId,
        req: UpdateWalletRequest,
    ) -> Result<Wallet, AppError> {
        ensure_owner(owner)?;
        if req.name.is_none() && req.currency.is_none() {
            return Err(AppError::ValidationFailed("Nothing to update".into()));
        }
        let name = req.name.as_deref().map(validate_name).transpose()?;
        let currency = req.currency.as_deref().map(parse_currency).transpose()?;

        let wallet = self
            .within_timeout(run_in_transaction(&self.store, self, move |tx, svc| {
                Box::pin(async move {
                    let current = svc.store.lock_wallet(tx, id, Some(owner)).await?;

                    let balance = match currency {
                        Some(to) if to != current.currency() => {
                            let converted = svc.convert_balance(current.balance, to).await?;
                            Money::new(converted, to)?
                        }
                        _ => current.balance,
                    };
                    let update = WalletUpdate {
                        name: name.unwrap_or_else(|| current.name.clone()),
                        balance,
                    };

                    Ok::<_, AppError>(svc.store.update_wallet(tx, id, owner, &update).await?)
                })
            }))
            .await?;

        info!(currency = %wallet.currency(), balance = wallet.balance.amount(), "Wallet updated");
        Ok(wallet)
    }

    #[instrument(skip(self), fields(owner = %owner, wallet_id = %id))]
    pub async fn delete_wallet(&self, owner: OwnerId, id: WalletId) -> Result<(), AppError> {
        ensure_owner(owner)?;
        self.store.soft_delete_wallet(id, owner).await?;
        info!("Wallet soft-deleted");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Money movement
    // ─────────────────────────────────────────────────────────────────────────────

    #[instrument(skip(self, req), fields(owner = %owner, wallet_id = %req.wallet_id, amount = req.amount))]
    pub async fn deposit(&self, owner: OwnerId, req: DepositRequest) -> Result<Movement, AppError> {
        ensure_owner(owner)?;
        let amount = requested_amount(req.amount, &req.currency)?;
        let label = OperationKind::Deposit.accept_label(req.operation.as_deref())?;
        let wallet_id = req.wallet_id;

        let movement = self
            .within_timeout(run_in_transaction(&self.store, self, move |tx, svc| {
                Box::pin(async move {
                    let wallet = svc.store.lock_wallet(tx, wallet_id, Some(owner)).await?;
                    let conversion = svc.convert_flow(amount, wallet.currency()).await?;
                    let applied = conversion.map_or(amount.amount(), |c| c.amount);

                    let wallet = svc
                        .store
                        .adjust_balance(tx, wallet_id, owner, applied)
                        .await?;
                    let record = Transaction::deposit(wallet_id, owner, amount, conversion)
                        .with_label(label);
                    svc.store.append_history(tx, &record).await?;

                    Ok::<_, AppError>(Movement {
                        transaction: record,
                        wallet,
                    })
                })
            }))
            .await?;

        info!(
            transaction_id = %movement.transaction.id,
            applied = movement.transaction.applied_amount(),
            balance = movement.wallet.balance.amount(),
            "Deposit committed"
        );
        self.publish(&movement.transaction);
        Ok(movement)
    }

    /// Withdraws funds. A balance that would go negative surfaces as
    /// `InsufficientFunds`.
    #[instrument(skip(self, req), fields(owner = %owner, wallet_id = %req.wallet_id, amount = req.amount))]
    pub async fn withdraw(
        &self,
        owner: OwnerId,
        req: WithdrawRequest,
    ) -> Result<Movement, AppError> {
        ensure_owner(owner)?;
        let amount = requested_amount(req.amount, &req.currency)?;
        let label = OperationKind::Withdraw.accept_label(req.operation.as_deref())?;
        let wallet_id = req.wallet_id;

        let movement = self
            .within_timeout(run_in_transaction(&self.store, self, move |tx, svc| {
                Box::pin(async move {
                    let wallet = svc.store.lock_wallet(tx, wallet_id, Some(owner)).await?;
                    let conversion = svc.convert_flow(amount, wallet.currency()).await?;
                    let applied = conversion.map_or(amount.amount(), |c| c.amount);

                    let wallet = svc
                        .store
                        .adjust_balance(tx, wallet_id, owner, -applied)
                        .await?;
                    let record = Transaction::withdrawal(wallet_id, owner, amount, conversion)
                        .with_label(label);
                    svc.store.append_history(tx, &record).await?;

                    Ok::<_, AppError>(Movement {
                        transaction: record,
                        wallet,
                    })
                })
            }))
            .await?;

        info!(
            transaction_id = %movement.transaction.id,
            applied = movement.transaction.applied_amount(),
            balance = movement.wallet.balance.amount(),
            "Withdrawal committed"
        );
        self.publish(&movement.transaction);
        Ok(movement)
    }

    /// Moves funds from one of the caller's wallets to any live wallet.
    ///
    /// Both wallets are locked in ascending id order, so two transfers in
    /// opposite directions between the same pair cannot deadlock. The amount
    /// must be in the source's currency and is debited as is; the target is
    /// credited the converted amount in its currency.
    #[instrument(
        skip(self, req),
        fields(owner = %owner, from = %req.from_wallet_id, to = %req.to_wallet_id, amount = req.amount)
    )]
    pub async fn transfer(
        &self,
        owner: OwnerId,
        req: TransferRequest,
    ) -> Result<Movement, AppError> {
        ensure_owner(owner)?;
        let amount = requested_amount(req.amount, &req.currency)?;
        let label = OperationKind::Transfer.accept_label(req.operation.as_deref())?;
        let (from, to) = (req.from_wallet_id, req.to_wallet_id);
        if from == to {
            return Err(AppError::ValidationFailed(
                "Cannot transfer to the same wallet".into(),
            ));
        }

        let movement = self
            .within_timeout(run_in_transaction(&self.store, self, move |tx, svc| {
                Box::pin(async move {
                    let owner_of = |id: WalletId| (id == from).then_some(owner);
                    let (first, second) = if from < to { (from, to) } else { (to, from) };

                    let first_wallet = svc.store.lock_wallet(tx, first, owner_of(first)).await?;
                    let second_wallet = svc.store.lock_wallet(tx, second, owner_of(second)).await?;
                    let (source, target) = if first == from {
                        (first_wallet, second_wallet)
                    } else {
                        (second_wallet, first_wallet)
                    };

                    if amount.currency() != source.currency() {
                        return Err(AppError::ValidationFailed(format!(
                            "Transfer currency {} does not match source wallet currency {}",
                            amount.currency(),
                            source.currency()
                        )));
                    }
                    let credit = svc.convert_flow(amount, target.currency()).await?;

                    let source = svc
                        .store
                        .adjust_balance(tx, source.id, owner, -amount.amount())
                        .await?;
                    svc.store
                        .adjust_balance(
                            tx,
                            target.id,
                            target.owner,
                            credit.map_or(amount.amount(), |c| c.amount),
                        )
                        .await?;

                    let record = Transaction::transfer(source.id, target.id, owner, amount, credit)
                        .with_label(label);
                    svc.store.append_history(tx, &record).await?;

                    Ok::<_, AppError>(Movement {
                        transaction: record,
                        wallet: source,
                    })
                })
            }))
            .await?;

        info!(
            transaction_id = %movement.transaction.id,
            credited = movement.transaction.applied_amount(),
            balance = movement.wallet.balance.amount(),
            "Transfer committed"
        );
        self.publish(&movement.transaction);
        Ok(movement)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists history of one of the caller's wallets, including incoming transfers.
    #[instrument(skip(self, query), fields(owner = %owner, wallet_id = %id))]
    pub async fn list_transactions(
        &self,
        owner: OwnerId,
        id: WalletId,
        query: HistoryQuery,
    ) -> Result<Vec<Transaction>, AppError> {
        ensure_owner(owner)?;
        let filter = query.into_filter()?;

        // Ownership check; soft-deleted wallets have no visible history.
        self.store.get_wallet(id, owner).await?;

        Ok(self.store.list_transactions(id, &filter).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────────

    async fn within_timeout<T>(
        &self,
        operation: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.config.operation_timeout, operation).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = self.config.operation_timeout.as_millis() as u64,
                    "Operation timed out, transaction rolled back"
                );
                Err(AppError::Timeout)
            }
        }
    }

    /// Converts a requested flow into the currency of the wallet it applies to.
    /// `None` when no conversion is needed.
    async fn convert_flow(&self, amount: Money, to: Currency) -> Result<Option<Conversion>, AppError> {
        if amount.currency() == to {
            return Ok(None);
        }
        let converted = self
            .converter
            .convert(amount.amount(), amount.currency(), to)
            .await?;
        if converted <= 0 {
            return Err(AppError::ValidationFailed(format!(
                "{} is too small to convert to {}",
                amount, to
            )));
        }
        debug!(from = %amount.currency(), to = %to, requested = amount.amount(), converted, "Converted amount");
        Ok(Some(Conversion::from_amounts(amount.amount(), converted)))
    }

    /// Re-denominates a whole balance. A non-zero balance may not round to zero.
    async fn convert_balance(&self, balance: Money, to: Currency) -> Result<i64, AppError> {
        if balance.amount() == 0 {
            return Ok(0);
        }
        let converted = self
            .converter
            .convert(balance.amount(), balance.currency(), to)
            .await?;
        if converted <= 0 {
            return Err(AppError::ValidationFailed(format!(
                "Balance {} is too small to convert to {}",
                balance, to
            )));
        }
        Ok(converted)
    }

    /// Fire-and-forget notification of a committed record.
    fn publish(&self, record: &Transaction) {
        let publisher = Arc::clone(&self.publisher);
        let record = record.clone();
        let timeout = self.config.publish_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(timeout, publisher.publish(&record)).await {
                Ok(Ok(())) => debug!(transaction_id = %record.id, "Transaction published"),
                Ok(Err(e)) => {
                    warn!(transaction_id = %record.id, error = %e, "Failed to publish transaction")
                }
                Err(_) => warn!(transaction_id = %record.id, "Publishing transaction timed out"),
            }
        });
    }
}

fn ensure_owner(owner: OwnerId) -> Result<(), AppError> {
    if owner.is_nil() {
        return Err(AppError::ValidationFailed("Owner is empty".into()));
    }
    Ok(())
}

fn parse_currency(code: &str) -> Result<Currency, AppError> {
    code.parse()
        .map_err(|_| AppError::CurrencyNotAllowed(code.trim().to_string()))
}

fn requested_amount(amount: i64, currency: &str) -> Result<Money, AppError> {
    let currency = parse_currency(currency)?;
    Ok(Money::positive(amount, currency)?)
}
