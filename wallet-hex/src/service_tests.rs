//! WalletService unit tests.

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use wallet_repo::MemoryStore;
    use wallet_repo::memory::MemoryTx;
    use wallet_types::{
        AppError, CreateWalletRequest, Currency, CurrencyConverter, DepositRequest, ExchangeError,
        HistoryFilter, HistoryQuery, LedgerStore, OperationKind, OwnerId, PublishError, RepoError,
        Transaction, TransactionPublisher, TransferRequest, UpdateWalletRequest, Wallet, WalletId,
        WalletUpdate, WithdrawRequest,
    };

    use crate::outbound::{LogPublisher, RateTableConverter};
    use crate::{ServiceConfig, WalletService};

    // ─────────────────────────────────────────────────────────────────────────
    // Test doubles
    // ─────────────────────────────────────────────────────────────────────────

    /// Memory store with switchable failures at each step of a transaction.
    #[derive(Default)]
    pub struct FaultyStore {
        inner: MemoryStore,
        fail_lock: AtomicBool,
        fail_append: AtomicBool,
        fail_commit: AtomicBool,
        /// Adjustments allowed before the next one fails; negative means unlimited
        adjust_budget: AtomicI64,
    }

    impl FaultyStore {
        fn new() -> Self {
            Self {
                adjust_budget: AtomicI64::new(-1),
                ..Default::default()
            }
        }

        fn injected() -> RepoError {
            RepoError::Database("injected failure".into())
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyStore {
        type Tx = MemoryTx;

        async fn begin(&self) -> Result<Self::Tx, RepoError> {
            self.inner.begin().await
        }

        async fn commit(&self, tx: Self::Tx) -> Result<(), RepoError> {
            if self.fail_commit.load(Ordering::SeqCst) {
                drop(tx);
                return Err(RepoError::Transaction("injected commit failure".into()));
            }
            self.inner.commit(tx).await
        }

        async fn rollback(&self, tx: Self::Tx) -> Result<(), RepoError> {
            self.inner.rollback(tx).await
        }

        async fn lock_wallet(
            &self,
            tx: &mut Self::Tx,
            id: WalletId,
            owner: Option<OwnerId>,
        ) -> Result<Wallet, RepoError> {
            if self.fail_lock.load(Ordering::SeqCst) {
                return Err(Self::injected());
            }
            self.inner.lock_wallet(tx, id, owner).await
        }

        async fn adjust_balance(
            &self,
            tx: &mut Self::Tx,
            id: WalletId,
            owner: OwnerId,
            delta: i64,
        ) -> Result<Wallet, RepoError> {
            let budget = self.adjust_budget.load(Ordering::SeqCst);
            if budget == 0 {
                return Err(Self::injected());
            }
            if budget > 0 {
                self.adjust_budget.fetch_sub(1, Ordering::SeqCst);
            }
            self.inner.adjust_balance(tx, id, owner, delta).await
        }

        async fn append_history(
            &self,
            tx: &mut Self::Tx,
            record: &Transaction,
        ) -> Result<(), RepoError> {
            if self.fail_append.load(Ordering::SeqCst) {
                return Err(Self::injected());
            }
            self.inner.append_history(tx, record).await
        }

        async fn update_wallet(
            &self,
            tx: &mut Self::Tx,
            id: WalletId,
            owner: OwnerId,
            update: &WalletUpdate,
        ) -> Result<Wallet, RepoError> {
            self.inner.update_wallet(tx, id, owner, update).await
        }

        async fn get_wallet(&self, id: WalletId, owner: OwnerId) -> Result<Wallet, RepoError> {
            self.inner.get_wallet(id, owner).await
        }

        async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, RepoError> {
            self.inner.create_wallet(wallet).await
        }

        async fn soft_delete_wallet(&self, id: WalletId, owner: OwnerId) -> Result<(), RepoError> {
            self.inner.soft_delete_wallet(id, owner).await
        }

        async fn upsert_owner(&self, owner: OwnerId) -> Result<(), RepoError> {
            self.inner.upsert_owner(owner).await
        }

        async fn list_transactions(
            &self,
            wallet: WalletId,
            filter: &HistoryFilter,
        ) -> Result<Vec<Transaction>, RepoError> {
            self.inner.list_transactions(wallet, filter).await
        }

        async fn sweep_stale_wallets(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError> {
            self.inner.sweep_stale_wallets(cutoff).await
        }
    }

    /// Converter that never answers.
    struct UnavailableConverter;

    #[async_trait]
    impl CurrencyConverter for UnavailableConverter {
        async fn convert(&self, _: i64, _: Currency, _: Currency) -> Result<i64, ExchangeError> {
            Err(ExchangeError::ServiceUnavailable("rates offline".into()))
        }
    }

    /// Converter that takes longer than any test operation timeout.
    struct SlowConverter;

    #[async_trait]
    impl CurrencyConverter for SlowConverter {
        async fn convert(&self, amount: i64, _: Currency, _: Currency) -> Result<i64, ExchangeError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(amount)
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<Transaction>>,
    }

    #[async_trait]
    impl TransactionPublisher for RecordingPublisher {
        async fn publish(&self, record: &Transaction) -> Result<(), PublishError> {
            self.published.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    struct RejectingPublisher;

    #[async_trait]
    impl TransactionPublisher for RejectingPublisher {
        async fn publish(&self, _: &Transaction) -> Result<(), PublishError> {
            Err(PublishError::Rejected(503))
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn service_with<S: LedgerStore>(store: S) -> WalletService<S> {
        WalletService::new(
            store,
            Arc::new(RateTableConverter::default()),
            Arc::new(LogPublisher),
            ServiceConfig::default(),
        )
    }

    fn memory_service() -> WalletService<MemoryStore> {
        service_with(MemoryStore::new())
    }

    async fn registered_owner<S: LedgerStore>(service: &WalletService<S>) -> OwnerId {
        let owner = OwnerId::new();
        service.register_owner(owner).await.unwrap();
        owner
    }

    async fn open_wallet<S: LedgerStore>(
        service: &WalletService<S>,
        owner: OwnerId,
        name: &str,
        currency: &str,
    ) -> Wallet {
        service
            .create_wallet(
                owner,
                CreateWalletRequest {
                    name: name.into(),
                    currency: currency.into(),
                },
            )
            .await
            .unwrap()
    }

    fn deposit_req(wallet_id: WalletId, amount: i64, currency: &str) -> DepositRequest {
        DepositRequest {
            wallet_id,
            amount,
            currency: currency.into(),
            operation: None,
        }
    }

    fn withdraw_req(wallet_id: WalletId, amount: i64, currency: &str) -> WithdrawRequest {
        WithdrawRequest {
            wallet_id,
            amount,
            currency: currency.into(),
            operation: None,
        }
    }

    fn transfer_req(from: WalletId, to: WalletId, amount: i64, currency: &str) -> TransferRequest {
        TransferRequest {
            from_wallet_id: from,
            to_wallet_id: to,
            amount,
            currency: currency.into(),
            operation: None,
        }
    }

    async fn balance<S: LedgerStore>(service: &WalletService<S>, wallet: &Wallet) -> i64 {
        service
            .get_wallet(wallet.owner, wallet.id)
            .await
            .unwrap()
            .balance
            .amount()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Wallets
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_wallet_starts_empty() {
        let service = memory_service();
        let owner = registered_owner(&service).await;

        let wallet = open_wallet(&service, owner, "  Savings ", "chy").await;

        assert_eq!(wallet.name, "Savings");
        assert_eq!(wallet.currency(), Currency::CHY);
        assert_eq!(wallet.balance.amount(), 0);
        assert_eq!(wallet.owner, owner);
    }

    #[tokio::test]
    async fn test_create_wallet_errors() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        open_wallet(&service, owner, "Main", "RUR").await;

        let duplicate = service
            .create_wallet(
                owner,
                CreateWalletRequest {
                    name: "Main".into(),
                    currency: "AED".into(),
                },
            )
            .await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));

        let unknown_currency = service
            .create_wallet(
                owner,
                CreateWalletRequest {
                    name: "Euro".into(),
                    currency: "EUR".into(),
                },
            )
            .await;
        assert!(matches!(unknown_currency, Err(AppError::CurrencyNotAllowed(c)) if c == "EUR"));

        let blank = service
            .create_wallet(
                owner,
                CreateWalletRequest {
                    name: "   ".into(),
                    currency: "RUR".into(),
                },
            )
            .await;
        assert!(matches!(blank, Err(AppError::ValidationFailed(_))));

        let stranger = OwnerId::new();
        let unregistered = service
            .create_wallet(
                stranger,
                CreateWalletRequest {
                    name: "Main".into(),
                    currency: "RUR".into(),
                },
            )
            .await;
        assert!(matches!(unregistered, Err(AppError::OwnerNotFound(o)) if o == stranger));
    }

    #[tokio::test]
    async fn test_nil_owner_rejected_everywhere() {
        let service = memory_service();
        let nil = OwnerId::from_uuid(uuid::Uuid::nil());

        assert!(matches!(
            service.register_owner(nil).await,
            Err(AppError::ValidationFailed(_))
        ));
        assert!(matches!(
            service
                .deposit(nil, deposit_req(WalletId::new(), 10, "RUR"))
                .await,
            Err(AppError::ValidationFailed(_))
        ));
        assert!(matches!(
            service
                .list_transactions(nil, WalletId::new(), HistoryQuery::default())
                .await,
            Err(AppError::ValidationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_wallets_are_private_to_their_owner() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let intruder = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        assert!(matches!(
            service.get_wallet(intruder, wallet.id).await,
            Err(AppError::WalletNotFound(id)) if id == wallet.id
        ));
        assert!(matches!(
            service
                .deposit(intruder, deposit_req(wallet.id, 100, "RUR"))
                .await,
            Err(AppError::WalletNotFound(_))
        ));
        assert!(matches!(
            service.delete_wallet(intruder, wallet.id).await,
            Err(AppError::WalletNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_repeated_reads_are_identical() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "AED").await;
        service
            .deposit(owner, deposit_req(wallet.id, 42, "AED"))
            .await
            .unwrap();

        let first = service.get_wallet(owner, wallet.id).await.unwrap();
        let second = service.get_wallet(owner, wallet.id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_deleted_wallet_is_gone() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        service.delete_wallet(owner, wallet.id).await.unwrap();

        assert!(matches!(
            service.get_wallet(owner, wallet.id).await,
            Err(AppError::WalletNotFound(_))
        ));
        assert!(matches!(
            service.deposit(owner, deposit_req(wallet.id, 10, "RUR")).await,
            Err(AppError::WalletNotFound(_))
        ));
        assert!(matches!(
            service.delete_wallet(owner, wallet.id).await,
            Err(AppError::WalletNotFound(_))
        ));

        // The name is free again.
        open_wallet(&service, owner, "Main", "RUR").await;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Deposits & withdrawals
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_deposit_same_currency() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "INR").await;

        let movement = service
            .deposit(owner, deposit_req(wallet.id, 500, "INR"))
            .await
            .unwrap();

        assert_eq!(movement.wallet.balance.amount(), 500);
        assert_eq!(movement.transaction.operation, OperationKind::Deposit);
        assert_eq!(movement.transaction.converted_amount, None);
        assert_eq!(movement.transaction.exchange_rate, None);
        assert_eq!(movement.transaction.target_wallet_id, None);
        assert_eq!(movement.transaction.owner_id, owner);
        assert_eq!(service.store().history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_cross_currency_deposit_then_overdraw() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Roubles", "RUR").await;

        let movement = service
            .deposit(owner, deposit_req(wallet.id, 1_000, "CHY"))
            .await
            .unwrap();
        assert_eq!(movement.wallet.balance.amount(), 12_000);
        assert_eq!(movement.transaction.amount.amount(), 1_000);
        assert_eq!(movement.transaction.amount.currency(), Currency::CHY);
        assert_eq!(movement.transaction.converted_amount, Some(12_000));
        assert_eq!(movement.transaction.exchange_rate, Some(12.0));

        let overdraw = service
            .withdraw(owner, withdraw_req(wallet.id, 1_001, "CHY"))
            .await;
        assert!(matches!(overdraw, Err(AppError::InsufficientFunds(_))));

        assert_eq!(balance(&service, &wallet).await, 12_000);
        assert_eq!(service.store().history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_withdraw_records_history() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "AED").await;
        service
            .deposit(owner, deposit_req(wallet.id, 1_000, "AED"))
            .await
            .unwrap();

        let movement = service
            .withdraw(owner, withdraw_req(wallet.id, 1_000, "AED"))
            .await
            .unwrap();

        assert_eq!(movement.wallet.balance.amount(), 0);
        assert_eq!(movement.transaction.operation, OperationKind::Withdraw);
        let history = service.store().history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].id, movement.transaction.id);
    }

    #[tokio::test]
    async fn test_invalid_amounts_and_currencies() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        for amount in [0, -5] {
            assert!(matches!(
                service
                    .deposit(owner, deposit_req(wallet.id, amount, "RUR"))
                    .await,
                Err(AppError::ValidationFailed(_))
            ));
            assert!(matches!(
                service
                    .withdraw(owner, withdraw_req(wallet.id, amount, "RUR"))
                    .await,
                Err(AppError::ValidationFailed(_))
            ));
        }

        assert!(matches!(
            service
                .deposit(owner, deposit_req(wallet.id, 100, "USD"))
                .await,
            Err(AppError::CurrencyNotAllowed(_))
        ));
        assert!(service.store().history().await.is_empty());
    }

    #[tokio::test]
    async fn test_conversion_rounding_to_zero_rejected() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Yuan", "CHY").await;

        // 1 kopeck is 1/12 of a fen, which rounds to nothing.
        let result = service
            .deposit(owner, deposit_req(wallet.id, 1, "RUR"))
            .await;

        assert!(matches!(result, Err(AppError::ValidationFailed(_))));
        assert_eq!(balance(&service, &wallet).await, 0);
    }

    #[tokio::test]
    async fn test_subtype_label_is_recorded() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;
        service
            .deposit(owner, deposit_req(wallet.id, 500, "RUR"))
            .await
            .unwrap();

        let movement = service
            .withdraw(
                owner,
                WithdrawRequest {
                    operation: Some("ATM_withdraw".into()),
                    ..withdraw_req(wallet.id, 200, "RUR")
                },
            )
            .await
            .unwrap();
        assert_eq!(movement.transaction.operation, OperationKind::Withdraw);
        assert_eq!(movement.transaction.label, "ATM_withdraw");

        let withdrawals = service
            .list_transactions(
                owner,
                wallet.id,
                HistoryQuery {
                    kind: Some("withdraw".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].label, "ATM_withdraw");
    }

    #[tokio::test]
    async fn test_disallowed_label_rejected_before_any_change() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;
        let other = open_wallet(&service, owner, "Other", "RUR").await;
        service
            .deposit(owner, deposit_req(wallet.id, 500, "RUR"))
            .await
            .unwrap();

        let refund = service
            .deposit(
                owner,
                DepositRequest {
                    operation: Some("refund".into()),
                    ..deposit_req(wallet.id, 100, "RUR")
                },
            )
            .await;
        assert!(matches!(refund, Err(AppError::ValidationFailed(_))));

        // A label of another kind does not fit the endpoint.
        let mismatched = service
            .withdraw(
                owner,
                WithdrawRequest {
                    operation: Some("ATM_deposit".into()),
                    ..withdraw_req(wallet.id, 100, "RUR")
                },
            )
            .await;
        assert!(matches!(mismatched, Err(AppError::ValidationFailed(_))));

        let transfer = service
            .transfer(
                owner,
                TransferRequest {
                    operation: Some("withdraw".into()),
                    ..transfer_req(wallet.id, other.id, 100, "RUR")
                },
            )
            .await;
        assert!(matches!(transfer, Err(AppError::ValidationFailed(_))));

        assert_eq!(balance(&service, &wallet).await, 500);
        assert_eq!(balance(&service, &other).await, 0);
        assert_eq!(service.store().history().await.len(), 1);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transfers
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_transfer_across_currencies() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let dirhams = open_wallet(&service, owner, "Dirhams", "AED").await;
        let roubles = open_wallet(&service, owner, "Roubles", "RUR").await;
        service
            .deposit(owner, deposit_req(dirhams.id, 9_990, "AED"))
            .await
            .unwrap();
        service
            .deposit(owner, deposit_req(roubles.id, 10_000, "RUR"))
            .await
            .unwrap();

        let movement = service
            .transfer(owner, transfer_req(dirhams.id, roubles.id, 10, "AED"))
            .await
            .unwrap();

        assert_eq!(movement.wallet.id, dirhams.id);
        assert_eq!(movement.wallet.balance.amount(), 9_980);
        assert_eq!(balance(&service, &roubles).await, 10_240);

        let record = &movement.transaction;
        assert_eq!(record.operation, OperationKind::Transfer);
        assert_eq!(record.wallet_id, dirhams.id);
        assert_eq!(record.target_wallet_id, Some(roubles.id));
        assert_eq!(record.converted_amount, Some(240));
        assert_eq!(record.exchange_rate, Some(24.0));

        let transfers: Vec<_> = service
            .store()
            .history()
            .await
            .into_iter()
            .filter(|t| t.operation == OperationKind::Transfer)
            .collect();
        assert_eq!(transfers.len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_to_another_owners_wallet() {
        let service = memory_service();
        let alice = registered_owner(&service).await;
        let bob = registered_owner(&service).await;
        let from = open_wallet(&service, alice, "Main", "RUR").await;
        let to = open_wallet(&service, bob, "Main", "RUR").await;
        service
            .deposit(alice, deposit_req(from.id, 300, "RUR"))
            .await
            .unwrap();

        service
            .transfer(alice, transfer_req(from.id, to.id, 100, "RUR"))
            .await
            .unwrap();
        assert_eq!(balance(&service, &to).await, 100);

        // Bob cannot pull money out of Alice's wallet.
        let pull = service
            .transfer(bob, transfer_req(from.id, to.id, 100, "RUR"))
            .await;
        assert!(matches!(pull, Err(AppError::WalletNotFound(id)) if id == from.id));
        assert_eq!(balance(&service, &from).await, 200);

        // Bob sees the incoming transfer in his history.
        let history = service
            .list_transactions(bob, to.id, HistoryQuery::default())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].target_wallet_id, Some(to.id));
    }

    #[tokio::test]
    async fn test_transfer_validation() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;
        service
            .deposit(owner, deposit_req(wallet.id, 100, "RUR"))
            .await
            .unwrap();

        let same = service
            .transfer(owner, transfer_req(wallet.id, wallet.id, 10, "RUR"))
            .await;
        assert!(matches!(same, Err(AppError::ValidationFailed(_))));

        let missing_target = service
            .transfer(owner, transfer_req(wallet.id, WalletId::new(), 10, "RUR"))
            .await;
        assert!(matches!(missing_target, Err(AppError::WalletNotFound(_))));

        let other = open_wallet(&service, owner, "Other", "RUR").await;
        let too_much = service
            .transfer(owner, transfer_req(wallet.id, other.id, 101, "RUR"))
            .await;
        assert!(matches!(too_much, Err(AppError::InsufficientFunds(_))));

        assert_eq!(balance(&service, &wallet).await, 100);
        assert_eq!(balance(&service, &other).await, 0);
        assert_eq!(service.store().history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_in_foreign_currency_rejected() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let roubles = open_wallet(&service, owner, "Roubles", "RUR").await;
        let dirhams = open_wallet(&service, owner, "Dirhams", "AED").await;
        service
            .deposit(owner, deposit_req(roubles.id, 100_000, "RUR"))
            .await
            .unwrap();

        // Neither wallet holds yuan, so no single record could explain both sides.
        let result = service
            .transfer(owner, transfer_req(roubles.id, dirhams.id, 1_000, "CHY"))
            .await;
        assert!(matches!(result, Err(AppError::ValidationFailed(_))));

        // Naming the target's currency is just as wrong.
        let result = service
            .transfer(owner, transfer_req(roubles.id, dirhams.id, 10, "AED"))
            .await;
        assert!(matches!(result, Err(AppError::ValidationFailed(_))));

        assert_eq!(balance(&service, &roubles).await, 100_000);
        assert_eq!(balance(&service, &dirhams).await, 0);
        assert_eq!(service.store().history().await.len(), 1);

        let movement = service
            .transfer(owner, transfer_req(roubles.id, dirhams.id, 12_000, "RUR"))
            .await
            .unwrap();
        assert_eq!(movement.wallet.balance.amount(), 88_000);
        assert_eq!(balance(&service, &dirhams).await, 500);
        assert_eq!(movement.transaction.amount.amount(), 12_000);
        assert_eq!(movement.transaction.converted_amount, Some(500));
    }

    #[tokio::test]
    async fn test_opposite_transfers_do_not_deadlock() {
        let service = Arc::new(memory_service());
        let owner = registered_owner(&*service).await;
        let a = open_wallet(&*service, owner, "A", "RUR").await;
        let b = open_wallet(&*service, owner, "B", "RUR").await;
        for w in [&a, &b] {
            service
                .deposit(owner, deposit_req(w.id, 1_000, "RUR"))
                .await
                .unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..20 {
            let service = Arc::clone(&service);
            let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
            handles.push(tokio::spawn(async move {
                service
                    .transfer(owner, transfer_req(from, to, 10, "RUR"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(balance(&*service, &a).await, 1_000);
        assert_eq!(balance(&*service, &b).await, 1_000);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Atomicity
    // ─────────────────────────────────────────────────────────────────────────

    async fn faulty_setup() -> (WalletService<FaultyStore>, OwnerId, Wallet, Wallet) {
        let service = service_with(FaultyStore::new());
        let owner = registered_owner(&service).await;
        let source = open_wallet(&service, owner, "Source", "RUR").await;
        let target = open_wallet(&service, owner, "Target", "RUR").await;
        service
            .deposit(owner, deposit_req(source.id, 1_000, "RUR"))
            .await
            .unwrap();
        (service, owner, source, target)
    }

    async fn history_len(service: &WalletService<FaultyStore>) -> usize {
        service.store().inner.history().await.len()
    }

    #[tokio::test]
    async fn test_failed_history_append_rolls_back_balance() {
        let (service, owner, source, _) = faulty_setup().await;
        service.store().fail_append.store(true, Ordering::SeqCst);

        let result = service
            .withdraw(owner, withdraw_req(source.id, 400, "RUR"))
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(balance(&service, &source).await, 1_000);
        assert_eq!(history_len(&service).await, 1);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let (service, owner, source, _) = faulty_setup().await;
        service.store().fail_commit.store(true, Ordering::SeqCst);

        let result = service
            .deposit(owner, deposit_req(source.id, 400, "RUR"))
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(balance(&service, &source).await, 1_000);
        assert_eq!(history_len(&service).await, 1);
    }

    #[tokio::test]
    async fn test_failed_credit_rolls_back_debit() {
        let (service, owner, source, target) = faulty_setup().await;
        service.store().adjust_budget.store(1, Ordering::SeqCst);

        let result = service
            .transfer(owner, transfer_req(source.id, target.id, 400, "RUR"))
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(balance(&service, &source).await, 1_000);
        assert_eq!(balance(&service, &target).await, 0);
        assert_eq!(history_len(&service).await, 1);
    }

    #[tokio::test]
    async fn test_failed_lock_leaves_state_untouched() {
        let (service, owner, source, target) = faulty_setup().await;
        service.store().fail_lock.store(true, Ordering::SeqCst);

        let result = service
            .transfer(owner, transfer_req(source.id, target.id, 400, "RUR"))
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));

        service.store().fail_lock.store(false, Ordering::SeqCst);
        service
            .transfer(owner, transfer_req(source.id, target.id, 400, "RUR"))
            .await
            .unwrap();
        assert_eq!(balance(&service, &target).await, 400);
    }

    #[tokio::test]
    async fn test_converter_failure_rolls_back() {
        let store = MemoryStore::new();
        let service = WalletService::new(
            store,
            Arc::new(UnavailableConverter),
            Arc::new(LogPublisher),
            ServiceConfig::default(),
        );
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        let result = service
            .deposit(owner, deposit_req(wallet.id, 100, "AED"))
            .await;

        assert!(matches!(result, Err(AppError::ConversionFailed(_))));
        assert_eq!(balance(&service, &wallet).await, 0);
        assert!(service.store().history().await.is_empty());

        // Same-currency operations never touch the converter.
        service
            .deposit(owner, deposit_req(wallet.id, 100, "RUR"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_operation_timeout_rolls_back() {
        let service = WalletService::new(
            MemoryStore::new(),
            Arc::new(SlowConverter),
            Arc::new(LogPublisher),
            ServiceConfig {
                operation_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        let result = service
            .deposit(owner, deposit_req(wallet.id, 100, "CHY"))
            .await;

        assert!(matches!(result, Err(AppError::Timeout)));
        assert_eq!(balance(&service, &wallet).await, 0);
        assert!(service.store().history().await.is_empty());

        // The abandoned transaction released the store.
        service
            .deposit(owner, deposit_req(wallet.id, 100, "RUR"))
            .await
            .unwrap();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Concurrency
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let service = Arc::new(memory_service());
        let owner = registered_owner(&*service).await;
        let wallet = open_wallet(&*service, owner, "Main", "RUR").await;
        service
            .deposit(owner, deposit_req(wallet.id, 1_000, "RUR"))
            .await
            .unwrap();

        let spawn_withdraw = |amount: i64| {
            let service = Arc::clone(&service);
            let id = wallet.id;
            tokio::spawn(async move { service.withdraw(owner, withdraw_req(id, amount, "RUR")).await })
        };
        let first = spawn_withdraw(600);
        let second = spawn_withdraw(600);
        let results = [first.await.unwrap(), second.await.unwrap()];

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::InsufficientFunds(_))))
            .count();
        assert_eq!((succeeded, rejected), (1, 1));
        assert_eq!(balance(&*service, &wallet).await, 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_withdrawals_drain_exactly() {
        let service = Arc::new(memory_service());
        let owner = registered_owner(&*service).await;
        let wallet = open_wallet(&*service, owner, "Main", "RUR").await;
        service
            .deposit(owner, deposit_req(wallet.id, 1_000, "RUR"))
            .await
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let service = Arc::clone(&service);
                let id = wallet.id;
                tokio::spawn(async move { service.withdraw(owner, withdraw_req(id, 500, "RUR")).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(balance(&*service, &wallet).await, 0);
        assert_eq!(service.store().history().await.len(), 3);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Wallet updates
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_update_currency_converts_balance() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Yuan", "CHY").await;
        service
            .deposit(owner, deposit_req(wallet.id, 1_000, "CHY"))
            .await
            .unwrap();

        let updated = service
            .update_wallet(
                owner,
                wallet.id,
                UpdateWalletRequest {
                    name: Some("Roubles".into()),
                    currency: Some("RUR".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Roubles");
        assert_eq!(updated.currency(), Currency::RUR);
        assert_eq!(updated.balance.amount(), 12_000);
        // Re-denomination is not a money movement.
        assert_eq!(service.store().history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_rename_only_and_empty_patch() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "INR").await;
        open_wallet(&service, owner, "Taken", "INR").await;

        let renamed = service
            .update_wallet(
                owner,
                wallet.id,
                UpdateWalletRequest {
                    name: Some("Travel".into()),
                    currency: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "Travel");
        assert_eq!(renamed.currency(), Currency::INR);

        let empty = service
            .update_wallet(owner, wallet.id, UpdateWalletRequest::default())
            .await;
        assert!(matches!(empty, Err(AppError::ValidationFailed(_))));

        let clash = service
            .update_wallet(
                owner,
                wallet.id,
                UpdateWalletRequest {
                    name: Some("Taken".into()),
                    currency: None,
                },
            )
            .await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));

        let bad_currency = service
            .update_wallet(
                owner,
                wallet.id,
                UpdateWalletRequest {
                    name: None,
                    currency: Some("GBP".into()),
                },
            )
            .await;
        assert!(matches!(bad_currency, Err(AppError::CurrencyNotAllowed(_))));
    }

    #[tokio::test]
    async fn test_update_currency_refuses_to_round_balance_away() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;
        service
            .deposit(owner, deposit_req(wallet.id, 1, "RUR"))
            .await
            .unwrap();

        // 1 kopeck is 1/24 of a fils.
        let result = service
            .update_wallet(
                owner,
                wallet.id,
                UpdateWalletRequest {
                    name: None,
                    currency: Some("AED".into()),
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::ValidationFailed(_))));

        let unchanged = service.get_wallet(owner, wallet.id).await.unwrap();
        assert_eq!(unchanged.currency(), Currency::RUR);
        assert_eq!(unchanged.balance.amount(), 1);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_list_transactions_filters() {
        let service = memory_service();
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;
        for amount in [100, 200, 300] {
            service
                .deposit(owner, deposit_req(wallet.id, amount, "RUR"))
                .await
                .unwrap();
        }
        service
            .withdraw(owner, withdraw_req(wallet.id, 50, "RUR"))
            .await
            .unwrap();

        let all = service
            .list_transactions(owner, wallet.id, HistoryQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);

        let withdrawals = service
            .list_transactions(
                owner,
                wallet.id,
                HistoryQuery {
                    kind: Some("withdraw".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(withdrawals.len(), 1);
        assert_eq!(withdrawals[0].amount.amount(), 50);

        let largest = service
            .list_transactions(
                owner,
                wallet.id,
                HistoryQuery {
                    sort: Some("amount".into()),
                    descending: Some(true),
                    limit: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(largest.len(), 1);
        assert_eq!(largest[0].amount.amount(), 300);

        let bad_limit = service
            .list_transactions(
                owner,
                wallet.id,
                HistoryQuery {
                    limit: Some(0),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(bad_limit, Err(AppError::ValidationFailed(_))));

        let stranger = registered_owner(&service).await;
        assert!(matches!(
            service
                .list_transactions(stranger, wallet.id, HistoryQuery::default())
                .await,
            Err(AppError::WalletNotFound(_))
        ));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────────

    async fn wait_for_publish(publisher: &RecordingPublisher, count: usize) -> Vec<Transaction> {
        for _ in 0..100 {
            {
                let published = publisher.published.lock().unwrap();
                if published.len() >= count {
                    return published.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        publisher.published.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_committed_operations_are_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let service = WalletService::new(
            MemoryStore::new(),
            Arc::new(RateTableConverter::default()),
            publisher.clone(),
            ServiceConfig::default(),
        );
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        let movement = service
            .deposit(owner, deposit_req(wallet.id, 100, "RUR"))
            .await
            .unwrap();
        let failed = service
            .withdraw(owner, withdraw_req(wallet.id, 1_000, "RUR"))
            .await;
        assert!(failed.is_err());

        let published = wait_for_publish(&publisher, 1).await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].id, movement.transaction.id);
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_operation() {
        let service = WalletService::new(
            MemoryStore::new(),
            Arc::new(RateTableConverter::default()),
            Arc::new(RejectingPublisher),
            ServiceConfig::default(),
        );
        let owner = registered_owner(&service).await;
        let wallet = open_wallet(&service, owner, "Main", "RUR").await;

        let movement = service
            .deposit(owner, deposit_req(wallet.id, 100, "RUR"))
            .await
            .unwrap();

        assert_eq!(movement.wallet.balance.amount(), 100);
        assert_eq!(service.store().history().await.len(), 1);
    }
}
