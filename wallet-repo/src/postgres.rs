//! PostgreSQL ledger store adapter with row-level locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use wallet_types::{
    HistoryFilter, LedgerStore, OwnerId, RepoError, Transaction, Wallet, WalletId, WalletUpdate,
};

use crate::types::{
    HISTORY_COLUMNS, PgHistoryRow, PgWalletRow, WALLET_COLUMNS, WriteTarget, db_error,
    map_write_error, subtype_pattern, tx_error,
};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_wallets_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_transactions_history_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresStore {
    /// Connects and runs migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LedgerStore implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for PostgresStore {
    type Tx = sqlx::Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx, RepoError> {
        self.pool.begin().await.map_err(tx_error)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<(), RepoError> {
        tx.commit().await.map_err(tx_error)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<(), RepoError> {
        tx.rollback().await.map_err(tx_error)
    }

    async fn lock_wallet(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: Option<OwnerId>,
    ) -> Result<Wallet, RepoError> {
        let row: Option<PgWalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets \
             WHERE id = $1 AND deleted = FALSE AND ($2::uuid IS NULL OR owner_id = $2) \
             FOR UPDATE"
        ))
        .bind(id.into_uuid())
        .bind(owner.map(OwnerId::into_uuid))
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;

        row.ok_or(RepoError::WalletNotFound(id))?.into_domain()
    }

    async fn adjust_balance(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: OwnerId,
        delta: i64,
    ) -> Result<Wallet, RepoError> {
        let row: Option<PgWalletRow> = sqlx::query_as(&format!(
            "UPDATE wallets SET balance = balance + $1, updated_at = NOW() \
             WHERE id = $2 AND owner_id = $3 AND deleted = FALSE \
             RETURNING {WALLET_COLUMNS}"
        ))
        .bind(delta)
        .bind(id.into_uuid())
        .bind(owner.into_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            map_write_error(
                e,
                &WriteTarget {
                    wallet: id,
                    owner,
                    name: "",
                },
            )
        })?;

        row.ok_or(RepoError::WalletNotFound(id))?.into_domain()
    }

    async fn append_history(
        &self,
        tx: &mut Self::Tx,
        record: &Transaction,
    ) -> Result<(), RepoError> {
        sqlx::query(&format!(
            "INSERT INTO transactions_history ({HISTORY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(record.id.into_uuid())
        .bind(record.wallet_id.into_uuid())
        .bind(record.owner_id.into_uuid())
        .bind(record.target_wallet_id.map(WalletId::into_uuid))
        .bind(record.amount.amount())
        .bind(record.amount.currency().to_string())
        .bind(record.converted_amount)
        .bind(record.exchange_rate)
        .bind(&record.label)
        .bind(record.executed_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn update_wallet(
        &self,
        tx: &mut Self::Tx,
        id: WalletId,
        owner: OwnerId,
        update: &WalletUpdate,
    ) -> Result<Wallet, RepoError> {
        let row: Option<PgWalletRow> = sqlx::query_as(&format!(
            "UPDATE wallets SET name = $1, currency = $2, balance = $3, updated_at = NOW() \
             WHERE id = $4 AND owner_id = $5 AND deleted = FALSE \
             RETURNING {WALLET_COLUMNS}"
        ))
        .bind(&update.name)
        .bind(update.balance.currency().to_string())
        .bind(update.balance.amount())
        .bind(id.into_uuid())
        .bind(owner.into_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| {
            map_write_error(
                e,
                &WriteTarget {
                    wallet: id,
                    owner,
                    name: &update.name,
                },
            )
        })?;

        row.ok_or(RepoError::WalletNotFound(id))?.into_domain()
    }

    async fn get_wallet(&self, id: WalletId, owner: OwnerId) -> Result<Wallet, RepoError> {
        let row: Option<PgWalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets \
             WHERE id = $1 AND owner_id = $2 AND deleted = FALSE"
        ))
        .bind(id.into_uuid())
        .bind(owner.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.ok_or(RepoError::WalletNotFound(id))?.into_domain()
    }

    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, RepoError> {
        sqlx::query(&format!(
            "INSERT INTO wallets ({WALLET_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(wallet.id.into_uuid())
        .bind(wallet.owner.into_uuid())
        .bind(&wallet.name)
        .bind(wallet.currency().to_string())
        .bind(wallet.balance.amount())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .bind(wallet.deleted)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            map_write_error(
                e,
                &WriteTarget {
                    wallet: wallet.id,
                    owner: wallet.owner,
                    name: &wallet.name,
                },
            )
        })?;

        Ok(wallet.clone())
    }

    async fn soft_delete_wallet(&self, id: WalletId, owner: OwnerId) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"UPDATE wallets SET deleted = TRUE, updated_at = NOW()
               WHERE id = $1 AND owner_id = $2 AND deleted = FALSE"#,
        )
        .bind(id.into_uuid())
        .bind(owner.into_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::WalletNotFound(id));
        }
        Ok(())
    }

    async fn upsert_owner(&self, owner: OwnerId) -> Result<(), RepoError> {
        sqlx::query(r#"INSERT INTO owners (id) VALUES ($1) ON CONFLICT (id) DO NOTHING"#)
            .bind(owner.into_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn list_transactions(
        &self,
        wallet: WalletId,
        filter: &HistoryFilter,
    ) -> Result<Vec<Transaction>, RepoError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {HISTORY_COLUMNS} FROM transactions_history WHERE (wallet_id = "
        ));
        query.push_bind(wallet.into_uuid());
        query.push(" OR target_wallet_id = ");
        query.push_bind(wallet.into_uuid());
        query.push(")");

        if let Some(from) = filter.from {
            query.push(" AND executed_at >= ");
            query.push_bind(from);
        }
        if let Some(to) = filter.to {
            query.push(" AND executed_at <= ");
            query.push_bind(to);
        }
        if let Some(kind) = filter.kind {
            query.push(" AND (LOWER(transaction_type) = ");
            query.push_bind(kind.label());
            query.push(" OR LOWER(transaction_type) LIKE ");
            query.push_bind(subtype_pattern(kind));
            query.push(" ESCAPE '\\')");
        }

        let direction = if filter.descending { "DESC" } else { "ASC" };
        query.push(format!(
            " ORDER BY {} {direction}, id {direction} LIMIT ",
            filter.sort.column()
        ));
        query.push_bind(i64::from(filter.limit));
        query.push(" OFFSET ");
        query.push_bind(i64::from(filter.offset));

        let rows: Vec<PgHistoryRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(PgHistoryRow::into_domain).collect()
    }

    async fn sweep_stale_wallets(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"UPDATE wallets SET deleted = TRUE, updated_at = NOW()
               WHERE deleted = FALSE AND updated_at < $1"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
