//! SQLite ledger store adapter.
//!
//! SQLite has no row locks. `lock_wallet` instead opens the transaction
//! with a no-op write, which takes the database write lock up front. Every
//! money movement therefore serializes on the whole database, and a second
//! writer waits out the busy timeout instead of failing on lock upgrade.
#![allow(clippy::collapsible_if)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;

use wallet_types::{
    HistoryFilter, LedgerStore, OwnerId, RepoError, Transaction, Wallet, WalletId, WalletUpdate,
};

use crate::types::{
    HISTORY_COLUMNS, SqliteHistoryRow, SqliteWalletRow, WALLET_COLUMNS, WriteTarget, db_error,
    map_write_error, sqlite_timestamp, subtype_pattern, tx_error,
};

const MIGRATIONS: &[(&str, &str)] = &[
    ("0001", include_str!("../migrations/0001_create_wallets.sql")),
    (
        "0002",
        include_str!("../migrations/0002_create_transactions_history.sql"),
    ),
];

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects and runs migrations.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                if let Some(parent) = std::path::Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs every migration. Statements are idempotent.
    pub async fn create_schema(&self) -> Result<(), RepoError> {
        for (name, sql) in MIGRATIONS {
            for statement in sql.split(';') {
                let stmt = statement.trim();
                if stmt.is_empty() {
                    continue;
                }
                sqlx::query(stmt).execute(&self.pool).await.map_err(|e| {
                    RepoError::Database(format!("Migration {} failed: {}", name, e))
                })?;
            }
        }
        Ok(())
    }
}

fn now() -> String {
    sqlite_timestamp(Utc::now())
}

// ─────────────────────────────────────────────────────────────────────────────
// LedgerStore implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerStore for SqliteStore {
    type Tx = sqlx::Transaction<'static, Sqlite>;

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
        let id_str = id.to_string();

        sqlx::query(r#"UPDATE wallets SET updated_at = updated_at WHERE id = ? AND deleted = 0"#)
            .bind(&id_str)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;

        let owner_str = owner.map(|o| o.to_string());
        let row: Option<SqliteWalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets \
             WHERE id = ? AND deleted = 0 AND (? IS NULL OR owner_id = ?)"
        ))
        .bind(&id_str)
        .bind(&owner_str)
        .bind(&owner_str)
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
        let row: Option<SqliteWalletRow> = sqlx::query_as(&format!(
            "UPDATE wallets SET balance = balance + ?, updated_at = ? \
             WHERE id = ? AND owner_id = ? AND deleted = 0 \
             RETURNING {WALLET_COLUMNS}"
        ))
        .bind(delta)
        .bind(now())
        .bind(id.to_string())
        .bind(owner.to_string())
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
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.to_string())
        .bind(record.wallet_id.to_string())
        .bind(record.owner_id.to_string())
        .bind(record.target_wallet_id.map(|w| w.to_string()))
        .bind(record.amount.amount())
        .bind(record.amount.currency().to_string())
        .bind(record.converted_amount)
        .bind(record.exchange_rate)
        .bind(&record.label)
        .bind(sqlite_timestamp(record.executed_at))
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
        let row: Option<SqliteWalletRow> = sqlx::query_as(&format!(
            "UPDATE wallets SET name = ?, currency = ?, balance = ?, updated_at = ? \
             WHERE id = ? AND owner_id = ? AND deleted = 0 \
             RETURNING {WALLET_COLUMNS}"
        ))
        .bind(&update.name)
        .bind(update.balance.currency().to_string())
        .bind(update.balance.amount())
        .bind(now())
        .bind(id.to_string())
        .bind(owner.to_string())
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
        let row: Option<SqliteWalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ? AND owner_id = ? AND deleted = 0"
        ))
        .bind(id.to_string())
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.ok_or(RepoError::WalletNotFound(id))?.into_domain()
    }

    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, RepoError> {
        sqlx::query(&format!(
            "INSERT INTO wallets ({WALLET_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(wallet.id.to_string())
        .bind(wallet.owner.to_string())
        .bind(&wallet.name)
        .bind(wallet.currency().to_string())
        .bind(wallet.balance.amount())
        .bind(sqlite_timestamp(wallet.created_at))
        .bind(sqlite_timestamp(wallet.updated_at))
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
            r#"UPDATE wallets SET deleted = 1, updated_at = ? WHERE id = ? AND owner_id = ? AND deleted = 0"#,
        )
        .bind(now())
        .bind(id.to_string())
        .bind(owner.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::WalletNotFound(id));
        }
        Ok(())
    }

    async fn upsert_owner(&self, owner: OwnerId) -> Result<(), RepoError> {
        sqlx::query(r#"INSERT INTO owners (id, created_at) VALUES (?, ?) ON CONFLICT (id) DO NOTHING"#)
            .bind(owner.to_string())
            .bind(now())
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
        let wallet_str = wallet.to_string();
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {HISTORY_COLUMNS} FROM transactions_history WHERE (wallet_id = "
        ));
        query.push_bind(wallet_str.clone());
        query.push(" OR target_wallet_id = ");
        query.push_bind(wallet_str);
        query.push(")");

        if let Some(from) = filter.from {
            query.push(" AND executed_at >= ");
            query.push_bind(sqlite_timestamp(from));
        }
        if let Some(to) = filter.to {
            query.push(" AND executed_at <= ");
            query.push_bind(sqlite_timestamp(to));
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

        let rows: Vec<SqliteHistoryRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.into_iter().map(SqliteHistoryRow::into_domain).collect()
    }

    async fn sweep_stale_wallets(&self, cutoff: DateTime<Utc>) -> Result<u64, RepoError> {
        let result = sqlx::query(
            r#"UPDATE wallets SET deleted = 1, updated_at = ? WHERE deleted = 0 AND updated_at < ?"#,
        )
        .bind(now())
        .bind(sqlite_timestamp(cutoff))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(result.rows_affected())
    }
}
