//! PostgreSQL Ledger Store
//!
//! sqlx-backed implementation of [`LedgerStore`]. Balance adjustment is one
//! `UPDATE ... SET balance = balance + $2` statement, which takes the row lock
//! and applies the delta against the latest committed value.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::{Account, Entry, NewAccount, NewEntry, NewTransfer, Transfer};

use super::{LedgerStore, LedgerTx, StoreError};

/// PostgreSQL SQLSTATE: foreign_key_violation
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Ledger store on a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// One open PostgreSQL transaction.
///
/// sqlx rolls the transaction back when it is dropped unfinished.
#[derive(Debug)]
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

/// Map a foreign-key violation on one of our named constraints to the
/// account it references.
fn missing_account(err: sqlx::Error, resolve: impl Fn(&str) -> Option<i64>) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) {
            if let Some(account_id) = db_err.constraint().and_then(|c| resolve(c)) {
                return StoreError::AccountNotFound(account_id);
            }
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn create_transfer(&mut self, params: &NewTransfer) -> Result<Transfer, StoreError> {
        let from_account_id = params.from_account_id;
        let to_account_id = params.to_account_id;

        sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (from_account_id, to_account_id, amount)
            VALUES ($1, $2, $3)
            RETURNING id, from_account_id, to_account_id, amount, created_at
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(params.amount.value())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            missing_account(e, |constraint| match constraint {
                "transfers_from_account_id_fkey" => Some(from_account_id),
                "transfers_to_account_id_fkey" => Some(to_account_id),
                _ => None,
            })
        })
    }

    async fn create_entry(&mut self, params: &NewEntry) -> Result<Entry, StoreError> {
        let account_id = params.account_id;

        sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (account_id, amount)
            VALUES ($1, $2)
            RETURNING id, account_id, amount, created_at
            "#,
        )
        .bind(account_id)
        .bind(params.amount)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            missing_account(e, |constraint| {
                (constraint == "entries_account_id_fkey").then_some(account_id)
            })
        })
    }

    async fn add_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, StoreError> {
        let account: Option<Account> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        account.ok_or(StoreError::AccountNotFound(account_id))
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgLedgerTx { tx })
    }

    async fn create_account(&self, params: &NewAccount) -> Result<Account, StoreError> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (owner, balance, currency)
            VALUES ($1, $2, $3)
            RETURNING id, owner, balance, currency, created_at
            "#,
        )
        .bind(&params.owner)
        .bind(params.balance)
        .bind(&params.currency)
        .fetch_one(&self.pool)
        .await?;

        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        let account: Option<Account> = sqlx::query_as(
            r#"
            SELECT id, owner, balance, currency, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        account.ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, StoreError> {
        let entry: Option<Entry> = sqlx::query_as(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        entry.ok_or(StoreError::RecordNotFound { entity: "Entry", id })
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError> {
        let transfer: Option<Transfer> = sqlx::query_as(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        transfer.ok_or(StoreError::RecordNotFound {
            entity: "Transfer",
            id,
        })
    }

    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, StoreError> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT id, account_id, amount, created_at
            FROM entries
            WHERE account_id = $1
            ORDER BY id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    async fn list_transfers(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError> {
        let transfers = sqlx::query_as::<_, Transfer>(
            r#"
            SELECT id, from_account_id, to_account_id, amount, created_at
            FROM transfers
            WHERE from_account_id = $1 OR to_account_id = $2
            ORDER BY id
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(from_account_id)
        .bind(to_account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(transfers)
    }
}
