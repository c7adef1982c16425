//! Ledger store abstraction
//!
//! A `LedgerStore` hands out `LedgerTx` transactions and serves committed
//! point reads. All mutation of balances goes through
//! [`LedgerTx::add_account_balance`], a single read-modify-write on the store
//! side, so concurrent adjustments of one account never overwrite each other.

use async_trait::async_trait;

use crate::domain::{Account, Entry, NewAccount, NewEntry, NewTransfer, Transfer};

use super::StoreError;

/// Transactional context opened by [`LedgerStore::begin`].
///
/// Writes are invisible to other transactions until `commit`. Dropping a
/// transaction without calling `commit` or `rollback` discards its writes.
#[async_trait]
pub trait LedgerTx: Send {
    /// Insert a transfer record
    async fn create_transfer(&mut self, params: &NewTransfer) -> Result<Transfer, StoreError>;

    /// Append an entry row
    async fn create_entry(&mut self, params: &NewEntry) -> Result<Entry, StoreError>;

    /// Add `delta` to the account balance and return the updated row.
    ///
    /// Holds the account's row lock until the transaction ends.
    async fn add_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// Durable storage for accounts, entries and transfers
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Tx: LedgerTx + 'static;

    /// Open a new transaction
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    async fn create_account(&self, params: &NewAccount) -> Result<Account, StoreError>;

    async fn get_account(&self, id: i64) -> Result<Account, StoreError>;

    async fn get_entry(&self, id: i64) -> Result<Entry, StoreError>;

    async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError>;

    /// Entries of one account, oldest first
    async fn list_entries(
        &self,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Entry>, StoreError>;

    /// Transfers leaving `from_account_id` or arriving at `to_account_id`, oldest first
    async fn list_transfers(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError>;
}
