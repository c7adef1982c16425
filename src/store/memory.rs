//! In-memory Ledger Store
//!
//! Process-local implementation of [`LedgerStore`] with the same visibility
//! and locking behavior the transfer engine relies on from PostgreSQL:
//!
//! - writes made inside a transaction are staged and only become visible on
//!   commit
//! - `add_account_balance` takes a per-account write lock that is held until
//!   the transaction commits, rolls back or is dropped
//! - ids come from sequences, so a rolled-back insert leaves a gap
//!
//! Faults can be armed at any store operation to exercise rollback paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use crate::domain::{Account, Entry, NewAccount, NewEntry, NewTransfer, Transfer};

use super::{LedgerStore, LedgerTx, StoreError};

/// Store operation at which a fault can be armed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    CreateTransfer,
    CreateEntry,
    AddAccountBalance,
    Commit,
    Rollback,
}

#[derive(Debug)]
struct Fault {
    point: FaultPoint,
    /// Hits to let through before failing
    skip: usize,
}

#[derive(Debug)]
struct AccountRow {
    account: Account,
    lock: Arc<tokio::sync::Mutex<()>>,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: BTreeMap<i64, AccountRow>,
    entries: BTreeMap<i64, Entry>,
    transfers: BTreeMap<i64, Transfer>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: Mutex<Tables>,
    faults: Mutex<Vec<Fault>>,
    account_seq: AtomicI64,
    entry_seq: AtomicI64,
    transfer_seq: AtomicI64,
}

impl Inner {
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_fault(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(idx) = faults.iter().position(|f| f.point == point) else {
            return Ok(());
        };

        if faults[idx].skip > 0 {
            faults[idx].skip -= 1;
            return Ok(());
        }

        faults.remove(idx);
        tracing::debug!(?point, "Injected store fault");
        Err(StoreError::Unavailable(format!("injected fault at {:?}", point)))
    }

    fn require_account(&self, account_id: i64) -> Result<(), StoreError> {
        if self.tables().accounts.contains_key(&account_id) {
            Ok(())
        } else {
            Err(StoreError::AccountNotFound(account_id))
        }
    }
}

/// In-memory ledger store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next time `point` is reached
    pub fn fail_at(&self, point: FaultPoint) {
        self.fail_after(point, 0);
    }

    /// Let `skip` hits of `point` through, then fail the following one
    pub fn fail_after(&self, point: FaultPoint, skip: usize) {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Fault { point, skip });
    }

    /// Total committed entries across all accounts
    pub fn entry_count(&self) -> usize {
        self.inner.tables().entries.len()
    }

    /// Total committed transfers
    pub fn transfer_count(&self) -> usize {
        self.inner.tables().transfers.len()
    }
}

/// Open in-memory transaction.
///
/// Dropping it releases every row lock it holds and discards staged writes.
#[derive(Debug)]
pub struct MemoryLedgerTx {
    inner: Arc<Inner>,
    locks: HashMap<i64, OwnedMutexGuard<()>>,
    deltas: BTreeMap<i64, i64>,
    entries: Vec<Entry>,
    transfers: Vec<Transfer>,
}

impl MemoryLedgerTx {
    async fn lock_row(&mut self, account_id: i64) -> Result<(), StoreError> {
        if self.locks.contains_key(&account_id) {
            return Ok(());
        }

        let lock = self
            .inner
            .tables()
            .accounts
            .get(&account_id)
            .map(|row| Arc::clone(&row.lock))
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let guard = lock.lock_owned().await;
        self.locks.insert(account_id, guard);
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn create_transfer(&mut self, params: &NewTransfer) -> Result<Transfer, StoreError> {
        self.inner.check_fault(FaultPoint::CreateTransfer)?;
        self.inner.require_account(params.from_account_id)?;
        self.inner.require_account(params.to_account_id)?;

        let transfer = Transfer {
            id: self.inner.transfer_seq.fetch_add(1, Ordering::SeqCst) + 1,
            from_account_id: params.from_account_id,
            to_account_id: params.to_account_id,
            amount: params.amount.value(),
            created_at: Utc::now(),
        };
        self.transfers.push(transfer.clone());

        Ok(transfer)
    }

    async fn create_entry(&mut self, params: &NewEntry) -> Result<Entry, StoreError> {
        self.inner.check_fault(FaultPoint::CreateEntry)?;
        self.inner.require_account(params.account_id)?;

        let entry = Entry {
            id: self.inner.entry_seq.fetch_add(1, Ordering::SeqCst) + 1,
            account_id: params.account_id,
            amount: params.amount,
            created_at: Utc::now(),
        };
        self.entries.push(entry.clone());

        Ok(entry)
    }

    async fn add_account_balance(
        &mut self,
        account_id: i64,
        delta: i64,
    ) -> Result<Account, StoreError> {
        self.inner.check_fault(FaultPoint::AddAccountBalance)?;
        self.lock_row(account_id).await?;

        // The row lock is ours, so the committed balance cannot move under us.
        let mut account = self
            .inner
            .tables()
            .accounts
            .get(&account_id)
            .map(|row| row.account.clone())
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let staged = self.deltas.entry(account_id).or_insert(0);
        let pending = staged
            .checked_add(delta)
            .ok_or_else(|| StoreError::Unavailable("balance delta out of range".to_string()))?;
        account.balance = account
            .balance
            .checked_add(pending)
            .ok_or_else(|| StoreError::Unavailable("balance out of range".to_string()))?;
        *staged = pending;

        Ok(account)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.inner.check_fault(FaultPoint::Commit)?;

        let MemoryLedgerTx {
            inner,
            locks,
            deltas,
            entries,
            transfers,
        } = self;

        {
            let mut tables = inner.tables();
            for (account_id, delta) in deltas {
                if let Some(row) = tables.accounts.get_mut(&account_id) {
                    row.account.balance += delta;
                }
            }
            tables
                .entries
                .extend(entries.into_iter().map(|e| (e.id, e)));
            tables
                .transfers
                .extend(transfers.into_iter().map(|t| (t.id, t)));
        }

        // Row locks are released only after the new balances are visible.
        drop(locks);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.inner.check_fault(FaultPoint::Rollback)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.inner.check_fault(FaultPoint::Begin)?;

        Ok(MemoryLedgerTx {
            inner: Arc::clone(&self.inner),
            locks: HashMap::new(),
            deltas: BTreeMap::new(),
            entries: Vec::new(),
            transfers: Vec::new(),
        })
    }

    async fn create_account(&self, params: &NewAccount) -> Result<Account, StoreError> {
        let account = Account {
            id: self.inner.account_seq.fetch_add(1, Ordering::SeqCst) + 1,
            owner: params.owner.clone(),
            balance: params.balance,
            currency: params.currency.clone(),
            created_at: Utc::now(),
        };

        self.inner.tables().accounts.insert(
            account.id,
            AccountRow {
                account: account.clone(),
                lock: Arc::new(tokio::sync::Mutex::new(())),
            },
        );

        Ok(account)
    }

    async fn get_account(&self, id: i64) -> Result<Account, StoreError> {
        self.inner
            .tables()
            .accounts
            .get(&id)
            .map(|row| row.account.clone())
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn get_entry(&self, id: i64) -> Result<Entry, StoreError> {
        self.inner
            .tables()
            .entries
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound { entity: "Entry", id })
    }

    async fn get_transfer(&self, id: i64) -> Result<Transfer, StoreError> {
        self.inner
            .tables()
            .transfers
            .get(&id)
            .cloned()
            .ok_or(StoreError::RecordNotFound {
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
        Ok(self
            .inner
            .tables()
            .entries
            .values()
            .filter(|e| e.account_id == account_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn list_transfers(
        &self,
        from_account_id: i64,
        to_account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transfer>, StoreError> {
        Ok(self
            .inner
            .tables()
            .transfers
            .values()
            .filter(|t| t.from_account_id == from_account_id || t.to_account_id == to_account_id)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Amount;
    use std::time::Duration;

    async fn account(store: &MemoryLedgerStore, balance: i64) -> Account {
        store
            .create_account(&NewAccount::new("owner", balance, "USD"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemoryLedgerStore::new();
        let a = account(&store, 100).await;

        let mut tx = store.begin().await.unwrap();
        let entry = tx
            .create_entry(&NewEntry {
                account_id: a.id,
                amount: -10,
            })
            .await
            .unwrap();
        let updated = tx.add_account_balance(a.id, -10).await.unwrap();
        assert_eq!(updated.balance, 90);

        assert_eq!(store.get_account(a.id).await.unwrap().balance, 100);
        assert!(store.get_entry(entry.id).await.is_err());

        tx.commit().await.unwrap();

        assert_eq!(store.get_account(a.id).await.unwrap().balance, 90);
        assert_eq!(store.get_entry(entry.id).await.unwrap().amount, -10);
    }

    #[tokio::test]
    async fn test_dropped_tx_discards_writes_and_releases_lock() {
        let store = MemoryLedgerStore::new();
        let a = account(&store, 100).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.add_account_balance(a.id, 500).await.unwrap();
            tx.create_transfer(&NewTransfer {
                from_account_id: a.id,
                to_account_id: a.id,
                amount: Amount::new(1).unwrap(),
            })
            .await
            .unwrap();
        }

        assert_eq!(store.get_account(a.id).await.unwrap().balance, 100);
        assert_eq!(store.transfer_count(), 0);

        let mut tx = store.begin().await.unwrap();
        let locked = tokio::time::timeout(Duration::from_secs(1), tx.add_account_balance(a.id, 1))
            .await
            .expect("row lock was not released");
        assert_eq!(locked.unwrap().balance, 101);
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_writer_until_commit() {
        let store = MemoryLedgerStore::new();
        let a = account(&store, 100).await;

        let mut first = store.begin().await.unwrap();
        first.add_account_balance(a.id, -30).await.unwrap();

        let second_store = store.clone();
        let account_id = a.id;
        let second = tokio::spawn(async move {
            let mut tx = second_store.begin().await.unwrap();
            let account = tx.add_account_balance(account_id, -20).await.unwrap();
            tx.commit().await.unwrap();
            account.balance
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();

        // The second writer must see the first writer's committed delta.
        assert_eq!(second.await.unwrap(), 50);
        assert_eq!(store.get_account(a.id).await.unwrap().balance, 50);
    }

    #[tokio::test]
    async fn test_missing_account_rejected() {
        let store = MemoryLedgerStore::new();
        let a = account(&store, 100).await;
        let mut tx = store.begin().await.unwrap();

        let err = tx
            .create_entry(&NewEntry {
                account_id: 999,
                amount: 5,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(999)));

        let err = tx
            .create_transfer(&NewTransfer {
                from_account_id: a.id,
                to_account_id: 998,
                amount: Amount::new(5).unwrap(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(998)));

        let err = tx.add_account_balance(997, 5).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(997)));
    }

    #[tokio::test]
    async fn test_fault_fires_once_after_skips() {
        let store = MemoryLedgerStore::new();
        let a = account(&store, 0).await;
        store.fail_after(FaultPoint::CreateEntry, 1);

        let mut tx = store.begin().await.unwrap();
        let entry = NewEntry {
            account_id: a.id,
            amount: 1,
        };
        assert!(tx.create_entry(&entry).await.is_ok());
        assert!(matches!(
            tx.create_entry(&entry).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(tx.create_entry(&entry).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_entries_paginates() {
        let store = MemoryLedgerStore::new();
        let a = account(&store, 0).await;
        let b = account(&store, 0).await;

        let mut tx = store.begin().await.unwrap();
        for i in 1..=10 {
            tx.create_entry(&NewEntry {
                account_id: a.id,
                amount: i,
            })
            .await
            .unwrap();
        }
        tx.create_entry(&NewEntry {
            account_id: b.id,
            amount: 1,
        })
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let page = store.list_entries(a.id, 5, 5).await.unwrap();
        assert_eq!(page.len(), 5);
        assert!(page.iter().all(|e| e.account_id == a.id));
        assert_eq!(page[0].amount, 6);
    }
}
