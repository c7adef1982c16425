//! Transaction Boundary
//!
//! `TxScope` owns one open [`LedgerTx`] for the lifetime of a unit of work.
//! It is released exactly once: committed when the work succeeds, rolled back
//! when it fails. A scope that is dropped instead (panic, cancelled future)
//! drops its transaction, which discards every uncommitted write.

use std::ops::{Deref, DerefMut};

use crate::error::{TransferError, TransferOutcome};
use crate::store::{LedgerStore, LedgerTx, StoreError};

/// One open transaction, released by `commit`, `rollback` or `finish`
pub struct TxScope<T: LedgerTx> {
    tx: Option<T>,
}

impl<T: LedgerTx> TxScope<T> {
    /// Open a transaction on `store`
    pub async fn begin<S>(store: &S) -> Result<Self, StoreError>
    where
        S: LedgerStore<Tx = T> + ?Sized,
    {
        let tx = store.begin().await?;
        Ok(Self { tx: Some(tx) })
    }

    fn take(&mut self) -> T {
        self.tx
            .take()
            .expect("transaction scope released more than once")
    }

    pub async fn commit(mut self) -> Result<(), StoreError> {
        self.take().commit().await
    }

    /// Roll back after `cause`, returning the error to propagate.
    ///
    /// A failing rollback never masks `cause`: both come back together.
    pub async fn rollback(mut self, cause: TransferError) -> TransferError {
        match self.take().rollback().await {
            Ok(()) => cause,
            Err(rollback) => {
                tracing::error!(
                    cause = %cause,
                    rollback = %rollback,
                    "Rollback failed"
                );
                TransferError::RollbackFailed {
                    cause: Box::new(cause),
                    rollback,
                }
            }
        }
    }

    /// Commit on `Ok`, roll back on `Err`
    pub async fn finish<R>(self, outcome: TransferOutcome<R>) -> TransferOutcome<R> {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(cause) => Err(self.rollback(cause).await),
        }
    }
}

impl<T: LedgerTx> Deref for TxScope<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.tx
            .as_ref()
            .expect("transaction scope used after release")
    }
}

impl<T: LedgerTx> DerefMut for TxScope<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.tx
            .as_mut()
            .expect("transaction scope used after release")
    }
}

impl<T: LedgerTx> Drop for TxScope<T> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!("Transaction scope dropped before release, discarding uncommitted writes");
        }
    }
}
