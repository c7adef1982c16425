//! Transfer Coordinator
//!
//! Moves money between two accounts as one atomic unit of work: a transfer
//! record, a debit and a credit entry, and both balance adjustments commit
//! together or not at all.

use std::future::Future;

use tracing::{debug, info, warn, Instrument};

use crate::domain::{Amount, NewTransfer, OperationContext, TransferTxParams, TransferTxResult};
use crate::error::{TransferError, TransferOutcome};
use crate::store::{LedgerStore, LedgerTx};

use super::entry::record_entry;
use super::ordering::{adjustment_order, Role};
use super::scope::TxScope;

/// Transfer Coordinator over any [`LedgerStore`]
#[derive(Debug, Clone)]
pub struct TransferCoordinator<S> {
    store: S,
}

impl<S: LedgerStore> TransferCoordinator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Execute one transfer in its own transaction.
    ///
    /// No balance floor is enforced and `from == to` is allowed.
    pub async fn execute_transfer(
        &self,
        params: TransferTxParams,
        context: &OperationContext,
    ) -> TransferOutcome<TransferTxResult> {
        self.execute_transfer_until(params, context, std::future::pending())
            .await
    }

    /// Execute a transfer that aborts when `cancel` completes first.
    ///
    /// `cancel` is only observed until the unit of work is done. A cancelled
    /// transfer is rolled back and nothing it wrote stays visible. Once
    /// commit has started the transfer runs to completion, so `Cancelled`
    /// never hides a committed transfer.
    pub async fn execute_transfer_until<F>(
        &self,
        params: TransferTxParams,
        context: &OperationContext,
        cancel: F,
    ) -> TransferOutcome<TransferTxResult>
    where
        F: Future<Output = ()> + Send,
    {
        let amount = Amount::new(params.amount)?;

        let span = tracing::info_span!(
            "transfer",
            correlation_id = ?context.correlation_id,
            tx_name = context.tx_name.as_deref().unwrap_or_default(),
            from_account_id = params.from_account_id,
            to_account_id = params.to_account_id,
            amount = params.amount,
        );

        self.run(params, amount, cancel).instrument(span).await
    }

    async fn run<F>(
        &self,
        params: TransferTxParams,
        amount: Amount,
        cancel: F,
    ) -> TransferOutcome<TransferTxResult>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(cancel);

        let mut scope = tokio::select! {
            biased;
            _ = &mut cancel => {
                warn!("Transfer cancelled before begin");
                return Err(TransferError::Cancelled);
            }
            scope = TxScope::begin(&self.store) => scope?,
        };

        let outcome = tokio::select! {
            biased;
            _ = &mut cancel => {
                warn!("Transfer cancelled");
                Err(TransferError::Cancelled)
            }
            outcome = apply_transfer(
                &mut *scope,
                params.from_account_id,
                params.to_account_id,
                amount,
            ) => outcome,
        };

        // Not raced against `cancel`: an interrupted commit may already be durable
        let result = scope.finish(outcome).await;

        match &result {
            Ok(result) => info!(transfer_id = result.transfer.id, "Transfer committed"),
            Err(e) => warn!(error = %e, "Transfer rolled back"),
        }
        result
    }
}

/// The transfer's unit of work against an open transaction
async fn apply_transfer<T: LedgerTx>(
    tx: &mut T,
    from_account_id: i64,
    to_account_id: i64,
    amount: Amount,
) -> TransferOutcome<TransferTxResult> {
    let transfer = tx
        .create_transfer(&NewTransfer {
            from_account_id,
            to_account_id,
            amount,
        })
        .await?;
    debug!(transfer_id = transfer.id, "Transfer record created");

    let from_entry = record_entry(tx, from_account_id, amount.debit()).await?;
    let to_entry = record_entry(tx, to_account_id, amount.credit()).await?;

    let [first, second] = adjustment_order(from_account_id, to_account_id, amount);
    let first_account = tx.add_account_balance(first.account_id, first.delta).await?;
    debug!(account_id = first.account_id, balance = first_account.balance, "Balance adjusted");
    let second_account = tx
        .add_account_balance(second.account_id, second.delta)
        .await?;
    debug!(account_id = second.account_id, balance = second_account.balance, "Balance adjusted");

    let (from_account, to_account) = match first.role {
        Role::Source => (first_account, second_account),
        Role::Destination => (second_account, first_account),
    };

    Ok(TransferTxResult {
        transfer,
        from_account,
        to_account,
        from_entry,
        to_entry,
    })
}
