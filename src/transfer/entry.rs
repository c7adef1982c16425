//! Entry Recorder
//!
//! Appends one immutable ledger entry inside the caller's transaction.

use crate::domain::{Entry, NewEntry};
use crate::store::{LedgerTx, StoreError};

/// Record `amount` (negative = debit) against `account_id`.
///
/// Has no commit authority: the entry becomes visible only when the
/// enclosing transaction commits.
pub async fn record_entry<T: LedgerTx>(
    tx: &mut T,
    account_id: i64,
    amount: i64,
) -> Result<Entry, StoreError> {
    let entry = tx.create_entry(&NewEntry { account_id, amount }).await?;

    tracing::debug!(
        entry_id = entry.id,
        account_id = account_id,
        amount = amount,
        "Entry recorded"
    );

    Ok(entry)
}
