//! Error handling module
//!
//! Error taxonomy surfaced by the transfer engine. Mapping these onto a
//! protocol (HTTP status codes and the like) is left to the caller.

use crate::domain::AmountError;
use crate::store::StoreError;

/// Result type of the transfer engine
pub type TransferOutcome<T> = Result<T, TransferError>;

/// Transfer engine error types
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Amount failed validation; nothing was opened
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    /// A referenced account does not exist
    #[error("Account not found: {0}")]
    NotFound(i64),

    /// Underlying store failed for reasons unrelated to transfer logic
    #[error("Store failure: {0}")]
    Store(#[source] StoreError),

    /// The unit of work failed and rolling it back failed too
    #[error("tx err: {cause}, rollback err: {rollback}")]
    RollbackFailed {
        cause: Box<TransferError>,
        #[source]
        rollback: StoreError,
    },

    /// Caller's cancellation signal fired before the transfer finished
    #[error("Transfer cancelled")]
    Cancelled,
}

impl From<StoreError> for TransferError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(account_id) => TransferError::NotFound(account_id),
            other => TransferError::Store(other),
        }
    }
}

impl TransferError {
    /// Check if this is a missing-account error
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransferError::NotFound(_))
    }

    /// Check if the caller may re-run the whole transfer.
    ///
    /// A failed transfer leaves no state behind, so retrying is safe; the
    /// engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransferError::Store(e) => e.is_retryable(),
            TransferError::RollbackFailed { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }
}
