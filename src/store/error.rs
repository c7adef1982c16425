//! Ledger Store Errors

/// PostgreSQL SQLSTATE: serialization_failure
const SERIALIZATION_FAILURE: &str = "40001";

/// PostgreSQL SQLSTATE: deadlock_detected
const DEADLOCK_DETECTED: &str = "40P01";

/// Errors raised by a ledger store or one of its transactions
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced account does not exist
    #[error("Account not found: {0}")]
    AccountNotFound(i64),

    /// Point read on an entry or transfer found nothing
    #[error("{entity} not found: {id}")]
    RecordNotFound { entity: &'static str, id: i64 },

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store could not serve the request (non-SQL backends)
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if this error means a referenced account is missing
    pub fn is_account_not_found(&self) -> bool {
        matches!(self, StoreError::AccountNotFound(_))
    }

    /// Check if re-running the whole transaction may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db_err)) => matches!(
                db_err.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
            ),
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}
