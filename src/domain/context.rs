//! Operation Context
//!
//! Metadata about the current transfer invocation, used for tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for an operation, carried into the transfer's tracing span.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Human-readable name for the transaction (e.g. "tx 3" in load runs)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_name: Option<String>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with a transaction name
    pub fn with_tx_name(mut self, name: impl Into<String>) -> Self {
        self.tx_name = Some(name.into());
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}
