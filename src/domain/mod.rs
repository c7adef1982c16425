//! Domain module
//!
//! Core domain types: ledger records, validated amounts, operation context.

pub mod amount;
pub mod context;
pub mod models;

pub use amount::{Amount, AmountError};
pub use context::OperationContext;
pub use models::{
    Account, Entry, NewAccount, NewEntry, NewTransfer, Transfer, TransferTxParams,
    TransferTxResult,
};
