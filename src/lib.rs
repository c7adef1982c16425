//! simple_bank Library
//!
//! The funds-transfer core of a banking backend: accounts, an append-only
//! entry ledger and transfers, moved atomically over a transactional store.

pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod store;
pub mod telemetry;
pub mod transfer;

pub use config::Config;
pub use domain::{Account, Amount, AmountError, Entry, OperationContext, Transfer};
pub use domain::{TransferTxParams, TransferTxResult};
pub use error::{TransferError, TransferOutcome};
pub use store::{LedgerStore, LedgerTx, MemoryLedgerStore, PgLedgerStore, StoreError};
pub use transfer::TransferCoordinator;
