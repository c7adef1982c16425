//! Ledger Store module
//!
//! Persistence for accounts, entries and transfers behind the
//! [`LedgerStore`] / [`LedgerTx`] traits.

mod error;
mod ledger;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use ledger::{LedgerStore, LedgerTx};
pub use memory::{FaultPoint, MemoryLedgerStore, MemoryLedgerTx};
pub use postgres::{PgLedgerStore, PgLedgerTx};
