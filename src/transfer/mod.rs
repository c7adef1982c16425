//! Transfer engine
//!
//! Atomic funds transfers: the coordinator, its transaction boundary, the
//! entry recorder and the lock ordering policy.

pub mod coordinator;
pub mod entry;
pub mod ordering;
pub mod scope;

pub use coordinator::TransferCoordinator;
pub use entry::record_entry;
pub use ordering::{adjustment_order, BalanceAdjustment, Role};
pub use scope::TxScope;
