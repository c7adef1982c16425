//! Lock ordering for balance adjustments
//!
//! Each balance adjustment takes the account's row lock until commit. Two
//! transfers over the same pair in opposite directions (A→B and B→A) would
//! deadlock if each locked its own source first, so both adjustments are
//! applied in ascending account id order regardless of direction.

use crate::domain::Amount;

/// Which side of the transfer an adjustment belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Destination,
}

/// One signed balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub role: Role,
    pub account_id: i64,
    pub delta: i64,
}

/// Both adjustments of a transfer, lowest account id first.
///
/// A self-transfer keeps the source adjustment first.
pub fn adjustment_order(
    from_account_id: i64,
    to_account_id: i64,
    amount: Amount,
) -> [BalanceAdjustment; 2] {
    let debit = BalanceAdjustment {
        role: Role::Source,
        account_id: from_account_id,
        delta: amount.debit(),
    };
    let credit = BalanceAdjustment {
        role: Role::Destination,
        account_id: to_account_id,
        delta: amount.credit(),
    };

    if to_account_id < from_account_id {
        [credit, debit]
    } else {
        [debit, credit]
    }
}
