//! Common test utilities
//!
//! Fixtures plus the transfer properties every `LedgerStore` must uphold,
//! written once and run against each store implementation.

#![allow(dead_code)]

use std::collections::HashSet;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use simple_bank::domain::NewAccount;
use simple_bank::{
    db, Account, LedgerStore, OperationContext, TransferCoordinator, TransferError,
    TransferTxParams, TransferTxResult,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::task::JoinSet;

/// Upper bound for concurrent runs; hitting it means transfers deadlocked
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect to DATABASE_URL and bring the schema up to date.
///
/// Tests create their own random accounts instead of truncating, so they can
/// run in parallel against one database.
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

pub fn random_owner() -> String {
    let suffix: u64 = rand::thread_rng().gen();
    format!("owner_{suffix:x}")
}

pub fn random_money() -> i64 {
    rand::thread_rng().gen_range(0..=1000)
}

pub fn random_currency() -> &'static str {
    ["USD", "EUR", "CAD"]
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap()
}

pub async fn create_account<S: LedgerStore>(store: &S, balance: i64) -> Account {
    let params = NewAccount::new(random_owner(), balance, random_currency());
    let account = store.create_account(&params).await.unwrap();

    assert_eq!(account.owner, params.owner);
    assert_eq!(account.balance, params.balance);
    assert_eq!(account.currency, params.currency);
    assert!(account.id > 0);

    account
}

pub async fn create_random_account<S: LedgerStore>(store: &S) -> Account {
    create_account(store, random_money()).await
}

/// Result and stored rows agree, and the two entries offset each other
pub async fn assert_transfer_linked<S: LedgerStore>(
    store: &S,
    result: &TransferTxResult,
    from: &Account,
    to: &Account,
    amount: i64,
) {
    let transfer = &result.transfer;
    assert!(transfer.id > 0);
    assert_eq!(transfer.from_account_id, from.id);
    assert_eq!(transfer.to_account_id, to.id);
    assert_eq!(transfer.amount, amount);
    assert_eq!(&store.get_transfer(transfer.id).await.unwrap(), transfer);

    let from_entry = store.get_entry(result.from_entry.id).await.unwrap();
    assert_eq!(from_entry.account_id, from.id);
    assert_eq!(from_entry.amount, -amount);

    let to_entry = store.get_entry(result.to_entry.id).await.unwrap();
    assert_eq!(to_entry.account_id, to.id);
    assert_eq!(to_entry.amount, amount);

    assert_eq!(from_entry.amount + to_entry.amount, 0);
    assert_eq!(result.from_account.id, from.id);
    assert_eq!(result.to_account.id, to.id);
}

/// Sum of all committed entry amounts of an account
pub async fn entry_sum<S: LedgerStore>(store: &S, account_id: i64) -> i64 {
    store
        .list_entries(account_id, i64::MAX, 0)
        .await
        .unwrap()
        .iter()
        .map(|e| e.amount)
        .sum()
}

/// Transfer 10 from A (100) to B (50)
pub async fn check_simple_transfer<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let a = create_account(&store, 100).await;
    let b = create_account(&store, 50).await;
    let coordinator = TransferCoordinator::new(store.clone());

    let result = coordinator
        .execute_transfer(TransferTxParams::new(a.id, b.id, 10), &OperationContext::new())
        .await
        .unwrap();

    assert_transfer_linked(&store, &result, &a, &b, 10).await;
    assert_eq!(store.get_account(a.id).await.unwrap().balance, 90);
    assert_eq!(store.get_account(b.id).await.unwrap().balance, 60);
    assert_eq!(store.list_transfers(a.id, b.id, 10, 0).await.unwrap().len(), 1);
    assert_eq!(store.list_entries(a.id, 10, 0).await.unwrap().len(), 1);
    assert_eq!(store.list_entries(b.id, 10, 0).await.unwrap().len(), 1);
}

/// Missing destination fails with NotFound and persists nothing
pub async fn check_missing_destination<S>(store: S)
where
    S: LedgerStore + Clone + 'static,
{
    let a = create_account(&store, 100).await;
    let missing = i64::MAX;
    let coordinator = TransferCoordinator::new(store.clone());

    let err = coordinator
        .execute_transfer(TransferTxParams::new(a.id, missing, 10), &OperationContext::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::NotFound(id) if id == missing), "{err:?}");
    assert_eq!(store.get_account(a.id).await.unwrap().balance, 100);
    assert!(store.list_entries(a.id, 10, 0).await.unwrap().is_empty());
    assert!(store.list_transfers(a.id, a.id, 10, 0).await.unwrap().is_empty());
}

/// `n` concurrent transfers of `amount` from A to B.
///
/// Every transfer must observe a distinct cumulative delta (1·amount,
/// 2·amount, ..., n·amount) and the final balances move by exactly n·amount.
pub async fn check_concurrent_transfers<S>(store: S, n: usize, amount: i64)
where
    S: LedgerStore + Clone + 'static,
{
    let account_one = create_random_account(&store).await;
    let account_two = create_random_account(&store).await;
    let coordinator = TransferCoordinator::new(store.clone());

    let mut tasks = JoinSet::new();
    for i in 0..n {
        let coordinator = coordinator.clone();
        let params = TransferTxParams::new(account_one.id, account_two.id, amount);
        let context = OperationContext::new().with_tx_name(format!("tx {}", i + 1));
        tasks.spawn(async move { coordinator.execute_transfer(params, &context).await });
    }

    let mut seen = HashSet::new();
    let collect = async {
        while let Some(joined) = tasks.join_next().await {
            let result = joined.expect("transfer task panicked").expect("transfer failed");
            assert_transfer_linked(&store, &result, &account_one, &account_two, amount).await;

            let diff_one = account_one.balance - result.from_account.balance;
            let diff_two = result.to_account.balance - account_two.balance;
            assert_eq!(diff_one, diff_two);
            assert!(diff_one > 0);
            assert_eq!(diff_one % amount, 0);

            let k = diff_one / amount;
            assert!(k >= 1 && k <= n as i64, "k = {k}");
            assert!(seen.insert(k), "two transfers observed the same delta {k}");
        }
    };
    tokio::time::timeout(STALL_TIMEOUT, collect)
        .await
        .expect("concurrent transfers stalled");

    let updated_one = store.get_account(account_one.id).await.unwrap();
    let updated_two = store.get_account(account_two.id).await.unwrap();
    let total = n as i64 * amount;
    assert_eq!(updated_one.balance, account_one.balance - total);
    assert_eq!(updated_two.balance, account_two.balance + total);
    assert_eq!(entry_sum(&store, account_one.id).await, -total);
    assert_eq!(entry_sum(&store, account_two.id).await, total);
}

/// `n` concurrent transfers alternating A→B and B→A must all complete
pub async fn check_reversed_transfers_complete<S>(store: S, n: usize, amount: i64)
where
    S: LedgerStore + Clone + 'static,
{
    let account_one = create_random_account(&store).await;
    let account_two = create_random_account(&store).await;
    let coordinator = TransferCoordinator::new(store.clone());

    let mut tasks = JoinSet::new();
    for i in 0..n {
        let coordinator = coordinator.clone();
        let (from, to) = if i % 2 == 0 {
            (account_one.id, account_two.id)
        } else {
            (account_two.id, account_one.id)
        };
        let params = TransferTxParams::new(from, to, amount);
        tasks.spawn(async move {
            coordinator
                .execute_transfer(params, &OperationContext::new())
                .await
        });
    }

    let collect = async {
        while let Some(joined) = tasks.join_next().await {
            joined.expect("transfer task panicked").expect("transfer failed");
        }
    };
    tokio::time::timeout(STALL_TIMEOUT, collect)
        .await
        .expect("reversed transfers deadlocked");

    let forward = n.div_ceil(2) as i64;
    let backward = (n / 2) as i64;
    let net = (forward - backward) * amount;

    let updated_one = store.get_account(account_one.id).await.unwrap();
    let updated_two = store.get_account(account_two.id).await.unwrap();
    assert_eq!(updated_one.balance, account_one.balance - net);
    assert_eq!(updated_two.balance, account_two.balance + net);
    assert_eq!(entry_sum(&store, account_one.id).await, -net);
    assert_eq!(entry_sum(&store, account_two.id).await, net);
}
