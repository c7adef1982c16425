//! simple_bank - run one funds transfer
//!
//! Usage: simple_bank --from <account id> --to <account id> --amount <minor units>
//!
//! Prints the created transfer, both entries and both updated accounts as
//! JSON. Ctrl+C while the transfer is in flight rolls it back.

use simple_bank::{
    db, telemetry, Config, OperationContext, PgLedgerStore, TransferCoordinator, TransferTxParams,
};

/// Value following `flag` on the command line
fn arg_value(args: &[String], flag: &str) -> anyhow::Result<i64> {
    let raw = args
        .iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .ok_or_else(|| {
            anyhow::anyhow!("usage: simple_bank --from <id> --to <id> --amount <n> (missing {flag})")
        })?;

    raw.parse()
        .map_err(|_| anyhow::anyhow!("{flag} expects an integer, got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    telemetry::init_tracing(config.log_format);

    let args: Vec<String> = std::env::args().collect();
    let params = TransferTxParams::new(
        arg_value(&args, "--from")?,
        arg_value(&args, "--to")?,
        arg_value(&args, "--amount")?,
    );

    tracing::info!(environment = %config.environment, "Connecting to database...");
    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    let coordinator = TransferCoordinator::new(PgLedgerStore::new(pool.clone()));
    let mut context = OperationContext::new();
    let correlation_id = context.ensure_correlation_id();
    tracing::info!(%correlation_id, "Submitting transfer");

    let outcome = coordinator
        .execute_transfer_until(params, &context, shutdown_signal())
        .await;

    pool.close().await;

    let result = outcome?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

/// Resolves on Ctrl+C (or SIGTERM on unix)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling transfer...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, cancelling transfer...");
        },
    }
}
