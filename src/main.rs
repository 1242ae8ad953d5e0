//! Transfer Ledger CLI
//!
//! ```text
//! transfer_ledger [--env dev] [--init-schema] [--seed] [--demo]
//!                 [--transfer FROM_ID TO_ID AMOUNT [DESCRIPTION]]
//!                 [--audit [ACCOUNT_ID ...]]
//! ```
//!
//! Uses PostgreSQL when `postgres_url` is configured, otherwise an in-memory
//! store that lives for the duration of the process.

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::{info, warn};
use uuid::Uuid;

use transfer_ledger::admin::seed_demo_accounts;
use transfer_ledger::config::AppConfig;
use transfer_ledger::db::{Database, schema};
use transfer_ledger::logging::init_logging;
use transfer_ledger::money::parse_amount;
use transfer_ledger::{
    AccountId, AuditEngine, AuditStatus, CancelSignal, InMemoryStore, LedgerStore, PgLedgerStore,
    TransferEngine, TransferRequest,
};

// ============================================================
// ARGUMENTS
// ============================================================

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn get_env(args: &[String]) -> String {
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Positional values following `flag`, up to the next `--option`
fn values_after<'a>(args: &'a [String], flag: &str) -> Option<Vec<&'a str>> {
    let pos = args.iter().position(|a| a == flag)?;
    Some(
        args[pos + 1..]
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .map(String::as_str)
            .collect(),
    )
}

fn parse_id(s: &str) -> anyhow::Result<AccountId> {
    Uuid::parse_str(s).with_context(|| format!("Invalid account ID: {}", s))
}

fn parse_transfer(values: &[&str]) -> anyhow::Result<TransferRequest> {
    if values.len() < 3 {
        bail!("--transfer needs FROM_ID TO_ID AMOUNT [DESCRIPTION]");
    }
    let amount = parse_amount(values[2]).with_context(|| format!("Invalid amount: {}", values[2]))?;
    let description = values[3..].join(" ");
    Ok(TransferRequest::new(
        parse_id(values[0])?,
        parse_id(values[1])?,
        amount,
        description,
    ))
}

// ============================================================
// COMMANDS
// ============================================================

/// Seed, demo and transfer steps; returns IDs created by seeding
async fn run_writes<S: LedgerStore>(
    store: &Arc<S>,
    args: &[String],
    cancel: &CancelSignal,
) -> anyhow::Result<Vec<AccountId>> {
    let mut seeded = Vec::new();
    if has_flag(args, "--seed") || has_flag(args, "--demo") {
        for account in seed_demo_accounts(store.as_ref()).await? {
            println!("{}", serde_json::to_string(&account)?);
            seeded.push(account.id);
        }
    }

    let engine = TransferEngine::new(store.clone());

    if has_flag(args, "--demo") && seeded.len() >= 2 {
        let req = TransferRequest::new(seeded[0], seeded[1], rust_decimal::Decimal::ONE_HUNDRED, "demo");
        let outcome = engine.transfer(req, cancel).await?;
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }

    if let Some(values) = values_after(args, "--transfer") {
        let req = parse_transfer(&values)?;
        match engine.transfer(req, cancel).await {
            Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
            Err(e) => bail!("Transfer failed [{}]: {}", e.code(), e),
        }
    }

    Ok(seeded)
}

async fn run_audit<S: LedgerStore>(
    store: Arc<S>,
    config: &AppConfig,
    ids: Vec<AccountId>,
    cancel: &CancelSignal,
) -> anyhow::Result<()> {
    let engine = AuditEngine::new(store, config.audit.clone());
    let results = engine.audit_accounts(&ids, cancel).await?;

    let mut flagged = 0;
    for result in &results {
        if result.status != AuditStatus::Valid {
            flagged += 1;
        }
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    info!(audited = results.len(), flagged, "Audit complete");
    Ok(())
}

/// IDs from the command line, or `all` when none were given
fn audit_ids(values: &[&str], all: Vec<AccountId>) -> anyhow::Result<Vec<AccountId>> {
    if values.is_empty() {
        return Ok(all);
    }
    values.iter().map(|v| parse_id(v)).collect()
}

// ============================================================
// MAIN
// ============================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let env = get_env(&args);

    let config = AppConfig::load(&env)?;
    let _log_guard = init_logging(&config);
    info!(env = %env, git = env!("GIT_HASH"), "Starting transfer ledger");

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling in-flight work");
                cancel.cancel();
            }
        });
    }

    let audit_values = values_after(&args, "--audit");

    match config.postgres_url.clone() {
        Some(url) => {
            let db = Database::connect(&url, &config.database)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await?;
            if has_flag(&args, "--init-schema") {
                schema::init_schema(db.pool()).await?;
            }

            let store = Arc::new(PgLedgerStore::new(db.pool().clone()));
            run_writes(&store, &args, &cancel).await?;

            if let Some(values) = audit_values {
                let all = if values.is_empty() {
                    store.list_account_ids().await?
                } else {
                    Vec::new()
                };
                let ids = audit_ids(&values, all)?;
                run_audit(store, &config, ids, &cancel).await?;
            }
        }
        None => {
            warn!("postgres_url not set, using in-memory store");
            let store = Arc::new(InMemoryStore::new());
            run_writes(&store, &args, &cancel).await?;

            if let Some(values) = audit_values {
                let ids = audit_ids(&values, store.list_account_ids()?)?;
                run_audit(store, &config, ids, &cancel).await?;
            }
        }
    }

    Ok(())
}
