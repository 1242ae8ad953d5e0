//! Idempotent schema bootstrap for the ledger tables
//!
//! Money columns are `NUMERIC(19,4)`; enum-like columns are lowercase text
//! guarded by CHECK constraints.

use sqlx::PgPool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id                UUID PRIMARY KEY,
        account_number    TEXT NOT NULL UNIQUE,
        currency_code     CHAR(3) NOT NULL,
        status            TEXT NOT NULL DEFAULT 'active'
                          CHECK (status IN ('active', 'suspended', 'closed')),
        balance           NUMERIC(19,4) NOT NULL DEFAULT 0,
        available_balance NUMERIC(19,4) NOT NULL DEFAULT 0,
        created_at        TIMESTAMPTZ NOT NULL,
        updated_at        TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id               UUID PRIMARY KEY,
        reference        TEXT NOT NULL UNIQUE,
        transaction_type TEXT NOT NULL,
        amount           NUMERIC(19,4) NOT NULL CHECK (amount > 0),
        currency_code    CHAR(3) NOT NULL,
        status           TEXT NOT NULL DEFAULT 'pending'
                         CHECK (status IN ('pending', 'completed', 'failed')),
        description      TEXT NOT NULL DEFAULT '',
        created_at       TIMESTAMPTZ NOT NULL,
        updated_at       TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id              UUID PRIMARY KEY,
        transaction_id  UUID NOT NULL REFERENCES transactions (id),
        account_id      UUID NOT NULL REFERENCES accounts (id),
        entry_type      TEXT NOT NULL CHECK (entry_type IN ('debit', 'credit')),
        amount          NUMERIC(19,4) NOT NULL CHECK (amount > 0),
        running_balance NUMERIC(19,4) NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_ledger_entries_account ON ledger_entries (account_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_ledger_entries_transaction ON ledger_entries (transaction_id)",
];

/// Create the ledger tables if they do not exist
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for stmt in STATEMENTS {
        sqlx::query(stmt).execute(pool).await?;
    }
    tracing::info!(tables = 3, "Ledger schema ready");
    Ok(())
}
