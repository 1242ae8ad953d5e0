//! Store Contract
//!
//! The minimal transactional capability the engines need from persistence.
//!
//! # Contract
//!
//! - [`LedgerStore::begin`] opens a transaction scope ([`StoreTx`]).
//! - [`StoreTx::load_account_for_update`] takes an exclusive row lock held
//!   until the scope ends.
//! - Writes become visible to other scopes only on [`StoreTx::commit`].
//! - Dropping a scope without committing rolls it back. This covers early
//!   returns, panics and cancelled futures alike.
//! - [`LedgerStore::load_account_with_ledger`] is an unlocked read of
//!   committed state; account and entries come from one consistent snapshot.
//!
//! Backends: [`postgres::PgLedgerStore`] and [`memory::InMemoryStore`].

pub mod memory;
pub mod postgres;

pub use memory::{FaultPoint, InMemoryStore};
pub use postgres::PgLedgerStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Account, AccountId, LedgerEntry, Transaction};

/// Errors surfaced by store backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness violation or concurrent-write conflict; retrying the whole
    /// operation may succeed
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transport, pool or backend failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // 23505 unique_violation, 40001 serialization_failure, 40P01 deadlock_detected
        if let sqlx::Error::Database(db_err) = &e
            && matches!(db_err.code().as_deref(), Some("23505" | "40001" | "40P01"))
        {
            return StoreError::Conflict(db_err.message().to_string());
        }
        StoreError::Unavailable(e.to_string())
    }
}

/// Store entry point: opens transaction scopes and serves audit reads
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    type Tx: StoreTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Committed account state with its full ledger history (oldest first)
    async fn load_account_with_ledger(
        &self,
        account_id: AccountId,
    ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError>;
}

/// One open transaction scope
#[async_trait]
pub trait StoreTx: Send {
    /// Read an account and hold its exclusive row lock until the scope ends
    async fn load_account_for_update(
        &mut self,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError>;

    /// Insert or overwrite an account row
    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Insert a transaction record; a duplicate reference is a `Conflict`
    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError>;

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
