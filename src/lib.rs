//! Transfer Ledger - atomic double-entry transfers with ledger reconciliation
//!
//! # Modules
//!
//! - [`models`] - Account, Transaction and LedgerEntry records
//! - [`money`] - Fixed-point amount and currency validation
//! - [`store`] - Transactional store contract, PostgreSQL and in-memory backends
//! - [`transfer`] - Transfer engine (lock ordering, validation, atomic commit)
//! - [`audit`] - Balance reconciliation against ledger history
//! - [`admin`] - Opening accounts, status changes, demo seed
//! - [`cancel`] - External cancellation signal
//! - [`config`] / [`logging`] / [`db`] - Ambient wiring

pub mod admin;
pub mod audit;
pub mod cancel;
pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod money;
pub mod store;
pub mod transfer;

// Convenient re-exports at crate root
pub use admin::{AdminError, NewAccount, open_account, seed_demo_accounts, set_account_status};
pub use audit::{AuditEngine, AuditError, AuditResult, AuditStatus, Finding};
pub use cancel::CancelSignal;
pub use models::{
    Account, AccountId, AccountStatus, EntryType, LedgerEntry, Transaction, TransactionStatus,
    TransactionType,
};
pub use store::{InMemoryStore, LedgerStore, PgLedgerStore, StoreError, StoreTx};
pub use transfer::{TransferEngine, TransferError, TransferOutcome, TransferRequest, ValidationError};
