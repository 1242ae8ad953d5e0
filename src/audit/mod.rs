//! Audit Engine
//!
//! Rebuilds each account's expected balance from its ledger history and
//! compares it with the stored balance.
//!
//! - `VALID`: stored balance equals `Σcredits − Σdebits`
//! - `FRAUDULENT`: they differ; the signed discrepancy is `actual − expected`
//! - `INCOMPLETE`: the account is missing or could not be loaded
//!
//! All three are terminal. Batch audits fan out one task per account and
//! join them before returning.

pub mod engine;
pub mod types;

pub use engine::{AuditEngine, AuditError};
pub use types::{AuditResult, AuditStatus, Finding};
