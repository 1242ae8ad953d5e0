//! Transfer Engine
//!
//! Moves money between two accounts of the same currency as one atomic
//! store transaction.
//!
//! # Flow
//!
//! ```text
//! validate amount ─▶ BEGIN ─▶ lock low ID ─▶ lock high ID ─▶ status/currency/funds
//!                                                                  │
//!                 ROLLBACK ◀── any failure / cancellation ◀────────┤
//!                                                                  ▼
//!                    COMMIT ◀── save both accounts ◀── debit + credit entries ◀── transaction record
//! ```
//!
//! # Invariants
//!
//! 1. **All or nothing**: the transaction record, both ledger entries and both
//!    account rows commit together
//! 2. **Lock ordering**: rows are locked in ascending account-ID order
//! 3. **Conservation**: source loses exactly what destination gains
//! 4. **No dedup**: a retried call is a new transfer

pub mod engine;
pub mod error;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use engine::TransferEngine;
pub use error::{TransferError, ValidationError};
pub use types::{TransferOutcome, TransferRequest, generate_reference};
