//! Transfer Error Types

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{AccountId, AccountStatus};
use crate::money::MoneyError;
use crate::store::StoreError;

/// Request-shape failures, raised before any money moves
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount must be greater than zero with at most 4 decimals: {0}")]
    InvalidAmount(MoneyError),

    #[error("Source and destination account cannot be the same")]
    SameAccount,

    #[error("Currency mismatch: source is {source_currency}, destination is {dest_currency}")]
    CurrencyMismatch {
        source_currency: String,
        dest_currency: String,
    },
}

/// Transfer error types
///
/// Every variant carries the account and reason needed to act on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Account {account_id} is not active (status: {status})")]
    AccountNotActive {
        account_id: AccountId,
        status: AccountStatus,
    },

    #[error("Insufficient funds in account {account_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Stable error code for calling layers
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(ValidationError::InvalidAmount(_)) => "INVALID_AMOUNT",
            TransferError::Validation(ValidationError::SameAccount) => "SAME_ACCOUNT",
            TransferError::Validation(ValidationError::CurrencyMismatch { .. }) => {
                "CURRENCY_MISMATCH"
            }
            TransferError::AccountNotActive { .. } => "ACCOUNT_NOT_ACTIVE",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::Conflict(_) => "CONFLICT",
            TransferError::Store(_) => "STORE_ERROR",
            TransferError::Cancelled => "CANCELLED",
        }
    }

    /// Whether re-submitting the whole transfer may succeed
    ///
    /// A retry is a new transfer; the engine does not deduplicate.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Conflict(_) | TransferError::Store(_))
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => TransferError::Conflict(msg),
            StoreError::Unavailable(msg) => TransferError::Store(msg),
        }
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        TransferError::Validation(ValidationError::InvalidAmount(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            TransferError::from(ValidationError::SameAccount).code(),
            "SAME_ACCOUNT"
        );
        assert_eq!(
            TransferError::from(MoneyError::InvalidAmount).code(),
            "INVALID_AMOUNT"
        );
        assert_eq!(TransferError::Cancelled.code(), "CANCELLED");
    }

    #[test]
    fn test_store_error_mapping() {
        let e: TransferError = StoreError::Conflict("dup".into()).into();
        assert_eq!(e, TransferError::Conflict("dup".into()));
        assert!(e.is_retryable());

        let e: TransferError = StoreError::Unavailable("down".into()).into();
        assert_eq!(e.code(), "STORE_ERROR");
        assert!(e.is_retryable());

        assert!(!TransferError::Cancelled.is_retryable());
        assert!(!TransferError::AccountNotFound(Uuid::nil()).is_retryable());
    }

    #[test]
    fn test_display_carries_context() {
        let id = Uuid::new_v4();
        let err = TransferError::InsufficientFunds {
            account_id: id,
            available: dec!(500.00),
            requested: dec!(600.00),
        };
        let msg = err.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("500.00"));
        assert!(msg.contains("600.00"));

        let err = TransferError::AccountNotActive {
            account_id: id,
            status: AccountStatus::Suspended,
        };
        assert!(err.to_string().contains("suspended"));
    }
}
