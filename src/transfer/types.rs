//! Transfer request/outcome types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Account, AccountId, Transaction};

/// Prefix of every generated transaction reference
pub const REFERENCE_PREFIX: &str = "TRX-";

/// Move `amount` from `source` to `dest`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source: AccountId,
    pub dest: AccountId,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
}

impl TransferRequest {
    pub fn new(
        source: AccountId,
        dest: AccountId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            source,
            dest,
            amount,
            description: description.into(),
        }
    }
}

/// Committed result of a transfer: the transaction record and both
/// accounts as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transaction: Transaction,
    pub source: Account,
    pub dest: Account,
}

/// Fresh human-readable reference, e.g. `TRX-01J9Z3K7X8V6M2Q4R5S6T7W8Y9`
///
/// ULIDs sort by creation time and carry 80 random bits per millisecond.
pub fn generate_reference() -> String {
    format!("{}{}", REFERENCE_PREFIX, ulid::Ulid::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_shape() {
        let r = generate_reference();
        assert!(r.starts_with(REFERENCE_PREFIX));
        assert_eq!(r.len(), REFERENCE_PREFIX.len() + 26);
    }

    #[test]
    fn test_references_are_unique() {
        let refs: std::collections::HashSet<String> =
            (0..1000).map(|_| generate_reference()).collect();
        assert_eq!(refs.len(), 1000);
    }
}
