//! Audit result types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Account, AccountId, LedgerEntry};
use crate::money::format_amount;

/// Terminal outcome of one account audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    /// Stored balance equals the ledger-derived balance
    Valid,
    /// Stored balance disagrees with the ledger
    Fraudulent,
    /// Account missing or could not be loaded
    Incomplete,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Valid => "VALID",
            AuditStatus::Fraudulent => "FRAUDULENT",
            AuditStatus::Incomplete => "INCOMPLETE",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Finding {
    BalanceMismatch,
}

/// Reconciliation report for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    pub status: AuditStatus,
    pub expected_balance: Decimal,
    pub actual_balance: Decimal,
    /// `actual_balance - expected_balance`
    pub balance_discrepancy: Decimal,
    #[serde(rename = "fraud_types", default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    pub ledger_entries_count: usize,
    pub audited_at: DateTime<Utc>,
}

impl AuditResult {
    /// Compare `account.balance` with the sum of its ledger entries
    pub fn reconcile(account: &Account, entries: &[LedgerEntry]) -> Self {
        let expected: Decimal = entries.iter().map(LedgerEntry::signed_amount).sum();
        let discrepancy = account.balance - expected;

        let mut result = Self {
            account_id: account.id,
            account_number: Some(account.account_number.clone()),
            status: AuditStatus::Valid,
            expected_balance: expected,
            actual_balance: account.balance,
            balance_discrepancy: discrepancy,
            findings: Vec::new(),
            details: Vec::new(),
            ledger_entries_count: entries.len(),
            audited_at: Utc::now(),
        };

        if !discrepancy.is_zero() {
            result.status = AuditStatus::Fraudulent;
            result.findings.push(Finding::BalanceMismatch);
            result.details.push(format!(
                "Balance mismatch detected: actual={}, expected={}, discrepancy={}",
                format_amount(account.balance),
                format_amount(expected),
                format_amount(discrepancy),
            ));
        }
        result
    }

    /// Result for an account that could not be audited
    pub fn incomplete(account_id: AccountId, detail: impl Into<String>) -> Self {
        Self {
            account_id,
            account_number: None,
            status: AuditStatus::Incomplete,
            expected_balance: Decimal::ZERO,
            actual_balance: Decimal::ZERO,
            balance_discrepancy: Decimal::ZERO,
            findings: Vec::new(),
            details: vec![detail.into()],
            ledger_entries_count: 0,
            audited_at: Utc::now(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == AuditStatus::Valid
    }
}
