//! Audit Engine
//!
//! Read-only reconciliation of stored balances against ledger history.
//! Takes no row locks; consistency comes from the store's snapshot read.

use std::sync::Arc;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::types::{AuditResult, AuditStatus};
use crate::cancel::CancelSignal;
use crate::config::AuditConfig;
use crate::models::AccountId;
use crate::store::LedgerStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("Audit cancelled")]
    Cancelled,
}

pub struct AuditEngine<S: LedgerStore> {
    store: Arc<S>,
    config: AuditConfig,
}

impl<S: LedgerStore> Clone for AuditEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore> AuditEngine<S> {
    pub fn new(store: Arc<S>, config: AuditConfig) -> Self {
        Self { store, config }
    }

    /// Audit one account
    ///
    /// A missing account or a failed load is reported as `INCOMPLETE`, not
    /// as an error. Only cancellation is an error.
    pub async fn audit_account(
        &self,
        account_id: AccountId,
        cancel: &CancelSignal,
    ) -> Result<AuditResult, AuditError> {
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AuditError::Cancelled),
            result = audit_one(self.store.as_ref(), account_id) => Ok(result),
        }
    }

    /// Audit many accounts concurrently
    ///
    /// One task per ID, at most `max_concurrency` loading at once. Returns
    /// exactly one result per input ID, in input order. A failure on one
    /// account never affects the others.
    pub async fn audit_accounts(
        &self,
        account_ids: &[AccountId],
        cancel: &CancelSignal,
    ) -> Result<Vec<AuditResult>, AuditError> {
        if cancel.is_cancelled() {
            return Err(AuditError::Cancelled);
        }

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let handles: Vec<_> = account_ids
            .iter()
            .map(|&account_id| {
                let store = self.store.clone();
                let permits = permits.clone();
                tokio::spawn(async move {
                    let _permit = match permits.acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => {
                            return AuditResult::incomplete(account_id, "Audit pool closed");
                        }
                    };
                    audit_one(store.as_ref(), account_id).await
                })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                permits.close();
                for handle in &aborts {
                    handle.abort();
                }
                warn!(accounts = account_ids.len(), "Batch audit cancelled");
                return Err(AuditError::Cancelled);
            }
            joined = join_all(handles) => joined,
        };

        let results: Vec<AuditResult> = joined
            .into_iter()
            .zip(account_ids)
            .map(|(res, &account_id)| {
                res.unwrap_or_else(|e| {
                    AuditResult::incomplete(account_id, format!("Audit task failed: {}", e))
                })
            })
            .collect();

        let count = |status: AuditStatus| results.iter().filter(|r| r.status == status).count();
        info!(
            accounts = results.len(),
            valid = count(AuditStatus::Valid),
            fraudulent = count(AuditStatus::Fraudulent),
            incomplete = count(AuditStatus::Incomplete),
            "Batch audit finished"
        );

        Ok(results)
    }
}

async fn audit_one<S: LedgerStore>(store: &S, account_id: AccountId) -> AuditResult {
    match store.load_account_with_ledger(account_id).await {
        Ok(Some((account, entries))) => {
            let result = AuditResult::reconcile(&account, &entries);
            if result.status == AuditStatus::Fraudulent {
                warn!(
                    account_id = %account_id,
                    expected = %result.expected_balance,
                    actual = %result.actual_balance,
                    discrepancy = %result.balance_discrepancy,
                    "Balance mismatch"
                );
            } else {
                debug!(account_id = %account_id, entries = entries.len(), "Account reconciled");
            }
            result
        }
        Ok(None) => AuditResult::incomplete(account_id, format!("Account not found: {}", account_id)),
        Err(e) => {
            warn!(account_id = %account_id, error = %e, "Audit load failed");
            AuditResult::incomplete(account_id, format!("Failed to fetch account: {}", e))
        }
    }
}
