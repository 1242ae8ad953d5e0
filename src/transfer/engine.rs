//! Transfer Engine
//!
//! Validates and applies one transfer inside a single store transaction.
//! Either every write (transaction record, two ledger entries, two account
//! rows) commits together or none does.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::error::{TransferError, ValidationError};
use super::types::{TransferOutcome, TransferRequest, generate_reference};
use crate::cancel::CancelSignal;
use crate::models::{
    Account, AccountId, EntryType, LedgerEntry, Transaction, TransactionStatus, TransactionType,
};
use crate::money::validate_amount;
use crate::store::{LedgerStore, StoreTx};

/// Transfer Engine - atomic double-entry transfers over a [`LedgerStore`]
pub struct TransferEngine<S: LedgerStore> {
    store: Arc<S>,
}

impl<S: LedgerStore> Clone for TransferEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: LedgerStore> TransferEngine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Move `req.amount` from `req.source` to `req.dest`
    ///
    /// # Validation order
    /// 1. amount > 0 (before any transaction is opened)
    /// 2. lock both accounts, ascending ID order
    /// 3. source active, 4. destination active
    /// 5. currencies match, 6. source balance >= amount
    ///
    /// Retried calls are not deduplicated: each successful call is a new
    /// transfer with its own reference.
    pub async fn transfer(
        &self,
        req: TransferRequest,
        cancel: &CancelSignal,
    ) -> Result<TransferOutcome, TransferError> {
        validate_amount(req.amount)?;
        if req.source == req.dest {
            return Err(ValidationError::SameAccount.into());
        }
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let mut tx = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            tx = self.store.begin() => tx?,
        };

        let applied = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            res = Self::apply(&mut tx, &req) => res,
        };

        let outcome = match applied {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    // Dropped scope still releases; the backend discards it
                    warn!(error = %rb, "Rollback failed");
                }
                match &e {
                    TransferError::Conflict(_) | TransferError::Store(_) => error!(
                        source = %req.source,
                        dest = %req.dest,
                        error = %e,
                        "Transfer rolled back on store failure"
                    ),
                    _ => warn!(
                        source = %req.source,
                        dest = %req.dest,
                        amount = %req.amount,
                        code = e.code(),
                        "Transfer rejected"
                    ),
                }
                return Err(e);
            }
        };

        // Commit is the atomic point; it is not raced against cancellation
        if let Err(e) = tx.commit().await {
            error!(
                reference = %outcome.transaction.reference,
                error = %e,
                "Transfer commit failed"
            );
            return Err(e.into());
        }

        info!(
            reference = %outcome.transaction.reference,
            source = %req.source,
            dest = %req.dest,
            amount = %req.amount,
            "Transfer committed"
        );
        Ok(outcome)
    }

    async fn apply(
        tx: &mut S::Tx,
        req: &TransferRequest,
    ) -> Result<TransferOutcome, TransferError> {
        let (mut source, mut dest) = Self::lock_pair(tx, req.source, req.dest).await?;

        if !source.status.is_active() {
            return Err(TransferError::AccountNotActive {
                account_id: source.id,
                status: source.status,
            });
        }
        if !dest.status.is_active() {
            return Err(TransferError::AccountNotActive {
                account_id: dest.id,
                status: dest.status,
            });
        }
        if source.currency_code != dest.currency_code {
            return Err(ValidationError::CurrencyMismatch {
                source_currency: source.currency_code.clone(),
                dest_currency: dest.currency_code.clone(),
            }
            .into());
        }
        if source.balance < req.amount {
            return Err(TransferError::InsufficientFunds {
                account_id: source.id,
                available: source.balance,
                requested: req.amount,
            });
        }

        let now = Utc::now();
        let transaction = Transaction {
            id: Uuid::new_v4(),
            reference: generate_reference(),
            transaction_type: TransactionType::Transfer,
            amount: req.amount,
            currency_code: source.currency_code.clone(),
            status: TransactionStatus::Completed,
            description: req.description.clone(),
            created_at: now,
            updated_at: now,
        };
        tx.insert_transaction(&transaction).await?;

        source.debit(req.amount, now);
        dest.credit(req.amount, now);

        let debit = LedgerEntry::for_account(transaction.id, &source, EntryType::Debit, req.amount, now);
        let credit = LedgerEntry::for_account(transaction.id, &dest, EntryType::Credit, req.amount, now);
        tx.insert_ledger_entry(&debit).await?;
        tx.insert_ledger_entry(&credit).await?;

        tx.save_account(&source).await?;
        tx.save_account(&dest).await?;

        debug!(
            reference = %transaction.reference,
            source_balance = %source.balance,
            dest_balance = %dest.balance,
            "Transfer applied, awaiting commit"
        );

        Ok(TransferOutcome {
            transaction,
            source,
            dest,
        })
    }

    /// Lock both rows in ascending ID order, return them as (source, dest)
    ///
    /// A fixed global order means two transfers over the same pair in
    /// opposite directions can never wait on each other in a cycle.
    async fn lock_pair(
        tx: &mut S::Tx,
        source_id: AccountId,
        dest_id: AccountId,
    ) -> Result<(Account, Account), TransferError> {
        let (first_id, second_id) = if source_id < dest_id {
            (source_id, dest_id)
        } else {
            (dest_id, source_id)
        };

        let first = tx
            .load_account_for_update(first_id)
            .await?
            .ok_or(TransferError::AccountNotFound(first_id))?;
        let second = tx
            .load_account_for_update(second_id)
            .await?
            .ok_or(TransferError::AccountNotFound(second_id))?;

        if first_id == source_id {
            Ok((first, second))
        } else {
            Ok((second, first))
        }
    }
}
