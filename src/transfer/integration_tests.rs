//! Integration Tests for the Transfer Engine
//!
//! Full engine runs against the in-memory store. Failure paths use injected
//! store faults; concurrency paths use real row-lock contention.

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::admin::{NewAccount, open_account, set_account_status};
    use crate::cancel::CancelSignal;
    use crate::models::{Account, AccountStatus, EntryType, TransactionStatus, TransactionType};
    use crate::money::MoneyError;
    use crate::store::{FaultPoint, InMemoryStore, LedgerStore, StoreTx};
    use crate::transfer::{TransferEngine, TransferError, TransferRequest, ValidationError};

    struct TestHarness {
        store: InMemoryStore,
        engine: TransferEngine<InMemoryStore>,
    }

    impl TestHarness {
        fn new() -> Self {
            let store = InMemoryStore::new();
            let engine = TransferEngine::new(Arc::new(store.clone()));
            Self { store, engine }
        }

        async fn open(&self, number: &str, currency: &str, balance: Decimal) -> Account {
            open_account(&self.store, NewAccount::new(number, currency, balance))
                .await
                .unwrap()
        }

        async fn transfer(
            &self,
            source: &Account,
            dest: &Account,
            amount: Decimal,
        ) -> Result<crate::transfer::TransferOutcome, TransferError> {
            self.engine
                .transfer(
                    TransferRequest::new(source.id, dest.id, amount, "test"),
                    &CancelSignal::new(),
                )
                .await
        }

        fn balance(&self, account: &Account) -> Decimal {
            self.store.account(account.id).unwrap().balance
        }

        /// (transactions, ledger entries) currently committed
        fn counts(&self) -> (usize, usize) {
            (
                self.store.transactions().len(),
                self.store.ledger_entry_count(),
            )
        }
    }

    // ========================================================================
    // Happy Path
    // ========================================================================

    #[tokio::test]
    async fn test_transfer_moves_funds_and_writes_double_entry() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500.00)).await;
        let y = h.open("ACC-Y", "USD", dec!(200.00)).await;

        let outcome = h.transfer(&x, &y, dec!(100.00)).await.unwrap();

        assert_eq!(outcome.source.balance, dec!(400.00));
        assert_eq!(outcome.dest.balance, dec!(300.00));
        assert_eq!(h.balance(&x), dec!(400.00));
        assert_eq!(h.balance(&y), dec!(300.00));
        assert_eq!(h.store.account(x.id).unwrap().available_balance, dec!(400.00));

        let txn = &outcome.transaction;
        assert!(txn.reference.starts_with("TRX-"));
        assert_eq!(txn.transaction_type, TransactionType::Transfer);
        assert_eq!(txn.status, TransactionStatus::Completed);
        assert_eq!(txn.amount, dec!(100.00));
        assert_eq!(txn.currency_code, "USD");

        let x_entries = h.store.ledger_entries(x.id);
        let y_entries = h.store.ledger_entries(y.id);
        let debit = x_entries.last().unwrap();
        let credit = y_entries.last().unwrap();

        assert_eq!(debit.entry_type, EntryType::Debit);
        assert_eq!(debit.amount, dec!(100.00));
        assert_eq!(debit.running_balance, dec!(400.00));
        assert_eq!(credit.entry_type, EntryType::Credit);
        assert_eq!(credit.amount, dec!(100.00));
        assert_eq!(credit.running_balance, dec!(300.00));
        assert_eq!(debit.transaction_id, txn.id);
        assert_eq!(credit.transaction_id, txn.id);
    }

    #[tokio::test]
    async fn test_transfer_entire_balance() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "EUR", dec!(75.5)).await;
        let y = h.open("ACC-Y", "EUR", Decimal::ZERO).await;

        h.transfer(&x, &y, dec!(75.5)).await.unwrap();
        assert_eq!(h.balance(&x), Decimal::ZERO);
        assert_eq!(h.balance(&y), dec!(75.5));
    }

    #[tokio::test]
    async fn test_repeated_request_is_not_deduplicated() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(0)).await;

        let first = h.transfer(&x, &y, dec!(10)).await.unwrap();
        let second = h.transfer(&x, &y, dec!(10)).await.unwrap();

        assert_ne!(first.transaction.reference, second.transaction.reference);
        assert_ne!(first.transaction.id, second.transaction.id);
        assert_eq!(h.balance(&x), dec!(480));
        assert_eq!(h.balance(&y), dec!(20));
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[tokio::test]
    async fn test_invalid_amounts_rejected_before_any_write() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(0)).await;
        let before = h.counts();

        for amount in [Decimal::ZERO, dec!(-5), dec!(1.00001)] {
            let err = h.transfer(&x, &y, amount).await.unwrap_err();
            assert!(
                matches!(err, TransferError::Validation(ValidationError::InvalidAmount(_))),
                "amount {} gave {:?}",
                amount,
                err
            );
        }

        let err = h.transfer(&x, &y, dec!(1.00001)).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::Validation(ValidationError::InvalidAmount(
                MoneyError::PrecisionOverflow { .. }
            ))
        ));

        assert_eq!(h.counts(), before);
        assert_eq!(h.balance(&x), dec!(500));
    }

    #[tokio::test]
    async fn test_same_account_rejected() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;

        let err = h.transfer(&x, &x, dec!(1)).await.unwrap_err();
        assert_eq!(err, TransferError::Validation(ValidationError::SameAccount));
        assert_eq!(h.balance(&x), dec!(500));
    }

    #[tokio::test]
    async fn test_missing_account_reported() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let ghost = Account::new("ACC-GHOST", "USD");
        let before = h.counts();

        let err = h.transfer(&x, &ghost, dec!(1)).await.unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound(ghost.id));

        let err = h.transfer(&ghost, &x, dec!(1)).await.unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound(ghost.id));

        assert_eq!(h.counts(), before);
    }

    #[tokio::test]
    async fn test_missing_pair_reports_lower_id_first() {
        let h = TestHarness::new();
        let a = Account::new("ACC-A", "USD");
        let b = Account::new("ACC-B", "USD");
        let lower = a.id.min(b.id);

        let err = h.transfer(&a, &b, dec!(1)).await.unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound(lower));
    }

    #[tokio::test]
    async fn test_inactive_accounts_rejected() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(200)).await;
        let z = h.open("ACC-Z", "USD", dec!(0)).await;

        set_account_status(&h.store, x.id, AccountStatus::Suspended)
            .await
            .unwrap();
        set_account_status(&h.store, z.id, AccountStatus::Closed)
            .await
            .unwrap();
        let before = h.counts();

        let err = h.transfer(&x, &y, dec!(10)).await.unwrap_err();
        assert_eq!(
            err,
            TransferError::AccountNotActive {
                account_id: x.id,
                status: AccountStatus::Suspended
            }
        );

        let err = h.transfer(&y, &z, dec!(10)).await.unwrap_err();
        assert_eq!(
            err,
            TransferError::AccountNotActive {
                account_id: z.id,
                status: AccountStatus::Closed
            }
        );

        assert_eq!(h.counts(), before);
        assert_eq!(h.balance(&y), dec!(200));
    }

    #[tokio::test]
    async fn test_source_status_checked_before_dest() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(0)).await;
        set_account_status(&h.store, x.id, AccountStatus::Closed)
            .await
            .unwrap();
        set_account_status(&h.store, y.id, AccountStatus::Suspended)
            .await
            .unwrap();

        let err = h.transfer(&x, &y, dec!(1)).await.unwrap_err();
        assert!(matches!(err, TransferError::AccountNotActive { account_id, .. } if account_id == x.id));
    }

    #[tokio::test]
    async fn test_currency_mismatch_rejected() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "EUR", dec!(500)).await;
        let before = h.counts();

        let err = h.transfer(&x, &y, dec!(10)).await.unwrap_err();
        assert_eq!(
            err,
            TransferError::Validation(ValidationError::CurrencyMismatch {
                source_currency: "USD".into(),
                dest_currency: "EUR".into(),
            })
        );
        assert_eq!(h.counts(), before);
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_no_trace() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500.00)).await;
        let y = h.open("ACC-Y", "USD", dec!(200.00)).await;
        let before = h.counts();

        let err = h.transfer(&x, &y, dec!(600.00)).await.unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account_id: x.id,
                available: dec!(500.00),
                requested: dec!(600.00),
            }
        );

        assert_eq!(h.counts(), before);
        assert_eq!(h.balance(&x), dec!(500.00));
        assert_eq!(h.balance(&y), dec!(200.00));
    }

    // ========================================================================
    // Atomicity
    // ========================================================================

    #[tokio::test]
    async fn test_store_failure_at_any_step_persists_nothing() {
        for point in [
            FaultPoint::InsertTransaction,
            FaultPoint::InsertLedgerEntry,
            FaultPoint::SaveAccount,
            FaultPoint::Commit,
        ] {
            let h = TestHarness::new();
            let x = h.open("ACC-X", "USD", dec!(500)).await;
            let y = h.open("ACC-Y", "USD", dec!(200)).await;
            let before = h.counts();

            h.store.inject_fault(point);
            let err = h.transfer(&x, &y, dec!(100)).await.unwrap_err();
            assert!(
                matches!(err, TransferError::Store(_)),
                "{:?} gave {:?}",
                point,
                err
            );
            assert!(err.is_retryable());

            assert_eq!(h.counts(), before, "{:?} leaked writes", point);
            assert_eq!(h.balance(&x), dec!(500));
            assert_eq!(h.balance(&y), dec!(200));

            // Locks were released: the retry goes through
            h.transfer(&x, &y, dec!(100)).await.unwrap();
            assert_eq!(h.balance(&x), dec!(400));
        }
    }

    #[tokio::test]
    async fn test_credit_entry_failure_after_debit_staged() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(200)).await;
        let before = h.counts();

        // Debit entry goes through, credit entry fails
        h.store.inject_fault_after(FaultPoint::InsertLedgerEntry, 1);
        let err = h.transfer(&x, &y, dec!(100)).await.unwrap_err();
        assert!(matches!(err, TransferError::Store(_)));

        assert_eq!(h.counts(), before);
        assert_eq!(h.store.ledger_entries(x.id).len(), 1);
        assert_eq!(h.store.ledger_entries(y.id).len(), 1);
        assert_eq!(h.balance(&x), dec!(500));
        assert_eq!(h.balance(&y), dec!(200));
    }

    // ========================================================================
    // Concurrency
    // ========================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_transfers_do_not_deadlock() {
        let h = Arc::new(TestHarness::new());
        let a = h.open("ACC-A", "USD", dec!(1000)).await;
        let b = h.open("ACC-B", "USD", dec!(1000)).await;

        let mut handles = Vec::new();
        for i in 0..40 {
            let h = h.clone();
            let (a, b) = (a.clone(), b.clone());
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    h.transfer(&a, &b, dec!(50)).await
                } else {
                    h.transfer(&b, &a, dec!(30)).await
                }
            }));
        }

        let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
            .await
            .expect("opposite-direction transfers deadlocked");

        for r in results {
            r.unwrap().unwrap();
        }

        // 20 x 50 out of A, 20 x 30 back
        assert_eq!(h.balance(&a), dec!(600));
        assert_eq!(h.balance(&b), dec!(1400));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_debits_never_overdraw() {
        let h = Arc::new(TestHarness::new());
        let x = h.open("ACC-X", "USD", dec!(100)).await;
        let y = h.open("ACC-Y", "USD", dec!(0)).await;

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let h = h.clone();
                let (x, y) = (x.clone(), y.clone());
                tokio::spawn(async move { h.transfer(&x, &y, dec!(10)).await })
            })
            .collect();

        let mut ok = 0;
        let mut insufficient = 0;
        for r in futures::future::join_all(handles).await {
            match r.unwrap() {
                Ok(_) => ok += 1,
                Err(TransferError::InsufficientFunds { .. }) => insufficient += 1,
                Err(e) => panic!("unexpected error: {:?}", e),
            }
        }

        assert_eq!(ok, 10);
        assert_eq!(insufficient, 15);
        assert_eq!(h.balance(&x), Decimal::ZERO);
        assert_eq!(h.balance(&y), dec!(100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_disjoint_pairs_commit_in_parallel() {
        let h = Arc::new(TestHarness::new());
        let mut pairs = Vec::new();
        for i in 0..8 {
            let s = h.open(&format!("ACC-S{}", i), "USD", dec!(100)).await;
            let d = h.open(&format!("ACC-D{}", i), "USD", dec!(0)).await;
            pairs.push((s, d));
        }

        let handles: Vec<_> = pairs
            .iter()
            .cloned()
            .map(|(s, d)| {
                let h = h.clone();
                tokio::spawn(async move { h.transfer(&s, &d, dec!(25)).await })
            })
            .collect();

        for r in futures::future::join_all(handles).await {
            r.unwrap().unwrap();
        }
        for (s, d) in &pairs {
            assert_eq!(h.balance(s), dec!(75));
            assert_eq!(h.balance(d), dec!(25));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_disjoint_pair_not_blocked_by_held_locks() {
        let h = TestHarness::new();
        let a = h.open("ACC-A", "USD", dec!(100)).await;
        let b = h.open("ACC-B", "USD", dec!(100)).await;
        let c = h.open("ACC-C", "USD", dec!(100)).await;
        let d = h.open("ACC-D", "USD", dec!(100)).await;

        // Another scope sits on both rows of the (A, B) pair
        let mut holder = h.store.begin().await.unwrap();
        holder.load_account_for_update(a.id).await.unwrap().unwrap();
        holder.load_account_for_update(b.id).await.unwrap().unwrap();

        let done = tokio::time::timeout(Duration::from_secs(1), h.transfer(&c, &d, dec!(40)))
            .await
            .expect("transfer on a disjoint pair waited on unrelated row locks");
        done.unwrap();
        assert_eq!(h.balance(&c), dec!(60));
        assert_eq!(h.balance(&d), dec!(140));

        // The held pair is still blocked until its scope ends
        let blocked = tokio::time::timeout(Duration::from_millis(50), h.transfer(&a, &b, dec!(1))).await;
        assert!(blocked.is_err());

        holder.rollback().await.unwrap();
        h.transfer(&a, &b, dec!(1)).await.unwrap();
        assert_eq!(h.balance(&a), dec!(99));
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    #[tokio::test]
    async fn test_pre_cancelled_transfer_does_nothing() {
        let h = TestHarness::new();
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(0)).await;
        let before = h.counts();

        let cancel = CancelSignal::new();
        cancel.cancel();
        let err = h
            .engine
            .transfer(TransferRequest::new(x.id, y.id, dec!(1), ""), &cancel)
            .await
            .unwrap_err();

        assert_eq!(err, TransferError::Cancelled);
        assert_eq!(h.counts(), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_waiting_on_row_lock() {
        let h = Arc::new(TestHarness::new());
        let x = h.open("ACC-X", "USD", dec!(500)).await;
        let y = h.open("ACC-Y", "USD", dec!(0)).await;
        let before = h.counts();

        // Another scope holds the destination row
        let mut holder = h.store.begin().await.unwrap();
        holder.load_account_for_update(y.id).await.unwrap().unwrap();

        let cancel = CancelSignal::new();
        let pending = {
            let h = h.clone();
            let cancel = cancel.clone();
            let req = TransferRequest::new(x.id, y.id, dec!(100), "blocked");
            tokio::spawn(async move { h.engine.transfer(req, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        cancel.cancel();
        let res = tokio::time::timeout(Duration::from_secs(2), pending)
            .await
            .expect("cancellation must unblock the transfer")
            .unwrap();
        assert_eq!(res.unwrap_err(), TransferError::Cancelled);

        holder.rollback().await.unwrap();
        assert_eq!(h.counts(), before);
        assert_eq!(h.balance(&x), dec!(500));

        // Whatever the cancelled transfer had locked is free again
        let done = tokio::time::timeout(Duration::from_secs(2), h.transfer(&x, &y, dec!(100)))
            .await
            .expect("locks leaked by cancelled transfer");
        done.unwrap();
        assert_eq!(h.balance(&y), dec!(100));
    }

    #[tokio::test]
    async fn test_unknown_ids_do_not_need_store_rows() {
        let h = TestHarness::new();
        let err = h
            .engine
            .transfer(
                TransferRequest::new(Uuid::new_v4(), Uuid::new_v4(), dec!(0), ""),
                &CancelSignal::new(),
            )
            .await
            .unwrap_err();
        // Amount is checked before any lookup
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }
}
