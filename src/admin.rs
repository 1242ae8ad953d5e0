//! Account administration
//!
//! Opening accounts and changing their status. An opening balance is booked
//! as a completed `deposit` transaction with a credit ledger entry, so a
//! freshly opened account already reconciles.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    Account, AccountId, AccountStatus, EntryType, LedgerEntry, Transaction, TransactionStatus,
    TransactionType,
};
use crate::money::{MoneyError, parse_currency, validate_amount};
use crate::store::{LedgerStore, StoreError, StoreTx};
use crate::transfer::generate_reference;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Invalid input: {0}")]
    Money(#[from] MoneyError),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parameters for [`open_account`]
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub account_number: String,
    pub currency_code: String,
    pub opening_balance: Decimal,
}

impl NewAccount {
    pub fn new(
        account_number: impl Into<String>,
        currency_code: impl Into<String>,
        opening_balance: Decimal,
    ) -> Self {
        Self {
            account_number: account_number.into(),
            currency_code: currency_code.into(),
            opening_balance,
        }
    }
}

/// Create an active account, funding it with `opening_balance` if non-zero
pub async fn open_account<S: LedgerStore>(
    store: &S,
    new: NewAccount,
) -> Result<Account, AdminError> {
    let currency = parse_currency(&new.currency_code)?;
    if !new.opening_balance.is_zero() {
        validate_amount(new.opening_balance)?;
    }

    let mut account = Account::new(new.account_number, currency);
    let mut tx = store.begin().await?;

    // Row must exist before a ledger entry can reference it
    tx.save_account(&account).await?;

    if !new.opening_balance.is_zero() {
        let now = Utc::now();
        let deposit = Transaction {
            id: Uuid::new_v4(),
            reference: generate_reference(),
            transaction_type: TransactionType::Deposit,
            amount: new.opening_balance,
            currency_code: account.currency_code.clone(),
            status: TransactionStatus::Completed,
            description: "Opening balance".to_string(),
            created_at: now,
            updated_at: now,
        };
        tx.insert_transaction(&deposit).await?;

        account.credit(new.opening_balance, now);
        let entry = LedgerEntry::for_account(
            deposit.id,
            &account,
            EntryType::Credit,
            new.opening_balance,
            now,
        );
        tx.insert_ledger_entry(&entry).await?;
        tx.save_account(&account).await?;
    }

    tx.commit().await?;

    info!(
        account_id = %account.id,
        account_number = %account.account_number,
        currency = %account.currency_code,
        balance = %account.balance,
        "Account opened"
    );
    Ok(account)
}

/// Suspend, close or re-activate an account
pub async fn set_account_status<S: LedgerStore>(
    store: &S,
    account_id: AccountId,
    status: AccountStatus,
) -> Result<Account, AdminError> {
    let mut tx = store.begin().await?;
    let mut account = tx
        .load_account_for_update(account_id)
        .await?
        .ok_or(AdminError::AccountNotFound(account_id))?;

    let previous = account.status;
    account.status = status;
    account.updated_at = Utc::now();
    tx.save_account(&account).await?;
    tx.commit().await?;

    info!(account_id = %account_id, from = %previous, to = %status, "Account status changed");
    Ok(account)
}

/// Open the two demo accounts used for local runs
pub async fn seed_demo_accounts<S: LedgerStore>(store: &S) -> Result<Vec<Account>, AdminError> {
    let demo = [
        NewAccount::new("ACC-1000001", "USD", dec!(1000.00)),
        NewAccount::new("ACC-2000001", "USD", dec!(500.00)),
    ];

    let mut accounts = Vec::with_capacity(demo.len());
    for new in demo {
        accounts.push(open_account(store, new).await?);
    }
    Ok(accounts)
}
