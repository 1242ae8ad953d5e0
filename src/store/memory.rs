//! In-memory store backend
//!
//! Behaves like a row-locking database at READ COMMITTED: each account has
//! an async exclusive lock held by the owning transaction, writes are staged
//! per transaction and published atomically on commit.
//!
//! Intended for tests and local runs. Supports one-shot fault injection so
//! callers can verify that a failure mid-transaction leaves no trace.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{Mutex as RowLock, OwnedMutexGuard};
use tracing::debug;

use super::{LedgerStore, StoreError, StoreTx};
use crate::models::{Account, AccountId, LedgerEntry, Transaction, TransactionId};

/// Store operation at which an injected fault fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    SaveAccount,
    InsertTransaction,
    InsertLedgerEntry,
    Commit,
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    references: HashSet<String>,
    account_numbers: HashMap<String, AccountId>,
    ledger: HashMap<AccountId, Vec<LedgerEntry>>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<AccountId, Arc<RowLock<()>>>>,
    /// Armed faults with the number of matching calls still to let through
    faults: Mutex<Vec<(FaultPoint, usize)>>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl Shared {
    fn row_lock(&self, account_id: AccountId) -> Result<Arc<RowLock<()>>, StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        Ok(locks.entry(account_id).or_default().clone())
    }

    /// Drop the lock entry for `account_id` unless another scope holds or
    /// awaits it
    fn release_row_lock(&self, account_id: AccountId) -> Result<(), StoreError> {
        let mut locks = self.row_locks.lock().map_err(|_| poisoned())?;
        if locks
            .get(&account_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&account_id);
        }
        Ok(())
    }

    /// Consume an armed fault for `point`, if any
    fn trip(&self, point: FaultPoint) -> Result<(), StoreError> {
        let mut faults = self.faults.lock().map_err(|_| poisoned())?;
        if let Some(pos) = faults.iter().position(|(f, _)| *f == point) {
            if faults[pos].1 > 0 {
                faults[pos].1 -= 1;
                return Ok(());
            }
            faults.remove(pos);
            debug!(?point, "Injected store fault fired");
            return Err(StoreError::Unavailable(format!(
                "injected fault at {:?}",
                point
            )));
        }
        Ok(())
    }
}

/// Shared-state in-memory ledger store; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot fault: the next operation matching `point` fails with
    /// `StoreError::Unavailable`
    pub fn inject_fault(&self, point: FaultPoint) {
        self.inject_fault_after(point, 0);
    }

    /// Arm a one-shot fault that lets `skip` matching operations succeed
    /// before failing the next one
    pub fn inject_fault_after(&self, point: FaultPoint, skip: usize) {
        if let Ok(mut faults) = self.shared.faults.lock() {
            faults.push((point, skip));
        }
    }

    /// Committed copy of an account
    pub fn account(&self, account_id: AccountId) -> Option<Account> {
        let tables = self.shared.tables.read().ok()?;
        tables.accounts.get(&account_id).cloned()
    }

    /// Committed ledger entries for an account, oldest first
    pub fn ledger_entries(&self, account_id: AccountId) -> Vec<LedgerEntry> {
        self.shared
            .tables
            .read()
            .map(|t| t.ledger.get(&account_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// All committed transaction records
    pub fn transactions(&self) -> Vec<Transaction> {
        self.shared
            .tables
            .read()
            .map(|t| t.transactions.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn ledger_entry_count(&self) -> usize {
        self.shared
            .tables
            .read()
            .map(|t| t.ledger.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// IDs of all committed accounts, ordered by account number
    pub fn list_account_ids(&self) -> Result<Vec<AccountId>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        let mut accounts: Vec<&Account> = tables.accounts.values().collect();
        accounts.sort_by(|a, b| a.account_number.cmp(&b.account_number));
        Ok(accounts.into_iter().map(|a| a.id).collect())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx, StoreError> {
        Ok(InMemoryTx {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            accounts: HashMap::new(),
            transactions: Vec::new(),
            entries: Vec::new(),
        })
    }

    async fn load_account_with_ledger(
        &self,
        account_id: AccountId,
    ) -> Result<Option<(Account, Vec<LedgerEntry>)>, StoreError> {
        let tables = self.shared.tables.read().map_err(|_| poisoned())?;
        Ok(tables.accounts.get(&account_id).map(|account| {
            let entries = tables.ledger.get(&account_id).cloned().unwrap_or_default();
            (account.clone(), entries)
        }))
    }
}

/// Open in-memory transaction; dropping it releases row locks and discards
/// staged writes
pub struct InMemoryTx {
    shared: Arc<Shared>,
    guards: HashMap<AccountId, OwnedMutexGuard<()>>,
    accounts: HashMap<AccountId, Account>,
    transactions: Vec<Transaction>,
    entries: Vec<LedgerEntry>,
}

impl InMemoryTx {
    fn reference_taken(&self, tables: &Tables, reference: &str) -> bool {
        tables.references.contains(reference)
            || self.transactions.iter().any(|t| t.reference == reference)
    }

    fn number_taken(&self, tables: &Tables, account: &Account) -> bool {
        number_owned_elsewhere(tables, account)
            || self
                .accounts
                .values()
                .any(|a| a.account_number == account.account_number && a.id != account.id)
    }
}

/// Whether a committed account other than `account` owns its number
fn number_owned_elsewhere(tables: &Tables, account: &Account) -> bool {
    tables
        .account_numbers
        .get(&account.account_number)
        .is_some_and(|owner| *owner != account.id)
}

fn duplicate_number(account: &Account) -> StoreError {
    StoreError::Conflict(format!(
        "duplicate account number {}",
        account.account_number
    ))
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn load_account_for_update(
        &mut self,
        account_id: AccountId,
    ) -> Result<Option<Account>, StoreError> {
        if !self.guards.contains_key(&account_id) {
            let lock = self.shared.row_lock(account_id)?;
            let guard = lock.lock_owned().await;
            self.guards.insert(account_id, guard);
        }

        if let Some(staged) = self.accounts.get(&account_id) {
            return Ok(Some(staged.clone()));
        }

        let committed = {
            let tables = self.shared.tables.read().map_err(|_| poisoned())?;
            tables.accounts.get(&account_id).cloned()
        };
        if committed.is_none() {
            // Nothing to protect; a missing row holds no lock
            self.guards.remove(&account_id);
            self.shared.release_row_lock(account_id)?;
        }
        Ok(committed)
    }

    async fn save_account(&mut self, account: &Account) -> Result<(), StoreError> {
        self.shared.trip(FaultPoint::SaveAccount)?;
        let taken = {
            let tables = self.shared.tables.read().map_err(|_| poisoned())?;
            self.number_taken(&tables, account)
        };
        if taken {
            return Err(duplicate_number(account));
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        self.shared.trip(FaultPoint::InsertTransaction)?;
        let taken = {
            let tables = self.shared.tables.read().map_err(|_| poisoned())?;
            self.reference_taken(&tables, &transaction.reference)
        };
        if taken {
            return Err(StoreError::Conflict(format!(
                "duplicate transaction reference {}",
                transaction.reference
            )));
        }
        self.transactions.push(transaction.clone());
        Ok(())
    }

    async fn insert_ledger_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.shared.trip(FaultPoint::InsertLedgerEntry)?;
        self.entries.push(entry.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.shared.trip(FaultPoint::Commit)?;

        let mut tables = self.shared.tables.write().map_err(|_| poisoned())?;

        // Uniqueness is re-checked under the write lock: two scopes may have
        // staged the same reference concurrently
        if let Some(dup) = self
            .transactions
            .iter()
            .find(|t| tables.references.contains(&t.reference))
        {
            return Err(StoreError::Conflict(format!(
                "duplicate transaction reference {}",
                dup.reference
            )));
        }

        if let Some(dup) = self
            .accounts
            .values()
            .find(|a| number_owned_elsewhere(&tables, a))
        {
            return Err(duplicate_number(dup));
        }

        for (id, account) in self.accounts.drain() {
            let stale = tables
                .accounts
                .get(&id)
                .filter(|prev| prev.account_number != account.account_number)
                .map(|prev| prev.account_number.clone());
            if let Some(number) = stale {
                tables.account_numbers.remove(&number);
            }
            tables
                .account_numbers
                .insert(account.account_number.clone(), id);
            tables.accounts.insert(id, account);
        }
        for txn in self.transactions.drain(..) {
            tables.references.insert(txn.reference.clone());
            tables.transactions.insert(txn.id, txn);
        }
        for entry in self.entries.drain(..) {
            tables.ledger.entry(entry.account_id).or_default().push(entry);
        }
        drop(tables);

        // Row locks release when `self.guards` drops here
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
