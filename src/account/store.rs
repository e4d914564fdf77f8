//! Account Store - durable keyed storage of accounts.
//!
//! The store is the ONLY component allowed to mutate balances. All
//! mutation goes through `apply_delta` / `apply_transfer`, which:
//!
//! 1. serialize per account via a `tokio::sync::Mutex` held for the
//!    duration of the read-modify-write,
//! 2. append the mutation to the journal and make it durable BEFORE the
//!    in-memory state changes (write-through),
//! 3. apply the checked balance arithmetic.
//!
//! A transfer's debit and credit are ONE journal entry, so the on-disk
//! state can never hold half a transfer. Replay at open rebuilds balances
//! and the set of applied transfer ids; the latter is how an interrupted
//! caller re-derives whether its transfer happened.
//!
//! Lock order for a transfer is the byte order of the two account numbers,
//! making opposing transfers on the same pair deadlock-free.

use dashmap::DashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::journal::{FileJournal, Journal, JournalOp};
use super::models::{Account, AccountView};
use crate::core_types::{AccountNo, MinorUnits};
use crate::wal::WalAppendError;

/// Account Store errors
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountNo),

    #[error("Account already exists: {0}")]
    AccountExists(AccountNo),

    #[error("Sender and receiver account cannot be the same")]
    SameAccount,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Balance arithmetic overflow")]
    Overflow,

    #[error("Journal write failed, no mutation applied: {0}")]
    Journal(String),

    #[error("Journal write state unknown: {0}")]
    JournalIndeterminate(String),
}

impl From<WalAppendError> for StoreError {
    fn from(e: WalAppendError) -> Self {
        match e {
            WalAppendError::Withdrawn(msg) => StoreError::Journal(msg),
            WalAppendError::Indeterminate(msg) => StoreError::JournalIndeterminate(msg),
        }
    }
}

/// A transfer that has durably hit the journal (debit + credit applied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransfer {
    pub transfer_id: u128,
    pub sender: AccountNo,
    pub receiver: AccountNo,
    pub amount: MinorUnits,
}

/// Durable keyed storage of accounts.
pub struct AccountStore {
    accounts: DashMap<AccountNo, Arc<Mutex<Account>>>,
    journal: Box<dyn Journal>,
    /// Transfer ids whose debit+credit entry is durable, by raw ULID bits.
    applied: DashMap<u128, AppliedTransfer>,
}

impl std::fmt::Debug for AccountStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountStore")
            .field("accounts", &self.accounts.len())
            .field("applied", &self.applied.len())
            .finish_non_exhaustive()
    }
}

impl AccountStore {
    /// Open the store, replaying the journal at `path`.
    ///
    /// Refuses to start if the valid journal prefix is internally
    /// inconsistent (e.g. a replayed debit below zero): serving from a
    /// state that cannot have been acknowledged is worse than stopping.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> io::Result<Self> {
        let (journal, ops) = FileJournal::open(path, sync)?;

        let store = Self {
            accounts: DashMap::new(),
            journal: Box::new(journal),
            applied: DashMap::new(),
        };

        for op in &ops {
            store
                .replay(op)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        }

        info!(
            accounts = store.accounts.len(),
            applied_transfers = store.applied.len(),
            "account store opened"
        );
        Ok(store)
    }

    /// Build a store over an arbitrary journal implementation (tests).
    pub fn with_journal(journal: Box<dyn Journal>) -> Self {
        Self {
            accounts: DashMap::new(),
            journal,
            applied: DashMap::new(),
        }
    }

    /// Apply one replayed journal op to in-memory state (no re-journaling).
    fn replay(&self, op: &JournalOp) -> Result<(), StoreError> {
        match op {
            JournalOp::Open {
                account_no,
                owner,
                email,
                routing,
                opening_minor,
                opened_at,
            } => {
                if self.accounts.contains_key(account_no) {
                    return Err(StoreError::AccountExists(account_no.clone()));
                }
                let account = Account::open(
                    account_no.clone(),
                    owner.clone(),
                    email.clone(),
                    routing.clone(),
                    *opening_minor,
                    *opened_at,
                );
                self.accounts
                    .insert(account_no.clone(), Arc::new(Mutex::new(account)));
                Ok(())
            }
            JournalOp::Delta { account_no, delta } => {
                let arc = self
                    .accounts
                    .get(account_no)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| StoreError::AccountNotFound(account_no.clone()))?;
                // Replay runs before the store is shared; the lock is free.
                let mut account = arc
                    .try_lock()
                    .map_err(|_| StoreError::Journal("replay lock contention".to_string()))?;
                apply_signed(account.balance_mut(), *delta)
            }
            JournalOp::Transfer {
                transfer_id,
                sender,
                receiver,
                amount,
            } => {
                let sender_arc = self
                    .accounts
                    .get(sender)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| StoreError::AccountNotFound(sender.clone()))?;
                let receiver_arc = self
                    .accounts
                    .get(receiver)
                    .map(|e| e.value().clone())
                    .ok_or_else(|| StoreError::AccountNotFound(receiver.clone()))?;

                let mut s = sender_arc
                    .try_lock()
                    .map_err(|_| StoreError::Journal("replay lock contention".to_string()))?;
                let mut r = receiver_arc
                    .try_lock()
                    .map_err(|_| StoreError::Journal("replay lock contention".to_string()))?;

                s.balance_mut()
                    .debit(*amount)
                    .map_err(|_| StoreError::InsufficientFunds)?;
                r.balance_mut()
                    .credit(*amount)
                    .map_err(|_| StoreError::Overflow)?;

                self.applied.insert(
                    *transfer_id,
                    AppliedTransfer {
                        transfer_id: *transfer_id,
                        sender: sender.clone(),
                        receiver: receiver.clone(),
                        amount: *amount,
                    },
                );
                Ok(())
            }
        }
    }

    /// Check account existence without locking the account.
    pub fn exists(&self, account_no: &str) -> bool {
        self.accounts.contains_key(account_no)
    }

    /// Number of accounts in the store.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Read one account.
    pub async fn get(&self, account_no: &str) -> Result<AccountView, StoreError> {
        let arc = self
            .accounts
            .get(account_no)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::AccountNotFound(account_no.to_string()))?;
        let account = arc.lock().await;
        Ok(account.view())
    }

    /// Read-only directory of all accounts, ordered by account number.
    pub async fn list(&self) -> Vec<AccountView> {
        let arcs: Vec<Arc<Mutex<Account>>> = self
            .accounts
            .iter()
            .map(|e| e.value().clone())
            .collect();

        let mut views = futures::future::join_all(
            arcs.iter().map(|arc| async { arc.lock().await.view() }),
        )
        .await;
        views.sort_by(|a, b| a.account_no.cmp(&b.account_no));
        views
    }

    /// Open a new account (out-of-band path: seeding, account opening).
    pub fn open_account(
        &self,
        account_no: AccountNo,
        owner: String,
        email: Option<String>,
        routing: String,
        opening_minor: MinorUnits,
    ) -> Result<AccountView, StoreError> {
        use dashmap::mapref::entry::Entry;

        let opened_at = chrono::Utc::now().timestamp_millis();
        match self.accounts.entry(account_no.clone()) {
            Entry::Occupied(_) => Err(StoreError::AccountExists(account_no)),
            Entry::Vacant(slot) => {
                self.journal.append(&JournalOp::Open {
                    account_no: account_no.clone(),
                    owner: owner.clone(),
                    email: email.clone(),
                    routing: routing.clone(),
                    opening_minor,
                    opened_at,
                })?;

                let account =
                    Account::open(account_no, owner, email, routing, opening_minor, opened_at);
                let view = account.view();
                slot.insert(Arc::new(Mutex::new(account)));
                Ok(view)
            }
        }
    }

    /// Atomic compare-and-apply of a signed delta on one account.
    ///
    /// Rejects if the resulting balance would fall below `min_after`
    /// (callers pass 0 to enforce the no-overdraft invariant). The journal
    /// entry is durable before the in-memory balance changes.
    pub async fn apply_delta(
        &self,
        account_no: &str,
        delta: i64,
        min_after: MinorUnits,
    ) -> Result<AccountView, StoreError> {
        let arc = self
            .accounts
            .get(account_no)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::AccountNotFound(account_no.to_string()))?;

        let mut account = arc.lock().await;

        let current = account.balance().minor();
        let new = current.checked_add_signed(delta).ok_or(if delta < 0 {
            StoreError::InsufficientFunds
        } else {
            StoreError::Overflow
        })?;
        if new < min_after {
            return Err(StoreError::InsufficientFunds);
        }

        self.journal.append(&JournalOp::Delta {
            account_no: account_no.to_string(),
            delta,
        })?;

        apply_signed(account.balance_mut(), delta)?;
        debug!(account_no, delta, balance = new, "delta applied");
        Ok(account.view())
    }

    /// Atomically move `amount` from `sender` to `receiver`.
    ///
    /// Locks both accounts in account-number order, re-checks funds under
    /// the locks, journals debit+credit as one durable entry, then applies
    /// both in memory. If `transfer_id` is already in the applied set the
    /// call is an idempotent no-op returning the current balances.
    ///
    /// Awaiting the locks is the only suspension point; from the funds
    /// re-check to the return the operation cannot be interrupted by
    /// cancellation.
    pub async fn apply_transfer(
        &self,
        transfer_id: u128,
        sender: &str,
        receiver: &str,
        amount: MinorUnits,
    ) -> Result<(AccountView, AccountView), StoreError> {
        if sender == receiver {
            return Err(StoreError::SameAccount);
        }

        let sender_arc = self
            .accounts
            .get(sender)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::AccountNotFound(sender.to_string()))?;
        let receiver_arc = self
            .accounts
            .get(receiver)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::AccountNotFound(receiver.to_string()))?;

        // Deterministic lock order prevents deadlock between A->B and B->A.
        let sender_first = sender < receiver;
        let (first_arc, second_arc) = if sender_first {
            (&sender_arc, &receiver_arc)
        } else {
            (&receiver_arc, &sender_arc)
        };

        let mut first = first_arc.lock().await;
        let mut second = second_arc.lock().await;
        let (sender_acc, receiver_acc) = if sender_first {
            (&mut *first, &mut *second)
        } else {
            (&mut *second, &mut *first)
        };

        // Idempotent re-derivation: already durably applied means a retry
        // must observe, not re-apply.
        if self.applied.contains_key(&transfer_id) {
            debug!(transfer_id, "transfer already applied, returning current balances");
            return Ok((sender_acc.view(), receiver_acc.view()));
        }

        // Authoritative re-check under the locks; validation results are
        // advisory by the time we get here.
        if !sender_acc.balance().can_debit(amount, 0) {
            return Err(StoreError::InsufficientFunds);
        }
        if receiver_acc.balance().minor().checked_add(amount).is_none() {
            return Err(StoreError::Overflow);
        }

        self.journal.append(&JournalOp::Transfer {
            transfer_id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
        })?;

        // Pre-checked above; these cannot fail.
        sender_acc
            .balance_mut()
            .debit(amount)
            .map_err(|_| StoreError::InsufficientFunds)?;
        receiver_acc
            .balance_mut()
            .credit(amount)
            .map_err(|_| StoreError::Overflow)?;

        self.applied.insert(
            transfer_id,
            AppliedTransfer {
                transfer_id,
                sender: sender.to_string(),
                receiver: receiver.to_string(),
                amount,
            },
        );

        debug!(
            sender,
            receiver,
            amount,
            sender_balance = sender_acc.balance().minor(),
            receiver_balance = receiver_acc.balance().minor(),
            "transfer applied"
        );
        Ok((sender_acc.view(), receiver_acc.view()))
    }

    /// Whether the transfer's debit+credit entry is durably applied.
    pub fn transfer_applied(&self, transfer_id: u128) -> bool {
        self.applied.contains_key(&transfer_id)
    }

    /// Snapshot of all durably applied transfers (startup reconciliation).
    pub fn applied_transfers(&self) -> Vec<AppliedTransfer> {
        self.applied.iter().map(|e| e.value().clone()).collect()
    }

    /// Sum of all balances (test/ops invariant checks).
    pub async fn total_minor(&self) -> u128 {
        let mut total: u128 = 0;
        for view in self.list().await {
            total += view.balance_minor as u128;
        }
        total
    }
}

fn apply_signed(balance: &mut crate::balance::Balance, delta: i64) -> Result<(), StoreError> {
    if delta >= 0 {
        balance
            .credit(delta as u64)
            .map_err(|_| StoreError::Overflow)
    } else {
        balance
            .debit(delta.unsigned_abs())
            .map_err(|_| StoreError::InsufficientFunds)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::journal::mock::{
        FAIL_CLEAN, FAIL_INDETERMINATE, MockJournal, SharedJournal,
    };
    use std::path::PathBuf;

    fn test_dir(name: &str) -> PathBuf {
        let dir = PathBuf::from(format!("target/test_store_{}/{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn seed(store: &AccountStore, account_no: &str, minor: u64) {
        store
            .open_account(
                account_no.to_string(),
                format!("Owner of {}", account_no),
                None,
                "QXPB0000001".to_string(),
                minor,
            )
            .unwrap();
    }

    #[test]
    fn test_open_account_and_exists() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        assert!(!store.exists("A"));

        seed(&store, "A", 1000);
        assert!(store.exists("A"));
        assert_eq!(store.len(), 1);

        // Duplicate open is rejected
        let err = store
            .open_account("A".to_string(), "X".to_string(), None, "R".to_string(), 0)
            .unwrap_err();
        assert!(matches!(err, StoreError::AccountExists(_)));
    }

    #[tokio::test]
    async fn test_get() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        seed(&store, "A", 1000);

        let view = store.get("A").await.unwrap();
        assert_eq!(view.balance_minor, 1000);

        assert!(matches!(
            store.get("missing").await,
            Err(StoreError::AccountNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_delta() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        seed(&store, "A", 1000);

        let view = store.apply_delta("A", 500, 0).await.unwrap();
        assert_eq!(view.balance_minor, 1500);

        let view = store.apply_delta("A", -700, 0).await.unwrap();
        assert_eq!(view.balance_minor, 800);

        // Would go below zero
        assert!(matches!(
            store.apply_delta("A", -900, 0).await,
            Err(StoreError::InsufficientFunds)
        ));
        assert_eq!(store.get("A").await.unwrap().balance_minor, 800);

        // min_after floor
        assert!(matches!(
            store.apply_delta("A", -700, 200).await,
            Err(StoreError::InsufficientFunds)
        ));
        let view = store.apply_delta("A", -600, 200).await.unwrap();
        assert_eq!(view.balance_minor, 200);
    }

    #[tokio::test]
    async fn test_apply_transfer_happy_path() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        seed(&store, "A", 1000);
        seed(&store, "B", 500);

        let (s, r) = store.apply_transfer(1, "A", "B", 300).await.unwrap();
        assert_eq!(s.balance_minor, 700);
        assert_eq!(r.balance_minor, 800);
        assert!(store.transfer_applied(1));
    }

    #[tokio::test]
    async fn test_apply_transfer_insufficient() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        seed(&store, "A", 100);
        seed(&store, "B", 500);

        assert!(matches!(
            store.apply_transfer(1, "A", "B", 300).await,
            Err(StoreError::InsufficientFunds)
        ));
        // No mutation on either side
        assert_eq!(store.get("A").await.unwrap().balance_minor, 100);
        assert_eq!(store.get("B").await.unwrap().balance_minor, 500);
        assert!(!store.transfer_applied(1));
    }

    #[tokio::test]
    async fn test_apply_transfer_same_account() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        seed(&store, "A", 1000);

        assert!(matches!(
            store.apply_transfer(1, "A", "A", 50).await,
            Err(StoreError::SameAccount)
        ));
    }

    #[tokio::test]
    async fn test_apply_transfer_idempotent_replay() {
        let store = AccountStore::with_journal(Box::new(MockJournal::new()));
        seed(&store, "A", 1000);
        seed(&store, "B", 500);

        store.apply_transfer(7, "A", "B", 300).await.unwrap();
        // Same transfer id again: observe, don't re-apply
        let (s, r) = store.apply_transfer(7, "A", "B", 300).await.unwrap();
        assert_eq!(s.balance_minor, 700);
        assert_eq!(r.balance_minor, 800);
    }

    #[tokio::test]
    async fn test_journal_failure_no_mutation() {
        let failing = std::sync::Arc::new(MockJournal::new());
        let store = AccountStore::with_journal(Box::new(SharedJournal(failing.clone())));
        seed(&store, "A", 1000);
        seed(&store, "B", 500);

        // Clean failure: entry withdrawn, neither side applied
        failing.set_mode(FAIL_CLEAN);
        assert!(matches!(
            store.apply_transfer(9, "A", "B", 300).await,
            Err(StoreError::Journal(_))
        ));
        assert_eq!(store.get("A").await.unwrap().balance_minor, 1000);
        assert_eq!(store.get("B").await.unwrap().balance_minor, 500);
        assert!(!store.transfer_applied(9));

        // Ambiguous failure: memory still untouched, error is distinct
        failing.set_mode(FAIL_INDETERMINATE);
        assert!(matches!(
            store.apply_transfer(9, "A", "B", 300).await,
            Err(StoreError::JournalIndeterminate(_))
        ));
        assert_eq!(store.get("A").await.unwrap().balance_minor, 1000);
        assert_eq!(store.get("B").await.unwrap().balance_minor, 500);
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = test_dir("reopen");
        let path = dir.join("accounts.wal");

        {
            let store = AccountStore::open(&path, false).unwrap();
            seed(&store, "A", 1000);
            seed(&store, "B", 500);
            store.apply_transfer(11, "A", "B", 300).await.unwrap();
            store.apply_delta("B", 50, 0).await.unwrap();
        }

        let store = AccountStore::open(&path, false).unwrap();
        assert_eq!(store.get("A").await.unwrap().balance_minor, 700);
        assert_eq!(store.get("B").await.unwrap().balance_minor, 850);
        assert!(store.transfer_applied(11));
        assert!(!store.transfer_applied(12));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_conservation_under_concurrency() {
        let store = std::sync::Arc::new(AccountStore::with_journal(Box::new(MockJournal::new())));
        for no in ["A", "B", "C", "D"] {
            seed(&store, no, 10_000);
        }
        let total_before = store.total_minor().await;

        let accounts = ["A", "B", "C", "D"];
        let mut handles = Vec::new();
        for i in 0..100u128 {
            let store = store.clone();
            let sender = accounts[(i as usize) % 4];
            let receiver = accounts[(i as usize + 1 + (i as usize % 3)) % 4];
            handles.push(tokio::spawn(async move {
                let _ = store.apply_transfer(1000 + i, sender, receiver, 97).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.total_minor().await, total_before);
    }

    #[tokio::test]
    async fn test_opposing_transfers_no_deadlock() {
        let store = std::sync::Arc::new(AccountStore::with_journal(Box::new(MockJournal::new())));
        seed(&store, "A", 1000);
        seed(&store, "B", 1000);

        let s1 = store.clone();
        let s2 = store.clone();
        let t1 = tokio::spawn(async move { s1.apply_transfer(21, "A", "B", 400).await });
        let t2 = tokio::spawn(async move { s2.apply_transfer(22, "B", "A", 400).await });

        let r1 = tokio::time::timeout(std::time::Duration::from_secs(5), t1)
            .await
            .expect("transfer A->B hung")
            .unwrap();
        let r2 = tokio::time::timeout(std::time::Duration::from_secs(5), t2)
            .await
            .expect("transfer B->A hung")
            .unwrap();

        assert!(r1.is_ok());
        assert!(r2.is_ok());
        assert_eq!(store.get("A").await.unwrap().balance_minor, 1000);
        assert_eq!(store.get("B").await.unwrap().balance_minor, 1000);
    }

    #[test]
    fn test_refuses_inconsistent_journal() {
        let dir = test_dir("inconsistent");
        let path = dir.join("accounts.wal");

        // A transfer from an account that was never opened
        {
            let (journal, _) = FileJournal::open(&path, false).unwrap();
            journal
                .append(&JournalOp::Transfer {
                    transfer_id: 1,
                    sender: "ghost".to_string(),
                    receiver: "nobody".to_string(),
                    amount: 10,
                })
                .unwrap();
        }

        let err = AccountStore::open(&path, false).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
