//! Integration Tests for the Transfer Subsystem
//!
//! These tests drive the full service path (validator → executor → log)
//! against a real journal-backed store in a scratch directory, plus
//! injected-failure variants using the mock journal.

use std::path::PathBuf;
use std::sync::Arc;

use crate::account::journal::mock::{
    FAIL_CLEAN, FAIL_INDETERMINATE, FAIL_NONE, MockJournal, SharedJournal,
};
use crate::account::AccountStore;
use crate::transfer::TransferError;
use crate::transfer::service::TransferService;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{TransferId, TransferRequest};
use crate::txlog::{CidClaim, TxLog};

/// Helper wiring a service over a scratch directory.
struct TestHarness {
    dir: PathBuf,
    store: Arc<AccountStore>,
    log: Arc<TxLog>,
    service: TransferService,
}

impl TestHarness {
    fn new(name: &str) -> Self {
        let dir = PathBuf::from(format!(
            "target/test_transfer_{}/{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        Self::open(dir)
    }

    fn open(dir: PathBuf) -> Self {
        let store = Arc::new(AccountStore::open(dir.join("accounts.wal"), false).unwrap());
        let log = Arc::new(TxLog::open(dir.join("transfers.log"), false).unwrap());
        let service = TransferService::new(store.clone(), log.clone());
        Self {
            dir,
            store,
            log,
            service,
        }
    }

    /// Simulate a restart: reopen both durable files from the same dir.
    fn reopen(self) -> Self {
        let dir = self.dir.clone();
        drop(self);
        Self::open(dir)
    }

    fn seed(&self, account_no: &str, minor: u64) {
        self.store
            .open_account(
                account_no.to_string(),
                format!("Owner of {}", account_no),
                None,
                "QXPB0000001".to_string(),
                minor,
            )
            .unwrap();
    }

    async fn balance(&self, account_no: &str) -> u64 {
        self.store.get(account_no).await.unwrap().balance_minor
    }

    fn cleanup(self) {
        let dir = self.dir.clone();
        drop(self);
        let _ = std::fs::remove_dir_all(dir);
    }
}

/// Harness over a mock journal so storage failures can be injected.
struct FailingHarness {
    dir: PathBuf,
    journal: Arc<MockJournal>,
    store: Arc<AccountStore>,
    service: TransferService,
}

impl FailingHarness {
    fn new(name: &str) -> Self {
        let dir = PathBuf::from(format!(
            "target/test_transfer_{}/{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let journal = Arc::new(MockJournal::new());
        let store = Arc::new(AccountStore::with_journal(Box::new(SharedJournal(
            journal.clone(),
        ))));
        let log = Arc::new(TxLog::open(dir.join("transfers.log"), false).unwrap());
        let service = TransferService::new(store.clone(), log.clone());
        Self {
            dir,
            journal,
            store,
            service,
        }
    }

    fn seed(&self, account_no: &str, minor: u64) {
        self.store
            .open_account(
                account_no.to_string(),
                format!("Owner of {}", account_no),
                None,
                "QXPB0000001".to_string(),
                minor,
            )
            .unwrap();
    }

    fn cleanup(self) {
        let dir = self.dir.clone();
        drop(self);
        let _ = std::fs::remove_dir_all(dir);
    }
}

// ========================================================================
// Acceptance Scenarios
// ========================================================================

/// Scenario 1: A=1000, B=500, transfer 300 → COMMITTED, A=700, B=800
#[tokio::test]
async fn test_scenario_basic_commit() {
    let h = TestHarness::new("scenario_commit");
    h.seed("A", 1000);
    h.seed("B", 500);

    let outcome = h
        .service
        .submit(TransferRequest::new("A".into(), "B".into(), 300))
        .await
        .unwrap();

    assert!(outcome.is_committed());
    assert_eq!(outcome.sender_balance_after, Some(700));
    assert_eq!(outcome.receiver_balance_after, Some(800));
    assert_eq!(h.balance("A").await, 700);
    assert_eq!(h.balance("B").await, 800);

    // The durable record matches the outcome
    let record = h
        .service
        .get(outcome.transfer_id.parse::<TransferId>().unwrap())
        .unwrap();
    assert_eq!(record.status, TransferStatus::Committed);
    assert_eq!(record.sender_balance_after, Some(700));

    h.cleanup();
}

/// Scenario 2: A=100, transfer 300 → FAILED/InsufficientFunds, no mutation
#[tokio::test]
async fn test_scenario_insufficient_funds() {
    let h = TestHarness::new("scenario_insufficient");
    h.seed("A", 100);
    h.seed("B", 500);

    let outcome = h
        .service
        .submit(TransferRequest::new("A".into(), "B".into(), 300))
        .await
        .unwrap();

    assert!(!outcome.is_committed());
    let reason = outcome.failure_reason.unwrap();
    assert!(reason.starts_with("INSUFFICIENT_FUNDS"), "got: {}", reason);
    assert_eq!(h.balance("A").await, 100);
    assert_eq!(h.balance("B").await, 500);

    h.cleanup();
}

/// Scenario 3: A→A → FAILED/SameAccount
#[tokio::test]
async fn test_scenario_same_account() {
    let h = TestHarness::new("scenario_same_account");
    h.seed("A", 1000);

    let outcome = h
        .service
        .submit(TransferRequest::new("A".into(), "A".into(), 50))
        .await
        .unwrap();

    assert!(!outcome.is_committed());
    let reason = outcome.failure_reason.unwrap();
    assert!(reason.starts_with("SAME_ACCOUNT"), "got: {}", reason);
    assert_eq!(h.balance("A").await, 1000);

    h.cleanup();
}

/// Scenario 4: concurrent A→B 400 and B→A 400 with A=B=1000 → both
/// COMMITTED, final A=B=1000, and neither hangs.
#[tokio::test]
async fn test_scenario_opposing_concurrent_transfers() {
    let h = TestHarness::new("scenario_opposing");
    h.seed("A", 1000);
    h.seed("B", 1000);

    let service = Arc::new(TransferService::new(h.store.clone(), h.log.clone()));
    let s1 = service.clone();
    let s2 = service.clone();

    let t1 = tokio::spawn(async move {
        s1.submit(TransferRequest::new("A".into(), "B".into(), 400))
            .await
    });
    let t2 = tokio::spawn(async move {
        s2.submit(TransferRequest::new("B".into(), "A".into(), 400))
            .await
    });

    let o1 = tokio::time::timeout(std::time::Duration::from_secs(5), t1)
        .await
        .expect("A->B hung")
        .unwrap()
        .unwrap();
    let o2 = tokio::time::timeout(std::time::Duration::from_secs(5), t2)
        .await
        .expect("B->A hung")
        .unwrap()
        .unwrap();

    assert!(o1.is_committed());
    assert!(o2.is_committed());
    assert_eq!(h.balance("A").await, 1000);
    assert_eq!(h.balance("B").await, 1000);

    h.cleanup();
}

/// Scenario 5: retrying a committed request with the same token returns
/// the prior result without moving money again.
#[tokio::test]
async fn test_scenario_idempotent_retry() {
    let h = TestHarness::new("scenario_idempotent");
    h.seed("A", 1000);
    h.seed("B", 500);

    let req = TransferRequest::with_cid("A".into(), "B".into(), 300, "client-tok-1".into());
    let first = h.service.submit(req.clone()).await.unwrap();
    assert!(first.is_committed());
    assert_eq!(h.balance("A").await, 700);

    let second = h.service.submit(req).await.unwrap();
    assert!(second.is_committed());
    assert_eq!(second.transfer_id, first.transfer_id);
    assert_eq!(second.sender_balance_after, Some(700));
    assert_eq!(second.receiver_balance_after, Some(800));

    // Not 400/1100: exactly one balance change happened
    assert_eq!(h.balance("A").await, 700);
    assert_eq!(h.balance("B").await, 800);

    // Exactly one COMMITTED record exists
    let committed: Vec<_> = h
        .service
        .history(&"A".to_string())
        .into_iter()
        .filter(|r| r.status == TransferStatus::Committed)
        .collect();
    assert_eq!(committed.len(), 1);

    h.cleanup();
}

// ========================================================================
// Concurrency Properties
// ========================================================================

/// Conservation: a storm of concurrent transfers never creates or
/// destroys money, and no balance ever goes negative (u64 + no-overdraft
/// re-check under the locks).
#[tokio::test]
async fn test_conservation_under_concurrent_storm() {
    let h = TestHarness::new("conservation");
    let accounts = ["A", "B", "C", "D", "E"];
    for no in accounts {
        h.seed(no, 10_000);
    }
    let total_before = h.store.total_minor().await;

    let service = Arc::new(TransferService::new(h.store.clone(), h.log.clone()));
    let mut handles = Vec::new();
    for i in 0..200usize {
        let service = service.clone();
        let sender = accounts[i % accounts.len()].to_string();
        let receiver = accounts[(i + 1 + i % 3) % accounts.len()].to_string();
        let amount = 50 + (i as u64 % 7) * 113;
        handles.push(tokio::spawn(async move {
            service
                .submit(TransferRequest::new(sender, receiver, amount))
                .await
        }));
    }

    let results = futures::future::join_all(handles).await;
    for result in results {
        let outcome = result.unwrap().unwrap();
        // Every submission reaches a terminal state with a reason on failure
        if !outcome.is_committed() {
            assert!(outcome.failure_reason.is_some());
        }
    }

    assert_eq!(h.store.total_minor().await, total_before);

    h.cleanup();
}

// ========================================================================
// Validation & Duplicate Handling
// ========================================================================

/// Validation failures are terminal FAILED records in the log.
#[tokio::test]
async fn test_validation_failures_are_logged() {
    let h = TestHarness::new("validation_logged");
    h.seed("A", 1000);

    let outcome = h
        .service
        .submit(TransferRequest::new("A".into(), "ghost".into(), 10))
        .await
        .unwrap();
    assert!(!outcome.is_committed());

    let record = h
        .service
        .get(outcome.transfer_id.parse::<TransferId>().unwrap())
        .unwrap();
    assert_eq!(record.status, TransferStatus::Failed);
    assert!(
        record
            .error
            .as_deref()
            .unwrap()
            .starts_with("RECEIVER_NOT_FOUND")
    );

    h.cleanup();
}

/// A token still in flight is rejected instead of double-spending.
#[tokio::test]
async fn test_duplicate_token_in_flight_rejected() {
    let h = TestHarness::new("duplicate_in_flight");
    h.seed("A", 1000);
    h.seed("B", 500);

    // Bind the token as a concurrent submission would
    match h.log.claim_cid("tok-racing", TransferId::new()) {
        CidClaim::Claimed => {}
        other => panic!("expected fresh claim, got {:?}", other),
    }

    let req = TransferRequest::with_cid("A".into(), "B".into(), 300, "tok-racing".into());
    let err = h.service.submit(req).await.unwrap_err();
    assert!(matches!(err, TransferError::DuplicateRequest));
    assert_eq!(h.balance("A").await, 1000);

    h.cleanup();
}

/// A FAILED token replays its failure rather than re-executing.
#[tokio::test]
async fn test_failed_token_replays_failure() {
    let h = TestHarness::new("failed_token_replay");
    h.seed("A", 100);
    h.seed("B", 500);

    let req = TransferRequest::with_cid("A".into(), "B".into(), 300, "tok-f".into());
    let first = h.service.submit(req.clone()).await.unwrap();
    assert!(!first.is_committed());

    let second = h.service.submit(req).await.unwrap();
    assert!(!second.is_committed());
    assert_eq!(second.transfer_id, first.transfer_id);

    h.cleanup();
}

// ========================================================================
// Failure Injection
// ========================================================================

/// A clean storage failure surfaces as FAILED with no mutation on either
/// side - never a half-applied transfer.
#[tokio::test]
async fn test_storage_failure_atomicity() {
    let h = FailingHarness::new("inject_clean");
    h.seed("A", 1000);
    h.seed("B", 500);

    h.journal.set_mode(FAIL_CLEAN);
    let outcome = h
        .service
        .submit(TransferRequest::new("A".into(), "B".into(), 300))
        .await
        .unwrap();

    assert!(!outcome.is_committed());
    let reason = outcome.failure_reason.unwrap();
    assert!(reason.starts_with("STORAGE_FAILURE"), "got: {}", reason);

    h.journal.set_mode(FAIL_NONE);
    assert_eq!(h.store.get("A").await.unwrap().balance_minor, 1000);
    assert_eq!(h.store.get("B").await.unwrap().balance_minor, 500);

    h.cleanup();
}

/// An ambiguous storage failure is surfaced with the distinct
/// indeterminate reason, not silently retried.
#[tokio::test]
async fn test_indeterminate_failure_distinct_reason() {
    let h = FailingHarness::new("inject_indeterminate");
    h.seed("A", 1000);
    h.seed("B", 500);

    h.journal.set_mode(FAIL_INDETERMINATE);
    let outcome = h
        .service
        .submit(TransferRequest::new("A".into(), "B".into(), 300))
        .await
        .unwrap();

    assert!(!outcome.is_committed());
    let reason = outcome.failure_reason.unwrap();
    assert!(reason.starts_with("INDETERMINATE"), "got: {}", reason);

    h.cleanup();
}

// ========================================================================
// Durability
// ========================================================================

/// Balances and records survive a restart.
#[tokio::test]
async fn test_restart_preserves_state() {
    let h = TestHarness::new("restart");
    h.seed("A", 1000);
    h.seed("B", 500);

    let req = TransferRequest::with_cid("A".into(), "B".into(), 300, "tok-d".into());
    let outcome = h.service.submit(req).await.unwrap();
    assert!(outcome.is_committed());

    let h = h.reopen();
    assert_eq!(h.balance("A").await, 700);
    assert_eq!(h.balance("B").await, 800);

    // Record and token binding survive too
    let record = h.log.get_by_cid("tok-d").unwrap();
    assert_eq!(record.status, TransferStatus::Committed);
    assert_eq!(record.transfer_id.to_string(), outcome.transfer_id);

    // Retrying after restart still replays instead of re-applying
    let req = TransferRequest::with_cid("A".into(), "B".into(), 300, "tok-d".into());
    let service = TransferService::new(h.store.clone(), h.log.clone());
    let replay = service.submit(req).await.unwrap();
    assert_eq!(replay.transfer_id, outcome.transfer_id);
    assert_eq!(h.balance("A").await, 700);

    h.cleanup();
}
