//! Transfer Service
//!
//! The only entry point external callers use to move money. Orchestrates
//! Validator → Executor → Transaction Log for a single request:
//!
//! ```text
//! RECEIVED → VALIDATED → EXECUTING → COMMITTED
//!     ↓                      ↓
//!   FAILED ←─────────────────┘
//! ```
//!
//! Every terminal state is reported with a human-readable reason and a
//! durable log record; no request silently disappears.
//!
//! # Cancellation
//!
//! Waiting for the account locks inside the executor is the only
//! suspension point of `submit` after the PENDING record exists. A caller
//! that times out and drops the future before the locks are acquired
//! aborts cleanly with no mutation (the PENDING record is failed by
//! startup reconciliation); once the atomic apply begins, the operation
//! runs to its terminal state.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::TransferError;
use super::executor::TransferExecutor;
use super::state::TransferState;
use super::types::{TransferId, TransferOutcome, TransferRecord, TransferRequest};
use super::validator;
use crate::account::AccountStore;
use crate::core_types::AccountNo;
use crate::txlog::{CidClaim, LogError, TxLog};

/// Orchestrates a single transfer request end to end.
pub struct TransferService {
    store: Arc<AccountStore>,
    log: Arc<TxLog>,
    executor: TransferExecutor,
}

impl TransferService {
    pub fn new(store: Arc<AccountStore>, log: Arc<TxLog>) -> Self {
        let executor = TransferExecutor::new(store.clone());
        Self {
            store,
            log,
            executor,
        }
    }

    /// Submit a transfer request and drive it to a terminal state.
    ///
    /// Returns the terminal outcome (COMMITTED or FAILED with a reason).
    /// `Err` is reserved for requests that never enter the state machine:
    /// a duplicate idempotency token still in flight, or an infrastructure
    /// fault before the PENDING record could be written.
    pub async fn submit(&self, req: TransferRequest) -> Result<TransferOutcome, TransferError> {
        let transfer_id = TransferId::new();
        let mut state = TransferState::Received;

        // Idempotency: a token already resolved returns the prior result
        // without re-applying; a token still in flight is rejected.
        if let Some(cid) = &req.cid {
            match self.log.claim_cid(cid, transfer_id) {
                CidClaim::Claimed => {}
                CidClaim::Existing(Some(prior)) if prior.status.is_terminal() => {
                    info!(
                        cid = %cid,
                        transfer_id = %prior.transfer_id,
                        status = %prior.status,
                        "duplicate token, returning prior result"
                    );
                    return Ok(TransferOutcome::from_record(&prior));
                }
                CidClaim::Existing(_) => {
                    warn!(cid = %cid, "duplicate token still in flight");
                    return Err(TransferError::DuplicateRequest);
                }
            }
        }

        // RECEIVED → VALIDATED, or → FAILED with the validator's reason
        if let Err(reject) = validator::validate(&self.store, &req) {
            self.advance(&mut state, TransferState::Failed)?;
            let record = TransferRecord::new_failed(transfer_id, &req, reject.reason());
            self.append_or_release(&record, &req)?;
            info!(%record, reason = %reject, "transfer rejected by validation");
            return Ok(TransferOutcome::from_record(&record));
        }
        self.advance(&mut state, TransferState::Validated)?;

        // VALIDATED → EXECUTING: the durable PENDING record marks the start
        // of execution.
        let pending = TransferRecord::new_pending(transfer_id, &req);
        self.append_or_release(&pending, &req)?;
        self.advance(&mut state, TransferState::Executing)?;

        // EXECUTING → COMMITTED | FAILED
        match self.executor.execute(&pending).await {
            Ok((sender_view, receiver_view)) => {
                let record = pending.committed(
                    sender_view.balance_minor,
                    receiver_view.balance_minor,
                );
                match self.log.append(&record) {
                    Ok(()) => {
                        self.advance(&mut state, TransferState::Committed)?;
                        info!(%record, "transfer committed");
                        Ok(TransferOutcome::from_record(&record))
                    }
                    Err(log_err) => {
                        // Funds moved, but the completion record could not
                        // be written: the transfer is not complete by the
                        // log's definition. Startup reconciliation repairs
                        // the record from the journal; report the distinct
                        // indeterminate reason instead of guessing.
                        error!(
                            transfer_id = %transfer_id,
                            error = %log_err,
                            "commit record append failed after apply"
                        );
                        self.advance(&mut state, TransferState::Failed)?;
                        Ok(TransferOutcome {
                            status: TransferState::Failed.as_str().to_string(),
                            transfer_id: transfer_id.to_string(),
                            sender_balance_after: None,
                            receiver_balance_after: None,
                            failure_reason: Some(TransferError::Indeterminate.reason()),
                        })
                    }
                }
            }
            Err(exec_err) => {
                self.advance(&mut state, TransferState::Failed)?;
                let record = pending.failed(exec_err.reason());
                if let Err(log_err) = self.log.append(&record) {
                    // The record stays PENDING in the log; reconciliation
                    // fails it on the next start.
                    error!(
                        transfer_id = %transfer_id,
                        error = %log_err,
                        "failure record append failed"
                    );
                }
                info!(%record, reason = %exec_err, "transfer failed");
                Ok(TransferOutcome::from_record(&record))
            }
        }
    }

    /// Look up a transfer record.
    pub fn get(&self, transfer_id: TransferId) -> Option<TransferRecord> {
        self.log.get(transfer_id)
    }

    /// Transfer history of an account, time ascending (read-only view).
    pub fn history(&self, account_no: &AccountNo) -> Vec<TransferRecord> {
        self.log.list_for_account(account_no)
    }

    /// Guarded state transition; the table in [`TransferState`] is the
    /// single source of truth for legal edges.
    fn advance(
        &self,
        state: &mut TransferState,
        next: TransferState,
    ) -> Result<(), TransferError> {
        if !state.can_transition(next) {
            return Err(TransferError::InvalidStateTransition(format!(
                "{} -> {}",
                state, next
            )));
        }
        *state = next;
        Ok(())
    }

    /// Append a record, releasing the idempotency claim if the append
    /// fails before the record ever existed.
    fn append_or_release(
        &self,
        record: &TransferRecord,
        req: &TransferRequest,
    ) -> Result<(), TransferError> {
        self.log.append(record).map_err(|e| {
            if let Some(cid) = &req.cid {
                self.log.release_cid(cid, record.transfer_id);
            }
            match e {
                LogError::AppendIndeterminate(_) => TransferError::Indeterminate,
                other => TransferError::Storage(other.to_string()),
            }
        })
    }
}
