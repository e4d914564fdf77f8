//! Bank bootstrap - wires the store, log and service together.
//!
//! Opening the bank replays both durable files and reconciles them:
//! the account journal is the truth about applied balance deltas, the
//! transaction log is the truth about what was reported. A crash between
//! the two appends leaves a gap that is repaired here, before the service
//! accepts any traffic.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::account::AccountStore;
use crate::config::AppConfig;
use crate::money;
use crate::transfer::TransferService;
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{TransferId, TransferRecord};
use crate::txlog::TxLog;

/// Counts of repairs performed during startup reconciliation.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Journal-applied transfers whose log record was missing or PENDING,
    /// repaired to COMMITTED
    pub repaired_committed: usize,
    /// PENDING log records with no journal entry, resolved to FAILED
    pub resolved_failed: usize,
    /// Applied transfers whose record is terminal FAILED (support case)
    pub mismatched: usize,
}

/// The assembled banking core.
pub struct Bank {
    store: Arc<AccountStore>,
    log: Arc<TxLog>,
    service: Arc<TransferService>,
}

impl Bank {
    /// Open the bank from configuration: replay, reconcile, seed.
    pub fn open(config: &AppConfig) -> anyhow::Result<Self> {
        let data_dir = Path::new(&config.storage.data_dir);
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let store = Arc::new(
            AccountStore::open(data_dir.join("accounts.wal"), config.storage.sync_writes)
                .context("opening account store")?,
        );
        let log = Arc::new(
            TxLog::open(data_dir.join("transfers.log"), config.storage.sync_writes)
                .context("opening transaction log")?,
        );

        let report = reconcile(&store, &log);
        if report != ReconcileReport::default() {
            info!(
                repaired_committed = report.repaired_committed,
                resolved_failed = report.resolved_failed,
                mismatched = report.mismatched,
                "startup reconciliation repaired records"
            );
        }

        seed_accounts(&store, config)?;

        let service = Arc::new(TransferService::new(store.clone(), log.clone()));
        Ok(Self {
            store,
            log,
            service,
        })
    }

    pub fn store(&self) -> &Arc<AccountStore> {
        &self.store
    }

    pub fn log(&self) -> &Arc<TxLog> {
        &self.log
    }

    pub fn service(&self) -> &Arc<TransferService> {
        &self.service
    }
}

/// Repair the transaction log from the account journal.
///
/// - A journal-applied transfer with no COMMITTED record (crash between
///   journal append and log append) gets its record repaired to COMMITTED.
/// - A PENDING record with no journal entry (crash before the atomic
///   apply) is resolved to FAILED: no funds moved.
/// - An applied transfer whose record is terminal FAILED is the
///   indeterminate-then-crash window; records are immutable, so it is
///   surfaced for support instead of rewritten.
pub fn reconcile(store: &AccountStore, log: &TxLog) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for applied in store.applied_transfers() {
        let transfer_id = TransferId::from_u128(applied.transfer_id);
        match log.get(transfer_id) {
            Some(record) if record.status == TransferStatus::Committed => {}
            Some(record) if record.status == TransferStatus::Pending => {
                // Balances at commit time are unknowable after the fact;
                // the repaired record carries none.
                let repaired = TransferRecord {
                    status: TransferStatus::Committed,
                    updated_at: chrono::Utc::now().timestamp_millis(),
                    ..record
                };
                match log.append(&repaired) {
                    Ok(()) => report.repaired_committed += 1,
                    Err(e) => warn!(
                        transfer_id = %transfer_id,
                        error = %e,
                        "failed to repair applied transfer to COMMITTED"
                    ),
                }
            }
            Some(_) => {
                warn!(
                    transfer_id = %transfer_id,
                    "applied transfer has a FAILED record; needs manual reconciliation"
                );
                report.mismatched += 1;
            }
            None => {
                let record = TransferRecord {
                    transfer_id,
                    cid: None,
                    sender: applied.sender.clone(),
                    receiver: applied.receiver.clone(),
                    amount: applied.amount,
                    status: TransferStatus::Committed,
                    error: None,
                    sender_balance_after: None,
                    receiver_balance_after: None,
                    created_at: chrono::Utc::now().timestamp_millis(),
                    updated_at: chrono::Utc::now().timestamp_millis(),
                };
                match log.append(&record) {
                    Ok(()) => report.repaired_committed += 1,
                    Err(e) => warn!(
                        transfer_id = %transfer_id,
                        error = %e,
                        "failed to reconstruct record for applied transfer"
                    ),
                }
            }
        }
    }

    for record in log.pending_records() {
        if !store.transfer_applied(record.transfer_id.as_u128()) {
            let failed = record.failed(
                "INTERRUPTED: restart before the atomic apply; no funds moved".to_string(),
            );
            match log.append(&failed) {
                Ok(()) => report.resolved_failed += 1,
                Err(e) => warn!(
                    transfer_id = %failed.transfer_id,
                    error = %e,
                    "failed to resolve interrupted transfer to FAILED"
                ),
            }
        }
    }

    report
}

/// Open any configured seed accounts that do not exist yet.
fn seed_accounts(store: &AccountStore, config: &AppConfig) -> anyhow::Result<()> {
    for seed in &config.seed_accounts {
        if store.exists(&seed.account_no) {
            continue;
        }
        let opening_minor = money::parse_amount(&seed.balance, config.currency_decimals)
            .with_context(|| format!("seed balance for {}", seed.account_no))?;
        store
            .open_account(
                seed.account_no.clone(),
                seed.owner.clone(),
                seed.email.clone(),
                seed.routing.clone(),
                opening_minor,
            )
            .with_context(|| format!("opening seed account {}", seed.account_no))?;
        info!(account_no = %seed.account_no, "seed account opened");
    }
    Ok(())
}
