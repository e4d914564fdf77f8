//! Transaction Log - append-only record of transfers.
//!
//! The log is the durability boundary of the transfer path: a transfer is
//! not considered complete until its COMMITTED record is durably appended
//! here. Records are append-only on disk (every state change is a new
//! framed entry); in memory the log keeps the latest state per transfer
//! plus indexes by idempotency token and by account.
//!
//! History consumers (`list_for_account`) are strictly read-only.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::core_types::{AccountNo, MinorUnits};
use crate::transfer::state::TransferStatus;
use crate::transfer::types::{TransferId, TransferRecord};
use crate::wal::{WalAppendError, WalEntryType, WalFile};

/// Transaction Log errors
#[derive(Debug, Error, Clone)]
pub enum LogError {
    #[error("log append failed: {0}")]
    Append(String),

    #[error("log append state unknown: {0}")]
    AppendIndeterminate(String),

    #[error("transfer record already terminal: {0}")]
    Terminal(String),

    #[error("idempotency token already bound: {0}")]
    CidBound(String),
}

impl From<WalAppendError> for LogError {
    fn from(e: WalAppendError) -> Self {
        match e {
            WalAppendError::Withdrawn(msg) => LogError::Append(msg),
            WalAppendError::Indeterminate(msg) => LogError::AppendIndeterminate(msg),
        }
    }
}

/// Result of claiming an idempotency token.
#[derive(Debug, Clone)]
pub enum CidClaim {
    /// Token was free and is now bound to the caller's transfer id
    Claimed,
    /// Token already bound. Carries the bound record, or `None` while the
    /// owning request is still between claim and first append.
    Existing(Option<TransferRecord>),
}

/// Durable bincode image of a record (one framed log entry per state).
#[derive(Debug, Serialize, Deserialize)]
struct RecordPayload {
    transfer_id: u128,
    cid: Option<String>,
    sender: AccountNo,
    receiver: AccountNo,
    amount: MinorUnits,
    status: i16,
    error: Option<String>,
    sender_balance_after: Option<MinorUnits>,
    receiver_balance_after: Option<MinorUnits>,
    created_at: i64,
    updated_at: i64,
}

impl RecordPayload {
    fn from_record(record: &TransferRecord) -> Self {
        Self {
            transfer_id: record.transfer_id.as_u128(),
            cid: record.cid.clone(),
            sender: record.sender.clone(),
            receiver: record.receiver.clone(),
            amount: record.amount,
            status: record.status.id(),
            error: record.error.clone(),
            sender_balance_after: record.sender_balance_after,
            receiver_balance_after: record.receiver_balance_after,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn into_record(self) -> io::Result<TransferRecord> {
        let status = TransferStatus::from_id(self.status).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown transfer status id: {}", self.status),
            )
        })?;
        Ok(TransferRecord {
            transfer_id: TransferId::from_u128(self.transfer_id),
            cid: self.cid,
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            status,
            error: self.error,
            sender_balance_after: self.sender_balance_after,
            receiver_balance_after: self.receiver_balance_after,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct TxLogInner {
    wal: WalFile,
    /// Latest record state by transfer id
    records: FxHashMap<u128, TransferRecord>,
    /// Idempotency token -> transfer id
    by_cid: FxHashMap<String, u128>,
    /// Account -> transfer ids in creation order
    by_account: FxHashMap<AccountNo, Vec<u128>>,
}

impl TxLogInner {
    fn index_new(&mut self, record: &TransferRecord) {
        let bits = record.transfer_id.as_u128();
        self.by_account
            .entry(record.sender.clone())
            .or_default()
            .push(bits);
        // Rejected same-account transfers carry one account twice
        if record.receiver != record.sender {
            self.by_account
                .entry(record.receiver.clone())
                .or_default()
                .push(bits);
        }
        if let Some(cid) = &record.cid {
            self.by_cid.entry(cid.clone()).or_insert(bits);
        }
    }
}

/// Append-only transaction log.
pub struct TxLog {
    inner: Mutex<TxLogInner>,
}

impl TxLog {
    /// Open the log, replaying existing records.
    ///
    /// Replay reduces the entry stream to the latest state per transfer;
    /// creation order rebuilds the per-account history order. A torn tail
    /// is truncated by the WAL layer.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> io::Result<Self> {
        let opened = WalFile::open(path, sync)?;

        let mut inner = TxLogInner {
            wal: opened.wal,
            records: FxHashMap::default(),
            by_cid: FxHashMap::default(),
            by_account: FxHashMap::default(),
        };

        for entry in &opened.entries {
            if entry.header.entry_type != WalEntryType::TransferRecord as u8 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unexpected entry type in log: {}", entry.header.entry_type),
                ));
            }
            let payload: RecordPayload = bincode::deserialize(&entry.payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let record = payload.into_record()?;
            let bits = record.transfer_id.as_u128();

            if !inner.records.contains_key(&bits) {
                inner.index_new(&record);
            }
            inner.records.insert(bits, record);
        }

        tracing::info!(records = inner.records.len(), "transaction log opened");
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, TxLogInner> {
        // A poisoned lock only means a panic elsewhere; the data is a
        // plain map plus an append-only file, safe to keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically claim an idempotency token for a transfer id.
    pub fn claim_cid(&self, cid: &str, transfer_id: TransferId) -> CidClaim {
        let mut inner = self.lock();
        if let Some(&bits) = inner.by_cid.get(cid) {
            return CidClaim::Existing(inner.records.get(&bits).cloned());
        }
        inner.by_cid.insert(cid.to_string(), transfer_id.as_u128());
        CidClaim::Claimed
    }

    /// Release a claimed token that never produced a record.
    ///
    /// No-op unless the token is still bound to `transfer_id` with no
    /// record behind it (the failed-before-first-append path).
    pub fn release_cid(&self, cid: &str, transfer_id: TransferId) {
        let mut inner = self.lock();
        let bits = transfer_id.as_u128();
        if inner.by_cid.get(cid) == Some(&bits) && !inner.records.contains_key(&bits) {
            inner.by_cid.remove(cid);
        }
    }

    /// Durably append a record state.
    ///
    /// The first append for a transfer id creates the record; a second
    /// append must carry a terminal status. Terminal records are immutable:
    /// appending over one is an error.
    pub fn append(&self, record: &TransferRecord) -> Result<(), LogError> {
        let mut inner = self.lock();
        let bits = record.transfer_id.as_u128();

        let is_new = match inner.records.get(&bits) {
            None => true,
            Some(existing) if existing.status.is_terminal() => {
                return Err(LogError::Terminal(record.transfer_id.to_string()));
            }
            Some(_) => false,
        };

        if is_new
            && let Some(cid) = &record.cid
            && let Some(&bound) = inner.by_cid.get(cid)
            && bound != bits
        {
            return Err(LogError::CidBound(cid.clone()));
        }

        let payload = bincode::serialize(&RecordPayload::from_record(record))
            .map_err(|e| LogError::Append(e.to_string()))?;
        inner.wal.append(WalEntryType::TransferRecord, &payload)?;

        if is_new {
            inner.index_new(record);
        }
        inner.records.insert(bits, record.clone());
        Ok(())
    }

    /// Look up a record by transfer id.
    pub fn get(&self, transfer_id: TransferId) -> Option<TransferRecord> {
        self.lock().records.get(&transfer_id.as_u128()).cloned()
    }

    /// Look up the record bound to an idempotency token.
    pub fn get_by_cid(&self, cid: &str) -> Option<TransferRecord> {
        let inner = self.lock();
        let bits = inner.by_cid.get(cid)?;
        inner.records.get(bits).cloned()
    }

    /// All records touching an account, ordered by creation time ascending.
    ///
    /// Finite snapshot; both sent and received transfers appear.
    pub fn list_for_account(&self, account_no: &str) -> Vec<TransferRecord> {
        let inner = self.lock();
        inner
            .by_account
            .get(account_no)
            .map(|ids| {
                ids.iter()
                    .filter_map(|bits| inner.records.get(bits).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All records still PENDING (startup reconciliation).
    pub fn pending_records(&self) -> Vec<TransferRecord> {
        self.lock()
            .records
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect()
    }

    /// Number of known transfers.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================
// TESTS
// ============================================================
