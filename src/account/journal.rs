//! Account journal - the durability seam of the Account Store.
//!
//! Every balance mutation is appended here BEFORE the in-memory state is
//! touched (write-through). A two-sided transfer is a single entry, so a
//! crash can never leave a debit without its credit on disk.
//!
//! The `Journal` trait exists so tests can inject append failures; the
//! production implementation is `FileJournal`.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use crate::core_types::{AccountNo, MinorUnits};
use crate::wal::{WalAppendError, WalEntryType, WalFile};

/// One journaled mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JournalOp {
    /// Account opened with an initial balance
    Open {
        account_no: AccountNo,
        owner: String,
        email: Option<String>,
        routing: String,
        opening_minor: MinorUnits,
        opened_at: i64,
    },
    /// Single-account signed delta (out-of-band adjustments, seeding tools)
    Delta { account_no: AccountNo, delta: i64 },
    /// Two-sided atomic transfer apply: debit sender, credit receiver
    Transfer {
        /// Transfer id as raw ULID bits
        transfer_id: u128,
        sender: AccountNo,
        receiver: AccountNo,
        amount: MinorUnits,
    },
}

impl JournalOp {
    fn entry_type(&self) -> WalEntryType {
        match self {
            JournalOp::Open { .. } => WalEntryType::AccountOpen,
            JournalOp::Delta { .. } => WalEntryType::BalanceDelta,
            JournalOp::Transfer { .. } => WalEntryType::TransferApply,
        }
    }
}

/// Append seam for the Account Store.
pub trait Journal: Send + Sync {
    /// Durably append one mutation. On `Ok` the entry is on disk (subject
    /// to the configured fsync policy); on `Withdrawn` it is guaranteed
    /// absent; on `Indeterminate` it may or may not be present.
    fn append(&self, op: &JournalOp) -> Result<u64, WalAppendError>;
}

/// File-backed journal used in production.
pub struct FileJournal {
    wal: Mutex<WalFile>,
}

impl FileJournal {
    /// Open the journal, replaying all valid entries.
    ///
    /// Returns the journal positioned for appending plus the replayed ops
    /// in append order. A torn tail is truncated by the WAL layer.
    pub fn open(path: impl AsRef<Path>, sync: bool) -> io::Result<(Self, Vec<JournalOp>)> {
        let opened = WalFile::open(path, sync)?;

        let mut ops = Vec::with_capacity(opened.entries.len());
        for entry in &opened.entries {
            let op: JournalOp = bincode::deserialize(&entry.payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            ops.push(op);
        }

        Ok((
            Self {
                wal: Mutex::new(opened.wal),
            },
            ops,
        ))
    }
}

impl Journal for FileJournal {
    fn append(&self, op: &JournalOp) -> Result<u64, WalAppendError> {
        let payload =
            bincode::serialize(op).map_err(|e| WalAppendError::Withdrawn(e.to_string()))?;

        let mut wal = self
            .wal
            .lock()
            .map_err(|_| WalAppendError::Indeterminate("journal lock poisoned".to_string()))?;
        wal.append(op.entry_type(), &payload)
    }
}

// ============================================================
// TEST JOURNAL (failure injection)
// ============================================================
