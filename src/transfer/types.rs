//! Transfer Core Types
//!
//! Type definitions for the transfer subsystem.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::state::TransferStatus;
use crate::core_types::{AccountNo, MinorUnits};

/// Transfer ID - ULID-based unique identifier
///
/// Using ULID provides:
/// - Monotonic, sortable IDs
/// - No coordination needed (no machine_id)
/// - 128-bit with good entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }

    /// Raw 128-bit value (journal and log payloads)
    pub fn as_u128(&self) -> u128 {
        u128::from(self.0)
    }

    /// Rebuild from a raw 128-bit value
    pub fn from_u128(bits: u128) -> Self {
        Self(ulid::Ulid::from(bits))
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Transfer request from the presentation layer.
///
/// The sender identity is resolved by the (external) authentication
/// collaborator before the request reaches the core.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Debited account
    pub sender: AccountNo,
    /// Credited account
    pub receiver: AccountNo,
    /// Amount in minor units (must be positive)
    pub amount: MinorUnits,
    /// Client-provided idempotency token (optional)
    pub cid: Option<String>,
}

impl TransferRequest {
    /// Create a new transfer request
    pub fn new(sender: AccountNo, receiver: AccountNo, amount: MinorUnits) -> Self {
        Self {
            sender,
            receiver,
            amount,
            cid: None,
        }
    }

    /// Create a request with a client idempotency token
    pub fn with_cid(
        sender: AccountNo,
        receiver: AccountNo,
        amount: MinorUnits,
        cid: String,
    ) -> Self {
        Self {
            sender,
            receiver,
            amount,
            cid: Some(cid),
        }
    }
}

/// Transfer record owned by the Transaction Log.
///
/// Created PENDING when execution starts, transitions exactly once to
/// COMMITTED or FAILED, immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Unique transfer ID (ULID, also the log key)
    pub transfer_id: TransferId,
    /// Client idempotency token
    pub cid: Option<String>,
    /// Debited account
    pub sender: AccountNo,
    /// Credited account
    pub receiver: AccountNo,
    /// Amount in minor units
    pub amount: MinorUnits,
    /// Durable record status
    pub status: TransferStatus,
    /// Failure reason (FAILED records)
    pub error: Option<String>,
    /// Sender balance right after commit (COMMITTED records)
    pub sender_balance_after: Option<MinorUnits>,
    /// Receiver balance right after commit (COMMITTED records)
    pub receiver_balance_after: Option<MinorUnits>,
    /// Created timestamp (millis)
    pub created_at: i64,
    /// Last updated timestamp (millis)
    pub updated_at: i64,
}

impl TransferRecord {
    /// Create a PENDING record at the start of execution
    pub fn new_pending(transfer_id: TransferId, req: &TransferRequest) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            transfer_id,
            cid: req.cid.clone(),
            sender: req.sender.clone(),
            receiver: req.receiver.clone(),
            amount: req.amount,
            status: TransferStatus::Pending,
            error: None,
            sender_balance_after: None,
            receiver_balance_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a record that failed before execution (validation rejects)
    pub fn new_failed(transfer_id: TransferId, req: &TransferRequest, reason: String) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            transfer_id,
            cid: req.cid.clone(),
            sender: req.sender.clone(),
            receiver: req.receiver.clone(),
            amount: req.amount,
            status: TransferStatus::Failed,
            error: Some(reason),
            sender_balance_after: None,
            receiver_balance_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Terminal transition to COMMITTED with the observed balances
    pub fn committed(
        mut self,
        sender_balance_after: MinorUnits,
        receiver_balance_after: MinorUnits,
    ) -> Self {
        self.status = TransferStatus::Committed;
        self.sender_balance_after = Some(sender_balance_after);
        self.receiver_balance_after = Some(receiver_balance_after);
        self.updated_at = chrono::Utc::now().timestamp_millis();
        self
    }

    /// Terminal transition to FAILED with a reason
    pub fn failed(mut self, reason: String) -> Self {
        self.status = TransferStatus::Failed;
        self.error = Some(reason);
        self.updated_at = chrono::Utc::now().timestamp_millis();
        self
    }
}

impl fmt::Display for TransferRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Transfer[{}] {} -> {} amount={} status={}",
            self.transfer_id, self.sender, self.receiver, self.amount, self.status
        )
    }
}

/// Result returned to the caller for a terminal transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    /// COMMITTED or FAILED
    pub status: String,
    pub transfer_id: String,
    pub sender_balance_after: Option<MinorUnits>,
    pub receiver_balance_after: Option<MinorUnits>,
    pub failure_reason: Option<String>,
}

impl TransferOutcome {
    /// Build the caller-visible outcome from a terminal record.
    pub fn from_record(record: &TransferRecord) -> Self {
        Self {
            status: record.status.as_str().to_string(),
            transfer_id: record.transfer_id.to_string(),
            sender_balance_after: record.sender_balance_after,
            receiver_balance_after: record.receiver_balance_after,
            failure_reason: record.error.clone(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == TransferStatus::Committed.as_str()
    }
}
