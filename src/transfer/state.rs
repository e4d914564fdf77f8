//! Transfer State Definitions
//!
//! Two state spaces live here:
//!
//! - [`TransferStatus`] is the durable status of a ledger record
//!   (`PENDING | COMMITTED | FAILED`). State IDs are i16 for compact
//!   storage in the transaction log.
//! - [`TransferState`] is the in-memory orchestration state machine of the
//!   transfer service (`RECEIVED → VALIDATED → EXECUTING → COMMITTED |
//!   FAILED`) with an explicit transition table.

use std::fmt;

/// Durable status of a transfer record.
///
/// Terminal states: COMMITTED (40), FAILED (-10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum TransferStatus {
    /// Execution started; balance deltas not yet acknowledged
    Pending = 0,

    /// Terminal: deltas applied exactly once
    Committed = 40,

    /// Terminal: no delta was applied
    Failed = -10,
}

impl TransferStatus {
    /// Check if this is a terminal status (record is immutable)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Committed | TransferStatus::Failed)
    }

    /// Get the numeric status ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from a storage status ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Pending),
            40 => Some(TransferStatus::Committed),
            -10 => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    /// Get human-readable status name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Committed => "COMMITTED",
            TransferStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}

/// Orchestration state of a single transfer request.
///
/// ```text
/// RECEIVED → VALIDATED → EXECUTING → COMMITTED
///     ↓                      ↓
///   FAILED ←─────────────────┘
/// ```
///
/// No transition skips a step and no state is revisited once left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Request accepted by the service
    Received,
    /// Business rules passed (advisory)
    Validated,
    /// Executor invoked; the PENDING record exists
    Executing,
    /// Terminal: committed and durably logged
    Committed,
    /// Terminal: rejected or failed; reason recorded
    Failed,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Committed | TransferState::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition(&self, next: TransferState) -> bool {
        use TransferState::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Received, Failed)
                | (Validated, Executing)
                | (Executing, Committed)
                | (Executing, Failed)
        )
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Received => "RECEIVED",
            TransferState::Validated => "VALIDATED",
            TransferState::Executing => "EXECUTING",
            TransferState::Committed => "COMMITTED",
            TransferState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
