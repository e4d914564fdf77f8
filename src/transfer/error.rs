//! Transfer Error Types
//!
//! All failure modes of the transfer path. Error codes are stable strings
//! used in API responses and ledger records.

use thiserror::Error;

use crate::account::StoreError;

/// Transfer error types
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    // === Validation Errors (recoverable, no mutation) ===
    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Sender and receiver account cannot be the same")]
    SameAccount,

    #[error("Sender account not found")]
    SenderNotFound,

    #[error("Receiver account not found")]
    ReceiverNotFound,

    // === Execution Errors (surfaced, no mutation) ===
    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Receiver balance would overflow")]
    Overflow,

    // === Idempotency ===
    #[error("Duplicate request (idempotency token already in flight)")]
    DuplicateRequest,

    // === Storage Errors ===
    #[error("Storage failure, no funds moved: {0}")]
    Storage(String),

    #[error("Transfer outcome indeterminate, contact support")]
    Indeterminate,

    // === Lookup / internal ===
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl TransferError {
    /// Get the stable error code for API responses and ledger records
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::SenderNotFound => "SENDER_NOT_FOUND",
            TransferError::ReceiverNotFound => "RECEIVER_NOT_FOUND",
            TransferError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TransferError::Overflow => "OVERFLOW",
            TransferError::DuplicateRequest => "DUPLICATE_REQUEST",
            TransferError::Storage(_) => "STORAGE_FAILURE",
            TransferError::Indeterminate => "INDETERMINATE",
            TransferError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            TransferError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAmount
            | TransferError::SameAccount
            | TransferError::DuplicateRequest => 400,
            TransferError::SenderNotFound
            | TransferError::ReceiverNotFound
            | TransferError::InsufficientFunds
            | TransferError::Overflow => 422,
            TransferError::TransferNotFound(_) => 404,
            TransferError::Storage(_)
            | TransferError::Indeterminate
            | TransferError::InvalidStateTransition(_) => 500,
        }
    }

    /// Reason string recorded on FAILED ledger records: `CODE: message`.
    pub fn reason(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientFunds => TransferError::InsufficientFunds,
            StoreError::Overflow => TransferError::Overflow,
            StoreError::SameAccount => TransferError::SameAccount,
            // Which side was missing is decided where the accounts are known;
            // a bare NotFound from the store maps to the sender by default.
            StoreError::AccountNotFound(_) => TransferError::SenderNotFound,
            StoreError::AccountExists(no) => {
                TransferError::Storage(format!("unexpected account state: {}", no))
            }
            StoreError::Journal(msg) => TransferError::Storage(msg),
            StoreError::JournalIndeterminate(_) => TransferError::Indeterminate,
        }
    }
}
