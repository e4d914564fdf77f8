//! Transfer Validator
//!
//! Business-rule checks for a proposed transfer, short-circuiting on the
//! first failure. Validation never mutates state and is purely advisory:
//! balances can change between validation and execution, so the executor
//! re-derives the authoritative truth under the account locks.

use super::error::TransferError;
use super::types::TransferRequest;
use crate::account::AccountStore;

/// Validate a transfer request against business rules, in order:
///
/// 1. amount > 0 (fractional and overflowing amounts never reach here:
///    the money module rejects them at parse time and `u64` minor units
///    cannot carry them)
/// 2. sender != receiver
/// 3. sender account exists
/// 4. receiver account exists
pub fn validate(store: &AccountStore, req: &TransferRequest) -> Result<(), TransferError> {
    if req.amount == 0 {
        return Err(TransferError::InvalidAmount);
    }
    if req.sender == req.receiver {
        return Err(TransferError::SameAccount);
    }
    if !store.exists(&req.sender) {
        return Err(TransferError::SenderNotFound);
    }
    if !store.exists(&req.receiver) {
        return Err(TransferError::ReceiverNotFound);
    }
    Ok(())
}
