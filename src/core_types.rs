//! Core types used throughout the system
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// Account number - unique opaque identifier for a customer account.
///
/// # Constraints:
/// - **Immutable**: Assigned at account opening, NEVER changes
/// - **Opaque**: No arithmetic meaning; compared and ordered as bytes
///
/// The byte ordering of account numbers defines the deterministic lock
/// order used when a transfer must hold two accounts at once.
pub type AccountNo = String;

/// Monetary amount in minor units (e.g. paise for INR).
///
/// All monetary arithmetic in the system is integer arithmetic on this
/// type. Fractional amounts only exist at the API boundary, where the
/// money module converts decimal strings to minor units and back.
pub type MinorUnits = u64;
