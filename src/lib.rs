//! qxp_bank - Online Banking Core
//!
//! A small banking service: durable account storage, atomic peer-to-peer
//! transfers, and an append-only transaction log, built so the ledger
//! never loses or duplicates money under concurrent transfers or crashes.
//!
//! # Modules
//!
//! - [`core_types`] - Core type aliases (AccountNo, MinorUnits)
//! - [`money`] - Decimal string <-> minor-unit conversion
//! - [`balance`] - Enforced balance type
//! - [`wal`] - CRC-framed append-only file format
//! - [`account`] - Account Store (journal-backed, sole mutation point)
//! - [`txlog`] - Transaction Log (durable transfer records)
//! - [`transfer`] - Validator, Executor, Service state machine
//! - [`bank`] - Bootstrap: open, reconcile, seed
//! - [`gateway`] - axum JSON API
//! - [`config`] / [`logging`] - YAML config and tracing setup

// Core types - must be first!
pub mod core_types;

pub mod balance;
pub mod config;
pub mod logging;
pub mod money;
pub mod wal;

pub mod account;
pub mod txlog;

pub mod transfer;

pub mod bank;
pub mod gateway;

// Convenient re-exports at crate root
pub use account::{AccountStore, AccountView, StoreError};
pub use balance::Balance;
pub use bank::Bank;
pub use config::AppConfig;
pub use core_types::{AccountNo, MinorUnits};
pub use transfer::{
    TransferError, TransferId, TransferOutcome, TransferRecord, TransferRequest, TransferService,
    TransferState, TransferStatus,
};
pub use txlog::TxLog;
