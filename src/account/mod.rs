//! Account Store
//!
//! Durable keyed storage of customer accounts. The store is the sole
//! serialization point for balance mutation: presentation code reads
//! through [`AccountStore::get`] / [`AccountStore::list`], and only the
//! transfer executor's apply paths write.

pub mod journal;
pub mod models;
pub mod store;

// Re-exports for convenience
pub use journal::{FileJournal, Journal, JournalOp};
pub use models::{Account, AccountView};
pub use store::{AccountStore, AppliedTransfer, StoreError};
