//! Data models for customer accounts

use serde::{Deserialize, Serialize};

use crate::balance::Balance;
use crate::core_types::{AccountNo, MinorUnits};

/// A customer account.
///
/// # Invariants (enforced by private fields):
/// 1. Identity fields are immutable after opening
/// 2. The balance can only change through the validated `Balance` ops,
///    and only the store's journaled apply paths call them
#[derive(Debug, Clone)]
pub struct Account {
    account_no: AccountNo,
    owner: String,
    email: Option<String>,
    routing: String,
    balance: Balance,
    opened_at: i64,
}

impl Account {
    /// Create an account with an opening balance (account-opening path).
    pub fn open(
        account_no: AccountNo,
        owner: String,
        email: Option<String>,
        routing: String,
        opening_minor: MinorUnits,
        opened_at: i64,
    ) -> Self {
        Self {
            account_no,
            owner,
            email,
            routing,
            balance: Balance::opening(opening_minor),
            opened_at,
        }
    }

    #[inline(always)]
    pub fn account_no(&self) -> &str {
        &self.account_no
    }

    #[inline(always)]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    #[inline(always)]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    #[inline(always)]
    pub fn routing(&self) -> &str {
        &self.routing
    }

    #[inline(always)]
    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    /// Mutable balance access, restricted to the store's apply paths.
    #[inline(always)]
    pub(crate) fn balance_mut(&mut self) -> &mut Balance {
        &mut self.balance
    }

    /// Read-only snapshot for API consumers.
    pub fn view(&self) -> AccountView {
        AccountView {
            account_no: self.account_no.clone(),
            owner: self.owner.clone(),
            email: self.email.clone(),
            routing: self.routing.clone(),
            balance_minor: self.balance.minor(),
            balance_version: self.balance.version(),
            opened_at: self.opened_at,
        }
    }
}

/// Immutable snapshot of an account, safe to hand to presentation code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountView {
    pub account_no: AccountNo,
    pub owner: String,
    pub email: Option<String>,
    pub routing: String,
    pub balance_minor: MinorUnits,
    pub balance_version: u64,
    pub opened_at: i64,
}
