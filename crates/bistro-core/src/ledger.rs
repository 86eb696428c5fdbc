//! # Ledger Math
//!
//! Pure arithmetic behind store account adjustments.
//!
//! ## The Four Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store_accounts                                                         │
//! │                                                                         │
//! │   balance  =  total_amount  −  withdrawn  −  pending_withdraw          │
//! │                                                                         │
//! │  Every event moves the columns by a delta that preserves the identity: │
//! │                                                                         │
//! │   kind                 balance  pending  withdrawn  total              │
//! │   ─────────────────    ───────  ───────  ─────────  ─────              │
//! │   income                 +a                           +a               │
//! │   withdraw_apply         −a       +a                                   │
//! │   withdraw_approve                −a        +a                         │
//! │   withdraw_reject        +a       −a                                   │
//! │   refund                 −a                           −a               │
//! │   settlement_reversal    −a                           −a               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The database applies a delta with `col = col + ?` for all four columns in
//! one statement; this module only decides what the delta is and whether the
//! resulting balances are acceptable.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::StoreAccount;

pub use crate::types::LedgerKind;

// =============================================================================
// Account Delta
// =============================================================================

/// Signed change to the four ledger columns, in cents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDelta {
    pub balance: i64,
    pub pending_withdraw: i64,
    pub withdrawn: i64,
    pub total: i64,
}

impl AccountDelta {
    /// Checks `balance == total − withdrawn − pending_withdraw` for the delta.
    ///
    /// ```rust
    /// use bistro_core::ledger::AccountDelta;
    ///
    /// let ok = AccountDelta { balance: 100, total: 100, ..Default::default() };
    /// let broken = AccountDelta { balance: 100, ..Default::default() };
    /// assert!(ok.is_consistent());
    /// assert!(!broken.is_consistent());
    /// ```
    ///
    /// A delta whose columns cannot be combined without overflowing is not
    /// consistent.
    pub fn is_consistent(&self) -> bool {
        self.total
            .checked_sub(self.withdrawn)
            .and_then(|v| v.checked_sub(self.pending_withdraw))
            == Some(self.balance)
    }

    pub fn is_zero(&self) -> bool {
        *self == AccountDelta::default()
    }
}

impl LedgerKind {
    /// Delta produced by an event of this kind for an unsigned `amount`.
    pub fn delta(&self, amount: Money) -> AccountDelta {
        let a = amount.cents();
        match self {
            LedgerKind::Income => AccountDelta {
                balance: a,
                total: a,
                ..Default::default()
            },
            LedgerKind::WithdrawApply => AccountDelta {
                balance: -a,
                pending_withdraw: a,
                ..Default::default()
            },
            LedgerKind::WithdrawApprove => AccountDelta {
                pending_withdraw: -a,
                withdrawn: a,
                ..Default::default()
            },
            LedgerKind::WithdrawReject => AccountDelta {
                balance: a,
                pending_withdraw: -a,
                ..Default::default()
            },
            LedgerKind::Refund | LedgerKind::SettlementReversal => AccountDelta {
                balance: -a,
                total: -a,
                ..Default::default()
            },
        }
    }
}

// =============================================================================
// Account Balances
// =============================================================================

/// Snapshot of the four columns, used to predict the effect of a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBalances {
    pub balance_cents: i64,
    pub pending_withdraw_cents: i64,
    pub withdrawn_cents: i64,
    pub total_amount_cents: i64,
}

impl From<&StoreAccount> for AccountBalances {
    fn from(account: &StoreAccount) -> Self {
        AccountBalances {
            balance_cents: account.balance_cents,
            pending_withdraw_cents: account.pending_withdraw_cents,
            withdrawn_cents: account.withdrawn_cents,
            total_amount_cents: account.total_amount_cents,
        }
    }
}

impl AccountBalances {
    /// Returns the balances after `delta`, or `None` if any column overflows.
    pub fn apply(&self, delta: &AccountDelta) -> Option<AccountBalances> {
        Some(AccountBalances {
            balance_cents: self.balance_cents.checked_add(delta.balance)?,
            pending_withdraw_cents: self
                .pending_withdraw_cents
                .checked_add(delta.pending_withdraw)?,
            withdrawn_cents: self.withdrawn_cents.checked_add(delta.withdrawn)?,
            total_amount_cents: self.total_amount_cents.checked_add(delta.total)?,
        })
    }

    pub fn is_consistent(&self) -> bool {
        self.total_amount_cents
            .checked_sub(self.withdrawn_cents)
            .and_then(|v| v.checked_sub(self.pending_withdraw_cents))
            == Some(self.balance_cents)
    }

    /// Applies `delta` and rejects results that would overdraw the account
    /// or leave a column outside the i64 range.
    ///
    /// `requested` is the magnitude quoted back in the error.
    ///
    /// ```rust
    /// use bistro_core::ledger::{AccountBalances, LedgerKind};
    /// use bistro_core::money::Money;
    ///
    /// let start = AccountBalances { balance_cents: 50, total_amount_cents: 50, ..Default::default() };
    /// let delta = LedgerKind::WithdrawApply.delta(Money::from_cents(80));
    /// assert!(start.checked_apply(1, &delta, 80).is_err());
    /// ```
    pub fn checked_apply(
        &self,
        store_id: i64,
        delta: &AccountDelta,
        requested: i64,
    ) -> CoreResult<AccountBalances> {
        let next = self
            .apply(delta)
            .ok_or(CoreError::AmountOverflow { store_id, requested })?;

        if next.balance_cents < 0 {
            return Err(CoreError::InsufficientBalance {
                store_id,
                available: self.balance_cents,
                requested,
            });
        }

        if next.pending_withdraw_cents < 0 {
            return Err(CoreError::InsufficientPending {
                store_id,
                pending: self.pending_withdraw_cents,
                requested,
            });
        }

        Ok(next)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
