//! # Ledger Service
//!
//! Posts balance-affecting events against a store account.
//!
//! ## Posting Flow
//! ```text
//! post(store, kind, amount)
//!    │
//!    ▼  atomic
//! find_for_update(store) ──► balances now
//!    │
//!    ▼
//! kind.delta(amount) ──► checked_apply ──► overdraft? ──► InsufficientBalance
//!    │                                                     (rolled back)
//!    ▼
//! adjust_amount(delta)        one UPDATE, four columns
//! record_transaction(entry)   after_cents = predicted balance
//!    │
//!    ▼  commit ──► LedgerPosted
//! ```

use tracing::info;

use bistro_core::validation::validate_amount_cents;
use bistro_core::{
    AccountBalances, LedgerKind, LedgerReference, Money, NewLedgerEntry, StoreAccount,
    StoreAccountTransaction,
};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::{AtomicAdjuster, LockingReader};

/// Posts ledger events.
#[derive(Debug, Clone)]
pub struct LedgerService {
    db: Database,
}

impl LedgerService {
    pub fn new(db: Database) -> Self {
        LedgerService { db }
    }

    /// Applies `kind` for `amount` to the store account and logs it.
    ///
    /// ## Errors
    /// * `NotFound` - the store has no account
    /// * `Domain(InsufficientBalance | InsufficientPending)` - nothing written
    /// * `Domain(AmountOverflow)` - a column would leave the i64 range
    pub async fn post(
        &self,
        store_id: i64,
        kind: LedgerKind,
        amount: Money,
        reference: Option<LedgerReference>,
    ) -> DbResult<StoreAccountTransaction> {
        validate_amount_cents("amount", amount.cents())?;

        let entry = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    post_entry(&mut tx.accounts(), store_id, kind, amount, reference.as_ref()).await
                })
            })
            .await?;

        info!(
            store_id,
            kind = kind.as_str(),
            amount = %amount,
            after = entry.after_cents,
            "Ledger posted"
        );
        Ok(entry)
    }
}

/// Locked read, sufficiency check, adjustment and log entry.
///
/// Must run inside an atomic block so the read and the write see the same row.
pub(crate) async fn post_entry<L>(
    ledger: &mut L,
    store_id: i64,
    kind: LedgerKind,
    amount: Money,
    reference: Option<&LedgerReference>,
) -> DbResult<StoreAccountTransaction>
where
    L: LockingReader<Record = StoreAccount> + AtomicAdjuster,
{
    let account = ledger.find_for_update(store_id).await?;
    let delta = kind.delta(amount);
    let next = AccountBalances::from(&account).checked_apply(store_id, &delta, amount.cents())?;

    ledger.adjust_amount(store_id, delta).await?;

    let reference = reference.map(LedgerReference::to_json).transpose()?;
    ledger
        .record_transaction(NewLedgerEntry {
            store_id,
            account_id: account.id,
            kind,
            amount_cents: amount.cents(),
            after_cents: next.balance_cents,
            reference,
        })
        .await
}

// =============================================================================
// Unit Tests
// =============================================================================
