//! # Approval Services
//!
//! Back-office review of point settlements and daily reconciliations.
//!
//! ## Workflow
//! ```text
//!                approve (approver required)
//!   Pending ─────────────────────────────────► Approved
//!      │  ◄───────────────────────────────────    │
//!      │        revert (approver cleared)         │
//!      │                                          │
//!      └── reject (reviewer optional) ──► Rejected (final)
//! ```
//!
//! Every step reads the record under the transaction's write lock, checks
//! the move is legal for the status it actually has, then writes. Two
//! reviewers racing on the same record serialize; the loser sees the
//! winner's status and gets `IllegalTransition`.
//!
//! Settlements also move money: approval credits the store ledger, revert
//! debits it back.

use tracing::info;

use bistro_core::validation::validate_id;
use bistro_core::{
    ApprovalRecord, ApprovalStatus, CoreError, LedgerKind, LedgerReference, Money,
    PointSettlement, ReconciliationRecord,
};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::ApprovalWorkflow;
use crate::service::ledger::post_entry;

/// Locked read, legality check, status write. Returns the record as it was
/// before the write.
async fn transition<W>(
    workflow: &mut W,
    id: i64,
    to: ApprovalStatus,
    approver_id: Option<i64>,
) -> DbResult<W::Record>
where
    W: ApprovalWorkflow,
{
    let record = workflow.find_by_id_for_update(id).await?;
    let from = record.status();
    if !from.can_transition_to(to) {
        return Err(CoreError::IllegalTransition {
            entity: W::ENTITY,
            id,
            from,
            to,
        }
        .into());
    }

    workflow.update_status(id, to, approver_id).await?;
    Ok(record)
}

// =============================================================================
// Point Settlements
// =============================================================================

/// Approval of loyalty-point settlements, with their ledger effect.
#[derive(Debug, Clone)]
pub struct SettlementService {
    db: Database,
}

impl SettlementService {
    pub fn new(db: Database) -> Self {
        SettlementService { db }
    }

    /// `Pending → Approved`, crediting the settlement amount to the store.
    pub async fn approve(&self, id: i64, approver_id: i64) -> DbResult<PointSettlement> {
        validate_id("approver_id", approver_id)?;

        let settlement = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    let before =
                        transition(&mut tx.settlements(), id, ApprovalStatus::Approved, Some(approver_id))
                            .await?;
                    post_entry(
                        &mut tx.accounts(),
                        before.store_id,
                        LedgerKind::Income,
                        Money::from_cents(before.amount_cents),
                        Some(&LedgerReference::settlement(id)),
                    )
                    .await?;
                    tx.settlements().find_by_id(id).await
                })
            })
            .await?;

        info!(id, approver_id, amount = settlement.amount_cents, "Settlement approved");
        Ok(settlement)
    }

    /// `Approved → Pending`, debiting the amount back.
    ///
    /// Fails with `InsufficientBalance` if the store already spent it.
    pub async fn revert(&self, id: i64) -> DbResult<PointSettlement> {
        let settlement = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    let before = transition(&mut tx.settlements(), id, ApprovalStatus::Pending, None).await?;
                    post_entry(
                        &mut tx.accounts(),
                        before.store_id,
                        LedgerKind::SettlementReversal,
                        Money::from_cents(before.amount_cents),
                        Some(&LedgerReference::settlement(id)),
                    )
                    .await?;
                    tx.settlements().find_by_id(id).await
                })
            })
            .await?;

        info!(id, "Settlement reverted");
        Ok(settlement)
    }

    /// `Pending → Rejected`. No ledger effect.
    pub async fn reject(&self, id: i64, reviewer_id: Option<i64>) -> DbResult<PointSettlement> {
        let settlement = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    transition(&mut tx.settlements(), id, ApprovalStatus::Rejected, reviewer_id).await?;
                    tx.settlements().find_by_id(id).await
                })
            })
            .await?;

        info!(id, ?reviewer_id, "Settlement rejected");
        Ok(settlement)
    }
}

// =============================================================================
// Reconciliations
// =============================================================================

/// Approval of daily reconciliations.
#[derive(Debug, Clone)]
pub struct ReconciliationService {
    db: Database,
}

impl ReconciliationService {
    pub fn new(db: Database) -> Self {
        ReconciliationService { db }
    }

    pub async fn approve(&self, id: i64, approver_id: i64) -> DbResult<ReconciliationRecord> {
        validate_id("approver_id", approver_id)?;
        self.apply(id, ApprovalStatus::Approved, Some(approver_id)).await
    }

    pub async fn revert(&self, id: i64) -> DbResult<ReconciliationRecord> {
        self.apply(id, ApprovalStatus::Pending, None).await
    }

    pub async fn reject(&self, id: i64, reviewer_id: Option<i64>) -> DbResult<ReconciliationRecord> {
        self.apply(id, ApprovalStatus::Rejected, reviewer_id).await
    }

    async fn apply(
        &self,
        id: i64,
        to: ApprovalStatus,
        approver_id: Option<i64>,
    ) -> DbResult<ReconciliationRecord> {
        let record = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    transition(&mut tx.reconciliations(), id, to, approver_id).await?;
                    tx.reconciliations().find_by_id(id).await
                })
            })
            .await?;

        info!(id, status = to.as_str(), variance = record.variance_cents(), "Reconciliation reviewed");
        Ok(record)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
