//! # Repository Module
//!
//! Database repository implementations for Bistro POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and Capabilities                        │
//! │                                                                         │
//! │  db.tables()  / tx.tables()                                            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TableRepository ─────────── StatusTransition   (compare-and-swap)     │
//! │  CartLineRepository ──────── AtomicCounter      (in-place +/- 1)       │
//! │  AccountRepository ───────── LockingReader      (read under lock)      │
//! │                      └────── AtomicAdjuster     (col = col + delta)    │
//! │                      └────── RangeAggregate     (MIN/MAX/COUNT)        │
//! │  SettlementRepository ────── ApprovalWorkflow   (status + approver)    │
//! │  ReconciliationRepository ── ApprovalWorkflow                          │
//! │                      └────── RangeAggregate                            │
//! │  MerchantRepository ──────── LockingReader                             │
//! │  StoreRepository, UserRepository                                       │
//! │       │                                                                 │
//! │       │  Every mutation is a single SQL statement whose WHERE clause   │
//! │       │  carries its precondition. No read-modify-write in Rust.       │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The capability traits let use-cases be written against "something that can
//! do a compare-and-swap" rather than against a concrete table.

use async_trait::async_trait;

use bistro_core::{
    AccountDelta, ApprovalRecord, ApprovalStatus, IdRange, NewLedgerEntry, StoreAccountTransaction,
};

use crate::error::DbResult;

pub mod account;
pub mod approval;
pub mod cart;
pub mod merchant;
pub mod range;
pub mod reconciliation;
pub mod settlement;
pub mod store;
pub mod table;
pub mod user;

// =============================================================================
// Capability Traits
// =============================================================================

/// Guarded status change on a finite-state entity.
#[async_trait]
pub trait StatusTransition: Send {
    type Status: Copy + Send + 'static;

    /// Moves `id` from `from` to `to` and sets its reference column to
    /// `reference`, in one conditional statement.
    ///
    /// ## Returns
    /// * `Ok(true)` - the row was in `from` and now is in `to`
    /// * `Ok(false)` - the row was not in `from` (lost race) or does not exist
    async fn transition_status(
        &mut self,
        id: i64,
        reference: Option<i64>,
        from: Self::Status,
        to: Self::Status,
    ) -> DbResult<bool>;
}

/// What a decrement did to the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    Decremented,
    /// The count was 1; the row is gone.
    Removed,
}

/// Integer column changed in place, never through a read-modify-write.
#[async_trait]
pub trait AtomicCounter: Send {
    async fn increment(&mut self, id: i64) -> DbResult<()>;

    async fn increment_by(&mut self, id: i64, delta: i64) -> DbResult<()>;

    /// Removes the row at 1, otherwise subtracts 1. NotFound if the row is gone.
    async fn decrement(&mut self, id: i64) -> DbResult<CounterChange>;
}

/// Read that blocks other writers until the enclosing transaction ends.
///
/// Outside `atomic` this is a plain read.
#[async_trait]
pub trait LockingReader: Send {
    type Record: Send;

    async fn find_for_update(&mut self, key: i64) -> DbResult<Self::Record>;
}

/// Additive balance updates plus the append-only log that explains them.
#[async_trait]
pub trait AtomicAdjuster: Send {
    async fn adjust_amount(&mut self, store_id: i64, delta: AccountDelta) -> DbResult<()>;

    async fn record_transaction(&mut self, entry: NewLedgerEntry) -> DbResult<StoreAccountTransaction>;
}

/// Status column with the approver/approved_at pair that accompanies it.
#[async_trait]
pub trait ApprovalWorkflow: Send {
    type Record: ApprovalRecord + Send;

    /// Entity name used in errors and events.
    const ENTITY: &'static str;

    async fn find_by_id_for_update(&mut self, id: i64) -> DbResult<Self::Record>;

    /// Sets `status`; with `Some(approver)` also sets approver and approval
    /// time, with `None` clears both.
    async fn update_status(
        &mut self,
        id: i64,
        status: ApprovalStatus,
        approver_id: Option<i64>,
    ) -> DbResult<()>;
}

/// `MIN(id), MAX(id), COUNT(*)` over a filter.
#[async_trait]
pub trait RangeAggregate: Send {
    type Filter: Sync;

    async fn get_range(&mut self, filter: &Self::Filter) -> DbResult<IdRange>;
}
