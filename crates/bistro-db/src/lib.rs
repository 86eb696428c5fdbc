//! # bistro-db: Transactional Core for Bistro POS
//!
//! SQLite storage, transaction boundaries and the concurrency-safe
//! primitives the restaurant back office is built on.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bistro POS Data Flow                             │
//! │                                                                         │
//! │  Transport (HTTP / gRPC, outside this workspace)                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    bistro-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   service/      use-cases: onboarding, ledger, approvals,      │   │
//! │  │                 dining, cart, batch planning                   │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │   tx.rs         Database::atomic + post-commit hooks           │   │
//! │  │   uow.rs        BEGIN IMMEDIATE / COMMIT / ROLLBACK            │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │   repository/   CAS, counters, ledger, approvals, ranges       │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │   pool.rs       SqlitePool (WAL, busy timeout)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database (bistro.db)                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`uow`] - Unit of work over one physical transaction
//! - [`tx`] - Atomic blocks and post-commit hooks
//! - [`events`] - Domain events published after commit
//! - [`repository`] - Repository implementations and capability traits
//! - [`service`] - Use-cases composed from repositories
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bistro_db::prelude::*;
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let dining = DiningService::new(db.clone());
//! dining.open_table(table_id, order_id).await?;
//!
//! let ledger = LedgerService::new(db.clone());
//! ledger.post(store_id, LedgerKind::Income, Money::from_cents(1_250), None).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod handle;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;
pub mod tx;
pub mod uow;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, DbError, DbResult};
pub use events::{DomainEvent, EventBus};
pub use pool::{Database, DbConfig};
pub use tx::{HookQueue, TxScope};
pub use uow::{IsolationLevel, UnitOfWork};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::cart::CartLineRepository;
pub use repository::merchant::MerchantRepository;
pub use repository::reconciliation::ReconciliationRepository;
pub use repository::settlement::SettlementRepository;
pub use repository::store::StoreRepository;
pub use repository::table::TableRepository;
pub use repository::user::UserRepository;

/// Everything an application usually needs, capability traits included.
pub mod prelude {
    pub use crate::error::{DbError, DbResult};
    pub use crate::events::DomainEvent;
    pub use crate::pool::{Database, DbConfig};
    pub use crate::repository::range::{ReconciliationFilter, SettlementFilter, TransactionFilter};
    pub use crate::repository::reconciliation::NewReconciliation;
    pub use crate::repository::settlement::NewPointSettlement;
    pub use crate::repository::user::NewUser;
    pub use crate::repository::{
        ApprovalWorkflow, AtomicAdjuster, AtomicCounter, CounterChange, LockingReader,
        RangeAggregate, StatusTransition,
    };
    pub use crate::service::{
        BatchPlan, BatchPlanner, CartService, DiningService, LedgerService, MerchantService,
        NewMerchantBundle, ReconciliationService, SettlementService,
    };
    pub use crate::tx::TxScope;

    pub use bistro_core::{
        AccountDelta, ApprovalStatus, IdRange, IdWindow, LedgerKind, LedgerReference, Money,
        TableStatus,
    };
}
