//! # Transactional Store
//!
//! `Database::atomic` runs a block of repository calls as one unit of work.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.atomic(|tx| Box::pin(async move { ... }))                           │
//! │     │                                                                   │
//! │     ├── already inside atomic on this store? ──► ReentrantTransaction  │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BEGIN IMMEDIATE ──► TxScope { unit of work, HookQueue }               │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  block(tx)                                                              │
//! │     ├── Ok(v)   ──► COMMIT ──► run hooks in order ──► Ok(v)            │
//! │     ├── Err(e)  ──► ROLLBACK ──► Err(e)                                 │
//! │     │                  └── rollback fails ──► Err(Rollback { e, .. })   │
//! │     └── panic   ──► ROLLBACK ──► resume the panic                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use bistro_db::prelude::*;
//!
//! let txn = db
//!     .atomic(move |tx| {
//!         Box::pin(async move {
//!             let mut accounts = tx.accounts();
//!             accounts.adjust_amount(store_id, delta).await?;
//!             accounts.record_transaction(entry).await
//!         })
//!     })
//!     .await?;
//! ```
//!
//! Hooks run on the calling task, after commit, and only once. A hook that
//! panics is logged and skipped; the commit stands.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::SqliteConnection;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::events::{DomainEvent, EventBus};
use crate::handle::DbHandle;
use crate::pool::Database;
use crate::repository::account::AccountRepository;
use crate::repository::cart::CartLineRepository;
use crate::repository::merchant::MerchantRepository;
use crate::repository::reconciliation::ReconciliationRepository;
use crate::repository::settlement::SettlementRepository;
use crate::repository::store::StoreRepository;
use crate::repository::table::TableRepository;
use crate::repository::user::UserRepository;
use crate::uow::{IsolationLevel, UnitOfWork};

tokio::task_local! {
    /// Stores with an atomic block open on the current task.
    static ACTIVE_STORES: Vec<Uuid>;
}

// =============================================================================
// Hook Queue
// =============================================================================

/// A side effect to run after commit.
pub type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Ordered post-commit hooks of one transaction.
#[derive(Clone, Default)]
pub struct HookQueue {
    inner: Arc<Mutex<Vec<Hook>>>,
}

impl HookQueue {
    pub fn push(&self, hook: Hook) {
        self.lock().push(hook);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn take(&self) -> Vec<Hook> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Hook>> {
        // A poisoned queue still holds valid boxed closures.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for HookQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookQueue").field("len", &self.len()).finish()
    }
}

fn run_hooks(hooks: Vec<Hook>) {
    let total = hooks.len();
    for (index, hook) in hooks.into_iter().enumerate() {
        if std::panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
            warn!(index, total, "Post-commit hook panicked");
        }
    }
}

// =============================================================================
// Transaction Scope
// =============================================================================

/// The open transaction handed to an atomic block.
///
/// Repositories obtained here run on the transaction's connection and
/// defer their events to the scope's hook queue.
pub struct TxScope {
    uow: UnitOfWork,
    hooks: HookQueue,
    events: EventBus,
}

impl TxScope {
    fn new(uow: UnitOfWork, events: EventBus) -> Self {
        TxScope {
            uow,
            hooks: HookQueue::default(),
            events,
        }
    }

    /// Registers `hook` to run once, after this transaction commits.
    pub fn add_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.push(Box::new(hook));
    }

    /// Publishes `event` after commit.
    pub fn publish(&self, event: DomainEvent) {
        let events = self.events.clone();
        self.add_hook(move || events.publish(event));
    }

    /// Connection of the open transaction, for statements no repository covers.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        self.uow.conn()
    }

    pub fn pending_hooks(&self) -> usize {
        self.hooks.len()
    }

    fn handle(&mut self) -> DbHandle<'_> {
        DbHandle::bound(self.uow.conn(), self.hooks.clone(), self.events.clone())
    }

    pub fn tables(&mut self) -> TableRepository<'_> {
        TableRepository::new(self.handle())
    }

    pub fn cart_lines(&mut self) -> CartLineRepository<'_> {
        CartLineRepository::new(self.handle())
    }

    pub fn accounts(&mut self) -> AccountRepository<'_> {
        AccountRepository::new(self.handle())
    }

    pub fn settlements(&mut self) -> SettlementRepository<'_> {
        SettlementRepository::new(self.handle())
    }

    pub fn reconciliations(&mut self) -> ReconciliationRepository<'_> {
        ReconciliationRepository::new(self.handle())
    }

    pub fn merchants(&mut self) -> MerchantRepository<'_> {
        MerchantRepository::new(self.handle())
    }

    pub fn stores(&mut self) -> StoreRepository<'_> {
        StoreRepository::new(self.handle())
    }

    pub fn users(&mut self) -> UserRepository<'_> {
        UserRepository::new(self.handle())
    }
}

// =============================================================================
// Atomic
// =============================================================================

impl Database {
    /// Runs `block` inside one transaction on this store.
    ///
    /// ## Returns
    /// * `Ok(value)` - committed; hooks have already run
    /// * `Err(ReentrantTransaction)` - called from inside another `atomic`
    ///   on the same store; nothing was started
    /// * `Err(e)` - the block failed (or begin/commit failed); rolled back
    ///
    /// A panic inside `block` rolls back and then continues unwinding.
    pub async fn atomic<R, F>(&self, block: F) -> DbResult<R>
    where
        F: for<'t> FnOnce(&'t mut TxScope) -> BoxFuture<'t, DbResult<R>> + Send,
        R: Send,
    {
        let mut active = ACTIVE_STORES.try_with(Clone::clone).unwrap_or_default();
        if active.contains(&self.id()) {
            warn!(store = %self.id(), "Nested atomic block rejected");
            return Err(DbError::ReentrantTransaction);
        }
        active.push(self.id());

        ACTIVE_STORES.scope(active, self.run_atomic(block)).await
    }

    /// Whether the current task is inside an atomic block on this store.
    pub fn in_atomic(&self) -> bool {
        ACTIVE_STORES
            .try_with(|active| active.contains(&self.id()))
            .unwrap_or(false)
    }

    async fn run_atomic<R, F>(&self, block: F) -> DbResult<R>
    where
        F: for<'t> FnOnce(&'t mut TxScope) -> BoxFuture<'t, DbResult<R>> + Send,
        R: Send,
    {
        let uow = UnitOfWork::begin(self.pool(), IsolationLevel::RepeatableRead).await?;
        let mut scope = TxScope::new(uow, self.events().clone());

        let outcome = AssertUnwindSafe(async { block(&mut scope).await })
            .catch_unwind()
            .await;

        let TxScope { uow, hooks, .. } = scope;

        match outcome {
            Ok(Ok(value)) => {
                uow.commit().await?;
                let hooks = hooks.take();
                debug!(hooks = hooks.len(), "Atomic block committed");
                run_hooks(hooks);
                Ok(value)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Atomic block failed, rolling back");
                match uow.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback) => {
                        error!(error = %err, rollback = %rollback, "Rollback failed");
                        Err(DbError::Rollback {
                            source: Box::new(err),
                            rollback: rollback.to_string(),
                        })
                    }
                }
            }
            Err(panic) => {
                warn!("Atomic block panicked, rolling back");
                if let Err(rollback) = uow.rollback().await {
                    error!(rollback = %rollback, "Rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
