//! # Use-Case Services
//!
//! Business operations composed from repository primitives.
//!
//! ## Layering
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Service Layer                                  │
//! │                                                                         │
//! │  Transport (outside this workspace)                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MerchantService  LedgerService  SettlementService  DiningService ...  │
//! │       │                                                                 │
//! │       │  db.atomic(|tx| ..)   one transaction per use-case             │
//! │       │  tx.publish(event)    delivered after commit                   │
//! │       ▼                                                                 │
//! │  Repositories (CAS, counters, ledger, approvals, ranges)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services are cheap to clone; each holds a `Database` handle.

pub mod approval;
pub mod batch;
pub mod cart;
pub mod dining;
pub mod ledger;
pub mod merchant;

pub use approval::{ReconciliationService, SettlementService};
pub use batch::{BatchPlan, BatchPlanner};
pub use cart::CartService;
pub use dining::DiningService;
pub use ledger::LedgerService;
pub use merchant::{MerchantBundle, MerchantService, NewMerchantBundle};
