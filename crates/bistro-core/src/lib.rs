//! # bistro-core: Pure Domain Logic for Bistro POS
//!
//! Entities, statuses and the arithmetic rules behind the restaurant back
//! office. Everything here is deterministic and free of I/O; the database
//! crate (`bistro-db`) decides *when* a rule runs, this crate decides *what*
//! the rule says.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bistro POS Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Transport (HTTP / gRPC, outside this workspace)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │           bistro-db services (atomic use-cases)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bistro-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │   range   │  │   │
//! │  │   │ DineTable │  │   Money   │  │ Delta     │  │  IdRange  │  │   │
//! │  │   │ Settlement│  │           │  │ Balances  │  │  windows  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entities and status enums (tables, carts, accounts, batches)
//! - [`money`] - Money type over integer cents
//! - [`ledger`] - Four-column account deltas and their invariant
//! - [`range`] - Id range summaries and batch windows
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use bistro_core::ledger::{AccountBalances, LedgerKind};
//! use bistro_core::money::Money;
//!
//! let balances = AccountBalances::default()
//!     .checked_apply(1, &LedgerKind::Income.delta(Money::from_cents(10_000)), 10_000)
//!     .and_then(|b| b.checked_apply(1, &LedgerKind::WithdrawApply.delta(Money::from_cents(2_500)), 2_500))
//!     .unwrap();
//!
//! assert_eq!(balances.balance_cents, 7_500);
//! assert!(balances.is_consistent());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod range;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, ValidationError};
pub use ledger::{AccountBalances, AccountDelta};
pub use money::Money;
pub use range::{IdRange, IdWindow};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Longest merchant renewal accepted in a single call (days).
pub const MAX_RENEWAL_DAYS: i64 = 3660;

/// Upper bound for a batch window produced from an [`IdRange`].
pub const MAX_WINDOW_SIZE: i64 = 100_000;
