//! # Money Module
//!
//! Provides the `Money` type for ledger amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  0.1 + 0.2 = 0.30000000000000004  ❌                                    │
//! │                                                                         │
//! │  A store account is adjusted thousands of times a day. Any drift       │
//! │  between balance and total − withdrawn − pending would be permanent.   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents end to end                                │
//! │    Rust i64 ──► SQLite INTEGER ──► `col = col + ?` in SQL              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bistro_core::money::Money;
//!
//! let income = Money::from_cents(1099);
//! assert_eq!(income.to_string(), "$10.99");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed: ledger deltas are negative for debits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use bistro_core::money::Money;
    ///
    /// let amount = Money::from_cents(1099);
    /// assert_eq!(amount.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display. Localized formatting belongs to the transport layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}${}.{:02}", sign, abs / 100, abs % 100)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::zero()), "$0.00");
        assert_eq!(format!("{}", Money::from_cents(i64::MIN)), "-$92233720368547758.08");
    }
}
