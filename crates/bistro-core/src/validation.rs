//! # Validation Module
//!
//! Input checks run before any statement is issued.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE (params errors, no I/O)                          │
//! │  ├── Empty / oversized names                                           │
//! │  └── Non-positive amounts, quantities, ids                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Repository preconditions                                     │
//! │  ├── Inconsistent ledger deltas                                        │
//! │  └── Illegal (status, approver) combinations                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (quantity > 0), UNIQUE (username), FOREIGN KEY              │
//! │  └── Predicate-on-write (status = ?, quantity > 1)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bistro_core::validation::{validate_amount_cents, validate_quantity};
//!
//! assert!(validate_quantity(2).is_ok());
//! assert!(validate_amount_cents("amount", 0).is_err());
//! ```

use crate::error::ValidationError;
use crate::{MAX_LINE_QUANTITY, MAX_RENEWAL_DAYS, MAX_WINDOW_SIZE};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (merchant, store, table, user display name).
///
/// ## Rules
/// - Must not be blank
/// - At most 100 characters after trimming
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > 100 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 100,
        });
    }

    Ok(())
}

/// Validates a login name.
///
/// ## Rules
/// - 1 to 32 characters
/// - ASCII alphanumerics, `.`, `_`, `-` only
pub fn validate_username(username: &str) -> ValidationResult<()> {
    if username.is_empty() {
        return Err(ValidationError::Required {
            field: "username".to_string(),
        });
    }

    if username.len() > 32 {
        return Err(ValidationError::TooLong {
            field: "username".to_string(),
            max: 32,
        });
    }

    let valid = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "username".to_string(),
            reason: "only letters, digits, '.', '_' and '-' are allowed".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a monetary magnitude (ledger events carry unsigned amounts).
pub fn validate_amount_cents(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a row id supplied by a caller.
pub fn validate_id(field: &str, id: i64) -> ValidationResult<()> {
    if id <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a cart quantity.
///
/// ## Rules
/// - 1 ..= MAX_LINE_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a merchant renewal length in days.
pub fn validate_renewal_days(days: i64) -> ValidationResult<()> {
    if !(1..=MAX_RENEWAL_DAYS).contains(&days) {
        return Err(ValidationError::OutOfRange {
            field: "days".to_string(),
            min: 1,
            max: MAX_RENEWAL_DAYS,
        });
    }

    Ok(())
}

/// Validates a batch window size.
pub fn validate_window_size(size: i64) -> ValidationResult<()> {
    if !(1..=MAX_WINDOW_SIZE).contains(&size) {
        return Err(ValidationError::OutOfRange {
            field: "window size".to_string(),
            min: 1,
            max: MAX_WINDOW_SIZE,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Table 4").is_ok());
        assert!(validate_name("name", "   ").is_err());
        assert!(validate_name("name", &"A".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("chef.ana").is_ok());
        assert!(validate_username("admin_01").is_ok());

        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"a".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amount_and_id() {
        assert!(validate_amount_cents("amount", 1).is_ok());
        assert!(validate_amount_cents("amount", 0).is_err());
        assert!(validate_id("store_id", 0).is_err());
        assert!(validate_id("store_id", 12).is_ok());
    }

    #[test]
    fn test_validate_renewal_and_window() {
        assert!(validate_renewal_days(30).is_ok());
        assert!(validate_renewal_days(0).is_err());
        assert!(validate_renewal_days(MAX_RENEWAL_DAYS + 1).is_err());

        assert!(validate_window_size(500).is_ok());
        assert!(validate_window_size(0).is_err());
    }
}
