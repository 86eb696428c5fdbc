//! # Error Types
//!
//! Domain-specific error types for bistro-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bistro-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bistro-db errors (separate crate)                                     │
//! │  └── DbError          - NotFound / Conflict / Params / infrastructure  │
//! │                                                                         │
//! │  Flow: ValidationError → DbError::Validation (params error)            │
//! │        CoreError       → DbError::Domain     (conflict)                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::types::ApprovalStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Every variant describes a request that was well-formed but cannot be
/// honoured in the current state of the data. The database layer classifies
/// all of them as conflicts.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The account cannot cover a debit.
    ///
    /// ## User Workflow
    /// ```text
    /// Withdraw request: $300
    ///      │
    ///      ▼
    /// Locked read: balance = $250
    ///      │
    ///      ▼
    /// InsufficientBalance { store_id: 7, available: 25000, requested: 30000 }
    ///      │
    ///      ▼
    /// Nothing written, transaction rolled back
    /// ```
    #[error("Insufficient balance for store {store_id}: available {available}, requested {requested}")]
    InsufficientBalance {
        store_id: i64,
        available: i64,
        requested: i64,
    },

    /// A pending-withdraw debit larger than what is pending.
    #[error("Store {store_id} has only {pending} pending for withdrawal, requested {requested}")]
    InsufficientPending {
        store_id: i64,
        pending: i64,
        requested: i64,
    },

    /// A posting would push one of the account columns outside the i64 range.
    #[error("Amount {requested} would overflow the account of store {store_id}")]
    AmountOverflow { store_id: i64, requested: i64 },

    /// Approval workflow transition that the batch's current status forbids.
    #[error("{entity} {id} cannot move from {from:?} to {to:?}")]
    IllegalTransition {
        entity: &'static str,
        id: i64,
        from: ApprovalStatus,
        to: ApprovalStatus,
    },

    /// Merchant is disabled and cannot be renewed or extended.
    #[error("Merchant {0} is disabled")]
    MerchantDisabled(i64),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any statement is issued.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientBalance {
            store_id: 7,
            available: 25_000,
            requested: 30_000,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance for store 7: available 25000, requested 30000"
        );

        let err = CoreError::IllegalTransition {
            entity: "PointSettlement",
            id: 3,
            from: ApprovalStatus::Rejected,
            to: ApprovalStatus::Approved,
        };
        assert_eq!(
            err.to_string(),
            "PointSettlement 3 cannot move from Rejected to Approved"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "username".to_string(),
        };
        assert_eq!(err.to_string(), "username is required");

        let err = ValidationError::MustBePositive {
            field: "amount".to_string(),
        };
        assert_eq!(err.to_string(), "amount must be positive");
    }
}
