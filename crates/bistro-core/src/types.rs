//! # Domain Types
//!
//! Entities and statuses touched by the transactional core.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Merchant ──1:n──► Store ──1:1──► StoreAccount ──1:n──► AccountTxn     │
//! │      │               │                                                  │
//! │      └──1:n──► User  ├──1:n──► DineTable ──1:n──► CartLine             │
//! │                      ├──1:n──► PointSettlement      (approval batch)   │
//! │                      └──1:n──► ReconciliationRecord (approval batch)   │
//! │                                                                         │
//! │  Mutated in place:   DineTable.status, CartLine.quantity,              │
//! │                      StoreAccount.* , batch status/approver            │
//! │  Append-only:        StoreAccountTransaction                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Row ids are integers (so batch jobs can window on them). Entities that are
//! quoted to humans also carry a UUID business number (`merchant_no`, `no`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Merchant / Store / User
// =============================================================================

/// Whether a merchant may operate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MerchantStatus {
    Active,
    Disabled,
}

/// A tenant of the platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Merchant {
    pub id: i64,
    /// Human-facing business number (UUID v4).
    pub merchant_no: String,
    pub name: String,
    pub status: MerchantStatus,
    /// Subscription end. Renewal extends from `max(expire_at, now)`.
    pub expire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    /// Checks if the subscription has lapsed at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }
}

/// A physical restaurant belonging to a merchant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Store {
    pub id: i64,
    pub merchant_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Role of a back-office user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Manager,
    Staff,
}

/// A merchant-level or store-level back-office user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub merchant_id: i64,
    /// `None` for merchant-wide users.
    pub store_id: Option<i64>,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Dine Table
// =============================================================================

/// Occupancy state of a dine-in table.
///
/// ## Lifecycle
/// ```text
///            reserve              open (order)
///   Idle ───────────► Reserved ───────────────► Occupied
///    ▲  ╲                │ cancel                  │ release
///    │   ╲ open (order)  ▼                         ▼
///    │    ╲────────────► Idle                   Cleaning
///    │                                             │
///    └──────────────── finish cleaning ────────────┘
/// ```
/// Every arrow is a compare-and-swap on the stored status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Idle,
    Occupied,
    Reserved,
    Cleaning,
}

impl TableStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Idle => "idle",
            TableStatus::Occupied => "occupied",
            TableStatus::Reserved => "reserved",
            TableStatus::Cleaning => "cleaning",
        }
    }
}

impl Default for TableStatus {
    fn default() -> Self {
        TableStatus::Idle
    }
}

/// A dine-in table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DineTable {
    pub id: i64,
    pub store_id: i64,
    pub name: String,
    pub status: TableStatus,
    /// Order currently seated at the table; `None` unless occupied.
    pub order_id: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Cart Line
// =============================================================================

/// A line on a table's open cart.
///
/// `quantity` is always > 0; reaching zero deletes the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CartLine {
    pub id: i64,
    pub table_id: i64,
    pub product_id: i64,
    /// Canonical variant/attribute key ("" when the product has no variants).
    pub variant_key: String,
    pub quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Store Account (ledger)
// =============================================================================

/// Balance summary row of a store.
///
/// `balance = total_amount − withdrawn − pending_withdraw` holds after every
/// adjustment because every adjustment moves the four columns together.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StoreAccount {
    pub id: i64,
    pub store_id: i64,
    pub balance_cents: i64,
    pub pending_withdraw_cents: i64,
    pub withdrawn_cents: i64,
    pub total_amount_cents: i64,
    pub updated_at: DateTime<Utc>,
}

/// Kind of a balance-affecting event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Settled revenue credited to the store.
    Income,
    /// Withdrawal requested: balance moves to pending.
    WithdrawApply,
    /// Withdrawal paid out: pending moves to withdrawn.
    WithdrawApprove,
    /// Withdrawal refused: pending moves back to balance.
    WithdrawReject,
    /// Revenue handed back to a customer.
    Refund,
    /// An approved settlement was reverted.
    SettlementReversal,
}

impl LedgerKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LedgerKind::Income => "income",
            LedgerKind::WithdrawApply => "withdraw_apply",
            LedgerKind::WithdrawApprove => "withdraw_approve",
            LedgerKind::WithdrawReject => "withdraw_reject",
            LedgerKind::Refund => "refund",
            LedgerKind::SettlementReversal => "settlement_reversal",
        }
    }
}

/// Immutable ledger log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StoreAccountTransaction {
    pub id: i64,
    /// Business number (UUID v4).
    pub no: String,
    pub store_id: i64,
    pub account_id: i64,
    pub kind: LedgerKind,
    /// Unsigned magnitude of the event.
    pub amount_cents: i64,
    /// Balance snapshot right after the adjustment.
    pub after_cents: i64,
    /// Optional JSON reference to the business object behind the entry.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payload for appending a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub store_id: i64,
    pub account_id: i64,
    pub kind: LedgerKind,
    pub amount_cents: i64,
    pub after_cents: i64,
    pub reference: Option<String>,
}

/// What a ledger entry points back to. Stored as JSON text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdraw_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl LedgerReference {
    pub fn settlement(id: i64) -> Self {
        LedgerReference {
            settlement_id: Some(id),
            ..Default::default()
        }
    }

    /// Serializes the reference into the text stored on the ledger row.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Approval batches
// =============================================================================

/// Status of a settlement or reconciliation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Whether an approver must, may, or must not accompany a target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproverRule {
    Required,
    Optional,
    Forbidden,
}

impl ApprovalStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Approver/approved_at combination enforced when moving *to* this status.
    ///
    /// ```rust
    /// use bistro_core::types::{ApprovalStatus, ApproverRule};
    ///
    /// assert_eq!(ApprovalStatus::Approved.approver_rule(), ApproverRule::Required);
    /// assert_eq!(ApprovalStatus::Pending.approver_rule(), ApproverRule::Forbidden);
    /// ```
    pub const fn approver_rule(&self) -> ApproverRule {
        match self {
            ApprovalStatus::Approved => ApproverRule::Required,
            ApprovalStatus::Pending => ApproverRule::Forbidden,
            ApprovalStatus::Rejected => ApproverRule::Optional,
        }
    }

    /// Workflow transitions exercised by the back office.
    ///
    /// `Pending → Approved`, `Approved → Pending` (reversal),
    /// `Pending → Rejected`.
    pub const fn can_transition_to(&self, to: ApprovalStatus) -> bool {
        matches!(
            (self, to),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Approved, ApprovalStatus::Pending)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
        )
    }
}

impl Default for ApprovalStatus {
    fn default() -> Self {
        ApprovalStatus::Pending
    }
}

/// Loyalty-point settlement batch for a store and period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PointSettlement {
    pub id: i64,
    pub store_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_points: i64,
    /// Amount credited to the store account on approval.
    pub amount_cents: i64,
    pub status: ApprovalStatus,
    pub approver_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Daily cash/payment reconciliation for a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReconciliationRecord {
    pub id: i64,
    pub store_id: i64,
    pub business_date: NaiveDate,
    pub expected_cents: i64,
    pub actual_cents: i64,
    pub status: ApprovalStatus,
    pub approver_id: Option<i64>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    /// Positive when the drawer holds more than expected.
    pub fn variance_cents(&self) -> i64 {
        self.actual_cents - self.expected_cents
    }
}

/// Read model shared by approval batches.
pub trait ApprovalRecord {
    fn id(&self) -> i64;
    fn status(&self) -> ApprovalStatus;
    fn approver_id(&self) -> Option<i64>;
    fn approved_at(&self) -> Option<DateTime<Utc>>;
}

macro_rules! impl_approval_record {
    ($ty:ty) => {
        impl ApprovalRecord for $ty {
            fn id(&self) -> i64 {
                self.id
            }
            fn status(&self) -> ApprovalStatus {
                self.status
            }
            fn approver_id(&self) -> Option<i64> {
                self.approver_id
            }
            fn approved_at(&self) -> Option<DateTime<Utc>> {
                self.approved_at
            }
        }
    };
}

impl_approval_record!(PointSettlement);
impl_approval_record!(ReconciliationRecord);

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_transitions() {
        use ApprovalStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Rejected));

        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Rejected));
    }

    #[test]
    fn test_approver_rules() {
        assert_eq!(ApprovalStatus::Rejected.approver_rule(), ApproverRule::Optional);
    }

    #[test]
    fn test_status_defaults() {
        assert_eq!(TableStatus::default(), TableStatus::Idle);
        assert_eq!(ApprovalStatus::default(), ApprovalStatus::Pending);
    }

    #[test]
    fn test_ledger_reference_json_skips_empty_fields() {
        let json = LedgerReference::settlement(7).to_json().unwrap();
        assert_eq!(json, r#"{"settlement_id":7}"#);
    }

    #[test]
    fn test_merchant_expiry() {
        let now = Utc::now();
        let merchant = Merchant {
            id: 1,
            merchant_no: "m".to_string(),
            name: "Noodle Bar".to_string(),
            status: MerchantStatus::Active,
            expire_at: now,
            created_at: now,
            updated_at: now,
        };
        assert!(merchant.is_expired(now));
        assert!(!merchant.is_expired(now - chrono::Duration::seconds(1)));
    }
}
