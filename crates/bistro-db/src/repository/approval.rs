//! # Approval Statements
//!
//! Status updates shared by every approval batch table.
//!
//! ## Approver Pairing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  target status   approver     statement                                │
//! │  ─────────────   ──────────   ──────────────────────────────────────   │
//! │  Approved        Some(u)      status, approver_id = u, approved_at=now │
//! │  Approved        None         InvalidParams                            │
//! │  Pending         None         status, approver_id = NULL,              │
//! │                                       approved_at = NULL               │
//! │  Pending         Some(u)      InvalidParams                            │
//! │  Rejected        either       as above, per Some/None                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Both columns come from one `Option`, so they can only be set or cleared
//! together. The schema CHECK backs this up.

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, SqliteConnection};
use tracing::debug;

use bistro_core::validation::validate_id;
use bistro_core::{ApprovalStatus, ApproverRule};

use crate::error::{DbError, DbResult};

/// Checks the approver combination for `status` before any statement runs.
pub(crate) fn check_approver(status: ApprovalStatus, approver_id: Option<i64>) -> DbResult<()> {
    match (status.approver_rule(), approver_id) {
        (ApproverRule::Required, None) => Err(DbError::invalid(format!(
            "status '{}' requires an approver",
            status.as_str()
        ))),
        (ApproverRule::Forbidden, Some(_)) => Err(DbError::invalid(format!(
            "status '{}' cannot carry an approver",
            status.as_str()
        ))),
        (_, Some(approver)) => Ok(validate_id("approver_id", approver)?),
        (_, None) => Ok(()),
    }
}

/// `SELECT *` by id. `table` must be a trusted literal.
pub(crate) async fn find_by_id<R>(
    conn: &mut SqliteConnection,
    table: &str,
    entity: &'static str,
    id: i64,
) -> DbResult<R>
where
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {table} WHERE id = ?1");
    sqlx::query_as::<_, R>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| DbError::not_found(entity, id))
}

/// Sets the status and the approver pair of one row.
pub(crate) async fn update_status(
    conn: &mut SqliteConnection,
    table: &str,
    entity: &'static str,
    id: i64,
    status: ApprovalStatus,
    approver_id: Option<i64>,
) -> DbResult<()> {
    validate_id("id", id)?;
    check_approver(status, approver_id)?;

    let now = Utc::now();
    let approved_at = approver_id.map(|_| now);

    let sql = format!(
        "UPDATE {table} SET status = ?1, approver_id = ?2, approved_at = ?3, updated_at = ?4 WHERE id = ?5"
    );
    let affected = sqlx::query(&sql)
        .bind(status)
        .bind(approver_id)
        .bind(approved_at)
        .bind(now)
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    if affected == 0 {
        return Err(DbError::not_found(entity, id));
    }

    debug!(entity, id, status = status.as_str(), ?approver_id, "Approval status updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approver_rules() {
        assert!(check_approver(ApprovalStatus::Approved, Some(5)).is_ok());
        assert!(check_approver(ApprovalStatus::Approved, None)
            .unwrap_err()
            .is_params_error());

        assert!(check_approver(ApprovalStatus::Pending, None).is_ok());
        assert!(check_approver(ApprovalStatus::Pending, Some(5))
            .unwrap_err()
            .is_params_error());

        assert!(check_approver(ApprovalStatus::Rejected, None).is_ok());
        assert!(check_approver(ApprovalStatus::Rejected, Some(5)).is_ok());
        assert!(check_approver(ApprovalStatus::Rejected, Some(0)).is_err());
    }
}
