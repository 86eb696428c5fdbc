//! # Point Settlement Repository
//!
//! Loyalty-point settlement batches awaiting back-office approval.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bistro_core::validation::{validate_amount_cents, validate_id};
use bistro_core::{ApprovalStatus, IdRange, IdWindow, PointSettlement, ValidationError};

use crate::error::DbResult;
use crate::events::DomainEvent;
use crate::handle::DbHandle;
use crate::repository::approval;
use crate::repository::range::{self, SettlementFilter};
use crate::repository::{ApprovalWorkflow, RangeAggregate};

const TABLE: &str = "point_settlements";
const ENTITY: &str = "PointSettlement";

/// Payload for opening a settlement batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPointSettlement {
    pub store_id: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_points: i64,
    pub amount_cents: i64,
}

/// Repository for point settlements.
pub struct SettlementRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> SettlementRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        SettlementRepository { handle }
    }

    /// Opens a pending settlement.
    pub async fn create(&mut self, new: &NewPointSettlement) -> DbResult<PointSettlement> {
        validate_id("store_id", new.store_id)?;
        validate_amount_cents("amount", new.amount_cents)?;
        if new.period_end < new.period_start {
            return Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: "period_end is before period_start".to_string(),
            }
            .into());
        }

        let now = Utc::now();
        let mut conn = self.handle.acquire().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO point_settlements (
                store_id, period_start, period_end, total_points, amount_cents,
                status, approver_id, approved_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, NULL, ?7, ?7)
            "#,
        )
        .bind(new.store_id)
        .bind(new.period_start)
        .bind(new.period_end)
        .bind(new.total_points)
        .bind(new.amount_cents)
        .bind(ApprovalStatus::Pending)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        debug!(id, store_id = new.store_id, amount = new.amount_cents, "Settlement created");

        Ok(PointSettlement {
            id,
            store_id: new.store_id,
            period_start: new.period_start,
            period_end: new.period_end,
            total_points: new.total_points,
            amount_cents: new.amount_cents,
            status: ApprovalStatus::Pending,
            approver_id: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<PointSettlement> {
        let mut conn = self.handle.acquire().await?;
        approval::find_by_id(&mut conn, TABLE, ENTITY, id).await
    }

    /// Settlements matching `filter` whose ids fall in `window`.
    pub async fn list_in_window(
        &mut self,
        filter: &SettlementFilter,
        window: IdWindow,
    ) -> DbResult<Vec<PointSettlement>> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_window(&mut conn, TABLE, filter, window).await
    }
}

#[async_trait]
impl<'c> ApprovalWorkflow for SettlementRepository<'c> {
    type Record = PointSettlement;

    const ENTITY: &'static str = ENTITY;

    async fn find_by_id_for_update(&mut self, id: i64) -> DbResult<PointSettlement> {
        validate_id("settlement_id", id)?;
        self.find_by_id(id).await
    }

    async fn update_status(
        &mut self,
        id: i64,
        status: ApprovalStatus,
        approver_id: Option<i64>,
    ) -> DbResult<()> {
        {
            let mut conn = self.handle.acquire().await?;
            approval::update_status(&mut conn, TABLE, ENTITY, id, status, approver_id).await?;
        }

        self.handle.emit(DomainEvent::ApprovalStatusChanged {
            entity: ENTITY.to_string(),
            id,
            status,
            approver_id,
        });
        Ok(())
    }
}

#[async_trait]
impl<'c> RangeAggregate for SettlementRepository<'c> {
    type Filter = SettlementFilter;

    async fn get_range(&mut self, filter: &SettlementFilter) -> DbResult<IdRange> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_range(&mut conn, TABLE, filter).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_settlement, seed_store};

    #[tokio::test]
    async fn test_create_and_find() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let created = seed_settlement(&db, store_id, 2_500).await;

        let found = db.settlements().find_by_id(created.id).await.unwrap();
        assert_eq!(found.status, ApprovalStatus::Pending);
        assert_eq!(found.amount_cents, 2_500);
        assert_eq!(found.approver_id, None);
        assert_eq!(found.approved_at, None);
    }

    #[tokio::test]
    async fn test_approver_pair_set_and_cleared_together() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let settlement = seed_settlement(&db, store_id, 1_000).await;

        db.settlements()
            .update_status(settlement.id, ApprovalStatus::Approved, Some(42))
            .await
            .unwrap();
        let approved = db.settlements().find_by_id(settlement.id).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.approver_id, Some(42));
        assert!(approved.approved_at.is_some());

        db.settlements()
            .update_status(settlement.id, ApprovalStatus::Pending, None)
            .await
            .unwrap();
        let reverted = db.settlements().find_by_id(settlement.id).await.unwrap();
        assert_eq!(reverted.status, ApprovalStatus::Pending);
        assert_eq!(reverted.approver_id, None);
        assert_eq!(reverted.approved_at, None);
    }

    #[tokio::test]
    async fn test_illegal_approver_combinations() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let settlement = seed_settlement(&db, store_id, 1_000).await;

        let err = db
            .settlements()
            .update_status(settlement.id, ApprovalStatus::Approved, None)
            .await
            .unwrap_err();
        assert!(err.is_params_error());

        let err = db
            .settlements()
            .update_status(settlement.id, ApprovalStatus::Pending, Some(3))
            .await
            .unwrap_err();
        assert!(err.is_params_error());

        let err = db
            .settlements()
            .update_status(9_999, ApprovalStatus::Rejected, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_range_and_windows() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        for amount in 1..=7 {
            seed_settlement(&db, store_id, amount * 100).await;
        }

        let filter = SettlementFilter {
            store_id: Some(store_id),
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        };
        let range = db.settlements().get_range(&filter).await.unwrap();
        assert_eq!(range.count, 7);

        let mut seen = 0;
        for window in range.windows(3) {
            seen += db
                .settlements()
                .list_in_window(&filter, window)
                .await
                .unwrap()
                .len();
        }
        assert_eq!(seen, 7);

        let empty = SettlementFilter {
            status: Some(ApprovalStatus::Approved),
            ..Default::default()
        };
        assert_eq!(db.settlements().get_range(&empty).await.unwrap(), IdRange::default());
    }
}
