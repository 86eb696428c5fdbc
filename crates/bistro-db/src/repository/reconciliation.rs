//! # Reconciliation Repository
//!
//! Daily drawer reconciliations. Same approval workflow as settlements,
//! without a ledger effect.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use bistro_core::validation::validate_id;
use bistro_core::{ApprovalStatus, IdRange, IdWindow, ReconciliationRecord};

use crate::error::{DbError, DbResult};
use crate::events::DomainEvent;
use crate::handle::DbHandle;
use crate::repository::approval;
use crate::repository::range::{self, ReconciliationFilter};
use crate::repository::{ApprovalWorkflow, RangeAggregate};

const TABLE: &str = "reconciliation_records";
const ENTITY: &str = "ReconciliationRecord";

/// Payload for a store's end-of-day count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReconciliation {
    pub store_id: i64,
    pub business_date: NaiveDate,
    pub expected_cents: i64,
    pub actual_cents: i64,
}

/// Repository for reconciliation records.
pub struct ReconciliationRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> ReconciliationRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        ReconciliationRepository { handle }
    }

    /// Records a pending reconciliation. One per store and business date.
    pub async fn create(&mut self, new: &NewReconciliation) -> DbResult<ReconciliationRecord> {
        validate_id("store_id", new.store_id)?;

        let now = Utc::now();
        let mut conn = self.handle.acquire().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO reconciliation_records (
                store_id, business_date, expected_cents, actual_cents,
                status, approver_id, approved_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?6)
            "#,
        )
        .bind(new.store_id)
        .bind(new.business_date)
        .bind(new.expected_cents)
        .bind(new.actual_cents)
        .bind(ApprovalStatus::Pending)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(
                "reconciliation",
                format!("store {} on {}", new.store_id, new.business_date),
            ),
            other => other,
        })?
        .last_insert_rowid();

        debug!(id, store_id = new.store_id, date = %new.business_date, "Reconciliation recorded");

        Ok(ReconciliationRecord {
            id,
            store_id: new.store_id,
            business_date: new.business_date,
            expected_cents: new.expected_cents,
            actual_cents: new.actual_cents,
            status: ApprovalStatus::Pending,
            approver_id: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<ReconciliationRecord> {
        let mut conn = self.handle.acquire().await?;
        approval::find_by_id(&mut conn, TABLE, ENTITY, id).await
    }

    pub async fn list_in_window(
        &mut self,
        filter: &ReconciliationFilter,
        window: IdWindow,
    ) -> DbResult<Vec<ReconciliationRecord>> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_window(&mut conn, TABLE, filter, window).await
    }
}

#[async_trait]
impl<'c> ApprovalWorkflow for ReconciliationRepository<'c> {
    type Record = ReconciliationRecord;

    const ENTITY: &'static str = ENTITY;

    async fn find_by_id_for_update(&mut self, id: i64) -> DbResult<ReconciliationRecord> {
        validate_id("reconciliation_id", id)?;
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
impl<'c> RangeAggregate for ReconciliationRepository<'c> {
    type Filter = ReconciliationFilter;

    async fn get_range(&mut self, filter: &ReconciliationFilter) -> DbResult<IdRange> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_range(&mut conn, TABLE, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_reconciliation, seed_store};

    #[tokio::test]
    async fn test_one_record_per_day() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let record = seed_reconciliation(&db, store_id, day).await;
        assert_eq!(record.variance_cents(), -150);

        let err = db
            .reconciliations()
            .create(&NewReconciliation {
                store_id,
                business_date: day,
                expected_cents: 1,
                actual_cents: 1,
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_rejected_may_carry_reviewer() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let record = seed_reconciliation(&db, store_id, day).await;

        db.reconciliations()
            .update_status(record.id, ApprovalStatus::Rejected, Some(8))
            .await
            .unwrap();

        let found = db.reconciliations().find_by_id(record.id).await.unwrap();
        assert_eq!(found.status, ApprovalStatus::Rejected);
        assert_eq!(found.approver_id, Some(8));
        assert!(found.approved_at.is_some());
    }

    #[tokio::test]
    async fn test_date_filter_range() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        for day in 1..=10 {
            seed_reconciliation(&db, store_id, NaiveDate::from_ymd_opt(2024, 6, day).unwrap()).await;
        }

        let filter = ReconciliationFilter {
            store_id: Some(store_id),
            date_from: NaiveDate::from_ymd_opt(2024, 6, 4),
            date_to: NaiveDate::from_ymd_opt(2024, 6, 6),
            ..Default::default()
        };
        let range = db.reconciliations().get_range(&filter).await.unwrap();
        assert_eq!(range.count, 3);

        let rows = db
            .reconciliations()
            .list_in_window(&filter, IdWindow { start: range.min, end: range.max })
            .await
            .unwrap();
        let days: Vec<_> = rows.iter().map(|r| r.business_date.to_string()).collect();
        assert_eq!(days, vec!["2024-06-04", "2024-06-05", "2024-06-06"]);
    }
}
