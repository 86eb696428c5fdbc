//! # Batch Planner
//!
//! Splits the rows matching a filter into id windows so export and
//! reconciliation jobs can walk large tables in bounded chunks.
//!
//! ```text
//! get_range(filter) ──► IdRange { min: 1001, max: 1450, count: 312 }
//!                              │
//!                              ▼  window_size = 200
//!          [1001..=1200]  [1201..=1400]  [1401..=1450]
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use bistro_core::validation::validate_window_size;
use bistro_core::{IdRange, IdWindow};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::range::{ReconciliationFilter, SettlementFilter, TransactionFilter};
use crate::repository::RangeAggregate;

/// Aggregated range plus the windows covering it. Empty range, no windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub range: IdRange,
    pub windows: Vec<IdWindow>,
}

/// Plans windowed batch walks.
#[derive(Debug, Clone)]
pub struct BatchPlanner {
    db: Database,
    window_size: i64,
}

impl BatchPlanner {
    pub fn new(db: Database, window_size: i64) -> DbResult<Self> {
        validate_window_size(window_size)?;
        Ok(BatchPlanner { db, window_size })
    }

    /// Aggregates `filter` on `source` and cuts the result into windows.
    pub async fn plan<A>(source: &mut A, filter: &A::Filter, window_size: i64) -> DbResult<BatchPlan>
    where
        A: RangeAggregate,
    {
        validate_window_size(window_size)?;

        let range = source.get_range(filter).await?;
        let windows: Vec<IdWindow> = range.windows(window_size).collect();
        debug!(
            min = range.min,
            max = range.max,
            count = range.count,
            windows = windows.len(),
            "Batch planned"
        );

        Ok(BatchPlan { range, windows })
    }

    pub async fn settlements(&self, filter: &SettlementFilter) -> DbResult<BatchPlan> {
        Self::plan(&mut self.db.settlements(), filter, self.window_size).await
    }

    pub async fn reconciliations(&self, filter: &ReconciliationFilter) -> DbResult<BatchPlan> {
        Self::plan(&mut self.db.reconciliations(), filter, self.window_size).await
    }

    pub async fn transactions(&self, filter: &TransactionFilter) -> DbResult<BatchPlan> {
        Self::plan(&mut self.db.accounts(), filter, self.window_size).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_settlement, seed_store};
    use bistro_core::ApprovalStatus;

    #[tokio::test]
    async fn test_plan_covers_every_row_once() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        for amount in 1..=11 {
            seed_settlement(&db, store_id, amount * 10).await;
        }

        let filter = SettlementFilter {
            store_id: Some(store_id),
            ..Default::default()
        };
        let plan = BatchPlanner::new(db.clone(), 4)
            .unwrap()
            .settlements(&filter)
            .await
            .unwrap();
        assert_eq!(plan.range.count, 11);
        assert_eq!(plan.windows.len(), 3);

        let mut ids = Vec::new();
        for window in &plan.windows {
            let rows = db.settlements().list_in_window(&filter, *window).await.unwrap();
            ids.extend(rows.into_iter().map(|s| s.id));
        }
        ids.dedup();
        assert_eq!(ids.len(), 11);
    }

    #[tokio::test]
    async fn test_empty_filter_yields_no_windows() {
        let db = memory_db().await;
        let planner = BatchPlanner::new(db, 100).unwrap();

        let plan = planner
            .settlements(&SettlementFilter {
                status: Some(ApprovalStatus::Approved),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(plan.range, IdRange::default());
        assert!(plan.windows.is_empty());

        let plan = planner.transactions(&TransactionFilter::default()).await.unwrap();
        assert!(plan.windows.is_empty());
    }

    #[tokio::test]
    async fn test_window_size_is_validated() {
        let db = memory_db().await;
        assert!(BatchPlanner::new(db, 0).unwrap_err().is_params_error());
    }
}
