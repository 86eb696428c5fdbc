//! # Dine Table Repository
//!
//! Table occupancy changes through compare-and-swap only.
//!
//! ## Compare-and-Swap
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Waiter A: open T4 for order 81        Waiter B: open T4 for order 82  │
//! │                                                                         │
//! │  UPDATE dine_tables                    UPDATE dine_tables              │
//! │  SET status='occupied', order_id=81    SET status='occupied',          │
//! │  WHERE id=4 AND status='idle'              order_id=82                 │
//! │                                        WHERE id=4 AND status='idle'    │
//! │        │                                     │                          │
//! │        ▼                                     ▼                          │
//! │  1 row affected → Ok(true)             0 rows affected → Ok(false)     │
//! │                                                                         │
//! │  SQLite serializes the two writes; the predicate is re-evaluated by    │
//! │  whichever runs second, so exactly one waiter wins.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use bistro_core::validation::{validate_id, validate_name};
use bistro_core::{DineTable, TableStatus};

use crate::error::{DbError, DbResult};
use crate::events::DomainEvent;
use crate::handle::DbHandle;
use crate::repository::StatusTransition;

/// Repository for dine tables.
pub struct TableRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> TableRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        TableRepository { handle }
    }

    /// Creates an idle table.
    pub async fn create(&mut self, store_id: i64, name: &str) -> DbResult<DineTable> {
        validate_id("store_id", store_id)?;
        validate_name("table name", name)?;

        let now = Utc::now();
        let name = name.trim();
        debug!(store_id, name, "Creating dine table");

        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO dine_tables (store_id, name, status, order_id, updated_at)
            VALUES (?1, ?2, ?3, NULL, ?4)
            "#,
        )
        .bind(store_id)
        .bind(name)
        .bind(TableStatus::Idle)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("table name", name),
            other => other,
        })?;

        Ok(DineTable {
            id: result.last_insert_rowid(),
            store_id,
            name: name.to_string(),
            status: TableStatus::Idle,
            order_id: None,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<DineTable> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query_as::<_, DineTable>("SELECT * FROM dine_tables WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("DineTable", id))
    }

    pub async fn list_by_store(&mut self, store_id: i64) -> DbResult<Vec<DineTable>> {
        let mut conn = self.handle.acquire().await?;
        let tables = sqlx::query_as::<_, DineTable>(
            "SELECT * FROM dine_tables WHERE store_id = ?1 ORDER BY name",
        )
        .bind(store_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(tables)
    }
}

#[async_trait]
impl<'c> StatusTransition for TableRepository<'c> {
    type Status = TableStatus;

    /// `reference` is the order seated at the table; `None` clears it.
    async fn transition_status(
        &mut self,
        table_id: i64,
        order_id: Option<i64>,
        from: TableStatus,
        to: TableStatus,
    ) -> DbResult<bool> {
        validate_id("table_id", table_id)?;
        if from == to {
            return Err(DbError::invalid(format!(
                "table transition must change status, got {} -> {}",
                from.as_str(),
                to.as_str()
            )));
        }

        let affected = {
            let mut conn = self.handle.acquire().await?;
            sqlx::query(
                r#"
                UPDATE dine_tables
                SET status = ?1, order_id = ?2, updated_at = ?3
                WHERE id = ?4 AND status = ?5
                "#,
            )
            .bind(to)
            .bind(order_id)
            .bind(Utc::now())
            .bind(table_id)
            .bind(from)
            .execute(&mut *conn)
            .await?
            .rows_affected()
        };

        let swapped = affected == 1;
        debug!(table_id, from = from.as_str(), to = to.as_str(), swapped, "Table status CAS");

        if swapped {
            self.handle.emit(DomainEvent::TableStatusChanged {
                table_id,
                from,
                to,
                order_id,
            });
        }

        Ok(swapped)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{file_db, memory_db, seed_store};

    #[tokio::test]
    async fn test_create_and_find() {
        let db = memory_db().await;
        let store = seed_store(&db).await;

        let table = db.tables().create(store.id, "  Patio 1 ").await.unwrap();
        assert_eq!(table.name, "Patio 1");
        assert_eq!(table.status, TableStatus::Idle);

        let found = db.tables().find_by_id(table.id).await.unwrap();
        assert_eq!(found.name, "Patio 1");
        assert_eq!(found.order_id, None);

        let dup = db.tables().create(store.id, "Patio 1").await.unwrap_err();
        assert!(dup.is_conflict());

        assert!(db.tables().find_by_id(9_999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_transition_requires_expected_status() {
        let db = memory_db().await;
        let store = seed_store(&db).await;
        let table = db.tables().create(store.id, "T1").await.unwrap();

        let wrong_from = db
            .tables()
            .transition_status(table.id, None, TableStatus::Occupied, TableStatus::Cleaning)
            .await
            .unwrap();
        assert!(!wrong_from);

        let seated = db
            .tables()
            .transition_status(table.id, Some(81), TableStatus::Idle, TableStatus::Occupied)
            .await
            .unwrap();
        assert!(seated);

        let found = db.tables().find_by_id(table.id).await.unwrap();
        assert_eq!(found.status, TableStatus::Occupied);
        assert_eq!(found.order_id, Some(81));

        let released = db
            .tables()
            .transition_status(table.id, None, TableStatus::Occupied, TableStatus::Cleaning)
            .await
            .unwrap();
        assert!(released);
        assert_eq!(db.tables().find_by_id(table.id).await.unwrap().order_id, None);
    }

    #[tokio::test]
    async fn test_missing_table_is_not_swapped() {
        let db = memory_db().await;

        let swapped = db
            .tables()
            .transition_status(404, None, TableStatus::Idle, TableStatus::Reserved)
            .await
            .unwrap();
        assert!(!swapped);
    }

    #[tokio::test]
    async fn test_same_status_is_params_error() {
        let db = memory_db().await;

        let err = db
            .tables()
            .transition_status(1, None, TableStatus::Idle, TableStatus::Idle)
            .await
            .unwrap_err();
        assert!(err.is_params_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_open_has_exactly_one_winner() {
        let (_dir, db) = file_db().await;
        let store = seed_store(&db).await;
        let table_id = db.tables().create(store.id, "T1").await.unwrap().id;

        let mut tasks = Vec::new();
        for order_id in 1..=16_i64 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                let swapped = db
                    .tables()
                    .transition_status(table_id, Some(order_id), TableStatus::Idle, TableStatus::Occupied)
                    .await
                    .unwrap();
                (order_id, swapped)
            }));
        }

        let mut winners = Vec::new();
        for task in tasks {
            let (order_id, swapped) = task.await.unwrap();
            if swapped {
                winners.push(order_id);
            }
        }

        assert_eq!(winners.len(), 1);
        let found = db.tables().find_by_id(table_id).await.unwrap();
        assert_eq!(found.status, TableStatus::Occupied);
        assert_eq!(found.order_id, Some(winners[0]));
    }
}
