//! # Dining Service
//!
//! Table occupancy. Every move is a compare-and-swap on the stored status;
//! a lost swap is reported as `Conflict` and never retried here.

use tracing::{info, warn};

use bistro_core::validation::validate_id;
use bistro_core::TableStatus;

use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::table::TableRepository;
use crate::repository::StatusTransition;

/// Swaps `from → to`, or explains why it could not.
///
/// ## Errors
/// * `NotFound` - no such table
/// * `Conflict` - the table is not in `from`
async fn swap(
    tables: &mut TableRepository<'_>,
    table_id: i64,
    order_id: Option<i64>,
    from: TableStatus,
    to: TableStatus,
) -> DbResult<()> {
    if tables.transition_status(table_id, order_id, from, to).await? {
        return Ok(());
    }

    let current = tables.find_by_id(table_id).await?;
    warn!(
        table_id,
        expected = from.as_str(),
        actual = current.status.as_str(),
        "Table status swap lost"
    );
    Err(DbError::conflict(
        "DineTable",
        format!(
            "table {} is {}, expected {}",
            table_id,
            current.status.as_str(),
            from.as_str()
        ),
    ))
}

/// Seating, reservations and turnover of dine-in tables.
#[derive(Debug, Clone)]
pub struct DiningService {
    db: Database,
}

impl DiningService {
    pub fn new(db: Database) -> Self {
        DiningService { db }
    }

    /// Seats `order_id` at an idle table.
    pub async fn open_table(&self, table_id: i64, order_id: i64) -> DbResult<()> {
        validate_id("order_id", order_id)?;
        swap(
            &mut self.db.tables(),
            table_id,
            Some(order_id),
            TableStatus::Idle,
            TableStatus::Occupied,
        )
        .await?;

        info!(table_id, order_id, "Table opened");
        Ok(())
    }

    /// Seats `order_id` at a table reserved for it.
    pub async fn seat_reservation(&self, table_id: i64, order_id: i64) -> DbResult<()> {
        validate_id("order_id", order_id)?;
        swap(
            &mut self.db.tables(),
            table_id,
            Some(order_id),
            TableStatus::Reserved,
            TableStatus::Occupied,
        )
        .await?;

        info!(table_id, order_id, "Reservation seated");
        Ok(())
    }

    pub async fn reserve(&self, table_id: i64) -> DbResult<()> {
        swap(&mut self.db.tables(), table_id, None, TableStatus::Idle, TableStatus::Reserved).await
    }

    pub async fn cancel_reservation(&self, table_id: i64) -> DbResult<()> {
        swap(&mut self.db.tables(), table_id, None, TableStatus::Reserved, TableStatus::Idle).await
    }

    /// Frees an occupied table for cleaning and clears its cart.
    ///
    /// Returns the number of cart lines removed.
    pub async fn release_table(&self, table_id: i64) -> DbResult<u64> {
        let cleared = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    swap(
                        &mut tx.tables(),
                        table_id,
                        None,
                        TableStatus::Occupied,
                        TableStatus::Cleaning,
                    )
                    .await?;
                    tx.cart_lines().delete_by_table(table_id).await
                })
            })
            .await?;

        info!(table_id, cleared, "Table released");
        Ok(cleared)
    }

    pub async fn finish_cleaning(&self, table_id: i64) -> DbResult<()> {
        swap(&mut self.db.tables(), table_id, None, TableStatus::Cleaning, TableStatus::Idle).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{file_db, memory_db, seed_store};

    async fn seed_table(db: &Database) -> i64 {
        let store_id = seed_store(db).await.id;
        db.tables().create(store_id, "T1").await.unwrap().id
    }

    #[tokio::test]
    async fn test_full_turnover() {
        let db = memory_db().await;
        let table_id = seed_table(&db).await;
        let dining = DiningService::new(db.clone());

        dining.open_table(table_id, 31).await.unwrap();
        db.cart_lines().create(table_id, 1, "", 2).await.unwrap();
        db.cart_lines().create(table_id, 2, "large", 1).await.unwrap();

        assert_eq!(dining.release_table(table_id).await.unwrap(), 2);
        let table = db.tables().find_by_id(table_id).await.unwrap();
        assert_eq!(table.status, TableStatus::Cleaning);
        assert_eq!(table.order_id, None);
        assert!(db.cart_lines().list_by_table(table_id).await.unwrap().is_empty());

        dining.finish_cleaning(table_id).await.unwrap();
        assert_eq!(
            db.tables().find_by_id(table_id).await.unwrap().status,
            TableStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_reservation_paths() {
        let db = memory_db().await;
        let table_id = seed_table(&db).await;
        let dining = DiningService::new(db.clone());

        dining.reserve(table_id).await.unwrap();
        assert!(dining.open_table(table_id, 1).await.unwrap_err().is_conflict());
        dining.cancel_reservation(table_id).await.unwrap();

        dining.reserve(table_id).await.unwrap();
        dining.seat_reservation(table_id, 12).await.unwrap();
        let table = db.tables().find_by_id(table_id).await.unwrap();
        assert_eq!(table.status, TableStatus::Occupied);
        assert_eq!(table.order_id, Some(12));
    }

    #[tokio::test]
    async fn test_release_of_idle_table_keeps_cart() {
        let db = memory_db().await;
        let table_id = seed_table(&db).await;
        db.cart_lines().create(table_id, 1, "", 1).await.unwrap();

        let err = DiningService::new(db.clone())
            .release_table(table_id)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }));
        assert_eq!(db.cart_lines().list_by_table(table_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_is_not_found() {
        let db = memory_db().await;
        let err = DiningService::new(db).open_table(404, 1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_open_one_winner() {
        let (_dir, db) = file_db().await;
        let table_id = seed_table(&db).await;
        let dining = DiningService::new(db.clone());

        let mut handles = Vec::new();
        for order_id in 1..=12 {
            let dining = dining.clone();
            handles.push(tokio::spawn(async move {
                dining.open_table(table_id, order_id).await
            }));
        }

        let mut winners = Vec::new();
        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await.unwrap() {
                Ok(()) => winners.push(index as i64 + 1),
                Err(err) => assert!(matches!(err, DbError::Conflict { .. })),
            }
        }
        assert_eq!(winners.len(), 1);

        let table = db.tables().find_by_id(table_id).await.unwrap();
        assert_eq!(table.order_id, Some(winners[0]));
    }
}
