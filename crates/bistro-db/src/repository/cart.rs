//! # Cart Line Repository
//!
//! Quantities on a table's open cart, changed in place.
//!
//! ## Decrement
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. DELETE FROM cart_lines WHERE id = ? AND quantity = 1               │
//! │        └── 1 row  → Removed                                            │
//! │  2. UPDATE cart_lines SET quantity = quantity - 1                      │
//! │     WHERE id = ? AND quantity > 1                                      │
//! │        └── 1 row  → Decremented                                        │
//! │  3. neither touched a row:                                             │
//! │        row gone        → NotFound                                      │
//! │        row still there → another writer moved it between 1 and 2,     │
//! │                          start over                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Each step carries its own precondition, so a line at 2 hit by two
//! concurrent decrements ends deleted, never at 0 or below. Increments carry
//! one too: a line never grows past `MAX_LINE_QUANTITY`.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use bistro_core::validation::{validate_id, validate_quantity};
use bistro_core::{CartLine, MAX_LINE_QUANTITY};

use crate::error::{DbError, DbResult};
use crate::handle::DbHandle;
use crate::repository::{AtomicCounter, CounterChange};

/// Repository for cart lines.
pub struct CartLineRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> CartLineRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        CartLineRepository { handle }
    }

    /// Adds a new line to a table's cart.
    ///
    /// ## Errors
    /// * `UniqueViolation` - the table already has a line for this
    ///   product/variant; increment that one instead
    pub async fn create(
        &mut self,
        table_id: i64,
        product_id: i64,
        variant_key: &str,
        quantity: i64,
    ) -> DbResult<CartLine> {
        validate_id("table_id", table_id)?;
        validate_id("product_id", product_id)?;
        validate_quantity(quantity)?;

        let now = Utc::now();
        debug!(table_id, product_id, variant_key, quantity, "Creating cart line");

        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO cart_lines (table_id, product_id, variant_key, quantity, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(table_id)
        .bind(product_id)
        .bind(variant_key)
        .bind(quantity)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate(
                "cart line",
                format!("table {table_id}, product {product_id}, variant '{variant_key}'"),
            ),
            other => other,
        })?;

        Ok(CartLine {
            id: result.last_insert_rowid(),
            table_id,
            product_id,
            variant_key: variant_key.to_string(),
            quantity,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<CartLine> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query_as::<_, CartLine>("SELECT * FROM cart_lines WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("CartLine", id))
    }

    /// The line for a product/variant on a table, if any.
    pub async fn find_line(
        &mut self,
        table_id: i64,
        product_id: i64,
        variant_key: &str,
    ) -> DbResult<Option<CartLine>> {
        let mut conn = self.handle.acquire().await?;
        let line = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT * FROM cart_lines
            WHERE table_id = ?1 AND product_id = ?2 AND variant_key = ?3
            "#,
        )
        .bind(table_id)
        .bind(product_id)
        .bind(variant_key)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(line)
    }

    pub async fn list_by_table(&mut self, table_id: i64) -> DbResult<Vec<CartLine>> {
        let mut conn = self.handle.acquire().await?;
        let lines = sqlx::query_as::<_, CartLine>(
            "SELECT * FROM cart_lines WHERE table_id = ?1 ORDER BY id",
        )
        .bind(table_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(lines)
    }

    /// Empties a table's cart. Returns the number of lines removed.
    pub async fn delete_by_table(&mut self, table_id: i64) -> DbResult<u64> {
        let mut conn = self.handle.acquire().await?;
        let removed = sqlx::query("DELETE FROM cart_lines WHERE table_id = ?1")
            .bind(table_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        debug!(table_id, removed, "Cart cleared");
        Ok(removed)
    }
}

#[async_trait]
impl<'c> AtomicCounter for CartLineRepository<'c> {
    async fn increment(&mut self, line_id: i64) -> DbResult<()> {
        self.increment_by(line_id, 1).await
    }

    async fn increment_by(&mut self, line_id: i64, delta: i64) -> DbResult<()> {
        validate_id("line_id", line_id)?;
        validate_quantity(delta)?;

        let mut conn = self.handle.acquire().await?;
        let affected = sqlx::query(
            r#"
            UPDATE cart_lines
            SET quantity = quantity + ?1, updated_at = ?2
            WHERE id = ?3 AND quantity + ?1 <= ?4
            "#,
        )
        .bind(delta)
        .bind(Utc::now())
        .bind(line_id)
        .bind(MAX_LINE_QUANTITY)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if affected == 0 {
            let current: Option<i64> = sqlx::query_scalar("SELECT quantity FROM cart_lines WHERE id = ?1")
                .bind(line_id)
                .fetch_optional(&mut *conn)
                .await?;
            return Err(match current {
                Some(quantity) => DbError::conflict(
                    "CartLine",
                    format!("quantity {quantity} + {delta} exceeds {MAX_LINE_QUANTITY}"),
                ),
                None => DbError::not_found("CartLine", line_id),
            });
        }

        debug!(line_id, delta, "Cart line incremented");
        Ok(())
    }

    async fn decrement(&mut self, line_id: i64) -> DbResult<CounterChange> {
        validate_id("line_id", line_id)?;

        let mut conn = self.handle.acquire().await?;

        loop {
            let removed = sqlx::query("DELETE FROM cart_lines WHERE id = ?1 AND quantity = 1")
                .bind(line_id)
                .execute(&mut *conn)
                .await?
                .rows_affected();
            if removed == 1 {
                debug!(line_id, "Cart line removed at quantity 1");
                return Ok(CounterChange::Removed);
            }

            let decremented = sqlx::query(
                r#"
                UPDATE cart_lines
                SET quantity = quantity - 1, updated_at = ?1
                WHERE id = ?2 AND quantity > 1
                "#,
            )
            .bind(Utc::now())
            .bind(line_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
            if decremented == 1 {
                debug!(line_id, "Cart line decremented");
                return Ok(CounterChange::Decremented);
            }

            let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM cart_lines WHERE id = ?1")
                .bind(line_id)
                .fetch_optional(&mut *conn)
                .await?;
            if exists.is_none() {
                break;
            }
            debug!(line_id, "Cart line changed between statements, retrying");
        }

        Err(DbError::not_found("CartLine", line_id))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{file_db, memory_db, seed_store};

    async fn seed_line(db: &crate::Database, quantity: i64) -> CartLine {
        let store = seed_store(db).await;
        let table = db.tables().create(store.id, "T1").await.unwrap();
        db.cart_lines().create(table.id, 501, "", quantity).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_find_line() {
        let db = memory_db().await;
        let line = seed_line(&db, 2).await;

        let found = db
            .cart_lines()
            .find_line(line.table_id, 501, "")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, line.id);
        assert_eq!(found.quantity, 2);

        let none = db.cart_lines().find_line(line.table_id, 501, "large").await.unwrap();
        assert!(none.is_none());

        let dup = db
            .cart_lines()
            .create(line.table_id, 501, "", 1)
            .await
            .unwrap_err();
        assert!(dup.is_conflict());
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected_before_insert() {
        let db = memory_db().await;
        let store = seed_store(&db).await;
        let table = db.tables().create(store.id, "T1").await.unwrap();

        let err = db.cart_lines().create(table.id, 1, "", 0).await.unwrap_err();
        assert!(err.is_params_error());
        assert!(db.cart_lines().list_by_table(table.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_increment() {
        let db = memory_db().await;
        let line = seed_line(&db, 1).await;

        db.cart_lines().increment(line.id).await.unwrap();
        db.cart_lines().increment_by(line.id, 3).await.unwrap();

        assert_eq!(db.cart_lines().find_by_id(line.id).await.unwrap().quantity, 5);
        assert!(db.cart_lines().increment(9_999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_increment_stops_at_line_cap() {
        let db = memory_db().await;
        let line = seed_line(&db, MAX_LINE_QUANTITY - 1).await;

        db.cart_lines().increment(line.id).await.unwrap();
        let err = db.cart_lines().increment(line.id).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            db.cart_lines().find_by_id(line.id).await.unwrap().quantity,
            MAX_LINE_QUANTITY
        );
    }

    #[tokio::test]
    async fn test_decrement_at_one_deletes_then_not_found() {
        let db = memory_db().await;
        let line = seed_line(&db, 2).await;

        let change = db.cart_lines().decrement(line.id).await.unwrap();
        assert_eq!(change, CounterChange::Decremented);
        assert_eq!(db.cart_lines().find_by_id(line.id).await.unwrap().quantity, 1);

        let change = db.cart_lines().decrement(line.id).await.unwrap();
        assert_eq!(change, CounterChange::Removed);
        assert!(db.cart_lines().find_by_id(line.id).await.unwrap_err().is_not_found());

        let err = db.cart_lines().decrement(line.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_by_table() {
        let db = memory_db().await;
        let line = seed_line(&db, 3).await;
        db.cart_lines().create(line.table_id, 502, "hot", 1).await.unwrap();

        assert_eq!(db.cart_lines().delete_by_table(line.table_id).await.unwrap(), 2);
        assert!(db.cart_lines().list_by_table(line.table_id).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_and_decrements_net_out() {
        let (_dir, db) = file_db().await;
        let line_id = seed_line(&db, 50).await.id;

        let mut tasks = Vec::new();
        for i in 0..40 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    db.cart_lines().increment(line_id).await.unwrap();
                } else {
                    db.cart_lines().decrement(line_id).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(db.cart_lines().find_by_id(line_id).await.unwrap().quantity, 50);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_decrements_never_go_below_one() {
        let (_dir, db) = file_db().await;
        let line_id = seed_line(&db, 2).await.id;

        let mut tasks = Vec::new();
        for _ in 0..2 {
            let db = db.clone();
            tasks.push(tokio::spawn(async move { db.cart_lines().decrement(line_id).await }));
        }

        let mut changes = Vec::new();
        for task in tasks {
            changes.push(task.await.unwrap().unwrap());
        }
        changes.sort_by_key(|c| matches!(c, CounterChange::Removed));

        assert_eq!(changes, vec![CounterChange::Decremented, CounterChange::Removed]);
        assert!(db.cart_lines().find_by_id(line_id).await.unwrap_err().is_not_found());
    }
}
