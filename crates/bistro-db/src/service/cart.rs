//! # Cart Service
//!
//! Adding to and taking from a table's open cart.

use tracing::debug;

use bistro_core::validation::validate_quantity;
use bistro_core::CartLine;

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::{AtomicCounter, CounterChange};

/// Cart operations for dine-in tables.
#[derive(Debug, Clone)]
pub struct CartService {
    db: Database,
}

impl CartService {
    pub fn new(db: Database) -> Self {
        CartService { db }
    }

    /// Adds `quantity` of a product variant to the table's cart, merging
    /// into the existing line when there is one.
    ///
    /// ## Errors
    /// * `Conflict` - the merged line would exceed `MAX_LINE_QUANTITY`
    pub async fn add_item(
        &self,
        table_id: i64,
        product_id: i64,
        variant_key: &str,
        quantity: i64,
    ) -> DbResult<CartLine> {
        validate_quantity(quantity)?;
        let variant_key = variant_key.to_string();

        self.db
            .atomic(move |tx| {
                Box::pin(async move {
                    let mut lines = tx.cart_lines();
                    match lines.find_line(table_id, product_id, &variant_key).await? {
                        Some(line) => {
                            lines.increment_by(line.id, quantity).await?;
                            debug!(line_id = line.id, quantity, "Merged into cart line");
                            lines.find_by_id(line.id).await
                        }
                        None => lines.create(table_id, product_id, &variant_key, quantity).await,
                    }
                })
            })
            .await
    }

    /// Takes one unit off a line; the line disappears at zero.
    pub async fn remove_one(&self, line_id: i64) -> DbResult<CounterChange> {
        self.db.cart_lines().decrement(line_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{file_db, memory_db, seed_store};
    use bistro_core::MAX_LINE_QUANTITY;

    async fn seed_table(db: &Database) -> i64 {
        let store_id = seed_store(db).await.id;
        db.tables().create(store_id, "T1").await.unwrap().id
    }

    #[tokio::test]
    async fn test_add_merges_same_variant() {
        let db = memory_db().await;
        let table_id = seed_table(&db).await;
        let cart = CartService::new(db.clone());

        let first = cart.add_item(table_id, 10, "spicy", 1).await.unwrap();
        let merged = cart.add_item(table_id, 10, "spicy", 2).await.unwrap();
        assert_eq!(merged.id, first.id);
        assert_eq!(merged.quantity, 3);

        let other = cart.add_item(table_id, 10, "mild", 1).await.unwrap();
        assert_ne!(other.id, first.id);
        assert_eq!(db.cart_lines().list_by_table(table_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_one_until_gone() {
        let db = memory_db().await;
        let table_id = seed_table(&db).await;
        let cart = CartService::new(db.clone());
        let line = cart.add_item(table_id, 10, "", 2).await.unwrap();

        assert_eq!(cart.remove_one(line.id).await.unwrap(), CounterChange::Decremented);
        assert_eq!(cart.remove_one(line.id).await.unwrap(), CounterChange::Removed);
        assert!(cart.remove_one(line.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_merge_cannot_pass_line_cap() {
        let db = memory_db().await;
        let table_id = seed_table(&db).await;
        let cart = CartService::new(db.clone());

        cart.add_item(table_id, 10, "", MAX_LINE_QUANTITY).await.unwrap();
        let err = cart
            .add_item(table_id, 10, "", MAX_LINE_QUANTITY)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let lines = db.cart_lines().list_by_table(table_id).await.unwrap();
        assert_eq!(lines[0].quantity, MAX_LINE_QUANTITY);
    }

    #[tokio::test]
    async fn test_bad_quantity() {
        let db = memory_db().await;
        let err = CartService::new(db).add_item(1, 1, "", 0).await.unwrap_err();
        assert!(err.is_params_error());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_lose_no_units() {
        let (_dir, db) = file_db().await;
        let table_id = seed_table(&db).await;
        let cart = CartService::new(db.clone());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cart = cart.clone();
            handles.push(tokio::spawn(async move {
                cart.add_item(table_id, 42, "", 1).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let lines = db.cart_lines().list_by_table(table_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 16);
    }
}
