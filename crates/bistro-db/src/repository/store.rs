//! # Store Repository

use chrono::Utc;
use tracing::debug;

use bistro_core::validation::{validate_id, validate_name};
use bistro_core::Store;

use crate::error::{DbError, DbResult};
use crate::handle::DbHandle;

/// Repository for stores.
pub struct StoreRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> StoreRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        StoreRepository { handle }
    }

    pub async fn create(&mut self, merchant_id: i64, name: &str) -> DbResult<Store> {
        validate_id("merchant_id", merchant_id)?;
        validate_name("store name", name)?;

        let now = Utc::now();
        let name = name.trim();

        let mut conn = self.handle.acquire().await?;
        let id = sqlx::query("INSERT INTO stores (merchant_id, name, created_at) VALUES (?1, ?2, ?3)")
            .bind(merchant_id)
            .bind(name)
            .bind(now)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

        debug!(id, merchant_id, "Store created");

        Ok(Store {
            id,
            merchant_id,
            name: name.to_string(),
            created_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<Store> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Store", id))
    }

    pub async fn list_by_merchant(&mut self, merchant_id: i64) -> DbResult<Vec<Store>> {
        let mut conn = self.handle.acquire().await?;
        let stores = sqlx::query_as::<_, Store>("SELECT * FROM stores WHERE merchant_id = ?1 ORDER BY id")
            .bind(merchant_id)
            .fetch_all(&mut *conn)
            .await?;

        Ok(stores)
    }
}
