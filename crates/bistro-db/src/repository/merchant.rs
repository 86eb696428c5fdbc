//! # Merchant Repository
//!
//! Tenants and their subscription expiry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use bistro_core::validation::{validate_id, validate_name};
use bistro_core::{Merchant, MerchantStatus};

use crate::error::{DbError, DbResult};
use crate::handle::DbHandle;
use crate::repository::LockingReader;

/// Repository for merchants.
pub struct MerchantRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> MerchantRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        MerchantRepository { handle }
    }

    /// Creates an active merchant with a fresh business number.
    pub async fn create(&mut self, name: &str, expire_at: DateTime<Utc>) -> DbResult<Merchant> {
        validate_name("merchant name", name)?;

        let merchant_no = Uuid::new_v4().to_string();
        let now = Utc::now();
        let name = name.trim();

        let mut conn = self.handle.acquire().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO merchants (merchant_no, name, status, expire_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(&merchant_no)
        .bind(name)
        .bind(MerchantStatus::Active)
        .bind(expire_at)
        .bind(now)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        debug!(id, merchant_no = %merchant_no, "Merchant created");

        Ok(Merchant {
            id,
            merchant_no,
            name: name.to_string(),
            status: MerchantStatus::Active,
            expire_at,
            created_at: now,
            updated_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<Merchant> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("Merchant", id))
    }

    /// Reads a merchant under the transaction's write lock.
    pub async fn find_by_id_for_update(&mut self, id: i64) -> DbResult<Merchant> {
        validate_id("merchant_id", id)?;
        self.find_by_id(id).await
    }

    pub async fn update_expire_at(&mut self, id: i64, expire_at: DateTime<Utc>) -> DbResult<()> {
        let mut conn = self.handle.acquire().await?;
        let affected = sqlx::query("UPDATE merchants SET expire_at = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(expire_at)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(DbError::not_found("Merchant", id));
        }

        debug!(id, %expire_at, "Merchant expiry updated");
        Ok(())
    }

    pub async fn set_status(&mut self, id: i64, status: MerchantStatus) -> DbResult<()> {
        let mut conn = self.handle.acquire().await?;
        let affected = sqlx::query("UPDATE merchants SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(DbError::not_found("Merchant", id));
        }
        Ok(())
    }
}

#[async_trait]
impl<'c> LockingReader for MerchantRepository<'c> {
    type Record = Merchant;

    async fn find_for_update(&mut self, id: i64) -> DbResult<Merchant> {
        self.find_by_id_for_update(id).await
    }
}
