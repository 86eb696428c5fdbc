//! # User Repository
//!
//! Back-office accounts. Usernames are unique across all merchants.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use bistro_core::validation::{validate_id, validate_name, validate_username};
use bistro_core::{User, UserRole};

use crate::error::{DbError, DbResult};
use crate::handle::DbHandle;

/// Payload for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub merchant_id: i64,
    pub store_id: Option<i64>,
    pub username: String,
    pub display_name: String,
    pub role: UserRole,
}

/// Repository for users.
pub struct UserRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> UserRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        UserRepository { handle }
    }

    /// Creates a user.
    ///
    /// ## Errors
    /// * `UniqueViolation` - the username is taken
    pub async fn create(&mut self, new: &NewUser) -> DbResult<User> {
        validate_id("merchant_id", new.merchant_id)?;
        validate_username(&new.username)?;
        validate_name("display name", &new.display_name)?;

        let now = Utc::now();
        let display_name = new.display_name.trim();

        let mut conn = self.handle.acquire().await?;
        let id = sqlx::query(
            r#"
            INSERT INTO users (merchant_id, store_id, username, display_name, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(new.merchant_id)
        .bind(new.store_id)
        .bind(&new.username)
        .bind(display_name)
        .bind(new.role)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("username", new.username.clone()),
            other => other,
        })?
        .last_insert_rowid();

        debug!(id, merchant_id = new.merchant_id, username = %new.username, "User created");

        Ok(User {
            id,
            merchant_id: new.merchant_id,
            store_id: new.store_id,
            username: new.username.clone(),
            display_name: display_name.to_string(),
            role: new.role,
            created_at: now,
        })
    }

    pub async fn find_by_id(&mut self, id: i64) -> DbResult<User> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("User", id))
    }

    pub async fn exists_by_username(&mut self, username: &str) -> DbResult<bool> {
        let mut conn = self.handle.acquire().await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE username = ?1)")
            .bind(username)
            .fetch_one(&mut *conn)
            .await?;

        Ok(exists)
    }
}
