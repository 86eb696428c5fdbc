//! # Unit of Work
//!
//! One physical SQLite transaction and the connection it runs on.
//!
//! ## Isolation Mapping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Requested level      SQLite statement     Effect                      │
//! │  ────────────────     ────────────────     ─────────────────────────   │
//! │  ReadCommitted        BEGIN DEFERRED       lock taken on first write   │
//! │  RepeatableRead       BEGIN IMMEDIATE      write lock taken at begin;  │
//! │                                            reads inside are stable and │
//! │                                            act as row locks            │
//! │  Serializable         BEGIN EXCLUSIVE      readers blocked too         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! SQLite has no `SELECT ... FOR UPDATE`. Under `BEGIN IMMEDIATE` only one
//! writer holds the database at a time, so a read followed by a write in the
//! same unit of work can never interleave with another writer. Other
//! writers wait up to the configured busy timeout.
//!
//! Dropping a `UnitOfWork` without calling [`UnitOfWork::commit`] rolls back.

use std::time::Instant;

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Transaction isolation requested from SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    ReadCommitted,
    /// Level used by [`Database::atomic`](crate::Database::atomic).
    #[default]
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub const fn begin_statement(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "BEGIN DEFERRED",
            IsolationLevel::RepeatableRead => "BEGIN IMMEDIATE",
            IsolationLevel::Serializable => "BEGIN EXCLUSIVE",
        }
    }
}

/// An open transaction owning its pooled connection.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    isolation: IsolationLevel,
    started: Instant,
}

impl UnitOfWork {
    /// Acquires a connection and begins a transaction at `isolation`.
    pub async fn begin(pool: &SqlitePool, isolation: IsolationLevel) -> DbResult<Self> {
        let tx = pool
            .begin_with(isolation.begin_statement())
            .await
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
                other => DbError::TransactionFailed(format!("begin: {other}")),
            })?;

        debug!(?isolation, "Transaction started");

        Ok(UnitOfWork {
            tx,
            isolation,
            started: Instant::now(),
        })
    }

    /// The transaction-scoped connection. Every statement issued on it is
    /// part of this unit of work.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub async fn commit(self) -> DbResult<()> {
        let elapsed = self.started.elapsed();
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::TransactionFailed(format!("commit: {e}")))?;

        debug!(elapsed_ms = elapsed.as_millis() as u64, "Transaction committed");
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(format!("rollback: {e}")))?;

        debug!("Transaction rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("isolation", &self.isolation)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    #[test]
    fn test_begin_statements() {
        assert_eq!(IsolationLevel::ReadCommitted.begin_statement(), "BEGIN DEFERRED");
        assert_eq!(IsolationLevel::default().begin_statement(), "BEGIN IMMEDIATE");
        assert_eq!(IsolationLevel::Serializable.begin_statement(), "BEGIN EXCLUSIVE");
    }

    #[tokio::test]
    async fn test_commit_persists_and_drop_rolls_back() {
        let db = memory_db().await;

        let mut uow = UnitOfWork::begin(db.pool(), IsolationLevel::RepeatableRead)
            .await
            .unwrap();
        sqlx::query("INSERT INTO merchants (merchant_no, name, expire_at, created_at, updated_at) VALUES ('m-1', 'Kept', '2030-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')")
            .execute(uow.conn())
            .await
            .unwrap();
        uow.commit().await.unwrap();

        {
            let mut uow = UnitOfWork::begin(db.pool(), IsolationLevel::RepeatableRead)
                .await
                .unwrap();
            sqlx::query("INSERT INTO merchants (merchant_no, name, expire_at, created_at, updated_at) VALUES ('m-2', 'Dropped', '2030-01-01T00:00:00Z', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')")
                .execute(uow.conn())
                .await
                .unwrap();
        }

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM merchants ORDER BY id")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(names, vec!["Kept".to_string()]);
    }
}
