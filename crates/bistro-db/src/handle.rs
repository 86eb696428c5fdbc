//! # Repository Handle
//!
//! What a repository runs its statements against.
//!
//! ```text
//! db.tables()            ──► DbHandle { target: Pool,  hooks: None }
//!                              each statement auto-commits on a pooled
//!                              connection; events publish immediately
//!
//! tx.tables()  (in atomic) ──► DbHandle { target: Tx,  hooks: Some(queue) }
//!                              statements join the open transaction;
//!                              events are deferred until commit
//! ```

use std::ops::{Deref, DerefMut};

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::error::DbResult;
use crate::events::{DomainEvent, EventBus};
use crate::tx::HookQueue;

enum Target<'c> {
    Pool(SqlitePool),
    Tx(&'c mut SqliteConnection),
}

/// Execution target plus the post-commit plumbing of a repository.
pub struct DbHandle<'c> {
    target: Target<'c>,
    hooks: Option<HookQueue>,
    events: EventBus,
}

impl DbHandle<'static> {
    pub(crate) fn pooled(pool: SqlitePool, events: EventBus) -> Self {
        DbHandle {
            target: Target::Pool(pool),
            hooks: None,
            events,
        }
    }
}

impl<'c> DbHandle<'c> {
    pub(crate) fn bound(conn: &'c mut SqliteConnection, hooks: HookQueue, events: EventBus) -> Self {
        DbHandle {
            target: Target::Tx(conn),
            hooks: Some(hooks),
            events,
        }
    }

    pub fn in_transaction(&self) -> bool {
        matches!(self.target, Target::Tx(_))
    }

    /// Connection for the next statement.
    pub(crate) async fn acquire(&mut self) -> DbResult<Conn<'_>> {
        match &mut self.target {
            Target::Pool(pool) => Ok(Conn::Pooled(pool.acquire().await?)),
            Target::Tx(conn) => Ok(Conn::Borrowed(&mut **conn)),
        }
    }

    /// Publishes `event` after commit, or now when not in a transaction.
    pub(crate) fn emit(&self, event: DomainEvent) {
        match &self.hooks {
            Some(hooks) => {
                let events = self.events.clone();
                hooks.push(Box::new(move || events.publish(event)));
            }
            None => self.events.publish(event),
        }
    }
}

/// A connection that is either checked out of the pool or borrowed from an
/// open transaction.
pub(crate) enum Conn<'a> {
    Pooled(PoolConnection<Sqlite>),
    Borrowed(&'a mut SqliteConnection),
}

impl Deref for Conn<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            Conn::Pooled(conn) => conn,
            Conn::Borrowed(conn) => conn,
        }
    }
}

impl DerefMut for Conn<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            Conn::Pooled(conn) => conn,
            Conn::Borrowed(conn) => conn,
        }
    }
}
