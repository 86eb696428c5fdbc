//! # Range Aggregation
//!
//! Filters shared by the "how much is there" and "give me this slice"
//! queries, so a batch job windows over exactly the rows it counted.
//!
//! ```text
//! filter ──► SELECT MIN(id), MAX(id), COUNT(*) FROM t WHERE <filter>
//!        └─► SELECT * FROM t WHERE <filter> AND id BETWEEN ? AND ? ORDER BY id
//!        └─► SELECT * FROM t WHERE <filter> AND id > ? ORDER BY id LIMIT ?
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Encode, FromRow, QueryBuilder, Sqlite, SqliteConnection, Type};

use bistro_core::{ApprovalStatus, IdRange, IdWindow, LedgerKind};

use crate::error::DbResult;

// =============================================================================
// Predicate Builder
// =============================================================================

/// Appends `WHERE a AND b AND ...` to a query.
pub(crate) struct Predicates<'q, 'args> {
    qb: &'q mut QueryBuilder<'args, Sqlite>,
    any: bool,
}

impl<'q, 'args> Predicates<'q, 'args> {
    pub(crate) fn new(qb: &'q mut QueryBuilder<'args, Sqlite>) -> Self {
        Predicates { qb, any: false }
    }

    /// `column <op> ?`. `column` and `op` must be trusted literals.
    pub(crate) fn cmp<T>(&mut self, column: &str, op: &str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Sqlite> + Type<Sqlite> + Send,
    {
        self.qb.push(if self.any { " AND " } else { " WHERE " });
        self.any = true;
        self.qb.push(column).push(' ').push(op).push(' ');
        self.qb.push_bind(value);
        self
    }

    pub(crate) fn eq<T>(&mut self, column: &str, value: T) -> &mut Self
    where
        T: 'args + Encode<'args, Sqlite> + Type<Sqlite> + Send,
    {
        self.cmp(column, "=", value)
    }

    pub(crate) fn id_within(&mut self, window: IdWindow) -> &mut Self {
        self.cmp("id", ">=", window.start).cmp("id", "<=", window.end)
    }
}

/// A filter over one table.
pub(crate) trait RangeFilter {
    fn push_predicates(&self, predicates: &mut Predicates<'_, '_>);
}

// =============================================================================
// Filters
// =============================================================================

/// Selects point settlements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementFilter {
    pub store_id: Option<i64>,
    pub status: Option<ApprovalStatus>,
    /// Inclusive lower bound on `period_start`.
    pub period_from: Option<NaiveDate>,
    /// Inclusive upper bound on `period_end`.
    pub period_to: Option<NaiveDate>,
}

impl RangeFilter for SettlementFilter {
    fn push_predicates(&self, p: &mut Predicates<'_, '_>) {
        if let Some(store_id) = self.store_id {
            p.eq("store_id", store_id);
        }
        if let Some(status) = self.status {
            p.eq("status", status);
        }
        if let Some(from) = self.period_from {
            p.cmp("period_start", ">=", from);
        }
        if let Some(to) = self.period_to {
            p.cmp("period_end", "<=", to);
        }
    }
}

/// Selects reconciliation records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationFilter {
    pub store_id: Option<i64>,
    pub status: Option<ApprovalStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl RangeFilter for ReconciliationFilter {
    fn push_predicates(&self, p: &mut Predicates<'_, '_>) {
        if let Some(store_id) = self.store_id {
            p.eq("store_id", store_id);
        }
        if let Some(status) = self.status {
            p.eq("status", status);
        }
        if let Some(from) = self.date_from {
            p.cmp("business_date", ">=", from);
        }
        if let Some(to) = self.date_to {
            p.cmp("business_date", "<=", to);
        }
    }
}

/// Selects ledger entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub store_id: Option<i64>,
    pub kind: Option<LedgerKind>,
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive.
    pub created_before: Option<DateTime<Utc>>,
}

impl RangeFilter for TransactionFilter {
    fn push_predicates(&self, p: &mut Predicates<'_, '_>) {
        if let Some(store_id) = self.store_id {
            p.eq("store_id", store_id);
        }
        if let Some(kind) = self.kind {
            p.eq("kind", kind);
        }
        if let Some(from) = self.created_from {
            p.cmp("created_at", ">=", from);
        }
        if let Some(before) = self.created_before {
            p.cmp("created_at", "<", before);
        }
    }
}

// =============================================================================
// Queries
// =============================================================================

/// One aggregate statement over `table` restricted by `filter`.
pub(crate) async fn fetch_range<F: RangeFilter>(
    conn: &mut SqliteConnection,
    table: &str,
    filter: &F,
) -> DbResult<IdRange> {
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT MIN(id), MAX(id), COUNT(*) FROM ");
    qb.push(table);
    filter.push_predicates(&mut Predicates::new(&mut qb));

    let (min, max, count): (Option<i64>, Option<i64>, i64) =
        qb.build_query_as().fetch_one(&mut *conn).await?;

    Ok(match (min, max) {
        (Some(min), Some(max)) => IdRange { min, max, count },
        _ => IdRange::default(),
    })
}

/// Rows of `table` matching `filter` with ids inside `window`, by id.
pub(crate) async fn fetch_window<F, R>(
    conn: &mut SqliteConnection,
    table: &str,
    filter: &F,
    window: IdWindow,
) -> DbResult<Vec<R>>
where
    F: RangeFilter,
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
    qb.push(table);
    {
        let mut predicates = Predicates::new(&mut qb);
        filter.push_predicates(&mut predicates);
        predicates.id_within(window);
    }
    qb.push(" ORDER BY id");

    let rows = qb.build_query_as::<R>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

/// Keyset page: up to `limit` rows with id greater than `after_id`.
pub(crate) async fn fetch_after<F, R>(
    conn: &mut SqliteConnection,
    table: &str,
    filter: &F,
    after_id: Option<i64>,
    limit: i64,
) -> DbResult<Vec<R>>
where
    F: RangeFilter,
    R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM ");
    qb.push(table);
    {
        let mut predicates = Predicates::new(&mut qb);
        filter.push_predicates(&mut predicates);
        if let Some(after_id) = after_id {
            predicates.cmp("id", ">", after_id);
        }
    }
    qb.push(" ORDER BY id LIMIT ");
    qb.push_bind(limit.max(0));

    let rows = qb.build_query_as::<R>().fetch_all(&mut *conn).await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render<F: RangeFilter>(filter: &F) -> String {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT 1 FROM t");
        filter.push_predicates(&mut Predicates::new(&mut qb));
        qb.sql().to_string()
    }

    #[test]
    fn test_empty_filter_has_no_where() {
        assert_eq!(render(&SettlementFilter::default()), "SELECT 1 FROM t");
    }

    #[test]
    fn test_predicates_are_joined_with_and() {
        let sql = render(&ReconciliationFilter {
            store_id: Some(3),
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        });
        assert_eq!(sql, "SELECT 1 FROM t WHERE store_id = ? AND status = ?");
    }
}
