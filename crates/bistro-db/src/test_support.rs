//! Fixtures shared by the unit tests of this crate.

use chrono::{Duration, NaiveDate, Utc};
use tempfile::TempDir;

use bistro_core::{PointSettlement, ReconciliationRecord, Store};

use crate::pool::{Database, DbConfig};
use crate::repository::reconciliation::NewReconciliation;
use crate::repository::settlement::NewPointSettlement;

/// Single-connection in-memory database with the schema applied.
pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// File-backed database for tests that need several connections at once.
///
/// Keep the `TempDir` alive for as long as the database is used.
pub async fn file_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = DbConfig::new(dir.path().join("bistro.db"))
        .max_connections(8)
        .busy_timeout(std::time::Duration::from_secs(30));
    let db = Database::new(config).await.expect("file database");
    (dir, db)
}

/// A merchant with one store. No account is opened.
pub async fn seed_store(db: &Database) -> Store {
    let merchant = db
        .merchants()
        .create("Test Merchant", Utc::now() + Duration::days(30))
        .await
        .expect("seed merchant");
    db.stores()
        .create(merchant.id, "Main Street")
        .await
        .expect("seed store")
}

pub async fn seed_settlement(db: &Database, store_id: i64, amount_cents: i64) -> PointSettlement {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).expect("date");
    db.settlements()
        .create(&NewPointSettlement {
            store_id,
            period_start: day,
            period_end: day + Duration::days(6),
            total_points: amount_cents * 10,
            amount_cents,
        })
        .await
        .expect("seed settlement")
}

/// A pending reconciliation that came up 150 cents short.
pub async fn seed_reconciliation(db: &Database, store_id: i64, day: NaiveDate) -> ReconciliationRecord {
    db.reconciliations()
        .create(&NewReconciliation {
            store_id,
            business_date: day,
            expected_cents: 10_000,
            actual_cents: 9_850,
        })
        .await
        .expect("seed reconciliation")
}
