//! # Store Account Repository
//!
//! Four-column balance row per store plus its append-only log.
//!
//! ## Posting Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  atomic(|tx| {                                                          │
//! │    accounts.find_for_update(store)     ← locked read                   │
//! │    predicted = balances.checked_apply(delta)   (bistro-core)           │
//! │    accounts.adjust_amount(store, delta)                                │
//! │       UPDATE store_accounts                                            │
//! │       SET balance_cents = balance_cents + ?, ... (all four columns)    │
//! │    accounts.record_transaction(entry with after = predicted.balance)   │
//! │  })                                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `adjust_amount` never reads the row, so a pure credit is safe without the
//! locked read. Anything that must check sufficiency first needs the
//! locked read and an enclosing `atomic`.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use bistro_core::validation::{validate_amount_cents, validate_id};
use bistro_core::{AccountDelta, IdRange, IdWindow, NewLedgerEntry, StoreAccount, StoreAccountTransaction};

use crate::error::{DbError, DbResult};
use crate::events::DomainEvent;
use crate::handle::DbHandle;
use crate::repository::range::{self, TransactionFilter};
use crate::repository::{AtomicAdjuster, LockingReader, RangeAggregate};

const TRANSACTIONS_TABLE: &str = "store_account_transactions";

/// Repository for store accounts and their ledger entries.
pub struct AccountRepository<'c> {
    handle: DbHandle<'c>,
}

impl<'c> AccountRepository<'c> {
    pub(crate) fn new(handle: DbHandle<'c>) -> Self {
        AccountRepository { handle }
    }

    /// Opens a zeroed account for a store.
    pub async fn create_for_store(&mut self, store_id: i64) -> DbResult<StoreAccount> {
        validate_id("store_id", store_id)?;

        let now = Utc::now();
        debug!(store_id, "Creating store account");

        let mut conn = self.handle.acquire().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO store_accounts (
                store_id, balance_cents, pending_withdraw_cents,
                withdrawn_cents, total_amount_cents, updated_at
            ) VALUES (?1, 0, 0, 0, 0, ?2)
            "#,
        )
        .bind(store_id)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("store account", store_id.to_string()),
            other => other,
        })?;

        Ok(StoreAccount {
            id: result.last_insert_rowid(),
            store_id,
            balance_cents: 0,
            pending_withdraw_cents: 0,
            withdrawn_cents: 0,
            total_amount_cents: 0,
            updated_at: now,
        })
    }

    pub async fn find_by_store(&mut self, store_id: i64) -> DbResult<StoreAccount> {
        let mut conn = self.handle.acquire().await?;
        sqlx::query_as::<_, StoreAccount>("SELECT * FROM store_accounts WHERE store_id = ?1")
            .bind(store_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found("StoreAccount", store_id))
    }

    /// Reads a store's account and holds the write lock until the enclosing
    /// transaction ends.
    ///
    /// SQLite has no `FOR UPDATE`: inside `atomic` the `BEGIN IMMEDIATE`
    /// transaction already owns the database write lock, so no other writer
    /// can change the row before this transaction commits.
    pub async fn find_by_store_for_update(&mut self, store_id: i64) -> DbResult<StoreAccount> {
        validate_id("store_id", store_id)?;
        if !self.handle.in_transaction() {
            debug!(store_id, "Locked read outside a transaction, lock released immediately");
        }
        self.find_by_store(store_id).await
    }

    /// Keyset page of ledger entries, oldest first.
    pub async fn list_transactions(
        &mut self,
        filter: &TransactionFilter,
        after_id: Option<i64>,
        limit: i64,
    ) -> DbResult<Vec<StoreAccountTransaction>> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_after(&mut conn, TRANSACTIONS_TABLE, filter, after_id, limit).await
    }

    /// Ledger entries inside one id window.
    pub async fn list_transactions_in_window(
        &mut self,
        filter: &TransactionFilter,
        window: IdWindow,
    ) -> DbResult<Vec<StoreAccountTransaction>> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_window(&mut conn, TRANSACTIONS_TABLE, filter, window).await
    }

    pub async fn get_transaction_range(&mut self, filter: &TransactionFilter) -> DbResult<IdRange> {
        let mut conn = self.handle.acquire().await?;
        range::fetch_range(&mut conn, TRANSACTIONS_TABLE, filter).await
    }
}

#[async_trait]
impl<'c> LockingReader for AccountRepository<'c> {
    type Record = StoreAccount;

    async fn find_for_update(&mut self, store_id: i64) -> DbResult<StoreAccount> {
        self.find_by_store_for_update(store_id).await
    }
}

#[async_trait]
impl<'c> AtomicAdjuster for AccountRepository<'c> {
    /// Adds `delta` to the four columns in one statement.
    ///
    /// ## Errors
    /// * `InvalidParams` - empty delta, or one that breaks
    ///   `balance = total − withdrawn − pending_withdraw`
    /// * `NotFound` - the store has no account
    async fn adjust_amount(&mut self, store_id: i64, delta: AccountDelta) -> DbResult<()> {
        validate_id("store_id", store_id)?;
        if delta.is_zero() {
            return Err(DbError::invalid("account delta is empty"));
        }
        if !delta.is_consistent() {
            return Err(DbError::invalid(format!(
                "account delta {delta:?} breaks balance = total - withdrawn - pending_withdraw"
            )));
        }

        let mut conn = self.handle.acquire().await?;
        let affected = sqlx::query(
            r#"
            UPDATE store_accounts
            SET balance_cents          = balance_cents + ?1,
                pending_withdraw_cents = pending_withdraw_cents + ?2,
                withdrawn_cents        = withdrawn_cents + ?3,
                total_amount_cents     = total_amount_cents + ?4,
                updated_at             = ?5
            WHERE store_id = ?6
            "#,
        )
        .bind(delta.balance)
        .bind(delta.pending_withdraw)
        .bind(delta.withdrawn)
        .bind(delta.total)
        .bind(Utc::now())
        .bind(store_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(DbError::not_found("StoreAccount", store_id));
        }

        debug!(
            store_id,
            balance = delta.balance,
            pending_withdraw = delta.pending_withdraw,
            withdrawn = delta.withdrawn,
            total = delta.total,
            "Store account adjusted"
        );
        Ok(())
    }

    /// Appends an immutable ledger entry.
    async fn record_transaction(&mut self, entry: NewLedgerEntry) -> DbResult<StoreAccountTransaction> {
        validate_id("store_id", entry.store_id)?;
        validate_id("account_id", entry.account_id)?;
        validate_amount_cents("amount", entry.amount_cents)?;

        let no = Uuid::new_v4().to_string();
        let now = Utc::now();

        let id = {
            let mut conn = self.handle.acquire().await?;
            sqlx::query(
                r#"
                INSERT INTO store_account_transactions (
                    no, store_id, account_id, kind,
                    amount_cents, after_cents, reference, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&no)
            .bind(entry.store_id)
            .bind(entry.account_id)
            .bind(entry.kind)
            .bind(entry.amount_cents)
            .bind(entry.after_cents)
            .bind(&entry.reference)
            .bind(now)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid()
        };

        debug!(
            id,
            store_id = entry.store_id,
            kind = entry.kind.as_str(),
            amount = entry.amount_cents,
            after = entry.after_cents,
            "Ledger entry recorded"
        );

        self.handle.emit(DomainEvent::LedgerPosted {
            store_id: entry.store_id,
            transaction_id: id,
            kind: entry.kind,
            amount_cents: entry.amount_cents,
            after_cents: entry.after_cents,
        });

        Ok(StoreAccountTransaction {
            id,
            no,
            store_id: entry.store_id,
            account_id: entry.account_id,
            kind: entry.kind,
            amount_cents: entry.amount_cents,
            after_cents: entry.after_cents,
            reference: entry.reference,
            created_at: now,
        })
    }
}

#[async_trait]
impl<'c> RangeAggregate for AccountRepository<'c> {
    type Filter = TransactionFilter;

    async fn get_range(&mut self, filter: &TransactionFilter) -> DbResult<IdRange> {
        self.get_transaction_range(filter).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{memory_db, seed_store};
    use bistro_core::{LedgerKind, Money};

    fn income(cents: i64) -> AccountDelta {
        LedgerKind::Income.delta(Money::from_cents(cents))
    }

    #[tokio::test]
    async fn test_adjust_and_record_in_one_atomic() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let account = db.accounts().create_for_store(store_id).await.unwrap();

        let txn = db
            .atomic(move |tx| {
                Box::pin(async move {
                    let mut accounts = tx.accounts();
                    accounts.adjust_amount(store_id, income(100)).await?;
                    accounts
                        .record_transaction(NewLedgerEntry {
                            store_id,
                            account_id: account.id,
                            kind: LedgerKind::Income,
                            amount_cents: 100,
                            after_cents: 100,
                            reference: None,
                        })
                        .await
                })
            })
            .await
            .unwrap();

        let account = db.accounts().find_by_store(store_id).await.unwrap();
        assert_eq!(account.balance_cents, 100);
        assert_eq!(account.total_amount_cents, 100);

        let entries = db
            .accounts()
            .list_transactions(
                &TransactionFilter {
                    store_id: Some(store_id),
                    ..Default::default()
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, txn.id);
        assert_eq!(entries[0].after_cents, 100);
        assert_eq!(entries[0].kind, LedgerKind::Income);
    }

    #[tokio::test]
    async fn test_inconsistent_delta_rejected_before_write() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        db.accounts().create_for_store(store_id).await.unwrap();

        let broken = AccountDelta {
            balance: 100,
            ..Default::default()
        };
        let err = db.accounts().adjust_amount(store_id, broken).await.unwrap_err();
        assert!(err.is_params_error());

        let overflowing = AccountDelta {
            balance: 0,
            pending_withdraw: 0,
            withdrawn: 1,
            total: i64::MIN,
        };
        let err = db.accounts().adjust_amount(store_id, overflowing).await.unwrap_err();
        assert!(err.is_params_error());

        let err = db
            .accounts()
            .adjust_amount(store_id, AccountDelta::default())
            .await
            .unwrap_err();
        assert!(err.is_params_error());

        assert_eq!(db.accounts().find_by_store(store_id).await.unwrap().balance_cents, 0);
    }

    #[tokio::test]
    async fn test_missing_account() {
        let db = memory_db().await;

        let err = db.accounts().adjust_amount(77, income(5)).await.unwrap_err();
        assert!(err.is_not_found());

        let err = db.accounts().find_for_update(77).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_account_is_conflict() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;

        db.accounts().create_for_store(store_id).await.unwrap();
        let err = db.accounts().create_for_store(store_id).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_transaction_range_and_pages() {
        let db = memory_db().await;
        let store_id = seed_store(&db).await.id;
        let account = db.accounts().create_for_store(store_id).await.unwrap();

        for amount in [10, 20, 30, 40, 50] {
            db.accounts()
                .record_transaction(NewLedgerEntry {
                    store_id,
                    account_id: account.id,
                    kind: LedgerKind::Income,
                    amount_cents: amount,
                    after_cents: amount,
                    reference: None,
                })
                .await
                .unwrap();
        }

        let filter = TransactionFilter {
            store_id: Some(store_id),
            ..Default::default()
        };
        let range = db.accounts().get_range(&filter).await.unwrap();
        assert_eq!(range.count, 5);
        assert_eq!(range.max - range.min, 4);

        let first = db.accounts().list_transactions(&filter, None, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        let rest = db
            .accounts()
            .list_transactions(&filter, Some(first[1].id), 10)
            .await
            .unwrap();
        assert_eq!(rest.len(), 3);
        assert_eq!(rest[0].amount_cents, 30);

        let refunds = TransactionFilter {
            kind: Some(LedgerKind::Refund),
            ..filter
        };
        assert!(db.accounts().get_range(&refunds).await.unwrap().is_empty());
    }
}
