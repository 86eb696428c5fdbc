//! # Merchant Service
//!
//! Onboarding and subscription renewal.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use bistro_core::validation::{validate_renewal_days, validate_username};
use bistro_core::{CoreError, Merchant, MerchantStatus, Store, StoreAccount, User, UserRole};

use crate::error::{DbError, DbResult};
use crate::events::DomainEvent;
use crate::pool::Database;
use crate::repository::user::NewUser;
use crate::repository::LockingReader;

/// Everything needed to open a merchant with its first store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMerchantBundle {
    pub merchant_name: String,
    pub store_name: String,
    pub admin_username: String,
    pub admin_display_name: String,
    /// Initial subscription length.
    pub trial_days: i64,
}

/// What `create_with_store` created.
#[derive(Debug, Clone)]
pub struct MerchantBundle {
    pub merchant: Merchant,
    pub store: Store,
    pub admin: User,
    pub account: StoreAccount,
}

/// Merchant onboarding and renewal.
#[derive(Debug, Clone)]
pub struct MerchantService {
    db: Database,
}

impl MerchantService {
    pub fn new(db: Database) -> Self {
        MerchantService { db }
    }

    /// Creates a merchant, its first store, an admin user and a zeroed
    /// store account, all or nothing.
    ///
    /// ## Errors
    /// * `UniqueViolation` - the admin username is taken
    pub async fn create_with_store(&self, new: NewMerchantBundle) -> DbResult<MerchantBundle> {
        validate_username(&new.admin_username)?;
        validate_renewal_days(new.trial_days)?;

        let bundle = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    if tx.users().exists_by_username(&new.admin_username).await? {
                        return Err(DbError::duplicate("username", new.admin_username));
                    }

                    let expire_at = Utc::now() + Duration::days(new.trial_days);
                    let merchant = tx.merchants().create(&new.merchant_name, expire_at).await?;
                    let store = tx.stores().create(merchant.id, &new.store_name).await?;
                    let admin = tx
                        .users()
                        .create(&NewUser {
                            merchant_id: merchant.id,
                            store_id: None,
                            username: new.admin_username,
                            display_name: new.admin_display_name,
                            role: UserRole::Admin,
                        })
                        .await?;
                    let account = tx.accounts().create_for_store(store.id).await?;

                    tx.publish(DomainEvent::MerchantCreated {
                        merchant_id: merchant.id,
                        store_id: store.id,
                        admin_user_id: admin.id,
                    });

                    Ok(MerchantBundle {
                        merchant,
                        store,
                        admin,
                        account,
                    })
                })
            })
            .await?;

        info!(
            merchant_id = bundle.merchant.id,
            store_id = bundle.store.id,
            "Merchant onboarded"
        );
        Ok(bundle)
    }

    /// Extends the subscription by `days`, counted from the current expiry
    /// or from now if it has already lapsed.
    ///
    /// ## Errors
    /// * `Domain(MerchantDisabled)` - disabled merchants cannot renew
    pub async fn renew(&self, merchant_id: i64, days: i64) -> DbResult<Merchant> {
        validate_renewal_days(days)?;

        let merchant = self
            .db
            .atomic(move |tx| {
                Box::pin(async move {
                    let mut merchants = tx.merchants();
                    let mut merchant = merchants.find_for_update(merchant_id).await?;
                    if merchant.status == MerchantStatus::Disabled {
                        return Err(CoreError::MerchantDisabled(merchant_id).into());
                    }

                    let expire_at = merchant.expire_at.max(Utc::now()) + Duration::days(days);
                    merchants.update_expire_at(merchant_id, expire_at).await?;
                    drop(merchants);

                    tx.publish(DomainEvent::MerchantRenewed {
                        merchant_id,
                        expire_at,
                    });

                    merchant.expire_at = expire_at;
                    Ok(merchant)
                })
            })
            .await?;

        info!(merchant_id, days, expire_at = %merchant.expire_at, "Merchant renewed");
        Ok(merchant)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_db;

    fn bundle(username: &str) -> NewMerchantBundle {
        NewMerchantBundle {
            merchant_name: "Golden Noodle".to_string(),
            store_name: "Downtown".to_string(),
            admin_username: username.to_string(),
            admin_display_name: "Owner".to_string(),
            trial_days: 14,
        }
    }

    async fn count(db: &Database, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_with_store() {
        let db = memory_db().await;
        let mut events = db.subscribe();

        let created = MerchantService::new(db.clone())
            .create_with_store(bundle("owner"))
            .await
            .unwrap();

        assert_eq!(created.store.merchant_id, created.merchant.id);
        assert_eq!(created.admin.role, UserRole::Admin);
        assert_eq!(created.account.store_id, created.store.id);
        assert_eq!(created.account.balance_cents, 0);
        assert!(!created.merchant.is_expired(Utc::now()));

        assert_eq!(
            events.recv().await.unwrap(),
            DomainEvent::MerchantCreated {
                merchant_id: created.merchant.id,
                store_id: created.store.id,
                admin_user_id: created.admin.id,
            }
        );
    }

    #[tokio::test]
    async fn test_duplicate_username_creates_nothing() {
        let db = memory_db().await;
        let service = MerchantService::new(db.clone());
        service.create_with_store(bundle("owner")).await.unwrap();

        let err = service.create_with_store(bundle("owner")).await.unwrap_err();
        assert!(err.is_conflict());

        assert_eq!(count(&db, "merchants").await, 1);
        assert_eq!(count(&db, "stores").await, 1);
        assert_eq!(count(&db, "store_accounts").await, 1);
    }

    #[tokio::test]
    async fn test_renew_extends_from_current_expiry() {
        let db = memory_db().await;
        let service = MerchantService::new(db.clone());
        let created = service.create_with_store(bundle("owner")).await.unwrap();

        let renewed = service.renew(created.merchant.id, 30).await.unwrap();
        let gained = renewed.expire_at - created.merchant.expire_at;
        assert_eq!(gained.num_days(), 30);

        let stored = db.merchants().find_by_id(created.merchant.id).await.unwrap();
        assert_eq!(stored.expire_at, renewed.expire_at);
    }

    #[tokio::test]
    async fn test_renew_lapsed_counts_from_now() {
        let db = memory_db().await;
        let merchant = db
            .merchants()
            .create("Lapsed", Utc::now() - Duration::days(90))
            .await
            .unwrap();

        let before = Utc::now();
        let renewed = MerchantService::new(db.clone()).renew(merchant.id, 10).await.unwrap();
        assert!(renewed.expire_at >= before + Duration::days(10));
        assert!(renewed.expire_at <= Utc::now() + Duration::days(10));
    }

    #[tokio::test]
    async fn test_disabled_merchant_cannot_renew() {
        let db = memory_db().await;
        let merchant = db
            .merchants()
            .create("Closed", Utc::now() + Duration::days(1))
            .await
            .unwrap();
        db.merchants()
            .set_status(merchant.id, MerchantStatus::Disabled)
            .await
            .unwrap();

        let err = MerchantService::new(db.clone()).renew(merchant.id, 30).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::MerchantDisabled(id)) if id == merchant.id));

        let stored = db.merchants().find_by_id(merchant.id).await.unwrap();
        assert_eq!(stored.expire_at, merchant.expire_at);
    }

    #[tokio::test]
    async fn test_renew_rejects_bad_days_and_missing_merchant() {
        let db = memory_db().await;
        let service = MerchantService::new(db);

        assert!(service.renew(1, 0).await.unwrap_err().is_params_error());
        assert!(service.renew(404, 30).await.unwrap_err().is_not_found());
    }
}
