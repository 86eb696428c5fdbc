//! # Seed Data Generator
//!
//! Populates the database with a demo merchant for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./bistro_dev.db with 12 tables (default)
//! cargo run -p bistro-db --bin seed
//!
//! # Custom table count and database path
//! cargo run -p bistro-db --bin seed -- --tables 30 --db ./data/bistro.db
//!
//! # More log output
//! RUST_LOG=bistro_db=debug cargo run -p bistro-db --bin seed
//! ```
//!
//! ## Generated Data
//! - One merchant with a 30-day trial, its first store, an admin user and a
//!   zeroed store account
//! - Dine tables `T01..Tnn`; the first is seated with a small cart
//! - One approved point settlement (credits the store ledger)
//! - A week of reconciliation records awaiting review

use std::env;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bistro_db::prelude::*;

const DEMO_USERNAME: &str = "demo_admin";

/// Menu items put on the first table: (product id, variant, quantity)
const DEMO_CART: &[(i64, &str, i64)] = &[(101, "", 2), (205, "large", 1), (310, "no-ice", 3)];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut table_count: usize = 12;
    let mut db_path = String::from("./bistro_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tables" | "-t" => {
                if i + 1 < args.len() {
                    table_count = args[i + 1].parse().unwrap_or(12);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bistro POS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -t, --tables <N>   Number of dine tables to create (default: 12)");
                println!("  -d, --db <PATH>    Database file path (default: ./bistro_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, tables = table_count, "Seeding demo data");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    if db.users().exists_by_username(DEMO_USERNAME).await? {
        warn!(username = DEMO_USERNAME, "Demo merchant already exists, skipping seed");
        return Ok(());
    }

    // Merchant, store, admin and account in one transaction
    let bundle = MerchantService::new(db.clone())
        .create_with_store(NewMerchantBundle {
            merchant_name: "Demo Bistro Group".to_string(),
            store_name: "Demo Bistro Downtown".to_string(),
            admin_username: DEMO_USERNAME.to_string(),
            admin_display_name: "Demo Owner".to_string(),
            trial_days: 30,
        })
        .await?;
    let store_id = bundle.store.id;

    let mut table_ids = Vec::with_capacity(table_count);
    for n in 1..=table_count {
        let table = db.tables().create(store_id, &format!("T{n:02}")).await?;
        table_ids.push(table.id);
    }
    info!(count = table_ids.len(), "Tables created");

    if let Some(&first) = table_ids.first() {
        DiningService::new(db.clone()).open_table(first, 1).await?;

        let cart = CartService::new(db.clone());
        for &(product_id, variant, quantity) in DEMO_CART {
            cart.add_item(first, product_id, variant, quantity).await?;
        }
        info!(table_id = first, lines = DEMO_CART.len(), "Demo table seated");
    }

    // Last week's loyalty points, approved by the admin
    let today = Utc::now().date_naive();
    let settlement = db
        .settlements()
        .create(&NewPointSettlement {
            store_id,
            period_start: today - Duration::days(7),
            period_end: today - Duration::days(1),
            total_points: 48_000,
            amount_cents: 4_800,
        })
        .await?;
    SettlementService::new(db.clone())
        .approve(settlement.id, bundle.admin.id)
        .await?;

    for days_ago in 1..=7 {
        db.reconciliations()
            .create(&NewReconciliation {
                store_id,
                business_date: today - Duration::days(days_ago),
                expected_cents: 125_000 + days_ago * 1_000,
                actual_cents: 125_000 + days_ago * 1_000 - (days_ago % 3) * 50,
            })
            .await?;
    }

    let account = db.accounts().find_by_store(store_id).await?;
    let backlog = BatchPlanner::new(db.clone(), 100)?
        .reconciliations(&ReconciliationFilter {
            store_id: Some(store_id),
            status: Some(ApprovalStatus::Pending),
            ..Default::default()
        })
        .await?;

    info!(
        merchant_no = %bundle.merchant.merchant_no,
        store_id,
        balance = %Money::from_cents(account.balance_cents),
        pending_reconciliations = backlog.range.count,
        "Seed complete"
    );

    db.close().await;
    Ok(())
}
