//! # Repository Module
//!
//! Database repository implementations for the ledger.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads: methods on the repository (own a pool clone)                   │
//! │       db.batches().for_product(id)        ──► SqlitePool               │
//! │                                                                         │
//! │  Writes: associated functions taking a connection                      │
//! │       let mut tx = db.pool().begin().await?;                           │
//! │       BatchRepository::decrement(&mut tx, batch_id, 5)  ─┐             │
//! │       SaleRepository::insert(&mut tx, &sale)            ─┤ one tx      │
//! │       tx.commit().await?;                               ─┘             │
//! │                                                                         │
//! │  The engine decides what goes into one transaction; repositories       │
//! │  only know how rows are laid out.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog and stock levels
//! - [`BatchRepository`](batch::BatchRepository) - Stock batches, FEFO reads
//! - [`PurchaseRepository`](purchase::PurchaseRepository) - Purchases and lines
//! - [`SaleRepository`](sale::SaleRepository) - Sales, lines, consumption records
//! - [`ReturnRepository`](returns::ReturnRepository) - Returns and release records
//! - [`ExpenseRepository`](expense::ExpenseRepository) - Expenses and reminders
//! - [`ReportRepository`](report::ReportRepository) - Profit/loss aggregates

use uuid::Uuid;

pub mod batch;
pub mod expense;
pub mod product;
pub mod purchase;
pub mod report;
pub mod returns;
pub mod sale;

/// Generates a new entity id (UUID v4).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Test fixtures shared by the repository tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, Utc};
    use tally_core::{Product, StockBatch};

    use super::new_id;
    use crate::pool::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub async fn product(db: &Database, sku: &str) -> Product {
        let now = Utc::now();
        let product = Product {
            id: new_id(),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            category: None,
            unit: Some("pcs".to_string()),
            barcode: None,
            sale_price_cents: 1000,
            purchase_price_cents: 500,
            reorder_level: 5,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await.unwrap()
    }

    pub async fn batch(
        db: &Database,
        product_id: &str,
        qty: i64,
        cost: i64,
        expiry: Option<NaiveDate>,
    ) -> StockBatch {
        let batch = StockBatch {
            id: new_id(),
            product_id: product_id.to_string(),
            batch_no: format!("B-{}", &new_id()[..8]),
            received_date: date(2023, 12, 1),
            expiry_date: expiry,
            initial_quantity: qty,
            quantity_remaining: qty,
            unit_cost_cents: cost,
            purchase_id: None,
            created_at: Utc::now(),
        };
        let mut tx = db.pool().begin().await.unwrap();
        crate::repository::batch::BatchRepository::insert(&mut tx, &batch)
            .await
            .unwrap();
        tx.commit().await.unwrap();
        batch
    }
}
