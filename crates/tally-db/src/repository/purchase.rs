//! # Purchase Repository
//!
//! Purchase headers and lines. The batches a purchase creates are written
//! through [`BatchRepository`](super::batch::BatchRepository) in the same
//! transaction.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{DateRange, Purchase, PurchaseItem};

const PURCHASE_COLUMNS: &str = "id, supplier_id, invoice_no, date, total_cents, created_at";

/// Repository for purchase database operations.
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
}

impl PurchaseRepository {
    /// Creates a new PurchaseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PurchaseRepository { pool }
    }

    /// Gets a purchase with its lines.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Purchase>> {
        let sql = format!("SELECT {PURCHASE_COLUMNS} FROM purchases WHERE id = ?1");
        let purchase = sqlx::query_as::<_, Purchase>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match purchase {
            Some(mut purchase) => {
                purchase.items = self.get_items(&purchase.id).await?;
                Ok(Some(purchase))
            }
            None => Ok(None),
        }
    }

    /// Purchases dated within `range`, oldest first.
    pub async fn list_by_date(&self, range: DateRange) -> DbResult<Vec<Purchase>> {
        let sql = format!(
            "SELECT {PURCHASE_COLUMNS} FROM purchases WHERE date BETWEEN ?1 AND ?2 \
             ORDER BY date ASC, created_at ASC"
        );
        let mut purchases = sqlx::query_as::<_, Purchase>(&sql)
            .bind(range.start())
            .bind(range.end())
            .fetch_all(&self.pool)
            .await?;

        for purchase in &mut purchases {
            purchase.items = self.get_items(&purchase.id).await?;
        }

        Ok(purchases)
    }

    /// Lines of a purchase in line order.
    pub async fn get_items(&self, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
        let items = sqlx::query_as::<_, PurchaseItem>(
            r#"
            SELECT id, purchase_id, line_no, product_id, quantity, cost_price_cents, batch_id
            FROM purchase_items
            WHERE purchase_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(purchase_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    // =========================================================================
    // Transaction-scoped writes
    // =========================================================================

    /// Inserts the purchase header.
    ///
    /// Lines reference batches, so callers insert the header first, then
    /// each batch, then [`insert_item`](Self::insert_item).
    pub async fn insert(conn: &mut SqliteConnection, purchase: &Purchase) -> DbResult<()> {
        debug!(
            purchase_id = %purchase.id,
            invoice_no = %purchase.invoice_no,
            lines = purchase.items.len(),
            "Inserting purchase"
        );

        sqlx::query(
            r#"
            INSERT INTO purchases (id, supplier_id, invoice_no, date, total_cents, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&purchase.id)
        .bind(&purchase.supplier_id)
        .bind(&purchase.invoice_no)
        .bind(purchase.date)
        .bind(purchase.total_cents)
        .bind(purchase.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts one purchase line.
    pub async fn insert_item(conn: &mut SqliteConnection, item: &PurchaseItem) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchase_items (
                id, purchase_id, line_no, product_id, quantity, cost_price_cents, batch_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&item.id)
        .bind(&item.purchase_id)
        .bind(item.line_no)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.cost_price_cents)
        .bind(&item.batch_id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::batch::BatchRepository;
    use crate::repository::fixtures::{self, date};
    use crate::repository::new_id;
    use chrono::Utc;
    use tally_core::StockBatch;

    #[tokio::test]
    async fn test_purchase_roundtrip_with_batch() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "RICE-5KG").await;

        let purchase_id = new_id();
        let batch = StockBatch {
            id: new_id(),
            product_id: product.id.clone(),
            batch_no: "PO-1-1".to_string(),
            received_date: date(2024, 1, 2),
            expiry_date: None,
            initial_quantity: 10,
            quantity_remaining: 10,
            unit_cost_cents: 450,
            purchase_id: Some(purchase_id.clone()),
            created_at: Utc::now(),
        };
        let item = PurchaseItem {
            id: new_id(),
            purchase_id: purchase_id.clone(),
            line_no: 1,
            product_id: product.id.clone(),
            quantity: 10,
            cost_price_cents: 450,
            batch_id: batch.id.clone(),
        };
        let purchase = Purchase {
            id: purchase_id.clone(),
            supplier_id: "4".to_string(),
            invoice_no: "PO-1".to_string(),
            date: date(2024, 1, 2),
            total_cents: 4_500,
            created_at: Utc::now(),
            items: vec![item.clone()],
        };

        let mut tx = db.pool().begin().await.unwrap();
        PurchaseRepository::insert(&mut tx, &purchase).await.unwrap();
        BatchRepository::insert(&mut tx, &batch).await.unwrap();
        PurchaseRepository::insert_item(&mut tx, &item).await.unwrap();
        tx.commit().await.unwrap();

        let loaded = db.purchases().get_by_id(&purchase_id).await.unwrap().unwrap();
        assert_eq!(loaded.items, vec![item]);
        assert_eq!(loaded.total().cents(), 4_500);

        let listed = db
            .purchases()
            .list_by_date(DateRange::day(date(2024, 1, 2)))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.purchase_id.as_deref(), Some(purchase_id.as_str()));
    }
}
