//! # Stock Batch Repository
//!
//! Rows of `stock_batches` and the guarded quantity updates the ledger
//! applies inside its transactions.
//!
//! ## Guarded Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  decrement: UPDATE ... SET quantity_remaining = quantity_remaining - ?  │
//! │             WHERE id = ? AND quantity_remaining >= ?                    │
//! │                                                                         │
//! │  increment: UPDATE ... SET quantity_remaining = quantity_remaining + ?  │
//! │             WHERE id = ? AND quantity_remaining + ? <= initial_quantity │
//! │                                                                         │
//! │  0 rows affected ──► the batch moved under us; the caller rolls back.  │
//! │  The table CHECK keeps 0 <= remaining <= initial regardless.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::StockBatch;

const BATCH_COLUMNS: &str = r#"
    id, product_id, batch_no, received_date, expiry_date,
    initial_quantity, quantity_remaining, unit_cost_cents,
    purchase_id, created_at
"#;

/// Consumption order: expiring batches first, then FIFO.
const FEFO_ORDER: &str =
    "ORDER BY expiry_date ASC NULLS LAST, received_date ASC, created_at ASC, id ASC";

/// Repository for stock batch operations.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Gets a batch by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<StockBatch>> {
        let sql = format!("SELECT {BATCH_COLUMNS} FROM stock_batches WHERE id = ?1");
        let batch = sqlx::query_as::<_, StockBatch>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(batch)
    }

    /// Gets several batches by ID, in no particular order.
    pub async fn get_many(&self, ids: &[String]) -> DbResult<Vec<StockBatch>> {
        let mut batches = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(batch) = self.get_by_id(id).await? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }

    /// Every batch of a product, depleted ones included, in FEFO order.
    pub async fn for_product(&self, product_id: &str) -> DbResult<Vec<StockBatch>> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE product_id = ?1 {FEFO_ORDER}"
        );
        let batches = sqlx::query_as::<_, StockBatch>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(product_id = %product_id, count = batches.len(), "Loaded batches");
        Ok(batches)
    }

    /// Batches of a product that still hold stock, in FEFO order.
    pub async fn available_for_product(&self, product_id: &str) -> DbResult<Vec<StockBatch>> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches \
             WHERE product_id = ?1 AND quantity_remaining > 0 {FEFO_ORDER}"
        );
        let batches = sqlx::query_as::<_, StockBatch>(&sql)
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(batches)
    }

    /// Σ quantity_remaining over a product's batches.
    pub async fn available(&self, product_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity_remaining), 0) FROM stock_batches WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }

    /// Non-depleted batches expiring on or before `date`, soonest first.
    pub async fn expiring_on_or_before(&self, date: NaiveDate) -> DbResult<Vec<StockBatch>> {
        let sql = format!(
            "SELECT {BATCH_COLUMNS} FROM stock_batches \
             WHERE expiry_date IS NOT NULL AND expiry_date <= ?1 AND quantity_remaining > 0 \
             {FEFO_ORDER}"
        );
        let batches = sqlx::query_as::<_, StockBatch>(&sql)
            .bind(date)
            .fetch_all(&self.pool)
            .await?;

        Ok(batches)
    }

    // =========================================================================
    // Transaction-scoped writes
    // =========================================================================

    /// Inserts a new batch.
    pub async fn insert(conn: &mut SqliteConnection, batch: &StockBatch) -> DbResult<()> {
        debug!(
            batch_id = %batch.id,
            product_id = %batch.product_id,
            qty = batch.initial_quantity,
            "Inserting batch"
        );

        sqlx::query(
            r#"
            INSERT INTO stock_batches (
                id, product_id, batch_no, received_date, expiry_date,
                initial_quantity, quantity_remaining, unit_cost_cents,
                purchase_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&batch.id)
        .bind(&batch.product_id)
        .bind(&batch.batch_no)
        .bind(batch.received_date)
        .bind(batch.expiry_date)
        .bind(batch.initial_quantity)
        .bind(batch.quantity_remaining)
        .bind(batch.unit_cost_cents)
        .bind(&batch.purchase_id)
        .bind(batch.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Takes `quantity` units out of a batch.
    ///
    /// Returns `false` (and changes nothing) if the batch holds fewer units.
    pub async fn decrement(
        conn: &mut SqliteConnection,
        batch_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stock_batches
            SET quantity_remaining = quantity_remaining - ?2
            WHERE id = ?1 AND quantity_remaining >= ?2
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        debug!(batch_id = %batch_id, qty = quantity, applied = (result.rows_affected() == 1), "Decrement");
        Ok(result.rows_affected() == 1)
    }

    /// Puts `quantity` units back into a batch.
    ///
    /// Returns `false` (and changes nothing) if that would exceed the
    /// quantity the batch was issued with.
    pub async fn increment(
        conn: &mut SqliteConnection,
        batch_id: &str,
        quantity: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE stock_batches
            SET quantity_remaining = quantity_remaining + ?2
            WHERE id = ?1 AND quantity_remaining + ?2 <= initial_quantity
            "#,
        )
        .bind(batch_id)
        .bind(quantity)
        .execute(&mut *conn)
        .await?;

        debug!(batch_id = %batch_id, qty = quantity, applied = (result.rows_affected() == 1), "Increment");
        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{self, date};

    #[tokio::test]
    async fn test_fefo_read_order() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "YOGURT").await;

        let none = fixtures::batch(&db, &product.id, 5, 400, None).await;
        let feb = fixtures::batch(&db, &product.id, 10, 600, Some(date(2024, 2, 1))).await;
        let jan = fixtures::batch(&db, &product.id, 10, 500, Some(date(2024, 1, 1))).await;

        let ids: Vec<String> = db
            .batches()
            .for_product(&product.id)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![jan.id, feb.id, none.id]);

        assert_eq!(db.batches().available(&product.id).await.unwrap(), 25);
    }

    #[tokio::test]
    async fn test_guarded_decrement_and_increment() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "YOGURT").await;
        let batch = fixtures::batch(&db, &product.id, 10, 500, None).await;

        let mut tx = db.pool().begin().await.unwrap();
        assert!(BatchRepository::decrement(&mut tx, &batch.id, 4).await.unwrap());
        assert!(!BatchRepository::decrement(&mut tx, &batch.id, 7).await.unwrap());
        assert!(!BatchRepository::increment(&mut tx, &batch.id, 5).await.unwrap());
        assert!(BatchRepository::increment(&mut tx, &batch.id, 4).await.unwrap());
        tx.commit().await.unwrap();

        let stored = db.batches().get_by_id(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.quantity_remaining, 10);
    }

    #[tokio::test]
    async fn test_expiring_on_or_before() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "YOGURT").await;

        fixtures::batch(&db, &product.id, 5, 400, None).await;
        let soon = fixtures::batch(&db, &product.id, 5, 400, Some(date(2024, 1, 10))).await;
        fixtures::batch(&db, &product.id, 5, 400, Some(date(2024, 3, 1))).await;

        let expiring = db
            .batches()
            .expiring_on_or_before(date(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, soon.id);
    }
}
