//! # Product Repository
//!
//! Database operations for the product catalog and derived stock levels.
//!
//! ## Stock Level Is Derived
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products has NO stock column.                                         │
//! │                                                                         │
//! │  on_hand(P) = Σ stock_batches.quantity_remaining WHERE product_id = P  │
//! │                                                                         │
//! │  A cached counter could drift from the batches; a sum cannot.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{Product, StockLevel};

const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, category, unit, barcode,
    sale_price_cents, purchase_price_cents, reorder_level,
    created_at, updated_at
"#;

const STOCK_LEVEL_SELECT: &str = r#"
    SELECT
        p.id AS product_id,
        p.sku,
        p.name,
        COALESCE(SUM(b.quantity_remaining), 0) AS on_hand,
        p.reorder_level
    FROM products p
    LEFT JOIN stock_batches b ON b.product_id = p.id
"#;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Gets a product by its SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(sku)
            .fetch_optional(&self.pool)
            .await?;

        Ok(product)
    }

    /// Lists every product, sorted by name.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY name, sku");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Inserted product
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, category, unit, barcode,
                sale_price_cents, purchase_price_cents, reorder_level,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(&product.barcode)
        .bind(product.sale_price_cents)
        .bind(product.purchase_price_cents)
        .bind(product.reorder_level)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        Ok(product.clone())
    }

    /// Updates the administrative fields of a product.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Product doesn't exist
    pub async fn update(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, "Updating product");

        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE products SET
                sku = ?2,
                name = ?3,
                category = ?4,
                unit = ?5,
                barcode = ?6,
                sale_price_cents = ?7,
                purchase_price_cents = ?8,
                reorder_level = ?9,
                updated_at = ?10
            WHERE id = ?1
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.category)
        .bind(&product.unit)
        .bind(&product.barcode)
        .bind(product.sale_price_cents)
        .bind(product.purchase_price_cents)
        .bind(product.reorder_level)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// On-hand summary for one product.
    pub async fn stock_level(&self, id: &str) -> DbResult<Option<StockLevel>> {
        let sql = format!("{STOCK_LEVEL_SELECT} WHERE p.id = ?1 GROUP BY p.id");
        let level = sqlx::query_as::<_, StockLevel>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(level)
    }

    /// On-hand summaries for every product, sorted by name.
    pub async fn stock_levels(&self) -> DbResult<Vec<StockLevel>> {
        let sql = format!("{STOCK_LEVEL_SELECT} GROUP BY p.id ORDER BY p.name, p.sku");
        let levels = sqlx::query_as::<_, StockLevel>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(levels)
    }

    /// Products whose on-hand quantity is at or below their reorder level.
    pub async fn low_stock(&self) -> DbResult<Vec<StockLevel>> {
        let sql = format!(
            "{STOCK_LEVEL_SELECT} GROUP BY p.id \
             HAVING COALESCE(SUM(b.quantity_remaining), 0) <= p.reorder_level \
             ORDER BY p.name, p.sku"
        );
        let levels = sqlx::query_as::<_, StockLevel>(&sql)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = levels.len(), "Low stock products");
        Ok(levels)
    }

    /// Counts total products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MILK-1L").await;

        let by_id = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(by_id.sku, "MILK-1L");

        let by_sku = db.products().get_by_sku("MILK-1L").await.unwrap().unwrap();
        assert_eq!(by_sku.id, product.id);

        assert!(db.products().get_by_id("missing").await.unwrap().is_none());
        assert_eq!(db.products().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_unique_violation() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MILK-1L").await;

        let mut twin = product.clone();
        twin.id = crate::repository::new_id();
        let err = db.products().insert(&twin).await.unwrap_err();

        match err {
            DbError::UniqueViolation { value, .. } => assert_eq!(value, "MILK-1L"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let db = fixtures::db().await;
        let mut product = fixtures::product(&db, "MILK-1L").await;
        product.id = "missing".to_string();

        assert!(matches!(
            db.products().update(&product).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_stock_level_sums_batches() {
        let db = fixtures::db().await;
        let product = fixtures::product(&db, "MILK-1L").await;
        let empty = fixtures::product(&db, "BREAD").await;

        fixtures::batch(&db, &product.id, 10, 500, None).await;
        fixtures::batch(&db, &product.id, 7, 600, None).await;

        let level = db.products().stock_level(&product.id).await.unwrap().unwrap();
        assert_eq!(level.on_hand, 17);
        assert!(!level.is_low());

        let level = db.products().stock_level(&empty.id).await.unwrap().unwrap();
        assert_eq!(level.on_hand, 0);

        let low = db.products().low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product_id, empty.id);

        assert_eq!(db.products().stock_levels().await.unwrap().len(), 2);
    }
}
