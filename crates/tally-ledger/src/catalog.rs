//! # Product Catalog
//!
//! Reference data: identity, pricing, reorder threshold. Nothing here
//! touches stock; on-hand figures are read from the batches.

use chrono::Utc;
use tracing::info;

use tally_core::validation::validate_product_input;
use tally_core::{LedgerError, LedgerResult, Product, ProductInput, StockLevel};
use tally_db::{new_id, Database};

/// Product administration and stock-level queries.
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    db: Database,
}

impl ProductCatalog {
    pub fn new(db: Database) -> Self {
        ProductCatalog { db }
    }

    /// Adds a product.
    ///
    /// ## Errors
    /// * `Validation(Duplicate)` - the SKU is taken
    pub async fn create_product(&self, input: ProductInput) -> LedgerResult<Product> {
        validate_product_input(&input)?;

        let now = Utc::now();
        let product = Product {
            id: new_id(),
            sku: input.sku.trim().to_string(),
            name: input.name.trim().to_string(),
            category: input.category,
            unit: input.unit,
            barcode: input.barcode,
            sale_price_cents: input.sale_price.cents(),
            purchase_price_cents: input.purchase_price.cents(),
            reorder_level: input.reorder_level,
            created_at: now,
            updated_at: now,
        };

        let product = self.db.products().insert(&product).await?;
        info!(product_id = %product.id, sku = %product.sku, "Product created");
        Ok(product)
    }

    /// Replaces the administrative fields of a product.
    pub async fn update_product(&self, id: &str, input: ProductInput) -> LedgerResult<Product> {
        validate_product_input(&input)?;

        let mut product = self.get_product(id).await?;
        product.sku = input.sku.trim().to_string();
        product.name = input.name.trim().to_string();
        product.category = input.category;
        product.unit = input.unit;
        product.barcode = input.barcode;
        product.sale_price_cents = input.sale_price.cents();
        product.purchase_price_cents = input.purchase_price.cents();
        product.reorder_level = input.reorder_level;

        self.db.products().update(&product).await?;
        info!(product_id = %id, "Product updated");

        self.get_product(id).await
    }

    /// Gets a product or fails with `NotFound`.
    pub async fn get_product(&self, id: &str) -> LedgerResult<Product> {
        require_product(&self.db, id).await
    }

    /// All products, sorted by name.
    pub async fn list_products(&self) -> LedgerResult<Vec<Product>> {
        Ok(self.db.products().list().await?)
    }

    /// On-hand summary for one product.
    pub async fn stock_level(&self, product_id: &str) -> LedgerResult<StockLevel> {
        self.db
            .products()
            .stock_level(product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Product", product_id))
    }

    /// Products at or below their reorder level.
    pub async fn low_stock(&self) -> LedgerResult<Vec<StockLevel>> {
        Ok(self.db.products().low_stock().await?)
    }
}

/// Loads a product or fails with `NotFound`.
pub(crate) async fn require_product(db: &Database, id: &str) -> LedgerResult<Product> {
    db.products()
        .get_by_id(id)
        .await?
        .ok_or_else(|| LedgerError::not_found("Product", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Money, ValidationError};
    use tally_db::DbConfig;

    async fn catalog() -> ProductCatalog {
        ProductCatalog::new(Database::new(DbConfig::in_memory()).await.unwrap())
    }

    fn input(sku: &str) -> ProductInput {
        ProductInput {
            sku: sku.to_string(),
            name: "Basmati Rice 5kg".to_string(),
            category: Some("Grocery".to_string()),
            unit: Some("bag".to_string()),
            barcode: None,
            sale_price: Money::from_cents(1_800),
            purchase_price: Money::from_cents(1_400),
            reorder_level: 3,
        }
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let catalog = catalog().await;
        let product = catalog.create_product(input("RICE-5")).await.unwrap();
        assert_eq!(product.sale_price().cents(), 1_800);

        let mut edit = input("RICE-5");
        edit.sale_price = Money::from_cents(1_900);
        let updated = catalog.update_product(&product.id, edit).await.unwrap();
        assert_eq!(updated.sale_price_cents, 1_900);
        assert_eq!(catalog.list_products().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_validation_error() {
        let catalog = catalog().await;
        catalog.create_product(input("RICE-5")).await.unwrap();

        let err = catalog.create_product(input("RICE-5")).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::Duplicate { ref value, .. }) if value == "RICE-5"
        ));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let catalog = catalog().await;
        assert!(matches!(
            catalog.get_product("nope").await,
            Err(LedgerError::NotFound { .. })
        ));
        assert!(matches!(
            catalog.stock_level("nope").await,
            Err(LedgerError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_new_product_is_low_stock() {
        let catalog = catalog().await;
        let product = catalog.create_product(input("RICE-5")).await.unwrap();

        let low = catalog.low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product_id, product.id);
        assert_eq!(low[0].on_hand, 0);
    }
}
