//! # Sales Processor
//!
//! Turns a list of requested lines into a committed sale.
//!
//! ## Create Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        create_sale(request)                             │
//! │                                                                         │
//! │  1. validate (lines, prices, discount ≤ subtotal, distinct products)   │
//! │  2. invoice unused, every product known            ── nothing touched  │
//! │                                                                         │
//! │  3. for each line, in request order:                                   │
//! │        StockLedger::consume(product, qty)   (locks ONE product)        │
//! │            │                                                            │
//! │            ├── ok  ──► SaleItem + consumption record                   │
//! │            └── err ──► release every earlier line, newest first,       │
//! │                        then surface the error                          │
//! │                                                                         │
//! │  4. BEGIN; insert sale (committed) + items + records; COMMIT           │
//! │        └── err ──► release every line, surface the error               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Holding one product at a time means two sales can never deadlock on
//! each other, whatever order their lines are in.

use chrono::Utc;
use tracing::{error, info, warn};

use tally_core::validation::validate_new_sale;
use tally_core::{
    BatchAllocation, DateRange, LedgerError, LedgerResult, NewSale, Sale, SaleItem, SaleStatus,
    ValidationError,
};
use tally_db::{new_id, Database, DbError, SaleRepository};

use crate::catalog::require_product;
use crate::stock::{apply_releases, check_releases, StockLedger};

/// Sale creation, lookup and voiding.
#[derive(Debug, Clone)]
pub struct SalesProcessor {
    db: Database,
    stock: StockLedger,
}

impl SalesProcessor {
    pub fn new(db: Database, stock: StockLedger) -> Self {
        SalesProcessor { db, stock }
    }

    /// Creates and commits a sale, consuming stock for every line.
    ///
    /// Subtotals and the total are computed here from quantity × unit
    /// price; the request carries no totals.
    ///
    /// ## Errors
    /// * `Validation` - bad input, duplicate invoice, repeated product
    /// * `NotFound` - unknown product
    /// * `InsufficientStock` - some line cannot be filled; no stock moved
    /// * `ConcurrencyConflict` - a product lock could not be had in time
    pub async fn create_sale(&self, request: NewSale) -> LedgerResult<Sale> {
        let subtotal = validate_new_sale(&request)?;
        let invoice_no = request.invoice_no.trim().to_string();

        if self.db.sales().invoice_exists(&invoice_no).await? {
            return Err(ValidationError::Duplicate {
                field: "invoice_no".to_string(),
                value: invoice_no,
            }
            .into());
        }
        for line in &request.items {
            require_product(&self.db, &line.product_id).await?;
        }

        let sale_id = new_id();
        let discount = request.discount;
        let mut sale = Sale {
            id: sale_id.clone(),
            invoice_no,
            date: request.date,
            subtotal_cents: subtotal.cents(),
            discount_cents: discount.cents(),
            total_cents: (subtotal - discount).cents(),
            payment_method: request.payment_method,
            created_by: request.created_by,
            status: SaleStatus::Open,
            created_at: Utc::now(),
            items: Vec::with_capacity(request.items.len()),
        };

        for (idx, line) in request.items.iter().enumerate() {
            let allocations = match self.stock.consume(&line.product_id, line.quantity).await {
                Ok(allocations) => allocations,
                Err(err) => {
                    warn!(
                        invoice_no = %sale.invoice_no,
                        product_id = %line.product_id,
                        requested = line.quantity,
                        error = %err,
                        "Sale line rejected, rolling back earlier lines"
                    );
                    self.compensate(&sale.items).await;
                    return Err(err);
                }
            };

            sale.items.push(SaleItem {
                id: new_id(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                line_no: idx as i64 + 1,
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                subtotal_cents: line.unit_price.multiply_quantity(line.quantity).cents(),
                allocations,
            });
        }

        sale.status = SaleStatus::Committed;
        if let Err(err) = self.persist(&sale).await {
            warn!(
                invoice_no = %sale.invoice_no,
                error = %err,
                "Sale could not be stored, rolling back stock"
            );
            self.compensate(&sale.items).await;
            return Err(err);
        }

        info!(
            sale_id = %sale.id,
            invoice_no = %sale.invoice_no,
            lines = sale.items.len(),
            total_cents = sale.total_cents,
            cogs_cents = sale.cogs().cents(),
            "Sale committed"
        );
        Ok(sale)
    }

    async fn persist(&self, sale: &Sale) -> LedgerResult<()> {
        let mut tx = self.db.begin().await?;
        SaleRepository::insert(&mut tx, sale).await?;
        tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }

    /// Gives back the stock of already-consumed lines, newest first.
    ///
    /// Waits out any product lock; a caller sees the sale's error only
    /// after every line is back.
    async fn compensate(&self, items: &[SaleItem]) {
        for item in items.iter().rev() {
            if let Err(err) = self.stock.restore(&item.product_id, &item.allocations).await {
                error!(
                    product_id = %item.product_id,
                    qty = item.quantity,
                    error = %err,
                    "Compensation failed, stock left consumed"
                );
            }
        }
    }

    /// Gets a sale with its lines and consumption records.
    pub async fn get_sale(&self, id: &str) -> LedgerResult<Sale> {
        self.db
            .sales()
            .get_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", id))
    }

    /// Sales dated within `range`, any status.
    pub async fn list_sales(&self, range: DateRange) -> LedgerResult<Vec<Sale>> {
        Ok(self.db.sales().list_by_date(range).await?)
    }

    /// Voids a committed sale that has no returns, restoring every
    /// consumed unit to the batch it came from.
    pub async fn void_sale(&self, id: &str) -> LedgerResult<Sale> {
        let sale = self.get_sale(id).await?;

        let _guards = self
            .stock
            .locks()
            .acquire_many(sale.items.iter().map(|item| item.product_id.as_str()))
            .await?;

        let mut sale = self.get_sale(id).await?;
        if sale.status != SaleStatus::Committed {
            return Err(invalid_state(&sale.id, "only committed sales can be voided"));
        }
        if !self.db.returns().for_sale(&sale.id).await?.is_empty() {
            return Err(invalid_state(&sale.id, "sale has returns"));
        }

        let releases: Vec<BatchAllocation> = sale
            .items
            .iter()
            .flat_map(|item| item.allocations.iter().cloned())
            .collect();
        check_releases(&self.db, &releases).await?;

        let mut tx = self.db.begin().await?;
        if !SaleRepository::set_status(&mut tx, &sale.id, SaleStatus::Committed, SaleStatus::Void).await? {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(LedgerError::ConcurrencyConflict(format!(
                "sale {} changed while voiding",
                sale.id
            )));
        }
        apply_releases(&mut tx, &releases).await?;
        tx.commit().await.map_err(DbError::from)?;

        sale.status = SaleStatus::Void;
        info!(sale_id = %sale.id, invoice_no = %sale.invoice_no, "Sale voided");
        Ok(sale)
    }
}

fn invalid_state(sale_id: &str, reason: &str) -> LedgerError {
    ValidationError::InvalidState {
        entity: "Sale".to_string(),
        id: sale_id.to_string(),
        reason: reason.to_string(),
    }
    .into()
}
