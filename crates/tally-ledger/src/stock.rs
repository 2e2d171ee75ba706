//! # Stock Ledger
//!
//! Owns every product's batches. The only code that changes
//! `quantity_remaining`.
//!
//! ## Consume
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consume(P, 15)                                                         │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  lock(P) ──► read P's batches ──► plan_consumption (FEFO)               │
//! │                                        │                                │
//! │                      InsufficientStock ◄┤ nothing written               │
//! │                                        ▼                                │
//! │                       BEGIN; decrement each planned batch; COMMIT       │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                       unlock(P) ──► [(B1, 10, 5), (B2, 5, 6)]           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads happen before the write transaction opens, and the transaction's
//! first statement is a write, so SQLite never has to upgrade a stale read
//! snapshot. The product lock keeps those reads current.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use tally_core::allocation::{check_release, plan_consumption, total_available};
use tally_core::validation::{validate_line_amount, validate_new_batch, validate_quantity};
use tally_core::{
    allocations_quantity, BatchAllocation, LedgerError, LedgerResult, NewBatch, StockBatch,
    ValidationError,
};
use tally_db::{new_id, BatchRepository, Database, DbError};

use crate::catalog::require_product;
use crate::locks::ProductLocks;
use crate::today;

const RESTORE_BACKOFF_START: Duration = Duration::from_millis(10);
const RESTORE_BACKOFF_MAX: Duration = Duration::from_millis(500);

/// Per-product batch collections with serialized mutation.
#[derive(Debug, Clone)]
pub struct StockLedger {
    db: Database,
    locks: ProductLocks,
}

impl StockLedger {
    pub fn new(db: Database, locks: ProductLocks) -> Self {
        StockLedger { db, locks }
    }

    pub(crate) fn locks(&self) -> &ProductLocks {
        &self.locks
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Creates a batch holding `batch.quantity` units.
    ///
    /// Unit cost defaults to the product's purchase price and the received
    /// date to today.
    ///
    /// An unknown product fails with `NotFound`, not a validation error.
    pub async fn receive(&self, batch: NewBatch) -> LedgerResult<StockBatch> {
        validate_new_batch(&batch)?;
        let product = require_product(&self.db, &batch.product_id).await?;
        let unit_cost = batch.unit_cost.unwrap_or_else(|| product.purchase_price());
        validate_line_amount("unitCost", unit_cost, batch.quantity)?;

        let stock_batch = StockBatch {
            id: new_id(),
            product_id: product.id.clone(),
            batch_no: batch.batch_no.trim().to_string(),
            received_date: batch.received_date.unwrap_or_else(today),
            expiry_date: batch.expiry_date,
            initial_quantity: batch.quantity,
            quantity_remaining: batch.quantity,
            unit_cost_cents: unit_cost.cents(),
            purchase_id: None,
            created_at: Utc::now(),
        };

        let _guard = self.locks.acquire(&product.id).await?;

        let mut tx = self.db.begin().await?;
        BatchRepository::insert(&mut tx, &stock_batch).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            batch_id = %stock_batch.id,
            product_id = %stock_batch.product_id,
            qty = stock_batch.initial_quantity,
            unit_cost_cents = stock_batch.unit_cost_cents,
            "Batch received"
        );
        Ok(stock_batch)
    }

    /// Takes `quantity` units of a product, first-expire-first-out.
    ///
    /// All-or-nothing: on `InsufficientStock` no batch is touched. Returns
    /// the consumption record, which is exactly what a later release needs.
    pub async fn consume(&self, product_id: &str, quantity: i64) -> LedgerResult<Vec<BatchAllocation>> {
        validate_quantity("quantity", quantity)?;
        require_product(&self.db, product_id).await?;

        let _guard = self.locks.acquire(product_id).await?;

        let batches = self.db.batches().available_for_product(product_id).await?;
        let plan = match plan_consumption(product_id, &batches, quantity) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    product_id = %product_id,
                    requested = quantity,
                    available = total_available(&batches),
                    "Consumption rejected"
                );
                return Err(err);
            }
        };

        let mut tx = self.db.begin().await?;
        for allocation in &plan {
            if !BatchRepository::decrement(&mut tx, &allocation.batch_id, allocation.quantity).await? {
                tx.rollback().await.map_err(DbError::from)?;
                return Err(LedgerError::ConcurrencyConflict(format!(
                    "batch {} changed while consuming",
                    allocation.batch_id
                )));
            }
        }
        tx.commit().await.map_err(DbError::from)?;

        info!(
            product_id = %product_id,
            qty = quantity,
            batches = plan.len(),
            "Stock consumed"
        );
        Ok(plan)
    }

    /// Puts `quantity` units back into one batch.
    ///
    /// ## Errors
    /// * `Validation(ExceedsIssued)` - the batch would hold more than it
    ///   was issued with
    pub async fn release(&self, batch_id: &str, quantity: i64) -> LedgerResult<StockBatch> {
        validate_quantity("quantity", quantity)?;
        let batch = self.require_batch(batch_id).await?;

        let _guard = self.locks.acquire(&batch.product_id).await?;

        let mut batch = self.require_batch(batch_id).await?;
        check_release(&batch, quantity)?;

        let mut tx = self.db.begin().await?;
        if !BatchRepository::increment(&mut tx, batch_id, quantity).await? {
            tx.rollback().await.map_err(DbError::from)?;
            return Err(exceeds_issued(&batch, quantity));
        }
        tx.commit().await.map_err(DbError::from)?;

        batch.quantity_remaining += quantity;
        info!(batch_id = %batch_id, qty = quantity, "Stock released");
        Ok(batch)
    }

    /// Reverses a consumption record of `product_id` in one transaction.
    pub async fn release_all(
        &self,
        product_id: &str,
        allocations: &[BatchAllocation],
    ) -> LedgerResult<()> {
        if allocations.is_empty() {
            return Ok(());
        }

        let _guard = self.locks.acquire(product_id).await?;
        self.reverse_locked(product_id, allocations).await
    }

    /// Reverses a consumption record that no document will own.
    ///
    /// Unlike [`release_all`](Self::release_all) this never gives up on the
    /// product lock, and it retries retryable storage conflicts with a
    /// capped backoff. Only a non-retryable failure is returned.
    pub(crate) async fn restore(
        &self,
        product_id: &str,
        allocations: &[BatchAllocation],
    ) -> LedgerResult<()> {
        if allocations.is_empty() {
            return Ok(());
        }

        let _guard = self.locks.acquire_unbounded(product_id).await;

        let mut backoff = RESTORE_BACKOFF_START;
        loop {
            match self.reverse_locked(product_id, allocations).await {
                Err(err) if err.is_retryable() => {
                    warn!(product_id = %product_id, error = %err, "Restore conflicted, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(RESTORE_BACKOFF_MAX);
                }
                other => return other,
            }
        }
    }

    /// Caller holds the product lock.
    async fn reverse_locked(&self, product_id: &str, allocations: &[BatchAllocation]) -> LedgerResult<()> {
        check_releases(&self.db, allocations).await?;

        let mut tx = self.db.begin().await?;
        apply_releases(&mut tx, allocations).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            product_id = %product_id,
            qty = allocations_quantity(allocations),
            "Consumption reversed"
        );
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Every batch of a product in consumption order, depleted ones included.
    pub async fn batches(&self, product_id: &str) -> LedgerResult<Vec<StockBatch>> {
        require_product(&self.db, product_id).await?;
        Ok(self.db.batches().for_product(product_id).await?)
    }

    /// Σ quantity_remaining over a product's batches.
    pub async fn available(&self, product_id: &str) -> LedgerResult<i64> {
        require_product(&self.db, product_id).await?;
        Ok(self.db.batches().available(product_id).await?)
    }

    /// Batches with stock left that expire on or before `date`.
    pub async fn expiring_before(&self, date: NaiveDate) -> LedgerResult<Vec<StockBatch>> {
        Ok(self.db.batches().expiring_on_or_before(date).await?)
    }

    /// Gets a batch or fails with `NotFound`.
    pub async fn get_batch(&self, batch_id: &str) -> LedgerResult<StockBatch> {
        self.require_batch(batch_id).await
    }

    async fn require_batch(&self, batch_id: &str) -> LedgerResult<StockBatch> {
        self.db
            .batches()
            .get_by_id(batch_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("StockBatch", batch_id))
    }
}

// =============================================================================
// Release helpers (caller holds the product locks)
// =============================================================================

/// Checks that every batch can take back its share of `allocations`.
pub(crate) async fn check_releases(db: &Database, allocations: &[BatchAllocation]) -> LedgerResult<()> {
    let mut per_batch: BTreeMap<&str, i64> = BTreeMap::new();
    for allocation in allocations {
        *per_batch.entry(allocation.batch_id.as_str()).or_default() += allocation.quantity;
    }

    for (batch_id, quantity) in per_batch {
        let batch = db
            .batches()
            .get_by_id(batch_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("StockBatch", batch_id))?;
        check_release(&batch, quantity)?;
    }

    Ok(())
}

/// Increments every batch named in `allocations` inside the caller's
/// transaction.
pub(crate) async fn apply_releases(
    conn: &mut SqliteConnection,
    allocations: &[BatchAllocation],
) -> LedgerResult<()> {
    for allocation in allocations {
        if !BatchRepository::increment(conn, &allocation.batch_id, allocation.quantity).await? {
            return Err(LedgerError::ConcurrencyConflict(format!(
                "batch {} changed while releasing",
                allocation.batch_id
            )));
        }
    }
    Ok(())
}

fn exceeds_issued(batch: &StockBatch, quantity: i64) -> LedgerError {
    ValidationError::ExceedsIssued {
        batch_id: batch.id.clone(),
        issued: batch.initial_quantity,
        requested: quantity,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, ledger, product};
    use tally_core::Money;

    fn new_batch(product_id: &str, qty: i64, cost: i64, expiry: Option<NaiveDate>) -> NewBatch {
        NewBatch {
            product_id: product_id.to_string(),
            quantity: qty,
            unit_cost: Some(Money::from_cents(cost)),
            batch_no: format!("LOT-{qty}-{cost}"),
            expiry_date: expiry,
            received_date: Some(date(2023, 12, 1)),
        }
    }

    #[tokio::test]
    async fn test_receive_defaults_cost_to_purchase_price() {
        let ledger = ledger().await;
        let p = product(&ledger, "SOAP").await;

        let batch = ledger
            .stock()
            .receive(NewBatch {
                unit_cost: None,
                received_date: None,
                ..new_batch(&p.id, 12, 0, None)
            })
            .await
            .unwrap();

        assert_eq!(batch.unit_cost_cents, p.purchase_price_cents);
        assert_eq!(batch.received_date, today());
        assert_eq!(ledger.stock().available(&p.id).await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_receive_bounds_default_cost_times_quantity() {
        let ledger = ledger().await;
        let p = ledger
            .catalog()
            .create_product(tally_core::ProductInput {
                sku: "GOLD".to_string(),
                name: "Gold bar".to_string(),
                category: None,
                unit: None,
                barcode: None,
                sale_price: Money::from_cents(100_000_000_000_000),
                purchase_price: Money::from_cents(100_000_000_000_000),
                reorder_level: 0,
            })
            .await
            .unwrap();

        let err = ledger
            .stock()
            .receive(NewBatch {
                unit_cost: None,
                ..new_batch(&p.id, tally_core::MAX_LINE_QUANTITY, 0, None)
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "unitCost"
        ));
        assert_eq!(ledger.stock().available(&p.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_receive_rejects_bad_input() {
        let ledger = ledger().await;
        let p = product(&ledger, "SOAP").await;

        let err = ledger.stock().receive(new_batch(&p.id, 0, 5, None)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = ledger.stock().receive(new_batch("ghost", 5, 5, None)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_consume_follows_fefo() {
        let ledger = ledger().await;
        let p = product(&ledger, "MILK").await;
        let stock = ledger.stock();

        let late = stock.receive(new_batch(&p.id, 10, 6, Some(date(2024, 2, 1)))).await.unwrap();
        let none = stock.receive(new_batch(&p.id, 10, 4, None)).await.unwrap();
        let early = stock.receive(new_batch(&p.id, 10, 5, Some(date(2024, 1, 1)))).await.unwrap();

        let taken = stock.consume(&p.id, 25).await.unwrap();
        let order: Vec<&str> = taken.iter().map(|a| a.batch_id.as_str()).collect();
        assert_eq!(order, vec![early.id.as_str(), late.id.as_str(), none.id.as_str()]);
        assert_eq!(taken[2].quantity, 5);
        assert_eq!(stock.available(&p.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_consume_is_all_or_nothing() {
        let ledger = ledger().await;
        let p = product(&ledger, "MILK").await;
        let stock = ledger.stock();
        stock.receive(new_batch(&p.id, 10, 5, None)).await.unwrap();

        let err = stock.consume(&p.id, 11).await.unwrap_err();
        assert_eq!(err.shortfall(), Some(1));
        assert_eq!(stock.available(&p.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_release_bounded_by_issued_quantity() {
        let ledger = ledger().await;
        let p = product(&ledger, "MILK").await;
        let stock = ledger.stock();
        let batch = stock.receive(new_batch(&p.id, 10, 5, None)).await.unwrap();

        stock.consume(&p.id, 4).await.unwrap();
        let released = stock.release(&batch.id, 4).await.unwrap();
        assert_eq!(released.quantity_remaining, 10);

        let err = stock.release(&batch.id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::ExceedsIssued { issued: 10, .. })
        ));
    }

    #[tokio::test]
    async fn test_release_unknown_batch() {
        let ledger = ledger().await;
        let err = ledger.stock().release("ghost", 1).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { ref entity, .. } if entity == "StockBatch"));
    }

    #[tokio::test]
    async fn test_expiring_before() {
        let ledger = ledger().await;
        let p = product(&ledger, "YOGURT").await;
        let stock = ledger.stock();
        let soon = stock.receive(new_batch(&p.id, 5, 5, Some(date(2024, 1, 10)))).await.unwrap();
        stock.receive(new_batch(&p.id, 5, 5, Some(date(2024, 3, 1)))).await.unwrap();
        stock.receive(new_batch(&p.id, 5, 5, None)).await.unwrap();

        let expiring = stock.expiring_before(date(2024, 1, 31)).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, soon.id);
    }
}
