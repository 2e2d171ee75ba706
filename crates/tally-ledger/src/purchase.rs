//! # Purchase Receiver
//!
//! Turns a supplier invoice into stock batches, one per line.
//!
//! ## Receive Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  receive_purchase(invoice PO-7, lines [P×10 @4.50, Q×24 @1.20])         │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  validate every line, every product known  ── nothing written on error  │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  lock(P), lock(Q)           (ascending id order)                        │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  BEGIN                                                                  │
//! │    purchases     PO-7, total = override or Σ cost × qty                 │
//! │    stock_batches PO-7-1 (P×10), PO-7-2 (Q×24)                           │
//! │    purchase_items line → batch                                          │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::info;

use tally_core::validation::validate_new_purchase;
use tally_core::{
    DateRange, LedgerError, LedgerResult, Money, NewPurchase, Purchase, PurchaseItem, StockBatch,
};
use tally_db::{new_id, BatchRepository, Database, DbError, PurchaseRepository};

use crate::catalog::require_product;
use crate::locks::ProductLocks;

/// Receives purchases into the stock ledger.
#[derive(Debug, Clone)]
pub struct PurchaseReceiver {
    db: Database,
    locks: ProductLocks,
}

impl PurchaseReceiver {
    pub fn new(db: Database, locks: ProductLocks) -> Self {
        PurchaseReceiver { db, locks }
    }

    /// Records a purchase and creates its batches atomically.
    ///
    /// Each line's batch number defaults to `<invoiceNo>-<line>` and its
    /// received date is the purchase date.
    ///
    /// A line naming an unknown product fails the whole purchase with
    /// `NotFound` rather than a validation error; nothing is written.
    pub async fn receive_purchase(&self, request: NewPurchase) -> LedgerResult<Purchase> {
        validate_new_purchase(&request)?;
        for line in &request.items {
            require_product(&self.db, &line.product_id).await?;
        }

        let purchase_id = new_id();
        let invoice_no = request.invoice_no.trim().to_string();
        let now = Utc::now();

        let mut batches = Vec::with_capacity(request.items.len());
        let mut items = Vec::with_capacity(request.items.len());

        for (idx, line) in request.items.iter().enumerate() {
            let line_no = idx as i64 + 1;
            let batch_no = line
                .batch_no
                .as_deref()
                .map(str::trim)
                .filter(|no| !no.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{invoice_no}-{line_no}"));

            let batch = StockBatch {
                id: new_id(),
                product_id: line.product_id.clone(),
                batch_no,
                received_date: request.date,
                expiry_date: line.expiry_date,
                initial_quantity: line.quantity,
                quantity_remaining: line.quantity,
                unit_cost_cents: line.cost_price.cents(),
                purchase_id: Some(purchase_id.clone()),
                created_at: now,
            };
            items.push(PurchaseItem {
                id: new_id(),
                purchase_id: purchase_id.clone(),
                line_no,
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                cost_price_cents: line.cost_price.cents(),
                batch_id: batch.id.clone(),
            });
            batches.push(batch);
        }

        let computed: Money = items.iter().map(PurchaseItem::line_cost).sum();
        let purchase = Purchase {
            id: purchase_id,
            supplier_id: request.supplier_id.trim().to_string(),
            invoice_no,
            date: request.date,
            total_cents: request.total_override.unwrap_or(computed).cents(),
            created_at: now,
            items,
        };

        let _guards = self
            .locks
            .acquire_many(purchase.items.iter().map(|item| item.product_id.as_str()))
            .await?;

        let mut tx = self.db.begin().await?;
        PurchaseRepository::insert(&mut tx, &purchase).await?;
        for (batch, item) in batches.iter().zip(&purchase.items) {
            BatchRepository::insert(&mut tx, batch).await?;
            PurchaseRepository::insert_item(&mut tx, item).await?;
        }
        tx.commit().await.map_err(DbError::from)?;

        info!(
            purchase_id = %purchase.id,
            invoice_no = %purchase.invoice_no,
            lines = purchase.items.len(),
            total_cents = purchase.total_cents,
            "Purchase received"
        );
        Ok(purchase)
    }

    /// Gets a purchase with its lines.
    pub async fn get_purchase(&self, id: &str) -> LedgerResult<Purchase> {
        self.db
            .purchases()
            .get_by_id(id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Purchase", id))
    }

    /// Purchases dated within `range`.
    pub async fn list_purchases(&self, range: DateRange) -> LedgerResult<Vec<Purchase>> {
        Ok(self.db.purchases().list_by_date(range).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, ledger, product};
    use tally_core::PurchaseLine;

    fn line(product_id: &str, qty: i64, cost: i64) -> PurchaseLine {
        PurchaseLine {
            product_id: product_id.to_string(),
            quantity: qty,
            cost_price: Money::from_cents(cost),
            batch_no: None,
            expiry_date: None,
        }
    }

    fn purchase(lines: Vec<PurchaseLine>) -> NewPurchase {
        NewPurchase {
            supplier_id: "sup-1".to_string(),
            invoice_no: "PO-7".to_string(),
            date: date(2024, 1, 5),
            total_override: None,
            items: lines,
        }
    }

    #[tokio::test]
    async fn test_each_line_becomes_a_batch() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;
        let q = product(&ledger, "B").await;

        let mut lines = vec![line(&p.id, 10, 450), line(&q.id, 24, 120)];
        lines[1].batch_no = Some("LOT-Q".to_string());
        lines[1].expiry_date = Some(date(2024, 6, 1));

        let purchase = ledger.purchases().receive_purchase(purchase(lines)).await.unwrap();
        assert_eq!(purchase.total_cents, 10 * 450 + 24 * 120);

        let p_batches = ledger.stock().batches(&p.id).await.unwrap();
        assert_eq!(p_batches.len(), 1);
        assert_eq!(p_batches[0].batch_no, "PO-7-1");
        assert_eq!(p_batches[0].received_date, date(2024, 1, 5));
        assert_eq!(p_batches[0].purchase_id.as_deref(), Some(purchase.id.as_str()));

        let q_batches = ledger.stock().batches(&q.id).await.unwrap();
        assert_eq!(q_batches[0].batch_no, "LOT-Q");
        assert_eq!(q_batches[0].expiry_date, Some(date(2024, 6, 1)));

        let stored = ledger.purchases().get_purchase(&purchase.id).await.unwrap();
        assert_eq!(stored.items, purchase.items);
    }

    #[tokio::test]
    async fn test_total_override() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;

        let mut request = purchase(vec![line(&p.id, 10, 450)]);
        request.total_override = Some(Money::from_cents(4_000));
        let purchase = ledger.purchases().receive_purchase(request).await.unwrap();
        assert_eq!(purchase.total().cents(), 4_000);
    }

    #[tokio::test]
    async fn test_invalid_line_rejects_whole_purchase() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;

        let err = ledger
            .purchases()
            .receive_purchase(purchase(vec![line(&p.id, 10, 450), line(&p.id, 0, 450)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));

        let err = ledger
            .purchases()
            .receive_purchase(purchase(vec![line(&p.id, 10, 450), line("ghost", 1, 450)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));

        assert_eq!(ledger.stock().available(&p.id).await.unwrap(), 0);
        assert!(ledger.purchases().list_purchases(DateRange::all()).await.unwrap().is_empty());
    }
}
