//! # Return Processor
//!
//! Reverses part or all of a committed sale line.
//!
//! ## Create Return Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_return(sale S, product P, qty 5)                                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  lock(P)                                                                │
//! │     │                                                                   │
//! │     ├── S committed?  line for P on S?                                  │
//! │     ├── returnable = line qty − Σ earlier returns on the line           │
//! │     ├── plan_release: walk the line's consumption record backwards      │
//! │     │       [B1×10, B2×5]  ──►  release B2×5                            │
//! │     ├── refund ≤ unit price × qty, date ≥ sale date                     │
//! │     ▼                                                                   │
//! │  BEGIN; increment batches; insert return (applied) + record; COMMIT     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{info, warn};

use tally_core::allocation::{plan_release, returnable_quantity};
use tally_core::validation::{validate_at_most, validate_new_return};
use tally_core::{
    BatchAllocation, LedgerError, LedgerResult, NewReturn, ReturnStatus, Sale, SaleItem,
    SaleReturn, SaleStatus, ValidationError,
};
use tally_db::{new_id, Database, DbError, ReturnRepository};

use crate::stock::{apply_releases, check_releases, StockLedger};
use crate::today;

/// Applies returns against committed sales.
#[derive(Debug, Clone)]
pub struct ReturnProcessor {
    db: Database,
    stock: StockLedger,
}

impl ReturnProcessor {
    pub fn new(db: Database, stock: StockLedger) -> Self {
        ReturnProcessor { db, stock }
    }

    /// Returns `quantity` units of one sale line to stock.
    ///
    /// ## Errors
    /// * `NotFound` - unknown sale, or the sale has no line for the product
    /// * `Validation(ExceedsReturnable)` - more than what is left on the line
    /// * `Validation(OutOfRange)` - refund above unit price × quantity
    /// * `Validation(InvalidState)` - the sale is void
    pub async fn create_return(&self, request: NewReturn) -> LedgerResult<SaleReturn> {
        validate_new_return(&request)?;

        let _guard = self.stock.locks().acquire(&request.product_id).await?;

        let sale = self.require_sale(&request.sale_id).await?;
        if sale.status != SaleStatus::Committed {
            return Err(ValidationError::InvalidState {
                entity: "Sale".to_string(),
                id: sale.id.clone(),
                reason: "returns need a committed sale".to_string(),
            }
            .into());
        }
        let item = require_item(&sale, &request.product_id)?;

        let returned = self.returned_allocations(&item.id).await?;
        let plan = match plan_release(&item.allocations, &returned, request.quantity) {
            Ok(plan) => plan,
            Err(err) => {
                warn!(
                    sale_id = %sale.id,
                    product_id = %item.product_id,
                    requested = request.quantity,
                    error = %err,
                    "Return rejected"
                );
                return Err(err.into());
            }
        };

        validate_at_most(
            "refundAmount",
            request.refund_amount,
            item.unit_price().multiply_quantity(request.quantity),
        )?;

        let date = request.date.unwrap_or_else(today);
        if date < sale.date {
            return Err(ValidationError::InvalidFormat {
                field: "date".to_string(),
                reason: format!("return date {date} precedes sale date {}", sale.date),
            }
            .into());
        }

        check_releases(&self.db, &plan).await?;

        let mut ret = SaleReturn {
            id: new_id(),
            sale_id: sale.id.clone(),
            sale_item_id: item.id.clone(),
            product_id: item.product_id.clone(),
            quantity: request.quantity,
            reason: request.reason.trim().to_string(),
            refund_cents: request.refund_amount.cents(),
            date,
            status: ReturnStatus::Pending,
            created_at: Utc::now(),
            allocations: plan,
        };

        let mut tx = self.db.begin().await?;
        apply_releases(&mut tx, &ret.allocations).await?;
        ret.status = ReturnStatus::Applied;
        ReturnRepository::insert(&mut tx, &ret).await?;
        tx.commit().await.map_err(DbError::from)?;

        info!(
            return_id = %ret.id,
            sale_id = %ret.sale_id,
            product_id = %ret.product_id,
            qty = ret.quantity,
            refund_cents = ret.refund_cents,
            cost_credited_cents = ret.cost_credited().cents(),
            "Return applied"
        );
        Ok(ret)
    }

    /// Every return against a sale, oldest first.
    pub async fn returns_for_sale(&self, sale_id: &str) -> LedgerResult<Vec<SaleReturn>> {
        self.require_sale(sale_id).await?;
        Ok(self.db.returns().for_sale(sale_id).await?)
    }

    /// Units of `product_id` on a sale that can still be returned.
    pub async fn returnable_quantity(&self, sale_id: &str, product_id: &str) -> LedgerResult<i64> {
        let sale = self.require_sale(sale_id).await?;
        if sale.status != SaleStatus::Committed {
            return Ok(0);
        }
        let item = require_item(&sale, product_id)?;
        let returned = self.returned_allocations(&item.id).await?;
        Ok(returnable_quantity(&item.allocations, &returned))
    }

    async fn require_sale(&self, sale_id: &str) -> LedgerResult<Sale> {
        self.db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| LedgerError::not_found("Sale", sale_id))
    }

    /// Release records of the line's applied returns.
    async fn returned_allocations(&self, sale_item_id: &str) -> LedgerResult<Vec<BatchAllocation>> {
        let returns = self.db.returns().for_sale_item(sale_item_id).await?;
        Ok(returns
            .into_iter()
            .filter(|r| r.status == ReturnStatus::Applied)
            .flat_map(|r| r.allocations)
            .collect())
    }
}

fn require_item<'a>(sale: &'a Sale, product_id: &str) -> LedgerResult<&'a SaleItem> {
    sale.item_for(product_id)
        .ok_or_else(|| LedgerError::not_found("SaleItem", format!("{}/{}", sale.id, product_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{date, ledger, product, receive, return_request, sale_request};

    #[tokio::test]
    async fn test_partial_returns_until_exhausted() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;
        receive(&ledger, &p.id, 10, 300, None).await;
        let sale = ledger
            .sales()
            .create_sale(sale_request("INV-1", &[(p.id.as_str(), 6, 500)]))
            .await
            .unwrap();

        ledger.returns().create_return(return_request(&sale.id, &p.id, 4, 2_000)).await.unwrap();
        assert_eq!(ledger.returns().returnable_quantity(&sale.id, &p.id).await.unwrap(), 2);

        let err = ledger
            .returns()
            .create_return(return_request(&sale.id, &p.id, 3, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Validation(ValidationError::ExceedsReturnable { requested: 3, returnable: 2 })
        ));

        ledger.returns().create_return(return_request(&sale.id, &p.id, 2, 0)).await.unwrap();
        assert_eq!(ledger.stock().available(&p.id).await.unwrap(), 10);
        assert_eq!(ledger.returns().returns_for_sale(&sale.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_refund_capped_at_line_value() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;
        receive(&ledger, &p.id, 10, 300, None).await;
        let sale = ledger
            .sales()
            .create_sale(sale_request("INV-1", &[(p.id.as_str(), 2, 500)]))
            .await
            .unwrap();

        let err = ledger
            .returns()
            .create_return(return_request(&sale.id, &p.id, 1, 501))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::OutOfRange { max: 500, .. })));
        assert_eq!(ledger.stock().available(&p.id).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_return_date_not_before_sale() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;
        receive(&ledger, &p.id, 10, 300, None).await;
        let sale = ledger
            .sales()
            .create_sale(sale_request("INV-1", &[(p.id.as_str(), 2, 500)]))
            .await
            .unwrap();

        let mut request = return_request(&sale.id, &p.id, 1, 0);
        request.date = Some(date(2023, 12, 31));
        let err = ledger.returns().create_return(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::InvalidFormat { .. })));
    }

    #[tokio::test]
    async fn test_unknown_sale_or_line() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;
        let q = product(&ledger, "B").await;
        receive(&ledger, &p.id, 10, 300, None).await;
        let sale = ledger
            .sales()
            .create_sale(sale_request("INV-1", &[(p.id.as_str(), 2, 500)]))
            .await
            .unwrap();

        let err = ledger
            .returns()
            .create_return(return_request("ghost", &p.id, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { ref entity, .. } if entity == "Sale"));

        let err = ledger
            .returns()
            .create_return(return_request(&sale.id, &q.id, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { ref entity, .. } if entity == "SaleItem"));
    }

    #[tokio::test]
    async fn test_void_sale_blocks_returns_and_returns_block_void() {
        let ledger = ledger().await;
        let p = product(&ledger, "A").await;
        receive(&ledger, &p.id, 10, 300, None).await;

        let voided = ledger
            .sales()
            .create_sale(sale_request("INV-1", &[(p.id.as_str(), 2, 500)]))
            .await
            .unwrap();
        ledger.sales().void_sale(&voided.id).await.unwrap();
        let err = ledger
            .returns()
            .create_return(return_request(&voided.id, &p.id, 1, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(ValidationError::InvalidState { .. })));
        assert_eq!(ledger.returns().returnable_quantity(&voided.id, &p.id).await.unwrap(), 0);

        let returned = ledger
            .sales()
            .create_sale(sale_request("INV-2", &[(p.id.as_str(), 2, 500)]))
            .await
            .unwrap();
        let ret = ledger
            .returns()
            .create_return(return_request(&returned.id, &p.id, 1, 500))
            .await
            .unwrap();
        assert_eq!(ret.status, ReturnStatus::Applied);
        assert!(ledger.sales().void_sale(&returned.id).await.is_err());
    }
}
