//! # Wire Shapes
//!
//! JSON request and response bodies exchanged with the admin console.
//!
//! ```text
//! ┌──────────────┐  JSON   ┌────────────────────┐ TryFrom ┌──────────────┐
//! │ Admin console│────────►│ *Request (this mod)│────────►│ New* inputs  │
//! │  (browser)   │         │ f64, String dates  │         │ Money, dates │
//! │              │◄────────│ *Response          │◄────────│ records      │
//! └──────────────┘  JSON   └────────────────────┘  From   └──────────────┘
//! ```
//!
//! The console sends numeric ids (`parseInt`) in some forms and strings in
//! others, decimals for money, and dates either as `YYYY-MM-DD` or as full
//! ISO timestamps. Everything is normalized here; decimals never travel
//! further than this module.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::report::{DateRange, ProfitLossReport};
use crate::types::{
    NewBatch, NewExpense, NewPurchase, NewReturn, NewSale, PaymentMethod, PurchaseLine,
    ReturnStatus, Sale, SaleItem, SaleLine, SaleReturn, SaleStatus, StockBatch,
};

// =============================================================================
// Scalars
// =============================================================================

/// An identifier sent either as a JSON string or a JSON number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    pub fn into_string(self) -> String {
        match self {
            WireId::Text(text) => text.trim().to_string(),
            WireId::Number(n) => n.to_string(),
        }
    }
}

/// Parses `YYYY-MM-DD` or an RFC 3339 timestamp into a business date.
///
/// ## Example
/// ```rust
/// use tally_core::wire::parse_date;
///
/// let a = parse_date("date", "2024-01-15").unwrap();
/// let b = parse_date("date", "2024-01-15T00:00:00.000Z").unwrap();
/// assert_eq!(a, b);
/// assert!(parse_date("date", "15/01/2024").is_err());
/// ```
pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, ValidationError> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.date_naive())
        .map_err(|_| ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: format!("'{value}' is not a YYYY-MM-DD date"),
        })
}

/// Like [`parse_date`], but absent, `null` and empty strings mean "none".
pub fn parse_optional_date(
    field: &str,
    value: Option<&str>,
) -> Result<Option<NaiveDate>, ValidationError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_date(field, value).map(Some),
    }
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Sales
// =============================================================================

/// `POST /api/sales` body.
///
/// `total` is accepted for compatibility and ignored; the total is always
/// recomputed from the lines.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[serde(rename = "invoice_no", alias = "invoiceNo")]
    pub invoice_no: String,
    pub date: String,
    #[serde(default)]
    pub discount: Option<f64>,
    pub payment_method: PaymentMethod,
    pub created_by: WireId,
    #[serde(default)]
    pub total: Option<f64>,
    pub items: Vec<SaleLineRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineRequest {
    pub product_id: WireId,
    pub qty: i64,
    #[serde(alias = "costPrice")]
    pub price: f64,
}

impl TryFrom<CreateSaleRequest> for NewSale {
    type Error = ValidationError;

    fn try_from(req: CreateSaleRequest) -> Result<Self, Self::Error> {
        let items = req
            .items
            .into_iter()
            .map(|line| {
                Ok(SaleLine {
                    product_id: line.product_id.into_string(),
                    quantity: line.qty,
                    unit_price: Money::from_decimal("price", line.price)?,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(NewSale {
            invoice_no: req.invoice_no.trim().to_string(),
            date: parse_date("date", &req.date)?,
            discount: Money::from_decimal("discount", req.discount.unwrap_or(0.0))?,
            payment_method: req.payment_method,
            created_by: req.created_by.into_string(),
            items,
        })
    }
}

/// A persisted sale as returned to the console.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub id: String,
    #[serde(rename = "invoice_no")]
    pub invoice_no: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    pub payment_method: PaymentMethod,
    pub created_by: String,
    pub status: SaleStatus,
    pub items: Vec<SaleItemResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleItemResponse {
    pub id: String,
    pub product_id: String,
    pub qty: i64,
    pub price: f64,
    pub subtotal: f64,
    pub cost: f64,
}

impl From<&SaleItem> for SaleItemResponse {
    fn from(item: &SaleItem) -> Self {
        SaleItemResponse {
            id: item.id.clone(),
            product_id: item.product_id.clone(),
            qty: item.quantity,
            price: item.unit_price().to_decimal(),
            subtotal: item.subtotal().to_decimal(),
            cost: item.cogs().to_decimal(),
        }
    }
}

impl From<&Sale> for SaleResponse {
    fn from(sale: &Sale) -> Self {
        SaleResponse {
            id: sale.id.clone(),
            invoice_no: sale.invoice_no.clone(),
            date: sale.date,
            subtotal: sale.subtotal().to_decimal(),
            discount: sale.discount().to_decimal(),
            total: sale.total().to_decimal(),
            payment_method: sale.payment_method,
            created_by: sale.created_by.clone(),
            status: sale.status,
            items: sale.items.iter().map(SaleItemResponse::from).collect(),
        }
    }
}

// =============================================================================
// Stock Batches
// =============================================================================

/// `POST /api/stock-batches` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockBatchRequest {
    pub product_id: WireId,
    #[serde(rename = "batch_no")]
    pub batch_no: String,
    #[serde(rename = "expiry_date", default)]
    pub expiry_date: Option<String>,
    pub qty: i64,
    #[serde(default)]
    pub unit_cost: Option<f64>,
    #[serde(default)]
    pub received_date: Option<String>,
}

impl TryFrom<StockBatchRequest> for NewBatch {
    type Error = ValidationError;

    fn try_from(req: StockBatchRequest) -> Result<Self, Self::Error> {
        Ok(NewBatch {
            product_id: req.product_id.into_string(),
            quantity: req.qty,
            unit_cost: req
                .unit_cost
                .map(|cost| Money::from_decimal("unitCost", cost))
                .transpose()?,
            batch_no: req.batch_no.trim().to_string(),
            expiry_date: parse_optional_date("expiry_date", req.expiry_date.as_deref())?,
            received_date: parse_optional_date("receivedDate", req.received_date.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockBatchResponse {
    pub id: String,
    pub product_id: String,
    #[serde(rename = "batch_no")]
    pub batch_no: String,
    #[serde(rename = "expiry_date")]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub received_date: NaiveDate,
    pub qty: i64,
    pub unit_cost: f64,
}

impl From<&StockBatch> for StockBatchResponse {
    fn from(batch: &StockBatch) -> Self {
        StockBatchResponse {
            id: batch.id.clone(),
            product_id: batch.product_id.clone(),
            batch_no: batch.batch_no.clone(),
            expiry_date: batch.expiry_date,
            received_date: batch.received_date,
            qty: batch.quantity_remaining,
            unit_cost: batch.unit_cost().to_decimal(),
        }
    }
}

// =============================================================================
// Purchases
// =============================================================================

/// `POST /api/purchase` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePurchaseRequest {
    pub supplier_id: WireId,
    pub invoice_no: String,
    pub date: String,
    #[serde(default)]
    pub total: Option<f64>,
    pub items: Vec<PurchaseLineRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLineRequest {
    pub product_id: WireId,
    pub qty: i64,
    pub cost_price: f64,
    #[serde(rename = "batch_no", default)]
    pub batch_no: Option<String>,
    #[serde(rename = "expiry_date", default)]
    pub expiry_date: Option<String>,
}

impl TryFrom<CreatePurchaseRequest> for NewPurchase {
    type Error = ValidationError;

    fn try_from(req: CreatePurchaseRequest) -> Result<Self, Self::Error> {
        let items = req
            .items
            .into_iter()
            .map(|line| {
                Ok(PurchaseLine {
                    product_id: line.product_id.into_string(),
                    quantity: line.qty,
                    cost_price: Money::from_decimal("costPrice", line.cost_price)?,
                    batch_no: optional_text(line.batch_no),
                    expiry_date: parse_optional_date("expiry_date", line.expiry_date.as_deref())?,
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        // The console sends NaN (serialized as null) when the total box is empty.
        let total_override = req
            .total
            .map(|total| Money::from_decimal("total", total))
            .transpose()?;

        Ok(NewPurchase {
            supplier_id: req.supplier_id.into_string(),
            invoice_no: req.invoice_no.trim().to_string(),
            date: parse_date("date", &req.date)?,
            total_override,
            items,
        })
    }
}

// =============================================================================
// Returns
// =============================================================================

/// `POST /api/returns` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnRequest {
    pub sale_id: WireId,
    pub product_id: WireId,
    pub qty: i64,
    pub reason: String,
    pub refund_amount: f64,
    #[serde(default)]
    pub date: Option<String>,
}

impl TryFrom<ReturnRequest> for NewReturn {
    type Error = ValidationError;

    fn try_from(req: ReturnRequest) -> Result<Self, Self::Error> {
        Ok(NewReturn {
            sale_id: req.sale_id.into_string(),
            product_id: req.product_id.into_string(),
            quantity: req.qty,
            reason: req.reason.trim().to_string(),
            refund_amount: Money::from_decimal("refundAmount", req.refund_amount)?,
            date: parse_optional_date("date", req.date.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReturnResponse {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub qty: i64,
    pub reason: String,
    pub refund_amount: f64,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub status: ReturnStatus,
}

impl From<&SaleReturn> for ReturnResponse {
    fn from(ret: &SaleReturn) -> Self {
        ReturnResponse {
            id: ret.id.clone(),
            sale_id: ret.sale_id.clone(),
            product_id: ret.product_id.clone(),
            qty: ret.quantity,
            reason: ret.reason.clone(),
            refund_amount: ret.refund().to_decimal(),
            date: ret.date,
            status: ret.status,
        }
    }
}

// =============================================================================
// Expenses
// =============================================================================

/// `POST /api/expenses` body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRequest {
    pub category: String,
    pub amount: f64,
    pub date: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reminder_date: Option<String>,
}

impl TryFrom<ExpenseRequest> for NewExpense {
    type Error = ValidationError;

    fn try_from(req: ExpenseRequest) -> Result<Self, Self::Error> {
        Ok(NewExpense {
            category: req.category.trim().to_string(),
            amount: Money::from_decimal("amount", req.amount)?,
            date: parse_date("date", &req.date)?,
            description: optional_text(req.description),
            reminder_date: parse_optional_date("reminderDate", req.reminder_date.as_deref())?,
        })
    }
}

// =============================================================================
// Profit / Loss
// =============================================================================

/// `GET /api/profit-loss?startDate=..&endDate=..` query.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfitLossQuery {
    pub start_date: String,
    pub end_date: String,
}

impl TryFrom<ProfitLossQuery> for DateRange {
    type Error = ValidationError;

    fn try_from(query: ProfitLossQuery) -> Result<Self, Self::Error> {
        DateRange::new(
            parse_date("startDate", &query.start_date)?,
            parse_date("endDate", &query.end_date)?,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProfitLossResponse {
    pub total_sales: f64,
    pub total_discounts: f64,
    pub total_returns: f64,
    #[serde(rename = "totalCOGS")]
    pub total_cogs: f64,
    pub total_expenses: f64,
    pub profit: f64,
}

impl From<&ProfitLossReport> for ProfitLossResponse {
    fn from(report: &ProfitLossReport) -> Self {
        ProfitLossResponse {
            total_sales: report.total_sales.to_decimal(),
            total_discounts: report.total_discounts.to_decimal(),
            total_returns: report.total_returns.to_decimal(),
            total_cogs: report.total_cogs.to_decimal(),
            total_expenses: report.total_expenses.to_decimal(),
            profit: report.profit.to_decimal(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::ProfitLossTotals;
    use serde_json::json;

    #[test]
    fn test_sale_request_from_console_json() {
        let body = json!({
            "invoice_no": "INV-001",
            "date": "2024-01-15",
            "total": 999.0,
            "discount": 5.5,
            "paymentMethod": "Cash",
            "createdBy": 7,
            "items": [
                { "productId": 3, "qty": 15, "price": 10.0 },
                { "productId": "p-9", "qty": 1, "costPrice": 2.25 }
            ]
        });

        let req: CreateSaleRequest = serde_json::from_value(body).unwrap();
        let sale = NewSale::try_from(req).unwrap();

        assert_eq!(sale.invoice_no, "INV-001");
        assert_eq!(sale.created_by, "7");
        assert_eq!(sale.discount.cents(), 550);
        assert_eq!(sale.payment_method, PaymentMethod::Cash);
        assert_eq!(sale.items[0].product_id, "3");
        assert_eq!(sale.items[0].unit_price.cents(), 1000);
        assert_eq!(sale.items[1].unit_price.cents(), 225);
    }

    #[test]
    fn test_sale_request_without_discount() {
        let body = json!({
            "invoice_no": "INV-002",
            "date": "2024-01-15T10:30:00.000Z",
            "discount": null,
            "paymentMethod": "card",
            "createdBy": "u-1",
            "items": [{ "productId": "p", "qty": 1, "price": 1 }]
        });
        let req: CreateSaleRequest = serde_json::from_value(body).unwrap();
        let sale = NewSale::try_from(req).unwrap();
        assert!(sale.discount.is_zero());
        assert_eq!(sale.date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_huge_sale_line_is_a_validation_error() {
        let body = json!({
            "invoice_no": "INV-003",
            "date": "2024-01-15",
            "paymentMethod": "cash",
            "createdBy": 7,
            "items": [{ "productId": 3, "qty": 1_000_000, "price": 1_000_000_000_000.0 }]
        });
        let req: CreateSaleRequest = serde_json::from_value(body).unwrap();
        let sale = NewSale::try_from(req).unwrap();

        let err = crate::validation::validate_new_sale(&sale).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "price"));
    }

    #[test]
    fn test_stock_batch_request_treats_blank_expiry_as_none() {
        let body = json!({
            "productId": 3,
            "batch_no": "B-7",
            "expiry_date": "",
            "qty": 12
        });
        let req: StockBatchRequest = serde_json::from_value(body).unwrap();
        let batch = NewBatch::try_from(req).unwrap();
        assert_eq!(batch.expiry_date, None);
        assert_eq!(batch.unit_cost, None);
        assert_eq!(batch.quantity, 12);
    }

    #[test]
    fn test_return_request() {
        let body = json!({
            "saleId": "s-1",
            "productId": 3,
            "qty": 5,
            "reason": " damaged ",
            "refundAmount": 50.0
        });
        let req: ReturnRequest = serde_json::from_value(body).unwrap();
        let ret = NewReturn::try_from(req).unwrap();
        assert_eq!(ret.reason, "damaged");
        assert_eq!(ret.refund_amount.cents(), 5000);
        assert_eq!(ret.date, None);
    }

    #[test]
    fn test_purchase_request_defaults() {
        let body = json!({
            "supplierId": 4,
            "invoiceNo": "PO-1",
            "date": "2024-01-02",
            "total": null,
            "items": [{ "productId": 3, "qty": 10, "costPrice": 5.0 }]
        });
        let req: CreatePurchaseRequest = serde_json::from_value(body).unwrap();
        let purchase = NewPurchase::try_from(req).unwrap();
        assert_eq!(purchase.supplier_id, "4");
        assert!(purchase.total_override.is_none());
        assert_eq!(purchase.items[0].batch_no, None);
        assert_eq!(purchase.items[0].cost_price.cents(), 500);
    }

    #[test]
    fn test_expense_request() {
        let body = json!({
            "category": "Utilities",
            "amount": 120.75,
            "date": "2024-01-05",
            "description": "",
            "reminderDate": null
        });
        let req: ExpenseRequest = serde_json::from_value(body).unwrap();
        let expense = NewExpense::try_from(req).unwrap();
        assert_eq!(expense.amount.cents(), 12_075);
        assert_eq!(expense.description, None);
        assert_eq!(expense.reminder_date, None);
    }

    #[test]
    fn test_profit_loss_query_rejects_bad_dates() {
        let query = ProfitLossQuery {
            start_date: "2024-02-01".to_string(),
            end_date: "2024-01-01".to_string(),
        };
        assert!(DateRange::try_from(query).is_err());

        let query = ProfitLossQuery {
            start_date: "".to_string(),
            end_date: "2024-01-01".to_string(),
        };
        assert!(matches!(
            DateRange::try_from(query),
            Err(ValidationError::Required { .. })
        ));
    }

    #[test]
    fn test_profit_loss_response_shape() {
        let totals = ProfitLossTotals {
            sales: Money::from_cents(15_000),
            sold_cost: Money::from_cents(8_000),
            ..Default::default()
        };
        let report = ProfitLossReport::from_totals(DateRange::all(), totals);
        let json = serde_json::to_value(ProfitLossResponse::from(&report)).unwrap();

        assert_eq!(json["totalSales"], 150.0);
        assert_eq!(json["totalCOGS"], 80.0);
        assert_eq!(json["profit"], 70.0);
        assert_eq!(json["totalDiscounts"], 0.0);
    }
}
