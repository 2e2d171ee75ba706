//! # Domain Types
//!
//! Records the ledger persists, plus the inputs that create them.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   1..n   ┌─────────────────┐                      │
//! │  │    Product      │─────────►│   StockBatch    │◄──── PurchaseItem    │
//! │  │  sku, prices    │          │  expiry, cost   │      (creates 1)     │
//! │  │  reorder_level  │          │  qty remaining  │                      │
//! │  └─────────────────┘          └────────▲────────┘                      │
//! │                                        │ BatchAllocation               │
//! │  ┌─────────────────┐   1..n   ┌────────┴────────┐   0..n  ┌─────────┐ │
//! │  │      Sale       │─────────►│    SaleItem     │◄────────│ Return  │ │
//! │  │  invoice_no     │          │  qty × price    │         │ refund  │ │
//! │  │  discount,total │          │  allocations    │         │ allocs  │ │
//! │  └─────────────────┘          └─────────────────┘         └─────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  (no relationship to stock)                       │
//! │  │    Expense      │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records store money as `*_cents: i64` columns and expose [`Money`]
//! accessors, so they map onto table rows one-to-one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A catalogued product. Never mutated by stock transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    pub category: Option<String>,

    /// Unit of measure ("pcs", "kg", ...).
    pub unit: Option<String>,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// List price in cents.
    pub sale_price_cents: i64,

    /// Default purchase cost in cents, used when a batch arrives without one.
    pub purchase_price_cents: i64,

    /// On-hand quantity at or below which the product needs reordering.
    pub reorder_level: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the list price as Money.
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price_cents)
    }

    /// Returns the default purchase cost as Money.
    #[inline]
    pub fn purchase_price(&self) -> Money {
        Money::from_cents(self.purchase_price_cents)
    }

    /// Checks whether the given on-hand quantity calls for a reorder.
    pub fn needs_reorder(&self, on_hand: i64) -> bool {
        on_hand <= self.reorder_level
    }
}

/// Administrative input for creating or editing a product.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductInput {
    pub sku: String,
    pub name: String,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub barcode: Option<String>,
    pub sale_price: Money,
    pub purchase_price: Money,
    pub reorder_level: i64,
}

/// On-hand summary for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockLevel {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    /// Σ quantity_remaining over the product's batches.
    pub on_hand: i64,
    pub reorder_level: i64,
}

impl StockLevel {
    /// Checks if the product is at or below its reorder threshold.
    pub fn is_low(&self) -> bool {
        self.on_hand <= self.reorder_level
    }
}

// =============================================================================
// Stock Batch
// =============================================================================

/// A distinct lot of a product with its own cost and optional expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockBatch {
    pub id: String,
    pub product_id: String,
    pub batch_no: String,

    #[ts(as = "String")]
    pub received_date: NaiveDate,

    /// Batches without expiry are consumed after every expiring batch.
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,

    /// Quantity the batch was received with; releases never exceed it.
    pub initial_quantity: i64,

    /// Never negative.
    pub quantity_remaining: i64,

    pub unit_cost_cents: i64,

    /// Purchase that created the batch, if any.
    pub purchase_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockBatch {
    /// Returns the unit cost as Money.
    #[inline]
    pub fn unit_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents)
    }

    /// Checks if nothing is left in the batch.
    #[inline]
    pub fn is_depleted(&self) -> bool {
        self.quantity_remaining == 0
    }

    /// Checks if the batch expires on or before `date`.
    pub fn expires_by(&self, date: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= date)
    }
}

/// Input for receiving a new batch into the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewBatch {
    pub product_id: String,
    pub quantity: i64,
    /// Defaults to the product's purchase price.
    pub unit_cost: Option<Money>,
    pub batch_no: String,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    /// Defaults to today.
    #[ts(as = "Option<String>")]
    pub received_date: Option<NaiveDate>,
}

/// One entry of a consumption record: `quantity` units taken from (or
/// released back into) `batch_id` at `unit_cost_cents` each.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BatchAllocation {
    pub batch_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

impl BatchAllocation {
    /// Cost of the units in this allocation.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// Total cost of a consumption record.
pub fn allocations_cost(allocations: &[BatchAllocation]) -> Money {
    allocations.iter().map(BatchAllocation::cost).sum()
}

/// Total units of a consumption record.
pub fn allocations_quantity(allocations: &[BatchAllocation]) -> i64 {
    allocations.iter().map(|a| a.quantity).sum()
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Being assembled; never visible to readers.
    #[default]
    Open,
    /// Stock consumed and records persisted.
    Committed,
    /// Cancelled; all consumed stock restored.
    Void,
}

// =============================================================================
// Payment Method
// =============================================================================

/// Serialized lowercase. Deserialization ignores case, so the console's
/// `"Cash"` and the API's `"cash"` both parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Bank,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 3] = [PaymentMethod::Cash, PaymentMethod::Card, PaymentMethod::Bank];

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
        }
    }

    /// Case-insensitive lookup.
    pub fn parse(s: &str) -> Option<Self> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s))
    }
}

impl<'de> Deserialize<'de> for PaymentMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        PaymentMethod::parse(&raw).ok_or_else(|| {
            serde::de::Error::unknown_variant(&raw, &["cash", "card", "bank"])
        })
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale and its line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    /// Unique across all sales.
    pub invoice_no: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    /// Σ item subtotals, before discount.
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    /// subtotal − discount; always recomputed, never taken from the caller.
    pub total_cents: i64,
    pub payment_method: PaymentMethod,
    /// Opaque reference to the user who rang up the sale.
    pub created_by: String,
    pub status: SaleStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<SaleItem>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Cost of goods sold across every line.
    pub fn cogs(&self) -> Money {
        self.items.iter().map(SaleItem::cogs).sum()
    }

    /// Finds the line for a product.
    pub fn item_for(&self, product_id: &str) -> Option<&SaleItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }
}

/// A line item in a sale.
/// Uses snapshot pattern: `unit_price_cents` is frozen at sale time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Position in the request, starting at 1.
    pub line_no: i64,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// quantity × unit_price.
    pub subtotal_cents: i64,
    /// Batches that funded this line, in consumption order.
    /// Σ allocation quantity = quantity.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub allocations: Vec<BatchAllocation>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Cost of the batches consumed by this line.
    pub fn cogs(&self) -> Money {
        allocations_cost(&self.allocations)
    }
}

/// Input for creating a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub invoice_no: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub discount: Money,
    pub payment_method: PaymentMethod,
    pub created_by: String,
    pub items: Vec<SaleLine>,
}

/// One requested sale line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
}

// =============================================================================
// Purchase
// =============================================================================

/// A received purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Purchase {
    pub id: String,
    pub supplier_id: String,
    pub invoice_no: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub items: Vec<PurchaseItem>,
}

impl Purchase {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A purchase line. Each creates exactly one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub line_no: i64,
    pub product_id: String,
    pub quantity: i64,
    pub cost_price_cents: i64,
    pub batch_id: String,
}

impl PurchaseItem {
    /// quantity × cost price.
    pub fn line_cost(&self) -> Money {
        Money::from_cents(self.cost_price_cents).multiply_quantity(self.quantity)
    }
}

/// Input for receiving a purchase.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPurchase {
    pub supplier_id: String,
    pub invoice_no: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    /// Replaces the computed Σ cost × qty when present.
    pub total_override: Option<Money>,
    pub items: Vec<PurchaseLine>,
}

/// One purchase line.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PurchaseLine {
    pub product_id: String,
    pub quantity: i64,
    pub cost_price: Money,
    /// Defaults to `<invoice_no>-<line_no>`.
    pub batch_no: Option<String>,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
}

// =============================================================================
// Return
// =============================================================================

/// The status of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    /// Validated but stock not yet released; never visible to readers.
    #[default]
    Pending,
    /// Stock released and refund booked.
    Applied,
}

/// A (partial) reversal of a sale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleReturn {
    pub id: String,
    pub sale_id: String,
    pub sale_item_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub reason: String,
    pub refund_cents: i64,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub status: ReturnStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    /// Batches the returned units went back into.
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    pub allocations: Vec<BatchAllocation>,
}

impl SaleReturn {
    #[inline]
    pub fn refund(&self) -> Money {
        Money::from_cents(self.refund_cents)
    }

    /// Batch cost credited back against COGS.
    pub fn cost_credited(&self) -> Money {
        allocations_cost(&self.allocations)
    }
}

/// Input for creating a return.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewReturn {
    pub sale_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub reason: String,
    pub refund_amount: Money,
    /// Defaults to today.
    #[ts(as = "Option<String>")]
    pub date: Option<NaiveDate>,
}

// =============================================================================
// Expense
// =============================================================================

/// A discretionary cost record. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Expense {
    pub id: String,
    pub category: String,
    pub amount_cents: i64,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub description: Option<String>,
    #[ts(as = "Option<String>")]
    pub reminder_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Expense {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Input for recording an expense.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewExpense {
    pub category: String,
    pub amount: Money,
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub description: Option<String>,
    #[ts(as = "Option<String>")]
    pub reminder_date: Option<NaiveDate>,
}

// =============================================================================
// User
// =============================================================================

/// Role of a console user. Access control itself lives in the API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Salesman,
    #[serde(other)]
    Other,
}

impl Role {
    /// Only admins see profit/loss.
    pub fn can_view_profit_loss(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// A console user, referenced by `Sale::created_by`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    pub id: String,
    pub name: String,
    pub role: Role,
}

// =============================================================================
// Unit Tests
// =============================================================================
