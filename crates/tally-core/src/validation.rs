//! # Validation Module
//!
//! Input validation for every ledger operation.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Wire DTOs (tally_core::wire)                                 │
//! │  ├── Shape and format checks (dates, finite amounts)                   │
//! │  └── Decimal → cents conversion                                        │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Business rules that need no storage                               │
//! │  └── Whole-document checks BEFORE any stock is touched                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Engine + SQLite (under the product lock)                     │
//! │  ├── Unknown product / sale references                                 │
//! │  ├── Returnable remainder, batch issued quantity                       │
//! │  └── UNIQUE / CHECK constraints                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_sku, validate_quantity};
//!
//! validate_sku("MILK-1L").unwrap();
//! validate_quantity("qty", 15).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{NewBatch, NewExpense, NewPurchase, NewReturn, NewSale, ProductInput};
use crate::{MAX_AMOUNT_CENTS, MAX_LINES_PER_DOCUMENT, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - Must be between 1 and 50 characters
/// - Should contain only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_sku;
///
/// assert!(validate_sku("MILK-1L").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name (1-200 characters after trimming).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_required_text("name", name, 200)
}

/// Validates a required free-text field.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_required_text;
///
/// assert!(validate_required_text("reason", "damaged", 500).is_ok());
/// assert!(validate_required_text("reason", "   ", 500).is_err());
/// ```
pub fn validate_required_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates an optional free-text field: absent is fine, present is bounded.
pub fn validate_optional_text(field: &str, value: Option<&str>, max: usize) -> ValidationResult<()> {
    match value {
        Some(value) if value.chars().count() > max => Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY
///
/// ```text
///  qty ──► qty <= 0 ? ──► MustBePositive
///      └─► qty > MAX_LINE_QUANTITY ? ──► OutOfRange
///      └─► OK
/// ```
pub fn validate_quantity(field: &str, qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount that may be zero (prices, costs, discounts, refunds).
///
/// ## Example
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("price", Money::from_cents(1099)).is_ok());
/// assert!(validate_non_negative("price", Money::zero()).is_ok());
/// assert!(validate_non_negative("price", Money::from_cents(-100)).is_err());
/// ```
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    validate_at_most(field, amount, Money::from_cents(MAX_AMOUNT_CENTS))
}

/// Validates an amount that must be strictly positive.
pub fn validate_positive_amount(field: &str, amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    validate_non_negative(field, amount)
}

/// Validates `unit × qty` and returns it.
///
/// The product must not overflow and must stay within
/// [`MAX_AMOUNT_CENTS`](crate::MAX_AMOUNT_CENTS).
///
/// ## Example
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::validation::validate_line_amount;
///
/// assert_eq!(validate_line_amount("price", Money::from_cents(1000), 15).unwrap().cents(), 15_000);
/// assert!(validate_line_amount("price", Money::from_cents(100_000_000_000_000), 1_000_000).is_err());
/// ```
pub fn validate_line_amount(field: &str, unit: Money, qty: i64) -> ValidationResult<Money> {
    let amount = unit
        .checked_multiply_quantity(qty)
        .ok_or_else(|| amount_too_large(field))?;
    validate_non_negative(field, amount).map_err(|_| amount_too_large(field))?;
    Ok(amount)
}

/// Sums line amounts, rejecting a total above the amount ceiling.
fn sum_amounts(field: &str, amounts: impl IntoIterator<Item = Money>) -> ValidationResult<Money> {
    let total = amounts
        .into_iter()
        .try_fold(Money::zero(), |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| amount_too_large(field))?;
    validate_non_negative(field, total).map_err(|_| amount_too_large(field))?;
    Ok(total)
}

fn amount_too_large(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_AMOUNT_CENTS,
    }
}

/// Validates `amount` lies within `0..=max`.
pub fn validate_at_most(field: &str, amount: Money, max: Money) -> ValidationResult<()> {
    if amount.is_negative() || amount > max {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: max.cents(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates a document has between 1 and MAX_LINES_PER_DOCUMENT lines.
pub fn validate_line_count(field: &str, lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if lines > MAX_LINES_PER_DOCUMENT {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_LINES_PER_DOCUMENT as i64,
        });
    }

    Ok(())
}

/// Rejects a product appearing on more than one line.
pub fn validate_distinct_products<'a>(
    product_ids: impl IntoIterator<Item = &'a str>,
) -> ValidationResult<()> {
    let mut seen = HashSet::new();
    for id in product_ids {
        if !seen.insert(id) {
            return Err(ValidationError::Duplicate {
                field: "productId".to_string(),
                value: id.to_string(),
            });
        }
    }
    Ok(())
}

// =============================================================================
// Document Validators
// =============================================================================

/// Validates a product create/edit.
pub fn validate_product_input(input: &ProductInput) -> ValidationResult<()> {
    validate_sku(&input.sku)?;
    validate_product_name(&input.name)?;
    validate_optional_text("category", input.category.as_deref(), 100)?;
    validate_optional_text("unit", input.unit.as_deref(), 20)?;
    validate_optional_text("barcode", input.barcode.as_deref(), 50)?;
    validate_non_negative("sale_price", input.sale_price)?;
    validate_non_negative("purchase_price", input.purchase_price)?;

    if input.reorder_level < 0 {
        return Err(ValidationError::OutOfRange {
            field: "reorder_level".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a batch receipt, excluding the product reference.
pub fn validate_new_batch(batch: &NewBatch) -> ValidationResult<()> {
    validate_required_text("productId", &batch.product_id, 64)?;
    validate_quantity("qty", batch.quantity)?;
    validate_required_text("batch_no", &batch.batch_no, 100)?;

    if let Some(cost) = batch.unit_cost {
        validate_non_negative("unitCost", cost)?;
        validate_line_amount("unitCost", cost, batch.quantity)?;
    }

    Ok(())
}

/// Validates every line of a purchase before any batch is created.
pub fn validate_new_purchase(purchase: &NewPurchase) -> ValidationResult<()> {
    validate_required_text("supplierId", &purchase.supplier_id, 64)?;
    validate_required_text("invoiceNo", &purchase.invoice_no, 100)?;
    validate_line_count("items", purchase.items.len())?;

    let mut line_costs = Vec::with_capacity(purchase.items.len());
    for line in &purchase.items {
        validate_required_text("productId", &line.product_id, 64)?;
        validate_quantity("qty", line.quantity)?;
        validate_non_negative("costPrice", line.cost_price)?;
        validate_optional_text("batch_no", line.batch_no.as_deref(), 100)?;
        line_costs.push(validate_line_amount("costPrice", line.cost_price, line.quantity)?);
    }
    sum_amounts("total", line_costs)?;

    if let Some(total) = purchase.total_override {
        validate_non_negative("total", total)?;
    }

    Ok(())
}

/// Validates a sale request as a whole and returns its subtotal.
///
/// Every check that needs no storage runs here, so a rejected sale never
/// touches a batch.
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<Money> {
    validate_required_text("invoice_no", &sale.invoice_no, 100)?;
    validate_required_text("createdBy", &sale.created_by, 64)?;
    validate_line_count("items", sale.items.len())?;

    let mut line_amounts = Vec::with_capacity(sale.items.len());
    for line in &sale.items {
        validate_required_text("productId", &line.product_id, 64)?;
        validate_quantity("qty", line.quantity)?;
        validate_non_negative("price", line.unit_price)?;
        line_amounts.push(validate_line_amount("price", line.unit_price, line.quantity)?);
    }

    validate_distinct_products(sale.items.iter().map(|line| line.product_id.as_str()))?;

    let subtotal = sum_amounts("subtotal", line_amounts)?;

    validate_at_most("discount", sale.discount, subtotal)?;

    Ok(subtotal)
}

/// Validates the parts of a return that need no sale lookup.
pub fn validate_new_return(ret: &NewReturn) -> ValidationResult<()> {
    validate_required_text("saleId", &ret.sale_id, 64)?;
    validate_required_text("productId", &ret.product_id, 64)?;
    validate_quantity("qty", ret.quantity)?;
    validate_required_text("reason", &ret.reason, 500)?;
    validate_non_negative("refundAmount", ret.refund_amount)?;
    Ok(())
}

/// Validates an expense record.
pub fn validate_new_expense(expense: &NewExpense) -> ValidationResult<()> {
    validate_required_text("category", &expense.category, 100)?;
    validate_positive_amount("amount", expense.amount)?;
    validate_optional_text("description", expense.description.as_deref(), 1000)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentMethod, PurchaseLine, SaleLine};
    use chrono::NaiveDate;

    fn sale_with(lines: Vec<(&str, i64, i64)>, discount: i64) -> NewSale {
        NewSale {
            invoice_no: "INV-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            discount: Money::from_cents(discount),
            payment_method: PaymentMethod::Cash,
            created_by: "u-1".to_string(),
            items: lines
                .into_iter()
                .map(|(product_id, quantity, price)| SaleLine {
                    product_id: product_id.to_string(),
                    quantity,
                    unit_price: Money::from_cents(price),
                })
                .collect(),
        }
    }

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("MILK-1L").is_ok());
        assert!(validate_sku("bread_white").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(51)).is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity("qty", 1).is_ok());
        assert!(validate_quantity("qty", MAX_LINE_QUANTITY).is_ok());

        assert!(matches!(
            validate_quantity("qty", 0),
            Err(ValidationError::MustBePositive { .. })
        ));
        assert!(validate_quantity("qty", -3).is_err());
        assert!(matches!(
            validate_quantity("qty", MAX_LINE_QUANTITY + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_non_negative("price", Money::zero()).is_ok());
        assert!(validate_non_negative("price", Money::from_cents(-1)).is_err());

        assert!(validate_positive_amount("amount", Money::from_cents(1)).is_ok());
        assert!(validate_positive_amount("amount", Money::zero()).is_err());

        let max = Money::from_cents(500);
        assert!(validate_at_most("refund", max, max).is_ok());
        assert!(validate_at_most("refund", Money::from_cents(501), max).is_err());
    }

    #[test]
    fn test_validate_new_sale_returns_subtotal() {
        let sale = sale_with(vec![("p-1", 15, 1000), ("p-2", 2, 250)], 500);
        assert_eq!(validate_new_sale(&sale).unwrap().cents(), 15_500);
    }

    #[test]
    fn test_oversized_line_is_rejected_not_overflowed() {
        let sale = sale_with(vec![("p-1", MAX_LINE_QUANTITY, 100_000_000_000_000)], 0);
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::OutOfRange { ref field, max: MAX_AMOUNT_CENTS, .. }) if field == "price"
        ));

        // Each line fits, the sum of 200 of them does not.
        let lines: Vec<(String, i64, i64)> = (0..MAX_LINES_PER_DOCUMENT)
            .map(|n| (format!("p-{n}"), 1, MAX_AMOUNT_CENTS))
            .collect();
        let sale = sale_with(lines.iter().map(|(id, q, p)| (id.as_str(), *q, *p)).collect(), 0);
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "subtotal"
        ));
    }

    #[test]
    fn test_validate_new_sale_rejects_duplicate_product() {
        let sale = sale_with(vec![("p-1", 1, 100), ("p-1", 2, 100)], 0);
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_validate_new_sale_rejects_excess_discount() {
        let sale = sale_with(vec![("p-1", 1, 100)], 101);
        assert!(matches!(
            validate_new_sale(&sale),
            Err(ValidationError::OutOfRange { max: 100, .. })
        ));

        let sale = sale_with(vec![("p-1", 1, 100)], -1);
        assert!(validate_new_sale(&sale).is_err());
    }

    #[test]
    fn test_validate_new_sale_rejects_empty_and_bad_lines() {
        assert!(validate_new_sale(&sale_with(vec![], 0)).is_err());
        assert!(validate_new_sale(&sale_with(vec![("p-1", 0, 100)], 0)).is_err());
        assert!(validate_new_sale(&sale_with(vec![("p-1", 1, -100)], 0)).is_err());
        assert!(validate_new_sale(&sale_with(vec![("", 1, 100)], 0)).is_err());
    }

    #[test]
    fn test_purchase_line_cost_cannot_overflow() {
        let purchase = NewPurchase {
            supplier_id: "sup-1".to_string(),
            invoice_no: "PO-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            total_override: None,
            items: vec![PurchaseLine {
                product_id: "p-1".to_string(),
                quantity: MAX_LINE_QUANTITY,
                cost_price: Money::from_cents(100_000_000_000_000),
                batch_no: None,
                expiry_date: None,
            }],
        };
        assert!(matches!(
            validate_new_purchase(&purchase),
            Err(ValidationError::OutOfRange { ref field, .. }) if field == "costPrice"
        ));
    }

    #[test]
    fn test_validate_new_expense() {
        let mut expense = NewExpense {
            category: "Rent".to_string(),
            amount: Money::from_cents(50_000),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            description: None,
            reminder_date: None,
        };
        assert!(validate_new_expense(&expense).is_ok());

        expense.amount = Money::zero();
        assert!(validate_new_expense(&expense).is_err());

        expense.amount = Money::from_cents(100);
        expense.category = " ".to_string();
        assert!(validate_new_expense(&expense).is_err());
    }
}
