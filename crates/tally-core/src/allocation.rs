//! # Batch Allocation
//!
//! Decides which batches fund a consumption and which batches take back
//! returned units. The engine applies the plan under the product lock.
//!
//! ## Consumption Order (FEFO)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. expiry_date ascending      (expiring batches first)                 │
//! │  2. no expiry_date             (after every expiring batch)             │
//! │  3. received_date ascending    (FIFO among equal expiry)                │
//! │  4. created_at, id             (deterministic tie break)                │
//! │                                                                         │
//! │  B1 exp 2024-01-01 qty 10 @5 ─┐                                         │
//! │  B2 exp 2024-02-01 qty 10 @6 ─┼─► consume 15 ─► [B1×10 @5, B2×5 @6]     │
//! │  B3 no expiry      qty 10 @4 ─┘                  COGS = 80              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Release Order
//! Returns walk the sale line's consumption record from the last-consumed
//! batch backwards, so the freshest stock goes back on the shelf first.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{LedgerError, LedgerResult, ValidationError};
use crate::types::{BatchAllocation, StockBatch};

// =============================================================================
// Ordering
// =============================================================================

/// Total order used to pick batches for consumption.
pub fn fefo_order(a: &StockBatch, b: &StockBatch) -> Ordering {
    let expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    expiry
        .then_with(|| a.received_date.cmp(&b.received_date))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Σ quantity_remaining over the given batches.
pub fn total_available(batches: &[StockBatch]) -> i64 {
    batches.iter().map(|b| b.quantity_remaining).sum()
}

// =============================================================================
// Consumption
// =============================================================================

/// Plans taking `quantity` units of `product_id` from `batches`.
///
/// All-or-nothing: if the batches hold fewer than `quantity` units the plan
/// fails with `InsufficientStock` and nothing is allocated.
///
/// ## Example
/// ```rust,ignore
/// let plan = plan_consumption("p-1", &batches, 15)?;
/// assert_eq!(allocations_quantity(&plan), 15);
/// ```
pub fn plan_consumption(
    product_id: &str,
    batches: &[StockBatch],
    quantity: i64,
) -> LedgerResult<Vec<BatchAllocation>> {
    let available = total_available(batches);
    if available < quantity {
        return Err(LedgerError::InsufficientStock {
            product_id: product_id.to_string(),
            available,
            requested: quantity,
        });
    }

    let mut ordered: Vec<&StockBatch> = batches
        .iter()
        .filter(|b| b.quantity_remaining > 0)
        .collect();
    ordered.sort_by(|a, b| fefo_order(a, b));

    let mut needed = quantity;
    let mut plan = Vec::new();

    for batch in ordered {
        if needed == 0 {
            break;
        }
        let take = needed.min(batch.quantity_remaining);
        plan.push(BatchAllocation {
            batch_id: batch.id.clone(),
            quantity: take,
            unit_cost_cents: batch.unit_cost_cents,
        });
        needed -= take;
    }

    Ok(plan)
}

// =============================================================================
// Release
// =============================================================================

/// Units of a consumption record not yet returned.
pub fn returnable_quantity(consumed: &[BatchAllocation], already_returned: &[BatchAllocation]) -> i64 {
    let consumed: i64 = consumed.iter().map(|a| a.quantity).sum();
    let returned: i64 = already_returned.iter().map(|a| a.quantity).sum();
    (consumed - returned).max(0)
}

/// Plans returning `quantity` units of a sale line to the batches that
/// funded it.
///
/// `consumed` is the line's consumption record in consumption order and
/// `already_returned` the allocations of its earlier applied returns.
/// Releases walk from the last-consumed batch backwards, never giving a
/// batch more than it funded net of earlier returns.
pub fn plan_release(
    consumed: &[BatchAllocation],
    already_returned: &[BatchAllocation],
    quantity: i64,
) -> Result<Vec<BatchAllocation>, ValidationError> {
    let returnable = returnable_quantity(consumed, already_returned);
    if quantity > returnable {
        return Err(ValidationError::ExceedsReturnable {
            requested: quantity,
            returnable,
        });
    }

    let mut returned_by_batch: HashMap<&str, i64> = HashMap::new();
    for allocation in already_returned {
        *returned_by_batch.entry(allocation.batch_id.as_str()).or_default() += allocation.quantity;
    }

    let mut needed = quantity;
    let mut plan = Vec::new();

    for allocation in consumed.iter().rev() {
        if needed == 0 {
            break;
        }

        // Earlier returns also drained this record from the back, so they
        // are charged against the batch before anything new is released.
        let returned = returned_by_batch
            .get_mut(allocation.batch_id.as_str())
            .map(|r| {
                let used = (*r).min(allocation.quantity);
                *r -= used;
                used
            })
            .unwrap_or(0);

        let open = allocation.quantity - returned;
        if open <= 0 {
            continue;
        }

        let give = needed.min(open);
        plan.push(BatchAllocation {
            batch_id: allocation.batch_id.clone(),
            quantity: give,
            unit_cost_cents: allocation.unit_cost_cents,
        });
        needed -= give;
    }

    Ok(plan)
}

/// Checks that releasing `quantity` units keeps `batch` within the quantity
/// it was issued with.
pub fn check_release(batch: &StockBatch, quantity: i64) -> Result<(), ValidationError> {
    if quantity <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if batch.quantity_remaining + quantity > batch.initial_quantity {
        return Err(ValidationError::ExceedsIssued {
            batch_id: batch.id.clone(),
            issued: batch.initial_quantity,
            requested: quantity,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{allocations_cost, allocations_quantity};
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn batch(id: &str, qty: i64, cost: i64, expiry: Option<NaiveDate>, received: NaiveDate) -> StockBatch {
        StockBatch {
            id: id.to_string(),
            product_id: "p".to_string(),
            batch_no: id.to_uppercase(),
            received_date: received,
            expiry_date: expiry,
            initial_quantity: qty,
            quantity_remaining: qty,
            unit_cost_cents: cost,
            purchase_id: None,
            created_at: Utc.with_ymd_and_hms(2023, 12, 1, 9, 0, 0).unwrap(),
        }
    }

    fn scenario_batches() -> Vec<StockBatch> {
        // Deliberately out of FEFO order.
        vec![
            batch("b2", 10, 600, Some(date(2024, 2, 1)), date(2023, 12, 1)),
            batch("b1", 10, 500, Some(date(2024, 1, 1)), date(2023, 12, 2)),
        ]
    }

    #[test]
    fn test_consumption_follows_fefo() {
        let plan = plan_consumption("p", &scenario_batches(), 15).unwrap();

        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].batch_id, "b1");
        assert_eq!(plan[0].quantity, 10);
        assert_eq!(plan[1].batch_id, "b2");
        assert_eq!(plan[1].quantity, 5);
        assert_eq!(allocations_cost(&plan).cents(), 8000);
    }

    #[test]
    fn test_consumption_is_all_or_nothing() {
        let err = plan_consumption("p", &scenario_batches(), 25).unwrap_err();
        match err {
            LedgerError::InsufficientStock {
                product_id,
                available,
                requested,
            } => {
                assert_eq!(product_id, "p");
                assert_eq!(available, 20);
                assert_eq!(requested, 25);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_batches_without_expiry_go_last() {
        let batches = vec![
            batch("none", 5, 100, None, date(2023, 1, 1)),
            batch("late", 5, 200, Some(date(2030, 1, 1)), date(2024, 1, 1)),
        ];
        let plan = plan_consumption("p", &batches, 7).unwrap();
        assert_eq!(plan[0].batch_id, "late");
        assert_eq!(plan[1].batch_id, "none");
        assert_eq!(plan[1].quantity, 2);
    }

    #[test]
    fn test_equal_expiry_falls_back_to_received_date() {
        let expiry = Some(date(2024, 6, 1));
        let batches = vec![
            batch("newer", 5, 100, expiry, date(2024, 2, 1)),
            batch("older", 5, 100, expiry, date(2024, 1, 1)),
        ];
        let plan = plan_consumption("p", &batches, 3).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].batch_id, "older");
    }

    #[test]
    fn test_depleted_batches_are_skipped() {
        let mut batches = scenario_batches();
        batches[1].quantity_remaining = 0;
        let plan = plan_consumption("p", &batches, 4).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].batch_id, "b2");
    }

    #[test]
    fn test_release_walks_back_from_last_consumed() {
        let consumed = plan_consumption("p", &scenario_batches(), 15).unwrap();

        let first = plan_release(&consumed, &[], 5).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].batch_id, "b2");
        assert_eq!(first[0].quantity, 5);

        let second = plan_release(&consumed, &first, 7).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].batch_id, "b1");
        assert_eq!(second[0].quantity, 7);
        assert_eq!(allocations_quantity(&second), 7);
    }

    #[test]
    fn test_release_rejects_more_than_returnable() {
        let consumed = plan_consumption("p", &scenario_batches(), 15).unwrap();
        let first = plan_release(&consumed, &[], 5).unwrap();

        assert_eq!(returnable_quantity(&consumed, &first), 10);
        assert!(matches!(
            plan_release(&consumed, &first, 11),
            Err(ValidationError::ExceedsReturnable {
                requested: 11,
                returnable: 10
            })
        ));
    }

    #[test]
    fn test_full_release_mirrors_consumption() {
        let consumed = plan_consumption("p", &scenario_batches(), 15).unwrap();
        let released = plan_release(&consumed, &[], 15).unwrap();

        let mut expected = consumed.clone();
        expected.reverse();
        assert_eq!(released, expected);
        assert_eq!(allocations_cost(&released), allocations_cost(&consumed));
    }

    #[test]
    fn test_check_release_bounds_issued_quantity() {
        let mut b = batch("b1", 10, 500, None, date(2024, 1, 1));
        b.quantity_remaining = 4;

        assert!(check_release(&b, 6).is_ok());
        assert!(matches!(
            check_release(&b, 7),
            Err(ValidationError::ExceedsIssued { issued: 10, .. })
        ));
        assert!(check_release(&b, 0).is_err());
    }
}
