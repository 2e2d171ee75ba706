//! # Profit/Loss Report
//!
//! Date ranges and the arithmetic of the profit/loss statement. Totals are
//! gathered by the storage layer; this module only validates the range and
//! combines them.
//!
//! ```text
//! profit = totalSales − totalDiscounts − totalReturns − totalCOGS − totalExpenses
//!
//! totalCOGS = Σ sale allocation qty × unit_cost   (committed sales in range)
//!           − Σ return allocation qty × unit_cost (applied returns in range)
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Date Range
// =============================================================================

/// An inclusive range of business days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    start: NaiveDate,
    #[ts(as = "String")]
    end: NaiveDate,
}

impl DateRange {
    /// Creates a range covering `start` through `end`, both included.
    ///
    /// ## Example
    /// ```rust
    /// use chrono::NaiveDate;
    /// use tally_core::report::DateRange;
    ///
    /// let jan = DateRange::new(
    ///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
    ///     NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    /// )
    /// .unwrap();
    /// assert!(jan.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
    /// ```
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidFormat {
                field: "startDate".to_string(),
                reason: format!("start date {start} is after end date {end}"),
            });
        }
        Ok(DateRange { start, end })
    }

    /// A range of one day.
    pub fn day(date: NaiveDate) -> Self {
        DateRange {
            start: date,
            end: date,
        }
    }

    /// Years 1 through 9999, which covers every four-digit ISO date.
    pub fn all() -> Self {
        DateRange {
            start: NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Checks if `date` falls within the range, endpoints included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// =============================================================================
// Profit/Loss Report
// =============================================================================

/// Raw totals read from committed records for a range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProfitLossTotals {
    /// Σ sale item subtotals (before discount), committed sales.
    pub sales: Money,
    /// Σ sale discounts, committed sales.
    pub discounts: Money,
    /// Σ refunds, applied returns.
    pub returns: Money,
    /// Σ qty × unit_cost over the consumption records of committed sales.
    pub sold_cost: Money,
    /// Σ qty × unit_cost over the release records of applied returns.
    pub returned_cost: Money,
    /// Σ expense amounts.
    pub expenses: Money,
}

/// The profit/loss statement for a date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ProfitLossReport {
    pub range: DateRange,
    pub total_sales: Money,
    pub total_discounts: Money,
    pub total_returns: Money,
    #[serde(rename = "totalCOGS")]
    pub total_cogs: Money,
    pub total_expenses: Money,
    pub profit: Money,
}

impl ProfitLossReport {
    /// Builds the statement from raw totals.
    pub fn from_totals(range: DateRange, totals: ProfitLossTotals) -> Self {
        let total_cogs = totals.sold_cost - totals.returned_cost;
        let profit =
            totals.sales - totals.discounts - totals.returns - total_cogs - totals.expenses;

        ProfitLossReport {
            range,
            total_sales: totals.sales,
            total_discounts: totals.discounts,
            total_returns: totals.returns,
            total_cogs,
            total_expenses: totals.expenses,
            profit,
        }
    }

    /// Revenue net of discounts and refunds.
    pub fn net_revenue(&self) -> Money {
        self.total_sales - self.total_discounts - self.total_returns
    }

    /// Net revenue minus cost of goods sold.
    pub fn gross_profit(&self) -> Money {
        self.net_revenue() - self.total_cogs
    }

    pub fn is_loss(&self) -> bool {
        self.profit.is_negative()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
