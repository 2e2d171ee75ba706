//! # Profit/Loss Aggregator
//!
//! Read-only. Never takes a product lock and never writes; the totals come
//! from one read transaction over committed sales, applied returns and
//! expenses.

use chrono::NaiveDate;
use tracing::info;

use tally_core::{DateRange, LedgerResult, ProfitLossReport};
use tally_db::Database;

#[derive(Debug, Clone)]
pub struct ProfitLossAggregator {
    db: Database,
}

impl ProfitLossAggregator {
    pub fn new(db: Database) -> Self {
        ProfitLossAggregator { db }
    }

    /// Profit/loss for `start` through `end`, both days included.
    ///
    /// ## Errors
    /// * `Validation(InvalidFormat)` - `start` is after `end`
    pub async fn compute_report(&self, start: NaiveDate, end: NaiveDate) -> LedgerResult<ProfitLossReport> {
        let range = DateRange::new(start, end)?;
        self.report_for(range).await
    }

    /// Profit/loss for an already validated range.
    pub async fn report_for(&self, range: DateRange) -> LedgerResult<ProfitLossReport> {
        let totals = self.db.reports().profit_loss_totals(range).await?;
        let report = ProfitLossReport::from_totals(range, totals);

        info!(
            start = %range.start(),
            end = %range.end(),
            profit_cents = report.profit.cents(),
            "Profit/loss computed"
        );
        Ok(report)
    }
}
