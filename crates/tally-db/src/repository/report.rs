//! # Report Repository
//!
//! Read-only aggregates behind the profit/loss statement.
//!
//! ## Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sales        Σ sale_items.subtotal, Σ discount     status = committed │
//! │  returns      Σ refund                              status = applied   │
//! │  sold cost    Σ sale_item_allocations qty × cost    committed sales    │
//! │  returned     Σ return_allocations qty × cost       applied returns    │
//! │  expenses     Σ amount                                                  │
//! │                                                                         │
//! │  Sales are bucketed by sale date, returns by return date, expenses by  │
//! │  expense date. All six sums run inside one read transaction, so they   │
//! │  see a single snapshot of the ledger.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{DateRange, Money, ProfitLossTotals};

const SALES_SQL: &str = r#"
    SELECT COALESCE(SUM(si.subtotal_cents), 0)
    FROM sale_items si
    JOIN sales s ON s.id = si.sale_id
    WHERE s.status = 'committed' AND s.date BETWEEN ?1 AND ?2
"#;

const DISCOUNTS_SQL: &str = r#"
    SELECT COALESCE(SUM(discount_cents), 0)
    FROM sales
    WHERE status = 'committed' AND date BETWEEN ?1 AND ?2
"#;

const RETURNS_SQL: &str = r#"
    SELECT COALESCE(SUM(refund_cents), 0)
    FROM returns
    WHERE status = 'applied' AND date BETWEEN ?1 AND ?2
"#;

const SOLD_COST_SQL: &str = r#"
    SELECT COALESCE(SUM(a.quantity * a.unit_cost_cents), 0)
    FROM sale_item_allocations a
    JOIN sale_items si ON si.id = a.sale_item_id
    JOIN sales s ON s.id = si.sale_id
    WHERE s.status = 'committed' AND s.date BETWEEN ?1 AND ?2
"#;

const RETURNED_COST_SQL: &str = r#"
    SELECT COALESCE(SUM(a.quantity * a.unit_cost_cents), 0)
    FROM return_allocations a
    JOIN returns r ON r.id = a.return_id
    WHERE r.status = 'applied' AND r.date BETWEEN ?1 AND ?2
"#;

const EXPENSES_SQL: &str = r#"
    SELECT COALESCE(SUM(amount_cents), 0)
    FROM expenses
    WHERE date BETWEEN ?1 AND ?2
"#;

/// Repository for profit/loss aggregates.
#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    /// Creates a new ReportRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Gathers the raw profit/loss totals for `range`.
    pub async fn profit_loss_totals(&self, range: DateRange) -> DbResult<ProfitLossTotals> {
        let mut tx = self.pool.begin().await?;

        let totals = ProfitLossTotals {
            sales: sum(&mut tx, SALES_SQL, range).await?,
            discounts: sum(&mut tx, DISCOUNTS_SQL, range).await?,
            returns: sum(&mut tx, RETURNS_SQL, range).await?,
            sold_cost: sum(&mut tx, SOLD_COST_SQL, range).await?,
            returned_cost: sum(&mut tx, RETURNED_COST_SQL, range).await?,
            expenses: sum(&mut tx, EXPENSES_SQL, range).await?,
        };

        // Nothing was written; ending the read transaction either way is fine.
        tx.rollback().await?;

        debug!(
            start = %range.start(),
            end = %range.end(),
            sales = totals.sales.cents(),
            sold_cost = totals.sold_cost.cents(),
            "Profit/loss totals"
        );
        Ok(totals)
    }
}

async fn sum(conn: &mut SqliteConnection, sql: &str, range: DateRange) -> DbResult<Money> {
    let cents: i64 = sqlx::query_scalar(sql)
        .bind(range.start())
        .bind(range.end())
        .fetch_one(&mut *conn)
        .await?;

    Ok(Money::from_cents(cents))
}

// =============================================================================
// Unit Tests
// =============================================================================
