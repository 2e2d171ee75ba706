//! # Sale Repository
//!
//! Sales, their lines, and each line's consumption record.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  (memory) OPEN ──► stock consumed per line ──► insert() as COMMITTED   │
//! │                                                       │                 │
//! │                                                       ▼                 │
//! │                                              set_status() ──► VOID     │
//! │                                                                         │
//! │  An OPEN sale is never written; readers only ever see committed or     │
//! │  void sales, each with its full consumption record.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{BatchAllocation, DateRange, Sale, SaleItem, SaleStatus};

const SALE_COLUMNS: &str = r#"
    id, invoice_no, date, subtotal_cents, discount_cents, total_cents,
    payment_method, created_by, status, created_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, sale_id, product_id, line_no, quantity, unit_price_cents, subtotal_cents
"#;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale with its items and consumption records.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match sale {
            Some(mut sale) => {
                sale.items = self.get_items(&sale.id).await?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }

    /// Checks whether any sale already uses `invoice_no`.
    pub async fn invoice_exists(&self, invoice_no: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales WHERE invoice_no = ?1")
            .bind(invoice_no)
            .fetch_one(&self.pool)
            .await?;

        Ok(count > 0)
    }

    /// Sales dated within `range`, oldest first, any status.
    pub async fn list_by_date(&self, range: DateRange) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE date BETWEEN ?1 AND ?2 \
             ORDER BY date ASC, created_at ASC"
        );
        let mut sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(range.start())
            .bind(range.end())
            .fetch_all(&self.pool)
            .await?;

        for sale in &mut sales {
            sale.items = self.get_items(&sale.id).await?;
        }

        debug!(count = sales.len(), "Listed sales");
        Ok(sales)
    }

    /// Gets all items of a sale in line order, with consumption records.
    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY line_no");
        let mut items = sqlx::query_as::<_, SaleItem>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        for item in &mut items {
            item.allocations = self.get_allocations(&item.id).await?;
        }

        Ok(items)
    }

    /// The consumption record of one sale line, in consumption order.
    pub async fn get_allocations(&self, sale_item_id: &str) -> DbResult<Vec<BatchAllocation>> {
        let allocations = sqlx::query_as::<_, BatchAllocation>(
            r#"
            SELECT batch_id, quantity, unit_cost_cents
            FROM sale_item_allocations
            WHERE sale_item_id = ?1
            ORDER BY seq
            "#,
        )
        .bind(sale_item_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    // =========================================================================
    // Transaction-scoped writes
    // =========================================================================

    /// Inserts a sale, its items and every consumption record.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - invoice number already used
    pub async fn insert(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
        debug!(sale_id = %sale.id, invoice_no = %sale.invoice_no, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, invoice_no, date, subtotal_cents, discount_cents, total_cents,
                payment_method, created_by, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.invoice_no)
        .bind(sale.date)
        .bind(sale.subtotal_cents)
        .bind(sale.discount_cents)
        .bind(sale.total_cents)
        .bind(sale.payment_method)
        .bind(&sale.created_by)
        .bind(sale.status)
        .bind(sale.created_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: sale.invoice_no.clone(),
            },
            other => other,
        })?;

        for item in &sale.items {
            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, product_id, line_no, quantity,
                    unit_price_cents, subtotal_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&item.id)
            .bind(&sale.id)
            .bind(&item.product_id)
            .bind(item.line_no)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.subtotal_cents)
            .execute(&mut *conn)
            .await?;

            for (seq, allocation) in item.allocations.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO sale_item_allocations (
                        sale_item_id, seq, batch_id, quantity, unit_cost_cents
                    ) VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                )
                .bind(&item.id)
                .bind(seq as i64)
                .bind(&allocation.batch_id)
                .bind(allocation.quantity)
                .bind(allocation.unit_cost_cents)
                .execute(&mut *conn)
                .await?;
            }
        }

        Ok(())
    }

    /// Moves a sale from `from` to `to`.
    ///
    /// ## Returns
    /// * `Ok(false)` - the sale was not in status `from`
    pub async fn set_status(
        conn: &mut SqliteConnection,
        sale_id: &str,
        from: SaleStatus,
        to: SaleStatus,
    ) -> DbResult<bool> {
        debug!(sale_id = %sale_id, ?from, ?to, "Updating sale status");

        let result = sqlx::query("UPDATE sales SET status = ?3 WHERE id = ?1 AND status = ?2")
            .bind(sale_id)
            .bind(from)
            .bind(to)
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
