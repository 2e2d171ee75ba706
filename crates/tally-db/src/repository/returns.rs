//! # Return Repository
//!
//! Applied returns and the record of which batches took the units back.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{BatchAllocation, DateRange, SaleReturn};

const RETURN_COLUMNS: &str = r#"
    id, sale_id, sale_item_id, product_id, quantity, reason,
    refund_cents, date, status, created_at
"#;

/// Repository for return database operations.
#[derive(Debug, Clone)]
pub struct ReturnRepository {
    pool: SqlitePool,
}

impl ReturnRepository {
    /// Creates a new ReturnRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReturnRepository { pool }
    }

    /// Gets a return with its release record.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<SaleReturn>> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1");
        let ret = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match ret {
            Some(mut ret) => {
                ret.allocations = self.get_allocations(&ret.id).await?;
                Ok(Some(ret))
            }
            None => Ok(None),
        }
    }

    /// Returns against a sale, oldest first.
    pub async fn for_sale(&self, sale_id: &str) -> DbResult<Vec<SaleReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE sale_id = ?1 ORDER BY created_at ASC, id ASC"
        );
        let returns = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(sale_id)
            .fetch_all(&self.pool)
            .await?;

        self.with_allocations(returns).await
    }

    /// Returns against one sale line, oldest first.
    pub async fn for_sale_item(&self, sale_item_id: &str) -> DbResult<Vec<SaleReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE sale_item_id = ?1 ORDER BY created_at ASC, id ASC"
        );
        let returns = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(sale_item_id)
            .fetch_all(&self.pool)
            .await?;

        self.with_allocations(returns).await
    }

    /// Returns dated within `range`, oldest first.
    pub async fn list_by_date(&self, range: DateRange) -> DbResult<Vec<SaleReturn>> {
        let sql = format!(
            "SELECT {RETURN_COLUMNS} FROM returns WHERE date BETWEEN ?1 AND ?2 \
             ORDER BY date ASC, created_at ASC"
        );
        let returns = sqlx::query_as::<_, SaleReturn>(&sql)
            .bind(range.start())
            .bind(range.end())
            .fetch_all(&self.pool)
            .await?;

        self.with_allocations(returns).await
    }

    /// The release record of one return.
    pub async fn get_allocations(&self, return_id: &str) -> DbResult<Vec<BatchAllocation>> {
        let allocations = sqlx::query_as::<_, BatchAllocation>(
            r#"
            SELECT batch_id, quantity, unit_cost_cents
            FROM return_allocations
            WHERE return_id = ?1
            ORDER BY seq
            "#,
        )
        .bind(return_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(allocations)
    }

    async fn with_allocations(&self, mut returns: Vec<SaleReturn>) -> DbResult<Vec<SaleReturn>> {
        for ret in &mut returns {
            ret.allocations = self.get_allocations(&ret.id).await?;
        }
        Ok(returns)
    }

    // =========================================================================
    // Transaction-scoped writes
    // =========================================================================

    /// Inserts a return and its release record.
    pub async fn insert(conn: &mut SqliteConnection, ret: &SaleReturn) -> DbResult<()> {
        debug!(
            return_id = %ret.id,
            sale_id = %ret.sale_id,
            qty = ret.quantity,
            "Inserting return"
        );

        sqlx::query(
            r#"
            INSERT INTO returns (
                id, sale_id, sale_item_id, product_id, quantity, reason,
                refund_cents, date, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&ret.id)
        .bind(&ret.sale_id)
        .bind(&ret.sale_item_id)
        .bind(&ret.product_id)
        .bind(ret.quantity)
        .bind(&ret.reason)
        .bind(ret.refund_cents)
        .bind(ret.date)
        .bind(ret.status)
        .bind(ret.created_at)
        .execute(&mut *conn)
        .await?;

        for (seq, allocation) in ret.allocations.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO return_allocations (return_id, seq, batch_id, quantity, unit_cost_cents)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&ret.id)
            .bind(seq as i64)
            .bind(&allocation.batch_id)
            .bind(allocation.quantity)
            .bind(allocation.unit_cost_cents)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}
