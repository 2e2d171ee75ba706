//! # Expense Repository
//!
//! Append-only expense records.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{DateRange, Expense};

const EXPENSE_COLUMNS: &str =
    "id, category, amount_cents, date, description, reminder_date, created_at";

/// Repository for expense database operations.
#[derive(Debug, Clone)]
pub struct ExpenseRepository {
    pool: SqlitePool,
}

impl ExpenseRepository {
    /// Creates a new ExpenseRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ExpenseRepository { pool }
    }

    /// Inserts an expense.
    pub async fn insert(&self, expense: &Expense) -> DbResult<Expense> {
        debug!(category = %expense.category, amount_cents = expense.amount_cents, "Inserting expense");

        sqlx::query(
            r#"
            INSERT INTO expenses (
                id, category, amount_cents, date, description, reminder_date, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&expense.id)
        .bind(&expense.category)
        .bind(expense.amount_cents)
        .bind(expense.date)
        .bind(&expense.description)
        .bind(expense.reminder_date)
        .bind(expense.created_at)
        .execute(&self.pool)
        .await?;

        Ok(expense.clone())
    }

    /// Gets an expense by its ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Expense>> {
        let sql = format!("SELECT {EXPENSE_COLUMNS} FROM expenses WHERE id = ?1");
        let expense = sqlx::query_as::<_, Expense>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(expense)
    }

    /// Expenses dated within `range`, oldest first.
    pub async fn list_by_date(&self, range: DateRange) -> DbResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses WHERE date BETWEEN ?1 AND ?2 \
             ORDER BY date ASC, created_at ASC"
        );
        let expenses = sqlx::query_as::<_, Expense>(&sql)
            .bind(range.start())
            .bind(range.end())
            .fetch_all(&self.pool)
            .await?;

        Ok(expenses)
    }

    /// Expenses whose reminder falls on or before `on`, soonest first.
    pub async fn due_reminders(&self, on: NaiveDate) -> DbResult<Vec<Expense>> {
        let sql = format!(
            "SELECT {EXPENSE_COLUMNS} FROM expenses \
             WHERE reminder_date IS NOT NULL AND reminder_date <= ?1 \
             ORDER BY reminder_date ASC, created_at ASC"
        );
        let expenses = sqlx::query_as::<_, Expense>(&sql)
            .bind(on)
            .fetch_all(&self.pool)
            .await?;

        Ok(expenses)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::{self, date};
    use crate::repository::new_id;
    use chrono::Utc;

    fn expense(category: &str, cents: i64, on: NaiveDate, reminder: Option<NaiveDate>) -> Expense {
        Expense {
            id: new_id(),
            category: category.to_string(),
            amount_cents: cents,
            date: on,
            description: None,
            reminder_date: reminder,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_list_by_date_is_inclusive() {
        let db = fixtures::db().await;
        let repo = db.expenses();

        repo.insert(&expense("Rent", 50_000, date(2024, 1, 1), None)).await.unwrap();
        repo.insert(&expense("Power", 7_000, date(2024, 1, 31), None)).await.unwrap();
        repo.insert(&expense("Rent", 50_000, date(2024, 2, 1), None)).await.unwrap();

        let jan = DateRange::new(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        let listed = repo.list_by_date(jan).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].category, "Rent");
    }

    #[tokio::test]
    async fn test_due_reminders() {
        let db = fixtures::db().await;
        let repo = db.expenses();

        let due = repo
            .insert(&expense("Insurance", 9_000, date(2024, 1, 1), Some(date(2024, 1, 20))))
            .await
            .unwrap();
        repo.insert(&expense("Tax", 9_000, date(2024, 1, 1), Some(date(2024, 3, 1))))
            .await
            .unwrap();
        repo.insert(&expense("Misc", 100, date(2024, 1, 1), None)).await.unwrap();

        let reminders = repo.due_reminders(date(2024, 1, 20)).await.unwrap();
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].id, due.id);

        let fetched = repo.get_by_id(&due.id).await.unwrap().unwrap();
        assert_eq!(fetched.reminder_date, Some(date(2024, 1, 20)));
    }
}
