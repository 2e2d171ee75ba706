//! # Expense Ledger
//!
//! Append-only discretionary costs. No relationship to stock.

use chrono::{NaiveDate, Utc};
use tracing::info;

use tally_core::validation::validate_new_expense;
use tally_core::{DateRange, Expense, LedgerResult, NewExpense};
use tally_db::{new_id, Database};

#[derive(Debug, Clone)]
pub struct ExpenseLedger {
    db: Database,
}

impl ExpenseLedger {
    pub fn new(db: Database) -> Self {
        ExpenseLedger { db }
    }

    /// Records an expense.
    pub async fn record_expense(&self, request: NewExpense) -> LedgerResult<Expense> {
        validate_new_expense(&request)?;

        let expense = Expense {
            id: new_id(),
            category: request.category.trim().to_string(),
            amount_cents: request.amount.cents(),
            date: request.date,
            description: request.description,
            reminder_date: request.reminder_date,
            created_at: Utc::now(),
        };

        let expense = self.db.expenses().insert(&expense).await?;
        info!(
            expense_id = %expense.id,
            category = %expense.category,
            amount_cents = expense.amount_cents,
            "Expense recorded"
        );
        Ok(expense)
    }

    pub async fn list_expenses(&self, range: DateRange) -> LedgerResult<Vec<Expense>> {
        Ok(self.db.expenses().list_by_date(range).await?)
    }

    /// Expenses whose reminder date is on or before `on`.
    pub async fn due_reminders(&self, on: NaiveDate) -> LedgerResult<Vec<Expense>> {
        Ok(self.db.expenses().due_reminders(on).await?)
    }
}
