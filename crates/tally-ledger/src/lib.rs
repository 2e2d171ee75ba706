//! # tally-ledger: Inventory Ledger & Profit/Loss Engine
//!
//! Keeps stock quantities, cost basis, sales, purchases and returns
//! consistent under concurrent callers, and computes profit/loss from the
//! committed records.
//!
//! ## Component Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Ledger                                       │
//! │                                                                         │
//! │  ┌────────────────┐                                                     │
//! │  │ ProductCatalog │  products, stock levels, low stock                  │
//! │  └────────────────┘                                                     │
//! │                                                                         │
//! │  ┌──────────────────┐    ┌───────────────┐    ┌─────────────────┐       │
//! │  │ PurchaseReceiver │───►│  StockLedger  │◄───│ SalesProcessor  │       │
//! │  └──────────────────┘    │ receive       │    └─────────────────┘       │
//! │                          │ consume (FEFO)│    ┌─────────────────┐       │
//! │                          │ release       │◄───│ ReturnProcessor │       │
//! │                          └───────┬───────┘    └─────────────────┘       │
//! │                                  │                                      │
//! │                          ProductLocks (one per product, shared)         │
//! │                                                                         │
//! │  ┌───────────────┐    ┌──────────────────────┐                          │
//! │  │ ExpenseLedger │    │ ProfitLossAggregator │  read-only, lock-free    │
//! │  └───────────────┘    └──────────────────────┘                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_ledger::{Ledger, LedgerConfig};
//!
//! let config = LedgerConfig::from_env()?;
//! tally_ledger::telemetry::init_tracing(&config.log_filter);
//! let ledger = Ledger::open(&config).await?;
//!
//! let sale = ledger.sales().create_sale(request).await?;
//! let report = ledger.reports().compute_report(start, end).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod config;
pub mod expense;
pub mod locks;
pub mod purchase;
pub mod report;
pub mod returns;
pub mod sales;
pub mod stock;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use catalog::ProductCatalog;
pub use config::{ConfigError, LedgerConfig};
pub use expense::ExpenseLedger;
pub use locks::ProductLocks;
pub use purchase::PurchaseReceiver;
pub use report::ProfitLossAggregator;
pub use returns::ReturnProcessor;
pub use sales::SalesProcessor;
pub use stock::StockLedger;

pub use tally_core::{LedgerError, LedgerResult};

use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::info;

use tally_db::Database;

/// Today's business date (UTC).
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// =============================================================================
// Ledger
// =============================================================================

/// Every ledger component wired to one database and one lock registry.
///
/// Cheap to clone; clones share the pool and the locks.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
    catalog: ProductCatalog,
    stock: StockLedger,
    purchases: PurchaseReceiver,
    sales: SalesProcessor,
    returns: ReturnProcessor,
    expenses: ExpenseLedger,
    reports: ProfitLossAggregator,
}

impl Ledger {
    /// Wires the components over an open database.
    pub fn new(db: Database, lock_timeout: Duration) -> Self {
        let locks = ProductLocks::new(lock_timeout);
        let stock = StockLedger::new(db.clone(), locks.clone());

        Ledger {
            catalog: ProductCatalog::new(db.clone()),
            purchases: PurchaseReceiver::new(db.clone(), locks),
            sales: SalesProcessor::new(db.clone(), stock.clone()),
            returns: ReturnProcessor::new(db.clone(), stock.clone()),
            expenses: ExpenseLedger::new(db.clone()),
            reports: ProfitLossAggregator::new(db.clone()),
            stock,
            db,
        }
    }

    /// Opens (and migrates) the configured database.
    pub async fn open(config: &LedgerConfig) -> LedgerResult<Self> {
        let db = Database::new(config.db_config()).await?;
        info!(
            path = %config.database_path.display(),
            lock_timeout_ms = config.lock_timeout_ms,
            "Ledger opened"
        );
        Ok(Ledger::new(db, config.lock_timeout()))
    }

    /// A private in-memory ledger.
    pub async fn in_memory() -> LedgerResult<Self> {
        Ledger::open(&LedgerConfig::in_memory()).await
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn stock(&self) -> &StockLedger {
        &self.stock
    }

    pub fn purchases(&self) -> &PurchaseReceiver {
        &self.purchases
    }

    pub fn sales(&self) -> &SalesProcessor {
        &self.sales
    }

    pub fn returns(&self) -> &ReturnProcessor {
        &self.returns
    }

    pub fn expenses(&self) -> &ExpenseLedger {
        &self.expenses
    }

    pub fn reports(&self) -> &ProfitLossAggregator {
        &self.reports
    }

    /// The underlying database, for diagnostics.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================
