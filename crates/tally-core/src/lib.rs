//! # tally-core: Pure Domain Logic for the Tally Ledger
//!
//! Everything that can be decided without touching storage lives here:
//! the shape of products, batches, sales and returns, integer money, the
//! first-expire-first-out consumption plan, the return release plan and
//! the profit/loss arithmetic.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Architecture                               │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Admin console / HTTP API (external)                │   │
//! │  │    JSON bodies ──► wire DTOs ──► engine operations              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          tally-ledger (locks, processors, aggregator)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌────────────┐  ┌──────────┐  │   │
//! │  │   │   types   │  │   money   │  │ allocation │  │  report  │  │   │
//! │  │   │  Product  │  │   Money   │  │ FEFO plan  │  │  P&L     │  │   │
//! │  │   │  Batch    │  │           │  │ release    │  │  ranges  │  │   │
//! │  │   └───────────┘  └───────────┘  └────────────┘  └──────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO LOCKS • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Product, StockBatch, Sale, Return, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Validation and ledger error taxonomy
//! - [`validation`] - Input validation rules
//! - [`allocation`] - FEFO consumption and return release planning
//! - [`report`] - Date ranges and the profit/loss report
//! - [`wire`] - Request/response shapes used by the admin console
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::money::Money;
//!
//! let price = Money::from_cents(1000);
//! let subtotal = price.multiply_quantity(15);
//! assert_eq!(subtotal.cents(), 15_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod allocation;
pub mod error;
pub mod money;
pub mod report;
pub mod types;
pub mod validation;
pub mod wire;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{LedgerError, LedgerResult, ValidationError};
pub use money::Money;
pub use report::{DateRange, ProfitLossReport, ProfitLossTotals};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity on a single sale, purchase or return line.
///
/// Guards against typos (an extra zero on a 10-unit sale) rather than any
/// physical limit.
pub const MAX_LINE_QUANTITY: i64 = 1_000_000;

/// Maximum number of lines on a single sale or purchase.
pub const MAX_LINES_PER_DOCUMENT: usize = 200;

/// Ceiling, in cents, for any single amount, line amount or document total
/// (ten trillion in major units).
///
/// Report sums over many documents stay far inside `i64` below it.
pub const MAX_AMOUNT_CENTS: i64 = 1_000_000_000_000_000;
