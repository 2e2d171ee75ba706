//! # Error Types
//!
//! Domain error taxonomy shared by every ledger operation.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── LedgerError      - What every engine operation returns            │
//! │  │   ├── Validation          caller's fault, never retried             │
//! │  │   ├── NotFound            unknown product / sale / batch            │
//! │  │   ├── InsufficientStock   resubmit smaller or after restock         │
//! │  │   ├── ConcurrencyConflict retry the whole operation                 │
//! │  │   └── Storage             infrastructure failure                    │
//! │  └── ValidationError  - Field-level input failures                     │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - mapped into LedgerError at the crate edge      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Ledger Error
// =============================================================================

/// Errors surfaced by ledger operations.
///
/// Every mutating operation is atomic: when one of these is returned, all
/// sub-steps already applied have been compensated.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed or out-of-range input.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced product, sale, sale item or batch does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Requested quantity exceeds what the product's batches hold.
    ///
    /// ## User Workflow
    /// ```text
    /// Sale line: product P, qty 25
    ///      │
    ///      ▼
    /// Σ quantity_remaining over P's batches = 20
    ///      │
    ///      ▼
    /// InsufficientStock { product_id: P, available: 20, requested: 25 }
    ///      │
    ///      ▼
    /// Console shows: "5 short on P"
    /// ```
    #[error("Insufficient stock for product {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Another writer got in the way; the whole operation may be retried.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The underlying store failed for a reason that is none of the above.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Units missing to satisfy the request, for `InsufficientStock`.
    pub fn shortfall(&self) -> Option<i64> {
        match self {
            LedgerError::InsufficientStock {
                available,
                requested,
                ..
            } => Some(requested - available),
            _ => None,
        }
    }

    /// Whether the caller may resubmit the identical request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict(_))
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched, except for the two ledger bounds
/// (`ExceedsReturnable`, `ExceedsIssued`) which are checked under the
/// product lock.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid date, non-finite amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., duplicate SKU, invoice number, sale line).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Return quantity is larger than what is still returnable on the line.
    #[error("cannot return {requested} units: only {returnable} remain returnable")]
    ExceedsReturnable { requested: i64, returnable: i64 },

    /// A release would push a batch above the quantity it was issued with.
    #[error("batch {batch_id} was issued {issued} units; releasing {requested} would exceed it")]
    ExceedsIssued {
        batch_id: String,
        issued: i64,
        requested: i64,
    },

    /// The entity is not in a state that allows the operation.
    #[error("{entity} {id}: {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with LedgerError.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Unit Tests
// =============================================================================
