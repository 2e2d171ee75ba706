//! # Per-Product Locks
//!
//! Serializes stock mutations on one product while leaving other products
//! free.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ProductLocks (cheap clone, shared by every component)                  │
//! │                                                                         │
//! │  std Mutex<HashMap>  ── held only to look up / insert an entry          │
//! │       │                                                                 │
//! │       ├── "p-1" ──► Arc<tokio Mutex<()>>  ◄── sale on p-1 (holding)     │
//! │       │                                   ◄── return on p-1 (waiting)   │
//! │       └── "p-2" ──► Arc<tokio Mutex<()>>  ◄── purchase on p-2           │
//! │                                                                         │
//! │  Waits are bounded by the lock timeout; expiry is a                     │
//! │  ConcurrencyConflict the caller may retry. Compensation alone waits     │
//! │  without a bound (acquire_unbounded).                                   │
//! │                                                                         │
//! │  Several products at once: acquire_many() sorts and dedups ids, so      │
//! │  two multi-product operations always lock in the same order.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{trace, warn};

use tally_core::{LedgerError, LedgerResult};

/// Exclusive hold on one product's stock.
pub type ProductGuard = OwnedMutexGuard<()>;

/// Registry of per-product locks.
#[derive(Debug, Clone)]
pub struct ProductLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    timeout: Duration,
}

impl ProductLocks {
    /// Creates an empty registry whose waits give up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        ProductLocks {
            inner: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        }
    }

    fn entry(&self, product_id: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(product_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Waits for exclusive access to `product_id`.
    pub async fn acquire(&self, product_id: &str) -> LedgerResult<ProductGuard> {
        let lock = self.entry(product_id);

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                trace!(product_id = %product_id, "Product lock acquired");
                Ok(guard)
            }
            Err(_) => {
                warn!(
                    product_id = %product_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Product lock wait timed out"
                );
                Err(LedgerError::ConcurrencyConflict(format!(
                    "timed out waiting for product {product_id}"
                )))
            }
        }
    }

    /// Waits for `product_id` however long it takes.
    ///
    /// Only for undoing stock that was already taken: giving up there would
    /// leave units consumed with no document behind them.
    pub async fn acquire_unbounded(&self, product_id: &str) -> ProductGuard {
        let guard = self.entry(product_id).lock_owned().await;
        trace!(product_id = %product_id, "Product lock acquired without timeout");
        guard
    }

    /// Locks every distinct product in ascending id order.
    ///
    /// On failure the locks already taken are dropped before returning.
    pub async fn acquire_many<'a>(
        &self,
        product_ids: impl IntoIterator<Item = &'a str>,
    ) -> LedgerResult<Vec<ProductGuard>> {
        let ordered: BTreeSet<&str> = product_ids.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());

        for product_id in ordered {
            guards.push(self.acquire(product_id).await?);
        }

        Ok(guards)
    }

    /// Number of products that have ever been locked.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no product has been locked yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
