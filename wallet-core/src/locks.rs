//! Per-account lock registry
//!
//! Each account has an exclusive async lock; postings hold it for the
//! duration of one unit of work. Operations on different accounts never
//! contend. Acquisition is bounded: a timeout surfaces as a retryable
//! busy error instead of hanging, and the caller's idempotency key makes
//! the retry safe.
//!
//! Keys are raw UUIDs: account ids for postings, owner ids for the
//! stats-only registration path.

use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

/// Guard over one account; dropped when the unit of work completes.
pub type AccountGuard = OwnedMutexGuard<()>;

/// Registry of per-account locks
pub struct LockTable {
    // Map: account/owner id -> lock
    locks: DashMap<Uuid, Arc<Mutex<()>>>,

    /// Bound on a single acquisition
    acquire_timeout: Duration,
}

impl LockTable {
    /// Create a registry with the given acquisition bound.
    pub fn new(acquire_timeout: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            acquire_timeout,
        }
    }

    fn lock_for(&self, id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the exclusive lock for one account, bounded.
    pub async fn acquire(&self, id: Uuid) -> Result<AccountGuard> {
        let lock = self.lock_for(id);
        timeout(self.acquire_timeout, lock.lock_owned())
            .await
            .map_err(|_| Error::Busy(id.to_string()))
    }

    /// Acquire two account locks in ascending id order, so concurrent
    /// transfers over the same pair can never deadlock. The bound
    /// applies to each acquisition.
    pub async fn acquire_pair(
        &self,
        a: Uuid,
        b: Uuid,
    ) -> Result<(AccountGuard, AccountGuard)> {
        debug_assert_ne!(a, b);
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first_guard = self.acquire(first).await?;
        let second_guard = self.acquire(second).await?;
        Ok((first_guard, second_guard))
    }
}
