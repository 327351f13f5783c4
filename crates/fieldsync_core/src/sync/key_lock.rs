//! Per-key async locks shared by submission and flush paths.
//!
//! Holding the lock for a `RecordKey` makes "check slot, then write or
//! enqueue, then dequeue" a single step with respect to other local callers.
//! Unrelated keys never contend.

use crate::model::record::RecordKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct KeyLocks {
    locks: Mutex<HashMap<RecordKey, Arc<AsyncMutex<()>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`.
    pub async fn acquire(&self, key: &RecordKey) -> KeyGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only referenced by the map are idle.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        lock.lock_owned().await
    }
}
