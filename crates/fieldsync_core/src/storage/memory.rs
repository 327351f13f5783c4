//! In-memory key/value store with write fault injection.

use super::{KeyValueStore, StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Volatile store used by tests and previews.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    items: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `set_item`/`remove_item` fail until cleared.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::WriteRejected(
                "memory store configured to fail writes".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        let items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check_writable()?;
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.check_writable()?;
        let mut items = self.items.lock().map_err(|_| StorageError::Poisoned)?;
        items.remove(key);
        Ok(())
    }
}
