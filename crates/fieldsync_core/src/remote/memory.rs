//! In-process remote store used by tests, previews and the smoke CLI.
//!
//! Supports reachability toggling, artificial latency, per-path write
//! failures and per-path write counters so sync behavior can be asserted.

use super::{RecordRepository, RemoteCallback, RemoteError, RemoteResult, Subscription};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

struct RepoState {
    values: BTreeMap<String, Value>,
    reachable: bool,
    latency: Duration,
    failing_paths: HashSet<String>,
    unreadable_paths: HashSet<String>,
    write_counts: HashMap<String, usize>,
    subscribers: HashMap<String, Vec<(u64, RemoteCallback)>>,
}

struct Shared {
    state: Mutex<RepoState>,
    next_subscription: AtomicU64,
}

/// Cloneable handle; clones share the same store.
#[derive(Clone)]
pub struct InMemoryRecordRepository {
    shared: Arc<Shared>,
}

impl Default for InMemoryRecordRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(RepoState {
                    values: BTreeMap::new(),
                    reachable: true,
                    latency: Duration::ZERO,
                    failing_paths: HashSet::new(),
                    unreadable_paths: HashSet::new(),
                    write_counts: HashMap::new(),
                    subscribers: HashMap::new(),
                }),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        if let Ok(mut state) = self.lock() {
            state.reachable = reachable;
        }
    }

    /// Delay applied before every read and write.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut state) = self.lock() {
            state.latency = latency;
        }
    }

    /// Makes writes to `path` fail with `Unreachable` until cleared.
    pub fn fail_writes_to(&self, path: &str) {
        if let Ok(mut state) = self.lock() {
            state.failing_paths.insert(path.to_string());
        }
    }

    pub fn clear_write_failures(&self) {
        if let Ok(mut state) = self.lock() {
            state.failing_paths.clear();
        }
    }

    /// Makes reads of `path` time out until cleared; writes still land.
    pub fn fail_reads_from(&self, path: &str) {
        if let Ok(mut state) = self.lock() {
            state.unreadable_paths.insert(path.to_string());
        }
    }

    pub fn clear_read_failures(&self) {
        if let Ok(mut state) = self.lock() {
            state.unreadable_paths.clear();
        }
    }

    /// Stores a value as if another device had written it.
    ///
    /// Subscribers are notified; write counters are not touched.
    pub fn seed(&self, path: &str, value: Value) {
        let callbacks = match self.lock() {
            Ok(mut state) => {
                state.values.insert(path.to_string(), value.clone());
                callbacks_for(&state, path)
            }
            Err(_) => return,
        };
        notify(&callbacks, Some(&value));
    }

    /// Current value at `path`, bypassing reachability and latency.
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        self.lock().ok()?.values.get(path).cloned()
    }

    /// Number of successful `write` calls made to `path`.
    pub fn write_count(&self, path: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|state| state.write_counts.get(path).copied())
            .unwrap_or(0)
    }

    /// Number of successful `write` calls across all paths.
    pub fn total_writes(&self) -> usize {
        self.lock()
            .map(|state| state.write_counts.values().sum())
            .unwrap_or(0)
    }

    /// Stored paths in lexical order.
    pub fn paths(&self) -> Vec<String> {
        self.lock()
            .map(|state| state.values.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> RemoteResult<MutexGuard<'_, RepoState>> {
        self.shared
            .state
            .lock()
            .map_err(|_| RemoteError::Rejected("in-memory store lock poisoned".to_string()))
    }

    async fn simulate_network(&self) -> RemoteResult<()> {
        let (reachable, latency) = {
            let state = self.lock()?;
            (state.reachable, state.latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !reachable {
            return Err(RemoteError::Unreachable);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn read(&self, path: &str) -> RemoteResult<Option<Value>> {
        self.simulate_network().await?;
        let state = self.lock()?;
        if state.unreadable_paths.contains(path) {
            return Err(RemoteError::Timeout(state.latency));
        }
        Ok(state.values.get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> RemoteResult<()> {
        self.simulate_network().await?;
        let callbacks = {
            let mut state = self.lock()?;
            if !state.reachable || state.failing_paths.contains(path) {
                return Err(RemoteError::Unreachable);
            }
            state.values.insert(path.to_string(), value.clone());
            *state.write_counts.entry(path.to_string()).or_insert(0) += 1;
            callbacks_for(&state, path)
        };
        notify(&callbacks, Some(&value));
        Ok(())
    }

    fn subscribe(&self, path: &str, callback: RemoteCallback) -> RemoteResult<Subscription> {
        let id = self.shared.next_subscription.fetch_add(1, Ordering::Relaxed);
        let current = {
            let mut state = self.lock()?;
            state
                .subscribers
                .entry(path.to_string())
                .or_default()
                .push((id, Arc::clone(&callback)));
            state.values.get(path).cloned()
        };
        callback(current.as_ref());

        let shared = Arc::clone(&self.shared);
        let path = path.to_string();
        Ok(Subscription::new(move || {
            if let Ok(mut state) = shared.state.lock() {
                if let Some(list) = state.subscribers.get_mut(&path) {
                    list.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }
}

fn callbacks_for(state: &RepoState, path: &str) -> Vec<RemoteCallback> {
    state
        .subscribers
        .get(path)
        .map(|list| list.iter().map(|(_, cb)| Arc::clone(cb)).collect())
        .unwrap_or_default()
}

fn notify(callbacks: &[RemoteCallback], value: Option<&Value>) {
    for callback in callbacks {
        callback(value);
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryRecordRepository;
    use crate::remote::{RecordRepository, RemoteError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn unreachable_store_fails_reads_and_writes() {
        let repo = InMemoryRecordRepository::new();
        repo.set_reachable(false);
        assert_eq!(repo.read("a").await, Err(RemoteError::Unreachable));
        assert_eq!(
            repo.write("a", json!(1)).await,
            Err(RemoteError::Unreachable)
        );
        assert_eq!(repo.total_writes(), 0);
    }

    #[tokio::test]
    async fn unreadable_path_still_accepts_writes() {
        let repo = InMemoryRecordRepository::new();
        repo.fail_reads_from("a");
        assert!(matches!(repo.read("a").await, Err(RemoteError::Timeout(_))));
        repo.write("a", json!(1)).await.expect("write");
        assert_eq!(repo.snapshot("a"), Some(json!(1)));

        repo.clear_read_failures();
        assert_eq!(repo.read("a").await, Ok(Some(json!(1))));
    }

    #[tokio::test]
    async fn subscription_sees_current_value_and_stops_after_drop() {
        let repo = InMemoryRecordRepository::new();
        repo.seed("feeding/2024-01-01/S1", json!({ "x": 1 }));
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let sub = repo
            .subscribe(
                "feeding/2024-01-01/S1",
                Arc::new(move |value| {
                    assert!(value.is_some());
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("subscribe");
        repo.write("feeding/2024-01-01/S1", json!({ "x": 2 }))
            .await
            .expect("write");
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        drop(sub);
        repo.write("feeding/2024-01-01/S1", json!({ "x": 3 }))
            .await
            .expect("write");
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
