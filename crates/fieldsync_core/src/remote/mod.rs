//! Remote record store capability.
//!
//! # Responsibility
//! - Define the storage-agnostic `read`/`write`/`subscribe` contract.
//! - Bound every remote call with a timeout.
//!
//! # Invariants
//! - `write` is all-or-nothing at the path level.
//! - Consistency is read-your-writes per path, never transactional across paths.
//! - A timed-out call is reported as `RemoteError::Timeout` and treated like
//!   any other transient network failure by callers.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

mod memory;

pub use memory::InMemoryRecordRepository;

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Callback invoked with the current value at a subscribed path.
pub type RemoteCallback = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Transient or permanent remote store failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("remote store unreachable")]
    Unreachable,
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("remote store rejected request: {0}")]
    Rejected(String),
    #[error("remote value could not be encoded/decoded: {0}")]
    Serialization(String),
}

impl RemoteError {
    /// Network-class failures leave queued work in place for a later retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable | Self::Timeout(_))
    }
}

/// Handle returned by `subscribe`; dropping it unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stops callback delivery.
    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Shared remote store addressed by `<formType>/<date>/<subjectId>` paths.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn read(&self, path: &str) -> RemoteResult<Option<Value>>;
    async fn write(&self, path: &str, value: Value) -> RemoteResult<()>;
    /// Delivers the current value immediately, then every later change.
    fn subscribe(&self, path: &str, callback: RemoteCallback) -> RemoteResult<Subscription>;
}

/// Runs one remote call under `limit`, mapping elapsed time to `Timeout`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = RemoteResult<T>>,
) -> RemoteResult<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::{with_timeout, RemoteError};
    use std::time::Duration;

    #[test]
    fn only_network_failures_are_transient() {
        assert!(RemoteError::Unreachable.is_transient());
        assert!(RemoteError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!RemoteError::Rejected("permission denied".to_string()).is_transient());
        assert!(!RemoteError::Serialization("bad json".to_string()).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_transient() {
        let limit = Duration::from_millis(100);
        let result = with_timeout(limit, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(RemoteError::Timeout(limit)));
        assert!(result.unwrap_err().is_transient());
    }
}
