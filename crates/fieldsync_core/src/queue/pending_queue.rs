//! `LocalPendingQueue` implementation.

use crate::model::record::{DailyRecord, RecordKey, RecordOrigin};
use crate::storage::{KeyValueStore, StorageError};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

const DOCUMENT_VERSION: u32 = 1;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("a pending record is already queued for {0}")]
    AlreadyQueued(RecordKey),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("pending queue document is corrupt: {0}")]
    Corrupt(String),
}

/// One queued record plus its sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQueueEntry {
    pub record: DailyRecord,
    pub enqueued_at: DateTime<Utc>,
    /// Failed flush attempts so far.
    pub retry_count: u32,
    /// Tie-breaker for entries sharing the same `enqueued_at`.
    seq: u64,
}

impl PendingQueueEntry {
    pub fn key(&self) -> RecordKey {
        self.record.key()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueueDocument {
    version: u32,
    next_seq: u64,
    entries: Vec<PendingQueueEntry>,
}

impl QueueDocument {
    fn position(&self, key: &RecordKey) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.key() == key)
    }

    fn sort_fifo(&mut self) {
        self.entries
            .sort_by(|a, b| (a.enqueued_at, a.seq).cmp(&(b.enqueued_at, b.seq)));
    }
}

/// Process-restart-surviving queue keyed by `RecordKey`.
pub struct LocalPendingQueue {
    store: Arc<dyn KeyValueStore>,
    storage_key: String,
    cache: Mutex<Option<QueueDocument>>,
}

impl LocalPendingQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, storage_key: impl Into<String>) -> Self {
        Self {
            store,
            storage_key: storage_key.into(),
            cache: Mutex::new(None),
        }
    }

    /// Durably enqueues `record` as pending.
    ///
    /// # Errors
    /// - `AlreadyQueued` when an entry with the same key exists; the queue
    ///   is left untouched.
    /// - `Storage` when the durable write fails; nothing is queued.
    pub async fn enqueue(&self, record: DailyRecord) -> QueueResult<PendingQueueEntry> {
        let key = record.key();
        let mut cache = self.cache.lock().await;
        let mut doc = self.load(&mut cache).await?;
        if doc.position(&key).is_some() {
            info!(
                "event=queue_enqueue module=queue status=skip reason=already_queued key={}",
                key
            );
            return Err(QueueError::AlreadyQueued(key));
        }

        let entry = PendingQueueEntry {
            record: DailyRecord {
                origin: RecordOrigin::Pending,
                ..record
            },
            enqueued_at: Utc::now(),
            retry_count: 0,
            seq: doc.next_seq,
        };
        doc.next_seq += 1;
        doc.entries.push(entry.clone());
        self.persist(&mut cache, doc).await?;

        info!(
            "event=queue_enqueue module=queue status=ok key={} submission_id={}",
            key, entry.record.submission_id
        );
        Ok(entry)
    }

    /// Returns all entries ordered by `enqueued_at` (FIFO).
    pub async fn peek_all(&self) -> QueueResult<Vec<PendingQueueEntry>> {
        let mut cache = self.cache.lock().await;
        let mut doc = self.load(&mut cache).await?;
        doc.sort_fifo();
        Ok(doc.entries)
    }

    /// Returns the entry queued for `key`, if any.
    pub async fn get(&self, key: &RecordKey) -> QueueResult<Option<PendingQueueEntry>> {
        let mut cache = self.cache.lock().await;
        let doc = self.load(&mut cache).await?;
        Ok(doc.position(key).map(|idx| doc.entries[idx].clone()))
    }

    pub async fn contains(&self, key: &RecordKey) -> QueueResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn len(&self) -> QueueResult<usize> {
        let mut cache = self.cache.lock().await;
        Ok(self.load(&mut cache).await?.entries.len())
    }

    pub async fn is_empty(&self) -> QueueResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Removes the entry for `key`. Returns whether an entry was removed.
    pub async fn remove(&self, key: &RecordKey) -> QueueResult<bool> {
        let mut cache = self.cache.lock().await;
        let mut doc = self.load(&mut cache).await?;
        let Some(idx) = doc.position(key) else {
            return Ok(false);
        };
        doc.entries.remove(idx);
        self.persist(&mut cache, doc).await?;
        info!("event=queue_remove module=queue status=ok key={}", key);
        Ok(true)
    }

    /// Durably bumps `retry_count` after a failed sync attempt.
    ///
    /// Returns the new count, or `None` when the entry no longer exists.
    pub async fn record_failure(&self, key: &RecordKey) -> QueueResult<Option<u32>> {
        let mut cache = self.cache.lock().await;
        let mut doc = self.load(&mut cache).await?;
        let Some(idx) = doc.position(key) else {
            return Ok(None);
        };
        let count = doc.entries[idx].retry_count.saturating_add(1);
        doc.entries[idx].retry_count = count;
        self.persist(&mut cache, doc).await?;
        Ok(Some(count))
    }

    async fn load(&self, cache: &mut Option<QueueDocument>) -> QueueResult<QueueDocument> {
        if let Some(doc) = cache.as_ref() {
            return Ok(doc.clone());
        }

        let doc = match self.store.get_item(&self.storage_key).await? {
            None => QueueDocument {
                version: DOCUMENT_VERSION,
                ..QueueDocument::default()
            },
            Some(raw) => {
                let doc: QueueDocument = serde_json::from_str(&raw).map_err(|err| {
                    error!(
                        "event=queue_load module=queue status=error error_code=corrupt_document error={}",
                        err
                    );
                    QueueError::Corrupt(err.to_string())
                })?;
                if doc.version != DOCUMENT_VERSION {
                    warn!(
                        "event=queue_load module=queue status=error error_code=unsupported_version version={}",
                        doc.version
                    );
                    return Err(QueueError::Corrupt(format!(
                        "unsupported document version {}",
                        doc.version
                    )));
                }
                info!(
                    "event=queue_load module=queue status=ok entries={}",
                    doc.entries.len()
                );
                doc
            }
        };
        *cache = Some(doc.clone());
        Ok(doc)
    }

    async fn persist(
        &self,
        cache: &mut Option<QueueDocument>,
        doc: QueueDocument,
    ) -> QueueResult<()> {
        let raw = serde_json::to_string(&doc).map_err(|err| QueueError::Corrupt(err.to_string()))?;
        if let Err(err) = self.store.set_item(&self.storage_key, &raw).await {
            error!(
                "event=queue_persist module=queue status=error error_code=storage_write_failed error={}",
                err
            );
            return Err(err.into());
        }
        *cache = Some(doc);
        Ok(())
    }
}
