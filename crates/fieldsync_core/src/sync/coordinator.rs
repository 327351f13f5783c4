//! `SyncCoordinator`: drains pending entries into the remote store.

use crate::connectivity::TransitionSubscription;
use crate::context::EngineContext;
use crate::guard::RemoteSlot;
use crate::lifecycle::SubmissionState;
use crate::model::record::{RecordKey, SubjectId};
use crate::queue::{PendingQueueEntry, QueueError, QueueResult};
use crate::remote::{with_timeout, RemoteError};
use crate::sync::history::mirror_temperature;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Outcome notice for UIs still observing an earlier `Queued` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    Synced {
        key: RecordKey,
        submission_id: Uuid,
    },
    /// Another writer synced the slot first; the queued record was discarded.
    Superseded {
        key: RecordKey,
        submission_id: Uuid,
    },
    /// The attempt failed; the entry stays queued.
    Deferred {
        key: RecordKey,
        submission_id: Uuid,
        retry_count: u32,
        reason: String,
    },
}

/// Per-flush summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub synced: Vec<RecordKey>,
    pub superseded: Vec<RecordKey>,
    /// Attempted and failed; still queued.
    pub deferred: Vec<RecordKey>,
    /// Not attempted because an earlier entry of the same subject failed.
    pub held_back: Vec<RecordKey>,
    /// Connectivity dropped (or was down) before every entry was attempted.
    pub interrupted: bool,
}

impl FlushReport {
    pub fn is_noop(&self) -> bool {
        self.synced.is_empty()
            && self.superseded.is_empty()
            && self.deferred.is_empty()
            && self.held_back.is_empty()
    }
}

enum EntryOutcome {
    Synced,
    Superseded,
    /// The remote side failed; the entry stays queued.
    Deferred(RemoteError),
    /// The local queue could not be read for this entry.
    LocalFailure(QueueError),
    Vanished,
}

pub struct SyncCoordinator {
    ctx: Arc<EngineContext>,
    notices: broadcast::Sender<SyncNotice>,
    flush_gate: Mutex<()>,
}

impl SyncCoordinator {
    pub fn new(ctx: Arc<EngineContext>, notice_capacity: usize) -> Self {
        let (notices, _) = broadcast::channel(notice_capacity.max(1));
        Self {
            ctx,
            notices,
            flush_gate: Mutex::new(()),
        }
    }

    /// Receives `SyncNotice`s emitted by every later flush.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    /// Drains the queue once.
    ///
    /// Safe to call repeatedly and concurrently with submissions: every entry
    /// is re-validated against the remote store before it is written.
    ///
    /// # Errors
    /// - Returns an error only when the queue itself cannot be read.
    pub async fn flush(&self) -> QueueResult<FlushReport> {
        let _gate = self.flush_gate.lock().await;
        let started_at = Instant::now();
        let entries = self.ctx.queue.peek_all().await?;
        let mut report = FlushReport::default();

        if entries.is_empty() {
            debug!("event=flush module=sync status=skip reason=empty_queue");
            return Ok(report);
        }

        info!(
            "event=flush module=sync status=start entries={}",
            entries.len()
        );
        let mut held_subjects: HashSet<SubjectId> = HashSet::new();

        for entry in entries {
            let key = entry.key();
            if !self.ctx.monitor.is_online() {
                report.interrupted = true;
                info!(
                    "event=flush module=sync status=interrupted reason=offline next_key={}",
                    key
                );
                break;
            }
            if held_subjects.contains(&key.subject_id) {
                report.held_back.push(key);
                continue;
            }

            let _key_guard = self.ctx.key_locks.acquire(&key).await;
            match self.sync_entry(&entry).await {
                EntryOutcome::Synced => report.synced.push(key),
                EntryOutcome::Superseded => report.superseded.push(key),
                EntryOutcome::Deferred(_) | EntryOutcome::LocalFailure(_) => {
                    held_subjects.insert(key.subject_id.clone());
                    report.deferred.push(key);
                }
                EntryOutcome::Vanished => {}
            }
        }

        info!(
            "event=flush module=sync status=ok duration_ms={} synced={} superseded={} deferred={} held_back={} interrupted={}",
            started_at.elapsed().as_millis(),
            report.synced.len(),
            report.superseded.len(),
            report.deferred.len(),
            report.held_back.len(),
            report.interrupted
        );
        Ok(report)
    }

    async fn sync_entry(&self, entry: &PendingQueueEntry) -> EntryOutcome {
        let key = entry.key();
        let submission_id = entry.record.submission_id;

        // A concurrent caller may have resolved this entry while we waited.
        let outcome = match self.ctx.queue.get(&key).await {
            Ok(Some(current)) if current.record.submission_id == submission_id => {
                self.attempt(entry).await
            }
            Ok(_) => EntryOutcome::Vanished,
            Err(err) => EntryOutcome::LocalFailure(err),
        };

        match &outcome {
            EntryOutcome::Synced => {
                self.dequeue(&key).await;
                self.ctx.tracker.advance(&key, submission_id, SubmissionState::Synced);
                self.notify(SyncNotice::Synced {
                    key: key.clone(),
                    submission_id,
                });
                info!(
                    "event=flush_entry module=sync status=ok key={} outcome=synced",
                    key
                );
            }
            EntryOutcome::Superseded => {
                self.dequeue(&key).await;
                self.ctx.tracker.advance(&key, submission_id, SubmissionState::Superseded);
                self.notify(SyncNotice::Superseded {
                    key: key.clone(),
                    submission_id,
                });
                info!(
                    "event=flush_entry module=sync status=ok key={} outcome=superseded",
                    key
                );
            }
            EntryOutcome::LocalFailure(err) => {
                self.ctx.tracker.advance(&key, submission_id, SubmissionState::StillQueued);
                self.notify(SyncNotice::Deferred {
                    key: key.clone(),
                    submission_id,
                    retry_count: entry.retry_count,
                    reason: err.to_string(),
                });
                error!(
                    "event=flush_entry module=sync status=error key={} error_code=queue_read_failed error={}",
                    key, err
                );
            }
            EntryOutcome::Deferred(err) => {
                let retry_count = match self.ctx.queue.record_failure(&key).await {
                    Ok(count) => count.unwrap_or(entry.retry_count),
                    Err(queue_err) => {
                        error!(
                            "event=flush_entry module=sync status=error key={} error_code=retry_persist_failed error={}",
                            key, queue_err
                        );
                        entry.retry_count
                    }
                };
                self.ctx.tracker.advance(&key, submission_id, SubmissionState::StillQueued);
                self.notify(SyncNotice::Deferred {
                    key: key.clone(),
                    submission_id,
                    retry_count,
                    reason: err.to_string(),
                });
                if err.is_transient() {
                    warn!(
                        "event=flush_entry module=sync status=deferred key={} retry_count={} error={}",
                        key, retry_count, err
                    );
                } else {
                    error!(
                        "event=flush_entry module=sync status=deferred key={} retry_count={} error_code=remote_rejected error={}",
                        key, retry_count, err
                    );
                }
            }
            EntryOutcome::Vanished => {
                debug!(
                    "event=flush_entry module=sync status=skip key={} reason=entry_resolved_elsewhere",
                    key
                );
            }
        }
        outcome
    }

    /// Re-checks the remote slot, then writes only if it is still vacant.
    async fn attempt(&self, entry: &PendingQueueEntry) -> EntryOutcome {
        match self.ctx.guard.probe_remote(&entry.key()).await {
            Ok(RemoteSlot::Occupied {
                submission_id: Some(stored),
            }) if stored == entry.record.submission_id => {
                // Our own earlier write landed but the dequeue did not.
                EntryOutcome::Synced
            }
            Ok(RemoteSlot::Occupied { .. }) => EntryOutcome::Superseded,
            Ok(RemoteSlot::Vacant) => self.write_entry(entry).await,
            Err(err) => EntryOutcome::Deferred(err),
        }
    }

    async fn write_entry(&self, entry: &PendingQueueEntry) -> EntryOutcome {
        let record = entry.record.as_synced();
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(err) => return EntryOutcome::Deferred(RemoteError::Serialization(err.to_string())),
        };
        let path = record.key().path();
        match with_timeout(self.ctx.remote_timeout, self.ctx.repo.write(&path, value)).await {
            Ok(()) => {
                if self.ctx.mirror_temperatures {
                    mirror_temperature(self.ctx.repo.as_ref(), self.ctx.remote_timeout, &record).await;
                }
                EntryOutcome::Synced
            }
            Err(err) => EntryOutcome::Deferred(err),
        }
    }

    async fn dequeue(&self, key: &RecordKey) {
        // If this fails the next flush finds our own submission remotely and
        // dequeues it then.
        if let Err(err) = self.ctx.queue.remove(key).await {
            error!(
                "event=flush_entry module=sync status=error key={} error_code=dequeue_failed error={}",
                key, err
            );
        }
    }

    fn notify(&self, notice: SyncNotice) {
        // No receivers is fine; notices are informational.
        let _ = self.notices.send(notice);
    }

    /// Flushes on every committed offline→online transition.
    pub fn spawn_on_reconnect(self: Arc<Self>) -> (JoinHandle<()>, TransitionSubscription) {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let subscription = self.ctx.monitor.subscribe(move |state| {
            if state.online {
                let _ = tx.send(());
            }
        });
        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Coalesce bursts of reconnects into one flush.
                while rx.try_recv().is_ok() {}
                if let Err(err) = self.flush().await {
                    error!(
                        "event=flush module=sync status=error trigger=reconnect error={}",
                        err
                    );
                }
            }
        });
        (handle, subscription)
    }

    /// Safety-net flush every `every` while online.
    pub fn spawn_periodic(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !self.ctx.monitor.is_online() {
                    continue;
                }
                if let Err(err) = self.flush().await {
                    error!(
                        "event=flush module=sync status=error trigger=periodic error={}",
                        err
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{EntryOutcome, SyncCoordinator, SyncNotice};
    use crate::connectivity::ConnectivityMonitor;
    use crate::context::EngineContext;
    use crate::model::payload::{FoodMonitoringObservation, FormPayload};
    use crate::model::record::{DailyRecord, FormType, RecordKey, SubjectId};
    use crate::queue::{LocalPendingQueue, QueueError};
    use crate::remote::InMemoryRecordRepository;
    use crate::storage::{KeyValueStore, MemoryKeyValueStore};
    use std::sync::Arc;
    use std::time::Duration;

    const QUEUE_KEY: &str = "pendingDailyRecords";

    #[tokio::test]
    async fn unreadable_queue_is_a_local_failure_not_a_remote_one() {
        let key = RecordKey::new(
            FormType::FoodMonitoring,
            "2024-01-01".parse().expect("date"),
            SubjectId::parse("S1").expect("subject"),
        );
        let healthy = LocalPendingQueue::new(Arc::new(MemoryKeyValueStore::new()), QUEUE_KEY);
        let entry = healthy
            .enqueue(DailyRecord::new_pending(
                key.clone(),
                FormPayload::FoodMonitoring(FoodMonitoringObservation {
                    temperature: 24.0,
                    leftover_food: None,
                    notes: None,
                }),
            ))
            .await
            .expect("enqueue");

        let store = Arc::new(MemoryKeyValueStore::new());
        store.set_item(QUEUE_KEY, "not json").await.expect("seed");
        let repo = InMemoryRecordRepository::new();
        let ctx = Arc::new(EngineContext::new(
            Arc::new(LocalPendingQueue::new(store, QUEUE_KEY)),
            Arc::new(repo.clone()),
            Arc::new(ConnectivityMonitor::new(true, Duration::from_millis(10))),
            Duration::from_secs(1),
            true,
        ));
        let coordinator = SyncCoordinator::new(ctx, 8);
        let mut notices = coordinator.subscribe_notices();

        let outcome = coordinator.sync_entry(&entry).await;
        assert!(matches!(
            outcome,
            EntryOutcome::LocalFailure(QueueError::Corrupt(_))
        ));
        match notices.recv().await.expect("notice") {
            SyncNotice::Deferred {
                key: deferred,
                retry_count,
                reason,
                ..
            } => {
                assert_eq!(deferred, key);
                assert_eq!(retry_count, 0);
                assert!(reason.contains("corrupt"), "{reason}");
            }
            other => panic!("unexpected notice: {other:?}"),
        }
        assert_eq!(repo.total_writes(), 0);
    }
}
