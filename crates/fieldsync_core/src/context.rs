//! Collaborators shared by the submission and sync paths.

use crate::connectivity::ConnectivityMonitor;
use crate::guard::DailyRecordGuard;
use crate::lifecycle::SubmissionTracker;
use crate::queue::LocalPendingQueue;
use crate::remote::RecordRepository;
use crate::sync::key_lock::KeyLocks;
use std::sync::Arc;
use std::time::Duration;

/// Engine-owned state accessed by reference from every component.
pub struct EngineContext {
    pub queue: Arc<LocalPendingQueue>,
    pub guard: DailyRecordGuard,
    pub repo: Arc<dyn RecordRepository>,
    pub monitor: Arc<ConnectivityMonitor>,
    pub key_locks: KeyLocks,
    pub tracker: SubmissionTracker,
    /// Bound applied to every remote read and write.
    pub remote_timeout: Duration,
    pub mirror_temperatures: bool,
}

impl EngineContext {
    pub fn new(
        queue: Arc<LocalPendingQueue>,
        repo: Arc<dyn RecordRepository>,
        monitor: Arc<ConnectivityMonitor>,
        remote_timeout: Duration,
        mirror_temperatures: bool,
    ) -> Self {
        Self {
            guard: DailyRecordGuard::new(Arc::clone(&repo), Arc::clone(&queue), remote_timeout),
            queue,
            repo,
            monitor,
            key_locks: KeyLocks::new(),
            tracker: SubmissionTracker::new(),
            remote_timeout,
            mirror_temperatures,
        }
    }
}
