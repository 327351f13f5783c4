//! Submission lifecycle state machine.
//!
//! ```text
//! Validated -> {SyncedDirect | QueuedOffline | Rejected}
//! SyncedDirect -> Synced
//! {QueuedOffline | StillQueued} -> {Synced | Superseded | StillQueued}
//! ```
//!
//! Terminal states: `Synced`, `Superseded`, `Rejected`.
//!
//! Tracking starts once a form has passed validation; input that fails
//! validation is returned to the caller and never tracked.

use crate::model::record::RecordKey;
use log::warn;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionState {
    Validated,
    Rejected,
    SyncedDirect,
    QueuedOffline,
    Synced,
    Superseded,
    StillQueued,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Superseded | Self::Rejected)
    }

    pub fn can_transition_to(self, next: SubmissionState) -> bool {
        use SubmissionState::{
            QueuedOffline, Rejected, StillQueued, Superseded, Synced, SyncedDirect, Validated,
        };
        matches!(
            (self, next),
            (Validated, SyncedDirect | QueuedOffline | Rejected)
                | (SyncedDirect, Synced)
                | (QueuedOffline | StillQueued, Synced | Superseded | StillQueued)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::Rejected => "rejected",
            Self::SyncedDirect => "synced_direct",
            Self::QueuedOffline => "queued_offline",
            Self::Synced => "synced",
            Self::Superseded => "superseded",
            Self::StillQueued => "still_queued",
        }
    }
}

/// Latest tracked submission for one daily slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedSubmission {
    pub submission_id: Uuid,
    pub state: SubmissionState,
}

/// Finished submissions kept for late `submission_state` lookups.
pub const DEFAULT_FINISHED_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct TrackerState {
    entries: HashMap<RecordKey, TrackedSubmission>,
    /// Slots whose submission reached a terminal state, oldest first.
    finished: VecDeque<RecordKey>,
}

impl TrackerState {
    fn set(&mut self, key: &RecordKey, tracked: TrackedSubmission, capacity: usize) {
        self.finished.retain(|finished| finished != key);
        self.entries.insert(key.clone(), tracked);
        if !tracked.state.is_terminal() {
            return;
        }
        self.finished.push_back(key.clone());
        while self.finished.len() > capacity {
            if let Some(evicted) = self.finished.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }
}

/// Engine-owned lifecycle state of accepted submissions, keyed by slot.
///
/// In-flight submissions are always kept; at most `finished_capacity`
/// finished ones are retained, evicting the oldest first.
#[derive(Debug)]
pub struct SubmissionTracker {
    state: Mutex<TrackerState>,
    finished_capacity: usize,
}

impl Default for SubmissionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::with_finished_capacity(DEFAULT_FINISHED_CAPACITY)
    }

    pub fn with_finished_capacity(finished_capacity: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            finished_capacity,
        }
    }

    /// Starts tracking a validated submission, replacing any finished one.
    pub fn begin(&self, key: &RecordKey, submission_id: Uuid) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.set(
            key,
            TrackedSubmission {
                submission_id,
                state: SubmissionState::Validated,
            },
            self.finished_capacity,
        );
    }

    /// Moves the tracked submission to `next` if the transition is legal.
    ///
    /// A slot with no tracked submission (queued by a previous run) starts
    /// being tracked at `next` and returns `true`. Returns `false` (and logs)
    /// when another submission owns the slot or the move is illegal.
    pub fn advance(&self, key: &RecordKey, submission_id: Uuid, next: SubmissionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tracked) = state.entries.get(key) {
            if tracked.submission_id != submission_id || !tracked.state.can_transition_to(next) {
                warn!(
                    "event=submission_transition module=lifecycle status=skip key={} from={} to={}",
                    key,
                    tracked.state.as_str(),
                    next.as_str()
                );
                return false;
            }
        }
        state.set(
            key,
            TrackedSubmission {
                submission_id,
                state: next,
            },
            self.finished_capacity,
        );
        true
    }

    pub fn get(&self, key: &RecordKey) -> Option<TrackedSubmission> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(key)
            .copied()
    }

    /// Number of tracked slots, in flight and finished.
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
