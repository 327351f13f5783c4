//! Offline-first daily record submission and sync engine.
//!
//! Field staff record one observation per subject, per day, per form type.
//! Submissions are written straight to the remote store when online and
//! queued durably when not; queued entries are re-validated and flushed on
//! reconnect so each daily slot ends up with at most one record.

pub mod config;
pub mod connectivity;
pub mod context;
pub mod db;
pub mod engine;
pub mod guard;
pub mod lifecycle;
pub mod logging;
pub mod model;
pub mod queue;
pub mod remote;
pub mod report;
pub mod service;
pub mod storage;
pub mod sync;

pub use config::{ConfigError, EngineConfig};
pub use connectivity::{ConnectivityMonitor, ConnectivityState, Debouncer};
pub use engine::{EngineError, SyncEngine, SyncEngineBuilder};
pub use guard::{DailyRecordGuard, Eligibility, EligibilityReason};
pub use lifecycle::{SubmissionState, TrackedSubmission};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::payload::{
    EnclosureObservation, FeedingObservation, FieldError, FoodMonitoringObservation, FoodPortion,
    FoodType, FormPayload, HealthChecklist, ValidationErrors,
};
pub use model::record::{DailyRecord, FormType, RecordDate, RecordKey, RecordOrigin, SubjectId};
pub use model::subject::{AliveStatus, MonitoredSubject};
pub use queue::{LocalPendingQueue, PendingQueueEntry, QueueError, QueueResult};
pub use remote::{InMemoryRecordRepository, RecordRepository, RemoteError, Subscription};
pub use report::DailyReport;
pub use service::{AmendError, SubmissionError, SubmissionResult, SubmissionService};
pub use storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StorageError};
pub use sync::{FlushReport, SyncCoordinator, SyncNotice};

/// Minimal health-check API for linkage probes.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
