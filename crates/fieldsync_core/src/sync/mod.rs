//! Queue-to-remote synchronization.
//!
//! # Responsibility
//! - Drain the pending queue into the remote store on reconnect and on a
//!   periodic safety-net timer.
//! - Re-validate every entry against the remote store before writing.
//!
//! # Invariants
//! - At most one flush runs at a time per engine.
//! - Entries are processed sequentially in FIFO order.
//! - After a failure, later entries for the same subject are held back.

mod coordinator;
pub mod history;
pub mod key_lock;

pub use coordinator::{FlushReport, SyncCoordinator, SyncNotice};
