//! Durable queue of not-yet-synced daily records.
//!
//! # Responsibility
//! - Persist pending records through the local key/value capability.
//! - Enforce one pending entry per `(subject, date, form type)` key.
//! - Hand entries to the sync coordinator in FIFO enqueue order.
//!
//! # Invariants
//! - The whole queue is one document under one storage key, so every
//!   mutation is a single atomic `set_item`.
//! - The in-memory view is replaced only after the durable write succeeds.

mod pending_queue;

pub use pending_queue::{LocalPendingQueue, PendingQueueEntry, QueueError, QueueResult};
