//! Domain model for daily observation records.
//!
//! # Responsibility
//! - Define record identity, envelopes and typed form payloads.
//! - Keep validation rules next to the data they guard.
//!
//! # Invariants
//! - One `RecordKey` identifies at most one authoritative daily record.
//! - Payload validation is pure and never touches storage.

pub mod payload;
pub mod record;
pub mod subject;
