//! Use-case services exposed to form UIs.
//!
//! # Responsibility
//! - Orchestrate guard, queue and remote calls into submission-level APIs.
//! - Keep UI layers decoupled from storage and sync details.

pub mod submission_service;

pub use submission_service::{AmendError, SubmissionError, SubmissionResult, SubmissionService};
