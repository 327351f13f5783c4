//! Submission use-case service.
//!
//! # Responsibility
//! - Validate form input, consult the eligibility guard, then write directly
//!   or enqueue durably.
//! - Apply in-place amendments to already synced records.
//! - Expose pending status and lifecycle state to form UIs.
//!
//! # Invariants
//! - Validation and duplicate outcomes are returned synchronously as values.
//! - A failed direct write degrades to queuing; it is never surfaced as an error.
//! - Only local storage failures surface as `Err`, because the offline
//!   guarantee cannot be honored without them.
//! - Offline submissions never touch the network.
//! - A direct write happens only after the remote slot was read as vacant.

use crate::context::EngineContext;
use crate::guard::EligibilityReason;
use crate::lifecycle::{SubmissionState, TrackedSubmission};
use crate::model::payload::{FormPayload, ValidationErrors};
use crate::model::record::{DailyRecord, FormType, RecordDate, RecordKey, SubjectId};
use crate::queue::{PendingQueueEntry, QueueError, QueueResult};
use crate::remote::{with_timeout, RemoteCallback, RemoteError, RemoteResult, Subscription};
use crate::sync::history::mirror_temperature;
use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Typed outcome of `SubmissionService::submit`.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmissionResult {
    /// Written to the remote store.
    Synced(DailyRecord),
    /// Durably queued; will be attempted at the next flush.
    Queued(PendingQueueEntry),
    /// The daily slot is already taken, remotely or locally.
    DuplicateSubmission {
        key: RecordKey,
        reason: EligibilityReason,
    },
    /// Input rejected; lists every offending field.
    ValidationError(ValidationErrors),
}

/// Failures that prevent the offline guarantee from being honored.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("record could not be stored locally: {0}")]
    Storage(#[source] QueueError),
}

#[derive(Debug, Error)]
pub enum AmendError {
    #[error(transparent)]
    Validation(ValidationErrors),
    #[error("amendments require connectivity")]
    Offline,
    #[error("no synced record exists for {0}")]
    NotFound(RecordKey),
    #[error("synced record for {key} cannot be decoded: {message}")]
    Corrupt { key: RecordKey, message: String },
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Public facade called by observation forms.
pub struct SubmissionService {
    ctx: Arc<EngineContext>,
}

impl SubmissionService {
    pub fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Submits one daily observation.
    ///
    /// # Contract
    /// - Returns `ValidationError` for bad subject ids or payload fields.
    /// - Returns `DuplicateSubmission` when the slot is synced or queued.
    /// - Returns `Synced` when online, the remote slot was confirmed vacant
    ///   and the remote write succeeds.
    /// - Returns `Queued` otherwise, after a durable local enqueue.
    ///
    /// # Errors
    /// - `SubmissionError::Storage` when the record cannot be queued locally.
    pub async fn submit(
        &self,
        form_type: FormType,
        subject_id: &str,
        date: RecordDate,
        payload: FormPayload,
    ) -> Result<SubmissionResult, SubmissionError> {
        let started_at = Instant::now();
        let subject_id = match SubjectId::parse(subject_id) {
            Ok(id) => id,
            Err(err) => {
                return Ok(SubmissionResult::ValidationError(ValidationErrors::single(
                    "subjectId",
                    err.to_string(),
                )));
            }
        };
        if let Err(errors) = payload.validate(form_type) {
            info!(
                "event=submit module=service status=rejected form={} fields={}",
                form_type,
                errors.field_names().join(",")
            );
            return Ok(SubmissionResult::ValidationError(errors));
        }

        let key = RecordKey::new(form_type, date, subject_id);
        let _key_guard = self.ctx.key_locks.acquire(&key).await;
        let online = self.ctx.monitor.is_online();

        let eligibility = self
            .ctx
            .guard
            .check_eligibility(&key, online)
            .await
            .map_err(SubmissionError::Storage)?;
        if !eligibility.eligible {
            info!(
                "event=submit module=service status=duplicate key={} reason={}",
                key,
                eligibility.reason.as_str()
            );
            return Ok(SubmissionResult::DuplicateSubmission {
                key,
                reason: eligibility.reason,
            });
        }

        let record = DailyRecord::new_pending(key.clone(), payload);
        let submission_id = record.submission_id;
        self.ctx.tracker.begin(&key, submission_id);

        // An unread remote slot may already hold another device's record;
        // only the flush re-check may decide between synced and superseded.
        if online && eligibility.reason == EligibilityReason::Eligible {
            match self.write_direct(&record).await {
                Ok(synced) => {
                    self.ctx
                        .tracker
                        .advance(&key, submission_id, SubmissionState::SyncedDirect);
                    self.ctx
                        .tracker
                        .advance(&key, submission_id, SubmissionState::Synced);
                    info!(
                        "event=submit module=service status=ok key={} outcome=synced duration_ms={}",
                        key,
                        started_at.elapsed().as_millis()
                    );
                    return Ok(SubmissionResult::Synced(synced));
                }
                Err(err) => {
                    warn!(
                        "event=submit module=service status=degraded key={} fallback=queue transient={} error={}",
                        key,
                        err.is_transient(),
                        err
                    );
                }
            }
        }

        match self.ctx.queue.enqueue(record).await {
            Ok(entry) => {
                self.ctx
                    .tracker
                    .advance(&key, submission_id, SubmissionState::QueuedOffline);
                info!(
                    "event=submit module=service status=ok key={} outcome=queued online={} duration_ms={}",
                    key,
                    online,
                    started_at.elapsed().as_millis()
                );
                Ok(SubmissionResult::Queued(entry))
            }
            Err(QueueError::AlreadyQueued(key)) => Ok(SubmissionResult::DuplicateSubmission {
                key,
                reason: EligibilityReason::AlreadyQueued,
            }),
            Err(err) => {
                self.ctx
                    .tracker
                    .advance(&key, submission_id, SubmissionState::Rejected);
                error!(
                    "event=submit module=service status=error key={} error_code=enqueue_failed error={}",
                    key, err
                );
                Err(SubmissionError::Storage(err))
            }
        }
    }

    /// Submits the dynamic JSON object a form UI produces.
    pub async fn submit_json(
        &self,
        form_type: FormType,
        subject_id: &str,
        date: RecordDate,
        payload: serde_json::Value,
    ) -> Result<SubmissionResult, SubmissionError> {
        match FormPayload::from_json(form_type, payload) {
            Ok(payload) => self.submit(form_type, subject_id, date, payload).await,
            Err(errors) => Ok(SubmissionResult::ValidationError(errors)),
        }
    }

    /// Corrects an already synced record in place.
    ///
    /// Identity and `submitted_at` are preserved; `amended_at` is set.
    pub async fn amend(&self, key: &RecordKey, payload: FormPayload) -> Result<DailyRecord, AmendError> {
        payload
            .validate(key.form_type)
            .map_err(AmendError::Validation)?;
        if !self.ctx.monitor.is_online() {
            return Err(AmendError::Offline);
        }

        let _key_guard = self.ctx.key_locks.acquire(key).await;
        let path = key.path();
        let current = with_timeout(self.ctx.remote_timeout, self.ctx.repo.read(&path))
            .await?
            .ok_or_else(|| AmendError::NotFound(key.clone()))?;
        let current: DailyRecord =
            serde_json::from_value(current).map_err(|err| AmendError::Corrupt {
                key: key.clone(),
                message: err.to_string(),
            })?;

        let amended = DailyRecord {
            payload,
            amended_at: Some(Utc::now()),
            ..current
        };
        let value = serde_json::to_value(&amended)
            .map_err(|err| RemoteError::Serialization(err.to_string()))?;
        with_timeout(self.ctx.remote_timeout, self.ctx.repo.write(&path, value)).await?;
        info!("event=amend module=service status=ok key={}", key);
        Ok(amended)
    }

    /// Entries still waiting for sync, FIFO.
    pub async fn pending_entries(&self) -> QueueResult<Vec<PendingQueueEntry>> {
        self.ctx.queue.peek_all().await
    }

    pub async fn pending_count(&self) -> QueueResult<usize> {
        self.ctx.queue.len().await
    }

    pub async fn has_pending(&self) -> QueueResult<bool> {
        Ok(!self.ctx.queue.is_empty().await?)
    }

    /// Lifecycle state of the latest accepted submission for `key`.
    pub fn submission_state(&self, key: &RecordKey) -> Option<TrackedSubmission> {
        self.ctx.tracker.get(key)
    }

    /// Observes the remote daily slot for `key`.
    pub fn watch_record(&self, key: &RecordKey, callback: RemoteCallback) -> RemoteResult<Subscription> {
        self.ctx.repo.subscribe(&key.path(), callback)
    }

    async fn write_direct(&self, record: &DailyRecord) -> RemoteResult<DailyRecord> {
        let synced = record.as_synced();
        let value = serde_json::to_value(&synced)
            .map_err(|err| RemoteError::Serialization(err.to_string()))?;
        with_timeout(
            self.ctx.remote_timeout,
            self.ctx.repo.write(&synced.key().path(), value),
        )
        .await?;
        if self.ctx.mirror_temperatures {
            mirror_temperature(self.ctx.repo.as_ref(), self.ctx.remote_timeout, &synced).await;
        }
        Ok(synced)
    }
}
