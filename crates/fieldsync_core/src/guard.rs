//! Daily record eligibility guard.
//!
//! # Responsibility
//! - Decide whether a `(subject, date, form type)` slot may accept a new
//!   submission, consulting the remote store first and the local queue second.
//! - Give the sync coordinator a strict remote-only probe for re-checks.
//!
//! # Invariants
//! - Offline checks never touch the network; the remote side is reported as
//!   unknown and the caller must re-check at flush time.
//! - A remote read failure while online is advisory: the slot is treated as
//!   eligible with reason `RemoteUnknown`. Such a slot must be queued, not
//!   written, so the flush re-check settles it.

use crate::model::record::{DailyRecord, RecordKey};
use crate::queue::{LocalPendingQueue, QueueResult};
use crate::remote::{with_timeout, RecordRepository, RemoteResult};
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Why a slot is (in)eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EligibilityReason {
    /// Remote slot confirmed vacant and nothing queued locally.
    Eligible,
    /// Nothing queued locally; remote state could not be read.
    RemoteUnknown,
    /// A synced record already exists remotely.
    AlreadySynced,
    /// A pending entry already exists locally.
    AlreadyQueued,
}

impl EligibilityReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::RemoteUnknown => "remote_unknown",
            Self::AlreadySynced => "already_synced",
            Self::AlreadyQueued => "already_queued",
        }
    }
}

/// Result of `DailyRecordGuard::check_eligibility`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: EligibilityReason,
}

impl Eligibility {
    fn from_reason(reason: EligibilityReason) -> Self {
        Self {
            eligible: matches!(
                reason,
                EligibilityReason::Eligible | EligibilityReason::RemoteUnknown
            ),
            reason,
        }
    }
}

/// Remote-only view of one slot, used by flush re-checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSlot {
    Vacant,
    /// Occupied; carries the submission id stored there when decodable.
    Occupied { submission_id: Option<Uuid> },
}

pub struct DailyRecordGuard {
    repo: Arc<dyn RecordRepository>,
    queue: Arc<LocalPendingQueue>,
    remote_timeout: Duration,
}

impl DailyRecordGuard {
    pub fn new(
        repo: Arc<dyn RecordRepository>,
        queue: Arc<LocalPendingQueue>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            queue,
            remote_timeout,
        }
    }

    /// Checks whether `key` may accept a new submission.
    ///
    /// # Errors
    /// - Only local queue failures are returned; remote failures degrade to
    ///   `RemoteUnknown`.
    pub async fn check_eligibility(&self, key: &RecordKey, online: bool) -> QueueResult<Eligibility> {
        let mut remote_known = false;
        if online {
            match self.probe_remote(key).await {
                Ok(RemoteSlot::Occupied { .. }) => {
                    debug!(
                        "event=eligibility_check module=guard status=ok key={} reason=already_synced",
                        key
                    );
                    return Ok(Eligibility::from_reason(EligibilityReason::AlreadySynced));
                }
                Ok(RemoteSlot::Vacant) => remote_known = true,
                Err(err) => {
                    warn!(
                        "event=eligibility_check module=guard status=degraded key={} error={}",
                        key, err
                    );
                }
            }
        }

        if self.queue.contains(key).await? {
            debug!(
                "event=eligibility_check module=guard status=ok key={} reason=already_queued",
                key
            );
            return Ok(Eligibility::from_reason(EligibilityReason::AlreadyQueued));
        }

        let reason = if remote_known {
            EligibilityReason::Eligible
        } else {
            EligibilityReason::RemoteUnknown
        };
        debug!(
            "event=eligibility_check module=guard status=ok key={} reason={}",
            key,
            reason.as_str()
        );
        Ok(Eligibility::from_reason(reason))
    }

    /// Reads the remote slot for `key` under the remote timeout.
    pub async fn probe_remote(&self, key: &RecordKey) -> RemoteResult<RemoteSlot> {
        let value = with_timeout(self.remote_timeout, self.repo.read(&key.path())).await?;
        Ok(match value {
            None | Some(Value::Null) => RemoteSlot::Vacant,
            Some(value) => RemoteSlot::Occupied {
                submission_id: serde_json::from_value::<DailyRecord>(value)
                    .ok()
                    .map(|record| record.submission_id),
            },
        })
    }
}
