//! Best-effort temperature history mirror.

use crate::model::record::DailyRecord;
use crate::remote::{with_timeout, RecordRepository};
use chrono::Utc;
use log::{info, warn};
use serde_json::json;
use std::time::Duration;

pub const TEMPERATURE_HISTORY_ROOT: &str = "temperature-history";

/// Path of the temperature mirror for `record`.
pub fn temperature_history_path(record: &DailyRecord) -> String {
    format!(
        "{TEMPERATURE_HISTORY_ROOT}/{}/{}/{}",
        record.form_type, record.date, record.subject_id
    )
}

/// Writes `{temperature, recordedAt}` next to a freshly synced record.
///
/// Failures are logged and swallowed; the primary record is already durable.
pub async fn mirror_temperature(repo: &dyn RecordRepository, timeout: Duration, record: &DailyRecord) {
    let Some(temperature) = record.payload.temperature() else {
        return;
    };
    let path = temperature_history_path(record);
    let value = json!({
        "temperature": temperature,
        "recordedAt": record.submitted_at,
        "mirroredAt": Utc::now(),
    });
    match with_timeout(timeout, repo.write(&path, value)).await {
        Ok(()) => info!(
            "event=temperature_mirror module=sync status=ok key={}",
            record.key()
        ),
        Err(err) => warn!(
            "event=temperature_mirror module=sync status=error key={} error={}",
            record.key(),
            err
        ),
    }
}
