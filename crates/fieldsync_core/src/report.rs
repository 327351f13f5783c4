//! Plain-text daily report over synced records.
//!
//! # Responsibility
//! - Read one daily slot per subject from the remote store.
//! - Render the shareable summary field staff send at the end of a round.
//!
//! # Invariants
//! - Subjects keep the caller's order; a missing slot renders as
//!   `Not recorded`.
//! - Undecodable remote values count as missing and are logged.

use crate::model::payload::FormPayload;
use crate::model::record::{DailyRecord, FormType, RecordDate, RecordKey};
use crate::model::subject::MonitoredSubject;
use crate::remote::{with_timeout, RecordRepository, RemoteResult};
use log::{info, warn};
use serde_json::Value;
use std::fmt::Write;
use std::time::Duration;

const NOT_RECORDED: &str = "Not recorded";

/// One subject row of a daily report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub subject: MonitoredSubject,
    pub record: Option<DailyRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub form_type: FormType,
    pub date: RecordDate,
    pub entries: Vec<ReportEntry>,
}

impl DailyReport {
    /// Reads the daily slot of every subject in `subjects`.
    ///
    /// # Errors
    /// - Returns the first remote read failure; a partial report is never built.
    pub async fn collect(
        repo: &dyn RecordRepository,
        timeout: Duration,
        form_type: FormType,
        date: RecordDate,
        subjects: &[MonitoredSubject],
    ) -> RemoteResult<Self> {
        let mut entries = Vec::with_capacity(subjects.len());
        for subject in subjects {
            let key = RecordKey::new(form_type, date, subject.id.clone());
            let value = with_timeout(timeout, repo.read(&key.path())).await?;
            entries.push(ReportEntry {
                subject: subject.clone(),
                record: decode_record(&key, value),
            });
        }
        let report = Self {
            form_type,
            date,
            entries,
        };
        info!(
            "event=report_collect module=report status=ok form={} date={} subjects={} recorded={}",
            form_type,
            date,
            report.entries.len(),
            report.recorded_count()
        );
        Ok(report)
    }

    pub fn recorded_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.record.is_some())
            .count()
    }

    /// Renders the shareable text summary.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} Report", self.form_type.title());
        let _ = writeln!(out, "Date: {}", self.date);
        let _ = writeln!(
            out,
            "Recorded: {}/{}",
            self.recorded_count(),
            self.entries.len()
        );
        out.push_str("------------------\n\n");

        for entry in &self.entries {
            let _ = writeln!(out, "{} ({})", entry.subject.name, entry.subject.species);
            match &entry.record {
                Some(record) => render_payload(&mut out, &record.payload),
                None => {
                    let _ = writeln!(out, "{NOT_RECORDED}");
                }
            }
            out.push('\n');
        }
        out
    }
}

fn decode_record(key: &RecordKey, value: Option<Value>) -> Option<DailyRecord> {
    let value = value.filter(|value| !value.is_null())?;
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(
                "event=report_collect module=report status=skip key={} reason=undecodable error={}",
                key, err
            );
            None
        }
    }
}

fn render_payload(out: &mut String, payload: &FormPayload) {
    match payload {
        FormPayload::FoodMonitoring(obs) => {
            let _ = writeln!(out, "Temperature: {}°C", obs.temperature);
            let leftover = obs.leftover_food.map_or(NOT_RECORDED, |portion| portion.label());
            let _ = writeln!(out, "Leftover Food: {leftover}");
            if let Some(notes) = &obs.notes {
                let _ = writeln!(out, "Notes: {notes}");
            }
        }
        FormPayload::Feeding(obs) => {
            let _ = writeln!(out, "Feeding: {}", obs.feeding_details);
            let _ = writeln!(out, "Health: {}", obs.health_status);
        }
        FormPayload::EnclosureMonitoring(obs) => {
            let _ = writeln!(out, "Temperature: {}°C", obs.temperature);
            let _ = writeln!(out, "Humidity: {}%", obs.humidity);
            let _ = writeln!(out, "Health: {}", obs.health);
            if let Some(quantity) = obs.food_offered_quantity {
                let _ = write!(out, "Food Offered: {quantity}");
                if let Some(food_type) = obs.food_type {
                    let _ = write!(out, " {food_type:?}");
                }
                out.push('\n');
            }
            if let Some(taken) = &obs.food_taken {
                let _ = writeln!(out, "Food Taken: {taken}");
            }
            let checks = obs.checklist;
            let ticked: Vec<&str> = [
                ("regurgitating", checks.regurgitating),
                ("faeces", checks.faeces),
                ("in blue", checks.in_blue),
                ("shed", checks.shed),
                ("clean", checks.clean),
                ("urine", checks.urine),
                ("water", checks.water),
            ]
            .into_iter()
            .filter_map(|(label, set)| set.then_some(label))
            .collect();
            if !ticked.is_empty() {
                let _ = writeln!(out, "Checklist: {}", ticked.join(", "));
            }
            if let Some(observation) = &obs.observation {
                let _ = writeln!(out, "Observation: {observation}");
            }
        }
    }
}
