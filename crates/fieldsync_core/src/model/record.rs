//! Daily record identity and envelope.
//!
//! # Responsibility
//! - Define the `(subject, date, form type)` key that owns one daily slot.
//! - Map keys to and from remote store paths.
//! - Define the record envelope written to the remote store.
//!
//! # Invariants
//! - A `RecordKey` maps to exactly one path `<formType>/<date>/<subjectId>`.
//! - `SubjectId` never contains `/` so paths stay unambiguous.
//! - Identity fields of a synced record never change; amendments only touch
//!   `payload` and `amended_at`.

use crate::model::payload::FormPayload;
use chrono::{DateTime, Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

static SUBJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9 _.\-]{0,127}$").expect("valid subject id regex"));

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse errors for keys, dates and paths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown form type `{0}`")]
    UnknownFormType(String),
    #[error("invalid record date `{0}`; expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid subject id `{0}`")]
    InvalidSubjectId(String),
    #[error("invalid record path `{0}`; expected <formType>/<date>/<subjectId>")]
    InvalidPath(String),
}

/// Closed set of observation forms handled by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormType {
    FoodMonitoring,
    Feeding,
    EnclosureMonitoring,
}

impl FormType {
    pub const ALL: [FormType; 3] = [
        FormType::FoodMonitoring,
        FormType::Feeding,
        FormType::EnclosureMonitoring,
    ];

    /// Stable string id used as the first remote path segment.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FoodMonitoring => "food-monitoring",
            Self::Feeding => "feeding",
            Self::EnclosureMonitoring => "enclosure-monitoring",
        }
    }

    /// Human-readable title used in daily reports.
    pub fn title(self) -> &'static str {
        match self {
            Self::FoodMonitoring => "Food Monitoring",
            Self::Feeding => "Feeding",
            Self::EnclosureMonitoring => "Enclosure Monitoring",
        }
    }
}

impl Display for FormType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormType {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| ParseError::UnknownFormType(value.to_string()))
    }
}

/// Calendar-day key in device-local time. Not an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordDate(NaiveDate);

impl RecordDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Today's date on the device clock.
    pub fn today_local() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn as_naive(self) -> NaiveDate {
        self.0
    }
}

impl Display for RecordDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for RecordDate {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|_| ParseError::InvalidDate(value.to_string()))
    }
}

/// Path-safe identifier of a monitored subject.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Validates and wraps a subject id.
    ///
    /// Leading/trailing whitespace is trimmed before validation.
    pub fn parse(value: &str) -> Result<Self, ParseError> {
        let trimmed = value.trim();
        if !SUBJECT_ID_RE.is_match(trimmed) {
            return Err(ParseError::InvalidSubjectId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

/// Identity of one daily slot.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordKey {
    pub form_type: FormType,
    pub date: RecordDate,
    pub subject_id: SubjectId,
}

impl RecordKey {
    pub fn new(form_type: FormType, date: RecordDate, subject_id: SubjectId) -> Self {
        Self {
            form_type,
            date,
            subject_id,
        }
    }

    /// Remote store path of this slot.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.form_type, self.date, self.subject_id)
    }

    /// Parses a remote store path back into its key.
    pub fn from_path(path: &str) -> Result<Self, ParseError> {
        let mut parts = path.splitn(3, '/');
        let (Some(form), Some(date), Some(subject)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ParseError::InvalidPath(path.to_string()));
        };
        Ok(Self {
            form_type: form.parse()?,
            date: date.parse()?,
            subject_id: SubjectId::parse(subject)?,
        })
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path())
    }
}

/// Where a record currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Saved only in local durable storage.
    Pending,
    /// Confirmed written to the shared remote store.
    Synced,
}

/// One observation submission for one subject, date and form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRecord {
    /// Stable id of the submission that created this record.
    pub submission_id: Uuid,
    pub subject_id: SubjectId,
    pub date: RecordDate,
    pub form_type: FormType,
    pub payload: FormPayload,
    pub submitted_at: DateTime<Utc>,
    pub origin: RecordOrigin,
    /// Set when a synced record was corrected in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amended_at: Option<DateTime<Utc>>,
}

impl DailyRecord {
    /// Creates a new pending record stamped with the current instant.
    pub fn new_pending(key: RecordKey, payload: FormPayload) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            subject_id: key.subject_id,
            date: key.date,
            form_type: key.form_type,
            payload,
            submitted_at: Utc::now(),
            origin: RecordOrigin::Pending,
            amended_at: None,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.form_type, self.date, self.subject_id.clone())
    }

    /// Returns a copy marked as synced, ready for the remote write.
    pub fn as_synced(&self) -> Self {
        Self {
            origin: RecordOrigin::Synced,
            ..self.clone()
        }
    }
}
