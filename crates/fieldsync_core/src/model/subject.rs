//! Monitored subject snapshot.
//!
//! Subjects are owned by the reference-data collaborator; the engine only
//! reads them (daily reports, roster lookups).

use crate::model::record::SubjectId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AliveStatus {
    Alive,
    Deceased,
}

/// Read-only view of one monitored animal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredSubject {
    pub id: SubjectId,
    pub name: String,
    pub species: String,
    /// Animal group the subject belongs to, e.g. `BigCats`.
    pub group_section: String,
    pub alive_status: AliveStatus,
}

impl MonitoredSubject {
    pub fn is_alive(&self) -> bool {
        self.alive_status == AliveStatus::Alive
    }
}
