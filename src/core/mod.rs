pub mod duplicate;
pub mod entry;
pub mod fingerprint;
pub mod resolution;

use thiserror::Error;

use crate::core::entry::{EntryError, RejectedEntry};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error("Malformed time entry at position {index}: {source}")]
    MalformedEntry {
        index: usize,
        entry_id: Option<String>,
        source: EntryError,
    },

    #[error("Invalid resolution for finding {finding_id}: {reason}")]
    InvalidResolution { finding_id: String, reason: String },

    #[error("Finding {finding_id} is stale; scan again before resolving it")]
    StaleFinding { finding_id: String },
}

impl From<RejectedEntry> for DetectionError {
    fn from(rejected: RejectedEntry) -> Self {
        DetectionError::MalformedEntry {
            index: rejected.index,
            entry_id: rejected.entry_id,
            source: rejected.error,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_entry(
    id: &str,
    employee_id: &str,
    date: &str,
    hours: f64,
    description: &str,
    project_id: Option<&str>,
) -> entry::TimeEntry {
    entry::TimeEntry {
        id: id.to_string(),
        timesheet_id: "TS1".to_string(),
        employee_id: employee_id.to_string(),
        date: entry::parse_entry_date(date).unwrap(),
        hours,
        description: description.to_string(),
        project_id: project_id.map(str::to_string),
        employee_name: None,
        project_name: None,
        timesheet_status: None,
    }
}
