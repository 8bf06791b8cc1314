use chrono::NaiveDate;
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryError {
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },

    #[error("invalid date `{value}`, expected YYYY-MM-DD")]
    InvalidDate { value: String },

    #[error("invalid hours {value}, must be a positive number")]
    InvalidHours { value: f64 },

    #[error("id `{id}` is already used by an earlier record")]
    DuplicateId { id: String },
}

/// A time entry exactly as it arrives from the data source.
///
/// Every field is optional so that a single bad record can be reported
/// instead of failing the whole file. Unknown fields are kept in `extra`
/// and written back untouched by the entry store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTimeEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timesheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timesheet_status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A validated time entry: one employee, one date, a positive number of hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawTimeEntry")]
pub struct TimeEntry {
    pub id: String,
    pub timesheet_id: String,
    pub employee_id: String,
    pub date: NaiveDate,
    pub hours: f64,
    pub description: String,
    pub project_id: Option<String>,
    // Presentation only
    pub employee_name: Option<String>,
    pub project_name: Option<String>,
    pub timesheet_status: Option<String>,
}

impl TryFrom<RawTimeEntry> for TimeEntry {
    type Error = EntryError;

    fn try_from(raw: RawTimeEntry) -> Result<Self, Self::Error> {
        let id = required(raw.id, "id")?;
        let timesheet_id = required(raw.timesheet_id, "timesheetId")?;
        let employee_id = required(raw.employee_id, "employeeId")?;
        let date = parse_entry_date(&required(raw.date, "date")?)?;

        let hours = raw.hours.ok_or(EntryError::MissingField { field: "hours" })?;
        if !hours.is_finite() || hours <= 0.0 {
            return Err(EntryError::InvalidHours { value: hours });
        }

        // A blank description would group with every other blank one.
        let description = required(raw.description, "description")?;

        Ok(TimeEntry {
            id,
            timesheet_id,
            employee_id,
            date,
            hours,
            description,
            project_id: raw.project_id.filter(|p| !p.trim().is_empty()),
            employee_name: raw.employee_name,
            project_name: raw.project_name,
            timesheet_status: raw.timesheet_status,
        })
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, EntryError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EntryError::MissingField { field }),
    }
}

/// Parses a calendar date in `YYYY-MM-DD` form.
pub fn parse_entry_date(value: &str) -> Result<NaiveDate, EntryError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| EntryError::InvalidDate {
        value: value.to_string(),
    })
}

/// An input record that failed validation and was left out of a scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEntry {
    /// Position of the record in the input.
    pub index: usize,
    pub entry_id: Option<String>,
    pub error: EntryError,
}

/// Validates raw records, keeping the valid ones in input order.
///
/// Invalid records are skipped and returned alongside so the caller can
/// report them; a bad record never aborts the batch. An id belongs to the
/// first record that carries it, whether or not that record is valid, so
/// later records reusing it are rejected.
pub fn validate_entries(raw: Vec<RawTimeEntry>) -> (Vec<TimeEntry>, Vec<RejectedEntry>) {
    let mut entries = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for (index, record) in raw.into_iter().enumerate() {
        let entry_id = record.id.clone();
        let claimed = match entry_id.as_deref().filter(|id| !id.trim().is_empty()) {
            Some(id) if !seen_ids.insert(id.to_string()) => Err(EntryError::DuplicateId {
                id: id.to_string(),
            }),
            _ => Ok(record),
        };
        match claimed.and_then(TimeEntry::try_from) {
            Ok(entry) => entries.push(entry),
            Err(error) => {
                warn!(
                    "Skipping malformed time entry #{} ({}): {}",
                    index,
                    entry_id.as_deref().unwrap_or("no id"),
                    error
                );
                rejected.push(RejectedEntry {
                    index,
                    entry_id,
                    error,
                });
            }
        }
    }

    (entries, rejected)
}

/// Narrows a scan to one employee and/or an inclusive date range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryFilter {
    pub employee_id: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl EntryFilter {
    pub fn matches(&self, entry: &TimeEntry) -> bool {
        self.employee_id
            .as_deref()
            .is_none_or(|employee| employee == entry.employee_id)
            && self.from.is_none_or(|from| entry.date >= from)
            && self.to.is_none_or(|to| entry.date <= to)
    }

    pub fn is_empty(&self) -> bool {
        self.employee_id.is_none() && self.from.is_none() && self.to.is_none()
    }
}
