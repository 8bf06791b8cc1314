use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::duplicate::DuplicateFinding;
use crate::core::resolution::ResolutionOutcome;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error on history file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Kept,
    Dismissed,
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryAction::Kept => write!(f, "kept"),
            HistoryAction::Dismissed => write!(f, "dismissed"),
        }
    }
}

/// One reviewed finding, as a line of the history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub finding_id: String,
    pub action: HistoryAction,
    pub kept: Option<String>,
    pub deleted: Vec<String>,
    /// Members of the finding when it was reviewed.
    pub entry_ids: Vec<String>,
}

impl HistoryRecord {
    pub fn from_outcome(finding: &DuplicateFinding, outcome: &ResolutionOutcome) -> Self {
        let (action, kept) = match outcome {
            ResolutionOutcome::Keep { kept_entry_id, .. } => {
                (HistoryAction::Kept, Some(kept_entry_id.clone()))
            }
            ResolutionOutcome::Dismiss { .. } => (HistoryAction::Dismissed, None),
        };

        Self {
            timestamp: Utc::now().to_rfc3339(),
            finding_id: outcome.finding_id().to_string(),
            action,
            kept,
            deleted: outcome.entries_to_delete().to_vec(),
            entry_ids: finding.entry_ids().into_iter().map(str::to_string).collect(),
        }
    }
}

/// Findings a reviewer already dismissed.
///
/// A dismissal only covers the exact set of entries that was reviewed; if
/// another entry joins the group, the finding shows up again.
#[derive(Debug, Clone, Default)]
pub struct DismissedFindings {
    dismissed: HashSet<(String, Vec<String>)>,
}

impl DismissedFindings {
    fn insert(&mut self, finding_id: &str, entry_ids: &[String]) {
        let mut ids = entry_ids.to_vec();
        ids.sort_unstable();
        self.dismissed.insert((finding_id.to_string(), ids));
    }

    pub fn contains(&self, finding: &DuplicateFinding) -> bool {
        let mut ids: Vec<String> = finding.entry_ids().into_iter().map(str::to_string).collect();
        ids.sort_unstable();
        self.dismissed.contains(&(finding.id.clone(), ids))
    }

    pub fn len(&self) -> usize {
        self.dismissed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dismissed.is_empty()
    }
}

/// Append-only JSON-lines log of resolutions.
pub struct History {
    path: PathBuf,
}

impl History {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let mut out = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;
        writeln!(out, "{}", serde_json::to_string(record)?).map_err(|source| self.io_error(source))?;
        Ok(())
    }

    /// All readable records in file order. A missing file is an empty history.
    pub fn load(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };

        let mut records = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| self.io_error(source))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => warn!("Skipping malformed history line {}: {}", i + 1, err),
            }
        }
        Ok(records)
    }

    pub fn dismissed(&self) -> Result<DismissedFindings, HistoryError> {
        let mut dismissed = DismissedFindings::default();
        for record in self.load()? {
            if record.action == HistoryAction::Dismissed {
                dismissed.insert(&record.finding_id, &record.entry_ids);
            }
        }
        Ok(dismissed)
    }

    fn io_error(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::duplicate::DuplicateDetector;
    use crate::core::test_entry as entry;
    use tempfile::TempDir;

    fn finding() -> DuplicateFinding {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "Support", None),
            entry("T2", "E1", "2025-08-10", 8.0, "Support", None),
        ];
        DuplicateDetector::new().scan(&entries).remove(0)
    }

    #[test]
    fn test_append_and_load() {
        let dir = TempDir::new().unwrap();
        let history = History::new(dir.path().join("nested").join("history.jsonl"));
        let finding = finding();
        let outcome = ResolutionOutcome::Keep {
            finding_id: finding.id.clone(),
            kept_entry_id: "T1".to_string(),
            entries_to_delete: vec!["T2".to_string()],
        };

        history
            .append(&HistoryRecord::from_outcome(&finding, &outcome))
            .unwrap();
        let records = history.load().unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, HistoryAction::Kept);
        assert_eq!(records[0].kept.as_deref(), Some("T1"));
        assert_eq!(records[0].deleted, vec!["T2"]);
        assert_eq!(records[0].entry_ids, vec!["T1", "T2"]);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));

        assert!(history.load().unwrap().is_empty());
        assert!(history.dismissed().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.jsonl");
        let history = History::new(&path);
        let finding = finding();
        let outcome = ResolutionOutcome::Dismiss {
            finding_id: finding.id.clone(),
        };
        history
            .append(&HistoryRecord::from_outcome(&finding, &outcome))
            .unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "not json").unwrap();

        assert_eq!(history.load().unwrap().len(), 1);
    }

    #[test]
    fn test_dismissed_matches_same_members_only() {
        let dir = TempDir::new().unwrap();
        let history = History::new(dir.path().join("history.jsonl"));
        let finding = finding();
        history
            .append(&HistoryRecord::from_outcome(
                &finding,
                &ResolutionOutcome::Dismiss {
                    finding_id: finding.id.clone(),
                },
            ))
            .unwrap();

        let dismissed = history.dismissed().unwrap();
        assert!(dismissed.contains(&finding));

        let mut grown = finding.clone();
        grown
            .entries
            .push(entry("T3", "E1", "2025-08-10", 8.0, "Support", None));
        assert!(!dismissed.contains(&grown));
    }
}
