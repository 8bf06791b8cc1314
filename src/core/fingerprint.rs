// Fingerprint grouping of time entries.
// Two entries share a fingerprint when employee, date and normalized
// description are identical; nothing else is compared here.

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::core::entry::TimeEntry;

/// Lower-cases and trims a description for comparison.
pub fn normalize_description(description: &str) -> String {
    description.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupKey {
    pub employee_id: String,
    pub date: NaiveDate,
    /// Already normalized.
    pub description: String,
}

impl GroupKey {
    pub fn for_entry(entry: &TimeEntry) -> Self {
        Self {
            employee_id: entry.employee_id.clone(),
            date: entry.date,
            description: normalize_description(&entry.description),
        }
    }

    /// Stable identifier derived from the key alone, so an unchanged group
    /// gets the same id on every scan.
    pub fn digest(&self) -> String {
        let date = self.date.format("%Y-%m-%d").to_string();
        let mut hasher = blake3::Hasher::new();
        // Length prefixes keep ("a|b", "c") and ("a", "b|c") apart.
        for part in [self.employee_id.as_str(), date.as_str(), self.description.as_str()] {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let hex = hasher.finalize().to_hex();
        format!("dup_{}", &hex.as_str()[..16])
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / \"{}\"", self.employee_id, self.date, self.description)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateGroup {
    pub key: GroupKey,
    /// Members in input order.
    pub entries: Vec<TimeEntry>,
}

impl CandidateGroup {
    pub fn is_candidate(&self) -> bool {
        self.entries.len() >= 2
    }
}

/// Entries partitioned by fingerprint, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct FingerprintGroups {
    groups: Vec<CandidateGroup>,
    index: HashMap<GroupKey, usize>,
}

impl FingerprintGroups {
    fn insert(&mut self, entry: TimeEntry) {
        let key = GroupKey::for_entry(&entry);
        match self.index.get(&key) {
            Some(&position) => self.groups[position].entries.push(entry),
            None => {
                self.index.insert(key.clone(), self.groups.len());
                self.groups.push(CandidateGroup {
                    key,
                    entries: vec![entry],
                });
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&CandidateGroup> {
        self.index.get(key).map(|&position| &self.groups[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CandidateGroup> {
        self.groups.iter()
    }

    /// Groups with at least two members.
    pub fn candidates(&self) -> impl Iterator<Item = &CandidateGroup> {
        self.groups.iter().filter(|group| group.is_candidate())
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|group| group.entries.len()).sum()
    }

    pub fn into_groups(self) -> Vec<CandidateGroup> {
        self.groups
    }
}

/// Partitions entries by fingerprint.
///
/// Singleton groups are kept. An id that was already placed is skipped, so
/// no entry is ever counted twice.
pub fn group_entries(entries: &[TimeEntry]) -> FingerprintGroups {
    let mut groups = FingerprintGroups::default();
    let mut seen_ids = HashSet::with_capacity(entries.len());

    for entry in entries {
        if !seen_ids.insert(entry.id.as_str()) {
            warn!("Time entry {} appears more than once; using the first occurrence", entry.id);
            continue;
        }
        groups.insert(entry.clone());
    }

    debug!(
        "Grouped {} entries into {} fingerprint(s), {} with more than one entry",
        groups.entry_count(),
        groups.len(),
        groups.candidates().count()
    );
    groups
}
