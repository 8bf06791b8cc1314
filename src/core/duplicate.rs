// Duplicate billing detection
// - group entries by fingerprint (employee, date, normalized description)
// - score every group of two or more
// - report groups scoring strictly above the threshold

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::core::DetectionError;
use crate::core::entry::{EntryFilter, RawTimeEntry, RejectedEntry, TimeEntry, validate_entries};
use crate::core::fingerprint::{CandidateGroup, FingerprintGroups, GroupKey, group_entries};
use crate::services::scoring::{ScoreBreakdown, ScoringService};

/// Groups must score above this to be reported; a score of exactly 70 is not.
pub const CONFIDENCE_THRESHOLD: u8 = 70;

pub fn exceeds_threshold(score: u8) -> bool {
    score > CONFIDENCE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateFinding {
    pub id: String,
    pub group_key: GroupKey,
    pub entries: Vec<TimeEntry>,
    pub confidence_score: u8,
    pub total_hours: f64,
    pub affected_timesheet_ids: Vec<String>,
}

impl DuplicateFinding {
    fn from_group(group: CandidateGroup, confidence_score: u8) -> Self {
        let total_hours = group.entries.iter().map(|entry| entry.hours).sum();

        let affected_timesheet_ids = {
            let mut seen = HashSet::new();
            group
                .entries
                .iter()
                .filter(|entry| seen.insert(entry.timesheet_id.as_str()))
                .map(|entry| entry.timesheet_id.clone())
                .collect::<Vec<_>>()
        };

        Self {
            id: group.key.digest(),
            group_key: group.key,
            entries: group.entries,
            confidence_score,
            total_hours,
            affected_timesheet_ids,
        }
    }

    pub fn entry_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.id.as_str()).collect()
    }

    pub fn contains_entry(&self, entry_id: &str) -> bool {
        self.entries.iter().any(|entry| entry.id == entry_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub entries_scanned: usize,
    pub entries_rejected: usize,
    pub groups: usize,
    pub findings: usize,
    pub duplicate_entries: usize,
    pub duplicate_hours: f64,
    /// Findings removed from the report after the scan, e.g. dismissed ones.
    pub hidden: usize,
}

/// Result of scanning unvalidated records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub findings: Vec<DuplicateFinding>,
    pub rejected: Vec<RejectedEntry>,
    pub summary: ScanSummary,
}

impl ScanReport {
    /// Drops findings matching `hide` and brings the summary totals in line
    /// with what is left. Returns how many were dropped.
    pub fn hide_findings<F>(&mut self, mut hide: F) -> usize
    where
        F: FnMut(&DuplicateFinding) -> bool,
    {
        let before = self.findings.len();
        self.findings.retain(|finding| !hide(finding));
        let hidden = before - self.findings.len();

        self.summary.hidden += hidden;
        self.summary.findings = self.findings.len();
        self.summary.duplicate_entries = self.findings.iter().map(|f| f.entries.len()).sum();
        self.summary.duplicate_hours = self.findings.iter().map(|f| f.total_hours).sum();
        hidden
    }

    /// Rejected records as errors, in input order.
    pub fn errors(&self) -> Vec<DetectionError> {
        self.rejected.iter().cloned().map(DetectionError::from).collect()
    }
}

pub struct DuplicateDetector {
    scorer: ScoringService,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self {
            scorer: ScoringService::new(),
        }
    }

    /// Findings for `entries`, in order of each group's first entry.
    ///
    /// Pure: the same input always yields the same findings with the same ids.
    pub fn scan(&self, entries: &[TimeEntry]) -> Vec<DuplicateFinding> {
        let findings = self.findings_from_groups(group_entries(entries));
        info!(
            "Scanned {} time entries, {} duplicate finding(s)",
            entries.len(),
            findings.len()
        );
        findings
    }

    /// Validates raw records and scans the valid ones.
    ///
    /// Malformed records are skipped and listed in the report; they never
    /// abort the scan.
    pub fn scan_raw(&self, raw: Vec<RawTimeEntry>) -> ScanReport {
        self.scan_raw_filtered(raw, &EntryFilter::default())
    }

    pub fn scan_raw_filtered(&self, raw: Vec<RawTimeEntry>, filter: &EntryFilter) -> ScanReport {
        let (mut entries, rejected) = validate_entries(raw);
        if !filter.is_empty() {
            entries.retain(|entry| filter.matches(entry));
            debug!("{} entries left after filtering", entries.len());
        }

        let groups = group_entries(&entries);
        let group_count = groups.len();
        let findings = self.findings_from_groups(groups);

        let summary = ScanSummary {
            entries_scanned: entries.len(),
            entries_rejected: rejected.len(),
            groups: group_count,
            findings: findings.len(),
            duplicate_entries: findings.iter().map(|f| f.entries.len()).sum(),
            duplicate_hours: findings.iter().map(|f| f.total_hours).sum(),
            hidden: 0,
        };
        info!(
            "Scanned {} time entries ({} rejected), {} duplicate finding(s)",
            summary.entries_scanned, summary.entries_rejected, summary.findings
        );

        ScanReport {
            findings,
            rejected,
            summary,
        }
    }

    /// Signal-by-signal score of a finding's members.
    pub fn explain(&self, finding: &DuplicateFinding) -> ScoreBreakdown {
        self.scorer.breakdown(&finding.entries)
    }

    fn findings_from_groups(&self, groups: FingerprintGroups) -> Vec<DuplicateFinding> {
        groups
            .into_groups()
            .into_iter()
            .filter(CandidateGroup::is_candidate)
            .filter_map(|group| {
                let score = self.scorer.score_group(&group.entries);
                if exceeds_threshold(score) {
                    Some(DuplicateFinding::from_group(group, score))
                } else {
                    debug!("Group {} scored {}, below threshold", group.key, score);
                    None
                }
            })
            .collect()
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Highest confidence first, then most hours, then id.
pub fn sort_by_confidence(findings: &mut [DuplicateFinding]) {
    findings.sort_by(|a, b| {
        b.confidence_score
            .cmp(&a.confidence_score)
            .then_with(|| b.total_hours.partial_cmp(&a.total_hours).unwrap_or(Ordering::Equal))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_entry as entry;
    use serde_json::json;

    #[test]
    fn test_empty_input() {
        let detector = DuplicateDetector::new();
        assert!(detector.scan(&[]).is_empty());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!exceeds_threshold(70));
        assert!(exceeds_threshold(71));
        assert!(!exceeds_threshold(0));
        assert!(exceeds_threshold(100));
    }

    #[test]
    fn test_identical_pair_scores_full_confidence() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "Development work on Project Alpha", Some("P1")),
            entry("T2", "E1", "2025-08-10", 8.0, "development work on project alpha ", Some("P1")),
        ];

        let findings = DuplicateDetector::new().scan(&entries);

        assert_eq!(findings.len(), 1);
        let finding = &findings[0];
        assert_eq!(finding.confidence_score, 100);
        assert_eq!(finding.total_hours, 16.0);
        assert_eq!(finding.entry_ids(), vec!["T1", "T2"]);
        assert_eq!(finding.group_key.description, "development work on project alpha");
        assert_eq!(finding.id, finding.group_key.digest());
    }

    #[test]
    fn test_score_of_exactly_seventy_is_not_reported() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "Development work on project alpha", Some("P1")),
            entry("T2", "E1", "2025-08-10", 6.0, "Development work on project alpha", Some("P2")),
        ];

        assert!(DuplicateDetector::new().scan(&entries).is_empty());
    }

    #[test]
    fn test_lowest_reportable_score_is_reported() {
        // 30 + 40 + 10 + 0: the smallest reachable score above the threshold
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "Support", Some("P1")),
            entry("T2", "E1", "2025-08-10", 8.0, "Support", Some("P2")),
            entry("T3", "E1", "2025-08-10", 5.0, "Support", Some("P3")),
        ];

        let findings = DuplicateDetector::new().scan(&entries);

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].confidence_score, 80);
        assert_eq!(findings[0].total_hours, 21.0);
    }

    #[test]
    fn test_affected_timesheets_are_distinct() {
        let mut a = entry("T1", "E1", "2025-08-10", 8.0, "Support", None);
        let mut b = entry("T2", "E1", "2025-08-10", 8.0, "Support", None);
        let mut c = entry("T3", "E1", "2025-08-10", 8.0, "Support", None);
        a.timesheet_id = "TS2".to_string();
        b.timesheet_id = "TS1".to_string();
        c.timesheet_id = "TS2".to_string();

        let findings = DuplicateDetector::new().scan(&[a, b, c]);

        assert_eq!(findings[0].affected_timesheet_ids, vec!["TS2", "TS1"]);
    }

    #[test]
    fn test_scan_is_deterministic() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "Support", None),
            entry("T2", "E2", "2025-08-10", 4.0, "Review", None),
            entry("T3", "E1", "2025-08-10", 8.0, "support", None),
            entry("T4", "E2", "2025-08-10", 4.0, "review", None),
            entry("T5", "E3", "2025-08-11", 1.0, "Other", None),
        ];
        let detector = DuplicateDetector::new();

        let first = detector.scan(&entries);
        let second = detector.scan(&entries);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        // first-seen key order
        assert_eq!(first[0].entry_ids(), vec!["T1", "T3"]);
        assert_eq!(first[1].entry_ids(), vec!["T2", "T4"]);
    }

    #[test]
    fn test_each_entry_in_at_most_one_finding() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "A", None),
            entry("T2", "E1", "2025-08-10", 8.0, "A", None),
            entry("T3", "E1", "2025-08-10", 8.0, "B", None),
            entry("T4", "E1", "2025-08-10", 8.0, "b", None),
        ];

        let findings = DuplicateDetector::new().scan(&entries);

        let mut ids: Vec<&str> = findings.iter().flat_map(|f| f.entry_ids()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
        assert_eq!(before, 4);
    }

    #[test]
    fn test_scan_raw_skips_malformed_entries() {
        let raw: Vec<RawTimeEntry> = serde_json::from_value(json!([
            {"id": "T1", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "Support", "projectId": "P1"},
            {"id": "T2", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "projectId": "P1"},
            {"id": "T3", "timesheetId": "TS2", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "support", "projectId": "P1"},
            {"id": "T4", "timesheetId": "TS2", "date": "2025-08-10",
             "hours": 8, "description": "Support"}
        ]))
        .unwrap();

        let report = DuplicateDetector::new().scan_raw(raw);

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].entry_ids(), vec!["T1", "T3"]);
        assert_eq!(
            report.rejected.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(
            report.summary,
            ScanSummary {
                entries_scanned: 2,
                entries_rejected: 2,
                groups: 1,
                findings: 1,
                duplicate_entries: 2,
                duplicate_hours: 16.0,
                hidden: 0,
            }
        );
    }

    #[test]
    fn test_rejections_as_errors() {
        let raw: Vec<RawTimeEntry> = serde_json::from_value(json!([
            {"id": "T1", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "Support"},
            {"id": "T2", "timesheetId": "TS1", "employeeId": "E1", "date": "not a date",
             "hours": 8, "description": "Support"}
        ]))
        .unwrap();

        let report = DuplicateDetector::new().scan_raw(raw);
        let errors = report.errors();

        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            DetectionError::MalformedEntry { index: 1, entry_id: Some(id), .. } if id == "T2"
        ));
    }

    #[test]
    fn test_hide_findings_updates_summary() {
        let raw: Vec<RawTimeEntry> = serde_json::from_value(json!([
            {"id": "T1", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "Support"},
            {"id": "T2", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "Support"},
            {"id": "T3", "timesheetId": "TS1", "employeeId": "E2", "date": "2025-08-10",
             "hours": 4, "description": "Review"},
            {"id": "T4", "timesheetId": "TS1", "employeeId": "E2", "date": "2025-08-10",
             "hours": 4, "description": "Review"},
            {"id": "T5", "timesheetId": "TS1", "employeeId": "E2", "date": "2025-08-10",
             "hours": 4, "description": "Review"}
        ]))
        .unwrap();
        let mut report = DuplicateDetector::new().scan_raw(raw);
        assert_eq!(report.summary.findings, 2);

        let hidden = report.hide_findings(|f| f.group_key.employee_id == "E1");

        assert_eq!(hidden, 1);
        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.summary.findings, 1);
        assert_eq!(report.summary.duplicate_entries, 3);
        assert_eq!(report.summary.duplicate_hours, 12.0);
        assert_eq!(report.summary.hidden, 1);
        assert_eq!(report.summary.groups, 2);
    }

    #[test]
    fn test_scan_raw_filtered_by_employee() {
        let raw: Vec<RawTimeEntry> = serde_json::from_value(json!([
            {"id": "T1", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "Support"},
            {"id": "T2", "timesheetId": "TS1", "employeeId": "E1", "date": "2025-08-10",
             "hours": 8, "description": "Support"},
            {"id": "T3", "timesheetId": "TS2", "employeeId": "E2", "date": "2025-08-10",
             "hours": 8, "description": "Support"},
            {"id": "T4", "timesheetId": "TS2", "employeeId": "E2", "date": "2025-08-10",
             "hours": 8, "description": "Support"}
        ]))
        .unwrap();
        let filter = EntryFilter {
            employee_id: Some("E2".to_string()),
            ..Default::default()
        };

        let report = DuplicateDetector::new().scan_raw_filtered(raw, &filter);

        assert_eq!(report.findings.len(), 1);
        assert_eq!(report.findings[0].group_key.employee_id, "E2");
        assert_eq!(report.summary.entries_scanned, 2);
    }

    #[test]
    fn test_explain_matches_score() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "Support", Some("P1")),
            entry("T2", "E1", "2025-08-10", 6.0, "Support", Some("P1")),
        ];
        let detector = DuplicateDetector::new();
        let findings = detector.scan(&entries);

        let breakdown = detector.explain(&findings[0]);
        assert_eq!(breakdown.total(), findings[0].confidence_score);
        assert_eq!(breakdown.hours, 0);
    }

    #[test]
    fn test_sort_by_confidence() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "A", Some("P1")),
            entry("T2", "E1", "2025-08-10", 6.0, "A", Some("P1")),
            entry("T3", "E1", "2025-08-11", 8.0, "B", None),
            entry("T4", "E1", "2025-08-11", 8.0, "B", None),
        ];
        let mut findings = DuplicateDetector::new().scan(&entries);
        assert_eq!(findings[0].confidence_score, 80);

        sort_by_confidence(&mut findings);

        assert_eq!(findings[0].confidence_score, 100);
        assert_eq!(findings[1].confidence_score, 80);
    }

    #[test]
    fn test_finding_serializes_camel_case() {
        let entries = vec![
            entry("T1", "E1", "2025-08-10", 8.0, "A", None),
            entry("T2", "E1", "2025-08-10", 8.0, "A", None),
        ];
        let findings = DuplicateDetector::new().scan(&entries);

        let value = serde_json::to_value(&findings[0]).unwrap();
        assert_eq!(value["confidenceScore"], json!(100));
        assert_eq!(value["groupKey"]["date"], json!("2025-08-10"));
        assert_eq!(value["entries"][0]["employeeId"], json!("E1"));
    }
}
