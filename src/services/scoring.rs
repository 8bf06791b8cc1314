use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::entry::TimeEntry;
use crate::core::fingerprint::normalize_description;

pub const BASE_SCORE: u8 = 30;
pub const MAX_SCORE: u8 = 100;

/// Per-signal contributions to a confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base: u8,
    pub description: u8,
    pub hours: u8,
    pub project: u8,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u8 {
        let sum = self.base as u16 + self.description as u16 + self.hours as u16 + self.project as u16;
        sum.min(MAX_SCORE as u16) as u8
    }
}

/// Scores how likely a group of same-fingerprint entries is accidental
/// double billing rather than legitimately repeated work.
pub struct ScoringService;

impl ScoringService {
    pub fn new() -> Self {
        Self
    }

    /// Confidence in `0..=100`. `entries` must hold at least two members.
    pub fn score_group(&self, entries: &[TimeEntry]) -> u8 {
        self.breakdown(entries).total()
    }

    /// Only the sets of distinct values matter, never their order.
    pub fn breakdown(&self, entries: &[TimeEntry]) -> ScoreBreakdown {
        debug_assert!(
            entries.len() >= 2,
            "confidence is only defined for groups of two or more entries"
        );

        let descriptions: HashSet<String> = entries
            .iter()
            .map(|entry| normalize_description(&entry.description))
            .collect();
        // Hours are always positive and finite, so bit equality is value equality.
        let hours: HashSet<u64> = entries.iter().map(|entry| entry.hours.to_bits()).collect();
        let projects: HashSet<Option<&str>> = entries
            .iter()
            .map(|entry| entry.project_id.as_deref())
            .collect();

        let members = entries.len();
        ScoreBreakdown {
            base: BASE_SCORE,
            description: uniformity(descriptions.len(), members, 40, 20),
            hours: uniformity(hours.len(), members, 20, 10),
            project: if projects.len() == 1 { 10 } else { 0 },
        }
    }
}

/// `full` when every member agrees. `partial` when exactly two values occur
/// in a group of three or more; in a pair, two values means no agreement.
fn uniformity(distinct: usize, members: usize, full: u8, partial: u8) -> u8 {
    match distinct {
        1 => full,
        2 if members >= 3 => partial,
        _ => 0,
    }
}

impl Default for ScoringService {
    fn default() -> Self {
        Self::new()
    }
}
