use log::info;
use serde::{Deserialize, Serialize};

use crate::core::DetectionError;
use crate::core::duplicate::DuplicateFinding;

/// A reviewer's decision on one finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Decision {
    /// Keep this entry and delete the rest of the group.
    Keep { entry_id: String },
    /// Not a duplicate; leave every entry alone.
    Dismiss,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FindingState {
    Pending,
    Resolved { kept_entry_id: String },
    Dismissed,
}

/// What the caller should do to its entry store. Nothing is deleted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Keep {
        finding_id: String,
        kept_entry_id: String,
        entries_to_delete: Vec<String>,
    },
    Dismiss {
        finding_id: String,
    },
}

impl ResolutionOutcome {
    pub fn finding_id(&self) -> &str {
        match self {
            ResolutionOutcome::Keep { finding_id, .. } => finding_id,
            ResolutionOutcome::Dismiss { finding_id } => finding_id,
        }
    }

    /// Empty for dismissals.
    pub fn entries_to_delete(&self) -> &[String] {
        match self {
            ResolutionOutcome::Keep {
                entries_to_delete, ..
            } => entries_to_delete,
            ResolutionOutcome::Dismiss { .. } => &[],
        }
    }
}

/// Identifies which scan a set of findings came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScanGeneration(u64);

impl ScanGeneration {
    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone)]
struct TrackedFinding {
    finding: DuplicateFinding,
    state: FindingState,
}

/// Review session over the findings of the latest scan.
///
/// Calls are expected one at a time from a single reviewer. Loading a new
/// scan forgets every decision made against the previous one.
#[derive(Debug, Default)]
pub struct ResolutionManager {
    generation: ScanGeneration,
    findings: Vec<TrackedFinding>,
    outcomes: Vec<ResolutionOutcome>,
}

impl ResolutionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active findings with a fresh scan, all `Pending`.
    pub fn load(&mut self, findings: Vec<DuplicateFinding>) -> ScanGeneration {
        self.generation = ScanGeneration(self.generation.0 + 1);
        self.findings = findings
            .into_iter()
            .map(|finding| TrackedFinding {
                finding,
                state: FindingState::Pending,
            })
            .collect();
        self.outcomes.clear();
        info!(
            "Loaded {} finding(s) for review (scan #{})",
            self.findings.len(),
            self.generation.0
        );
        self.generation
    }

    pub fn generation(&self) -> ScanGeneration {
        self.generation
    }

    /// Findings still awaiting a decision, in scan order.
    pub fn active_findings(&self) -> Vec<&DuplicateFinding> {
        self.findings
            .iter()
            .filter(|tracked| tracked.state == FindingState::Pending)
            .map(|tracked| &tracked.finding)
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|tracked| tracked.state == FindingState::Pending)
            .count()
    }

    pub fn finding(&self, finding_id: &str) -> Option<&DuplicateFinding> {
        self.findings
            .iter()
            .find(|tracked| tracked.finding.id == finding_id)
            .map(|tracked| &tracked.finding)
    }

    pub fn state(&self, finding_id: &str) -> Option<&FindingState> {
        self.findings
            .iter()
            .find(|tracked| tracked.finding.id == finding_id)
            .map(|tracked| &tracked.state)
    }

    /// Outcomes produced since the last `load`.
    pub fn outcomes(&self) -> &[ResolutionOutcome] {
        &self.outcomes
    }

    /// Applies `decision` to `finding`.
    ///
    /// Fails with `StaleFinding` when the finding was already decided or no
    /// longer matches the active finding with the same id, and with
    /// `InvalidResolution` when it is unknown or the kept entry is not one
    /// of its members.
    pub fn resolve(
        &mut self,
        finding: &DuplicateFinding,
        decision: Decision,
    ) -> Result<ResolutionOutcome, DetectionError> {
        let position = self.position(&finding.id)?;
        if self.findings[position].finding != *finding {
            return Err(DetectionError::StaleFinding {
                finding_id: finding.id.clone(),
            });
        }
        self.apply(position, decision)
    }

    /// Like [`resolve`](Self::resolve), addressed by id and scan generation.
    pub fn resolve_by_id(
        &mut self,
        generation: ScanGeneration,
        finding_id: &str,
        decision: Decision,
    ) -> Result<ResolutionOutcome, DetectionError> {
        if generation != self.generation {
            return Err(DetectionError::StaleFinding {
                finding_id: finding_id.to_string(),
            });
        }
        let position = self.position(finding_id)?;
        self.apply(position, decision)
    }

    fn position(&self, finding_id: &str) -> Result<usize, DetectionError> {
        self.findings
            .iter()
            .position(|tracked| tracked.finding.id == finding_id)
            .ok_or_else(|| DetectionError::InvalidResolution {
                finding_id: finding_id.to_string(),
                reason: "finding is not part of the current scan".to_string(),
            })
    }

    fn apply(
        &mut self,
        position: usize,
        decision: Decision,
    ) -> Result<ResolutionOutcome, DetectionError> {
        let tracked = &mut self.findings[position];
        if tracked.state != FindingState::Pending {
            return Err(DetectionError::StaleFinding {
                finding_id: tracked.finding.id.clone(),
            });
        }

        let outcome = match decision {
            Decision::Keep { entry_id } => {
                if !tracked.finding.contains_entry(&entry_id) {
                    return Err(DetectionError::InvalidResolution {
                        finding_id: tracked.finding.id.clone(),
                        reason: format!("entry {} is not part of this finding", entry_id),
                    });
                }
                let entries_to_delete = tracked
                    .finding
                    .entries
                    .iter()
                    .filter(|entry| entry.id != entry_id)
                    .map(|entry| entry.id.clone())
                    .collect::<Vec<_>>();
                info!(
                    "Finding {}: keeping {}, deleting {:?}",
                    tracked.finding.id, entry_id, entries_to_delete
                );
                tracked.state = FindingState::Resolved {
                    kept_entry_id: entry_id.clone(),
                };
                ResolutionOutcome::Keep {
                    finding_id: tracked.finding.id.clone(),
                    kept_entry_id: entry_id,
                    entries_to_delete,
                }
            }
            Decision::Dismiss => {
                info!("Finding {}: dismissed as not a duplicate", tracked.finding.id);
                tracked.state = FindingState::Dismissed;
                ResolutionOutcome::Dismiss {
                    finding_id: tracked.finding.id.clone(),
                }
            }
        };

        self.outcomes.push(outcome.clone());
        Ok(outcome)
    }
}
