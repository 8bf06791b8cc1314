//! Duplicate billing detection for timesheet entries.
//!
//! Entries are grouped by employee, date and normalized description, each
//! group is scored for how likely it is an accidental double entry, and a
//! reviewer resolves the findings by keeping one entry or dismissing them.
//! The library never touches the entry store itself; it hands back
//! [`ResolutionOutcome`]s for the caller to apply.

pub mod config;
pub mod core;
pub mod logging;
pub mod services;

pub use crate::core::DetectionError;
pub use crate::core::duplicate::{
    CONFIDENCE_THRESHOLD, DuplicateDetector, DuplicateFinding, ScanReport, ScanSummary,
};
pub use crate::core::entry::{EntryFilter, RawTimeEntry, TimeEntry};
pub use crate::core::fingerprint::GroupKey;
pub use crate::core::resolution::{Decision, FindingState, ResolutionManager, ResolutionOutcome};
