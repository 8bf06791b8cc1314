use anyhow::{Context, Result, anyhow};
use dialoguer::Select;
use dialoguer::theme::ColorfulTheme;
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::path::Path;
use std::time::{Duration, Instant};

use timedupe::config::Settings;
use timedupe::core::duplicate::sort_by_confidence;
use timedupe::services::history::DismissedFindings;
use timedupe::services::{EntryStore, History, HistoryRecord};
use timedupe::{
    Decision, DuplicateDetector, DuplicateFinding, EntryFilter, ResolutionManager,
    ResolutionOutcome, ScanReport,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutput {
    pub json: bool,
    pub include_dismissed: bool,
    pub explain: bool,
}

pub fn scan(settings: &Settings, path: &Path, filter: &EntryFilter, output: ScanOutput) -> Result<()> {
    if !output.json {
        println!("▶ Scanning for duplicates in: {}", path.display());
    }
    let store = load_store(path)?;
    let detector = DuplicateDetector::new();
    let mut report = benchmark("scanning entries", || {
        detector.scan_raw_filtered(store.records().to_vec(), filter)
    });

    let hidden = if output.include_dismissed {
        0
    } else {
        let dismissed = load_dismissed(settings)?;
        report.hide_findings(|finding| dismissed.contains(finding))
    };
    sort_by_confidence(&mut report.findings);

    if output.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_rejected(&report);
    if report.findings.is_empty() {
        println!("No duplicates found.");
    } else {
        println!("Found {} duplicate group(s):", report.findings.len());
        for (i, finding) in report.findings.iter().enumerate() {
            print_finding(i, finding);
            if output.explain {
                let b = detector.explain(finding);
                println!(
                    "   🧮 base {} + description {} + hours {} + project {} = {}",
                    b.base,
                    b.description,
                    b.hours,
                    b.project,
                    b.total()
                );
            }
        }
        println!(
            "\n{:.2} hour(s) billed across duplicate groups",
            report.summary.duplicate_hours
        );
    }
    if hidden > 0 {
        println!("({} previously dismissed group(s) hidden; use --include-dismissed)", hidden);
    }

    Ok(())
}

pub fn review(settings: &Settings, path: &Path, filter: &EntryFilter, dry_run: bool) -> Result<()> {
    println!("▶ Reviewing duplicates in: {}", path.display());
    let mut store = load_store(path)?;
    let history = History::new(&settings.history_path);
    let dismissed = load_dismissed(settings)?;

    let detector = DuplicateDetector::new();
    let mut report = detector.scan_raw_filtered(store.records().to_vec(), filter);
    print_rejected(&report);
    report.hide_findings(|finding| dismissed.contains(finding));
    sort_by_confidence(&mut report.findings);

    if report.findings.is_empty() {
        println!("No duplicates found.");
        return Ok(());
    }

    let mut manager = ResolutionManager::new();
    manager.load(report.findings);
    let queue: Vec<DuplicateFinding> = manager.active_findings().into_iter().cloned().collect();
    let theme = ColorfulTheme::default();
    let mut deleted = 0;

    for (i, finding) in queue.iter().enumerate() {
        print_finding(i, finding);

        let members = finding.entries.len();
        let mut items: Vec<String> = finding
            .entries
            .iter()
            .map(|e| format!("Keep {} ({:.2}h, timesheet {})", e.id, e.hours, e.timesheet_id))
            .collect();
        items.push("Not a duplicate".to_string());
        items.push("Skip for now".to_string());
        items.push("Quit review".to_string());

        let choice = Select::with_theme(&theme)
            .with_prompt("How should this group be resolved?")
            .items(&items)
            .default(0)
            .interact()
            .context("Failed to read selection")?;

        let decision = if choice < members {
            Decision::Keep {
                entry_id: finding.entries[choice].id.clone(),
            }
        } else if choice == members {
            Decision::Dismiss
        } else if choice == members + 1 {
            println!("   ⏭  Skipped");
            continue;
        } else {
            break;
        };

        let outcome = manager.resolve(finding, decision)?;
        deleted += apply_outcome(&mut store, &history, finding, &outcome, dry_run)?;
    }

    println!(
        "\n{} group(s) resolved, {} left pending",
        manager.outcomes().len(),
        manager.pending_count()
    );
    finish(&store, &history, deleted, dry_run)
}

pub fn resolve(
    settings: &Settings,
    path: &Path,
    finding_id: &str,
    decision: Decision,
    dry_run: bool,
) -> Result<()> {
    let mut store = load_store(path)?;
    let history = History::new(&settings.history_path);

    let detector = DuplicateDetector::new();
    let report = detector.scan_raw(store.records().to_vec());
    let mut manager = ResolutionManager::new();
    manager.load(report.findings);

    let finding = manager.finding(finding_id).cloned().ok_or_else(|| {
        anyhow!(
            "No duplicate group {} in {}; run `duplicates scan` to list current groups",
            finding_id,
            path.display()
        )
    })?;

    println!("✨ Group {}", finding.id);
    let outcome = manager
        .resolve(&finding, decision)
        .with_context(|| format!("Failed to resolve {}", finding_id))?;
    let deleted = apply_outcome(&mut store, &history, &finding, &outcome, dry_run)?;

    finish(&store, &history, deleted, dry_run)
}

pub fn history_list(settings: &Settings) -> Result<()> {
    let history = History::new(&settings.history_path);
    let records = history
        .load()
        .with_context(|| format!("Could not read history file {:?}", history.path()))?;

    if records.is_empty() {
        println!("No resolutions recorded in {}", history.path().display());
        return Ok(());
    }

    println!("🗂️  Resolution History:");
    for (i, rec) in records.iter().enumerate() {
        println!(
            "[{}] {}\n     group: {}\n     action: {}\n     kept: {}\n     deleted: {:?}\n",
            i,
            rec.timestamp,
            rec.finding_id,
            rec.action,
            rec.kept.as_deref().unwrap_or("-"),
            rec.deleted
        );
    }
    Ok(())
}

/// Prints the outcome and, unless dry-running, applies it to the store and
/// records it. Returns how many entries were deleted.
fn apply_outcome(
    store: &mut EntryStore,
    history: &History,
    finding: &DuplicateFinding,
    outcome: &ResolutionOutcome,
    dry_run: bool,
) -> Result<usize> {
    match outcome {
        ResolutionOutcome::Keep {
            kept_entry_id,
            entries_to_delete,
            ..
        } => {
            println!("   🏆 Keeping → {}", kept_entry_id);
            for id in entries_to_delete {
                if dry_run {
                    println!("   🗑️  [dry-run] DELETE {}", id);
                } else {
                    println!("   🗑️  Deleting {}", id);
                }
            }
        }
        ResolutionOutcome::Dismiss { .. } => println!("   ✋ Marked as not a duplicate"),
    }

    if dry_run {
        return Ok(0);
    }

    let removed = store.remove_entries(outcome.entries_to_delete());
    if removed > 0 {
        store
            .save()
            .with_context(|| format!("Failed to update entry file {:?}", store.path()))?;
    }
    history
        .append(&HistoryRecord::from_outcome(finding, outcome))
        .with_context(|| format!("Failed to write history file {:?}", history.path()))?;

    Ok(removed)
}

/// Reports what changed and re-scans the store so stale groups are not left
/// on screen.
fn finish(store: &EntryStore, history: &History, deleted: usize, dry_run: bool) -> Result<()> {
    if dry_run {
        println!("\n⚠️  Dry-run only; no entries were changed.");
        return Ok(());
    }

    println!(
        "\n✅ Deleted {} duplicate entries; recorded history in {}",
        deleted,
        history.path().display()
    );

    let dismissed = history
        .dismissed()
        .with_context(|| format!("Could not read history file {:?}", history.path()))?;
    let mut remaining = DuplicateDetector::new().scan_raw(store.records().to_vec());
    remaining.hide_findings(|finding| dismissed.contains(finding));
    println!("🔁 Re-scan: {} duplicate group(s) remain", remaining.summary.findings);
    Ok(())
}

fn load_store(path: &Path) -> Result<EntryStore> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Loading time entries…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let store = EntryStore::open(path)
        .with_context(|| format!("Failed to load time entries from {:?}", path));
    spinner.finish_and_clear();

    let store = store?;
    info!("Loaded {} time entry record(s)", store.len());
    Ok(store)
}

fn load_dismissed(settings: &Settings) -> Result<DismissedFindings> {
    History::new(&settings.history_path)
        .dismissed()
        .with_context(|| format!("Could not read history file {:?}", settings.history_path))
}

fn print_rejected(report: &ScanReport) {
    for err in report.errors() {
        eprintln!("⚠️  Skipping {}", err);
    }
}

fn print_finding(i: usize, finding: &DuplicateFinding) {
    println!(
        "\n✨ Group {}: {}  confidence {}  ({:.2}h across {} timesheet(s))",
        i + 1,
        finding.id,
        finding.confidence_score,
        finding.total_hours,
        finding.affected_timesheet_ids.len()
    );
    println!("   {}", finding.group_key);
    for entry in &finding.entries {
        println!(
            "   ▶ {}  {:.2}h  project {}  timesheet {}{}",
            entry.id,
            entry.hours,
            entry.project_id.as_deref().unwrap_or("-"),
            entry.timesheet_id,
            entry
                .employee_name
                .as_deref()
                .map(|name| format!("  ({})", name))
                .unwrap_or_default()
        );
    }
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
