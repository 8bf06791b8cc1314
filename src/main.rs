use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use timedupe::config::Settings;
use timedupe::core::entry::parse_entry_date;
use timedupe::{Decision, EntryFilter, logging};

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "timedupe",
    version,
    about = "CLI for finding and resolving duplicate billing in timesheets"
)]
struct Cli {
    /// Resolution history file (default: <local data dir>/timedupe/history.jsonl)
    #[arg(long, global = true, value_name = "FILE", env = "TIMEDUPE_HISTORY")]
    history: Option<PathBuf>,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },

    /// Work with resolution history
    History {
        #[command(subcommand)]
        command: HistoryCmd,
    },
}

#[derive(Args, Debug)]
struct EntryArgs {
    /// JSON file holding the time entries
    #[arg(short, long, value_name = "FILE")]
    entries: PathBuf,

    /// Only look at one employee
    #[arg(long, value_name = "ID")]
    employee: Option<String>,

    /// Only look at entries on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    from: Option<NaiveDate>,

    /// Only look at entries on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    to: Option<NaiveDate>,
}

impl EntryArgs {
    fn filter(&self) -> EntryFilter {
        EntryFilter {
            employee_id: self.employee.clone(),
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Find and list duplicate groups
    Scan {
        #[command(flatten)]
        input: EntryArgs,
        /// Print the scan report as JSON
        #[arg(long)]
        json: bool,
        /// Also show findings that were dismissed before
        #[arg(long)]
        include_dismissed: bool,
        /// Show how each confidence score was reached
        #[arg(long)]
        explain: bool,
    },

    /// Walk through duplicate groups and resolve them one by one
    Review {
        #[command(flatten)]
        input: EntryArgs,
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Resolve a single duplicate group
    Resolve {
        /// JSON file holding the time entries
        #[arg(short, long, value_name = "FILE")]
        entries: PathBuf,
        /// Finding id as printed by `scan`
        #[arg(long, value_name = "ID")]
        finding: String,
        /// Keep this entry and delete the rest of the group
        #[arg(long, value_name = "ENTRY_ID", conflicts_with = "dismiss", required_unless_present = "dismiss")]
        keep: Option<String>,
        /// Mark the group as not a duplicate
        #[arg(long)]
        dismiss: bool,
        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCmd {
    /// List all recorded resolutions
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::resolve(cli.history, cli.verbose)?;
    logging::init(settings.verbosity).context("Failed to initialise logging")?;

    match cli.command {
        Commands::Duplicates { command } => match command {
            Dups::Scan {
                input,
                json,
                include_dismissed,
                explain,
            } => commands::scan(
                &settings,
                &input.entries,
                &input.filter(),
                commands::ScanOutput {
                    json,
                    include_dismissed,
                    explain,
                },
            )?,

            Dups::Review { input, dry_run } => {
                commands::review(&settings, &input.entries, &input.filter(), dry_run)?
            }

            Dups::Resolve {
                entries,
                finding,
                keep,
                dismiss: _,
                dry_run,
            } => {
                let decision = match keep {
                    Some(entry_id) => Decision::Keep { entry_id },
                    None => Decision::Dismiss,
                };
                commands::resolve(&settings, &entries, &finding, decision, dry_run)?
            }
        },

        Commands::History { command } => match command {
            HistoryCmd::List => commands::history_list(&settings)?,
        },
    }

    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_entry_date(s).map_err(|e| e.to_string())
}
