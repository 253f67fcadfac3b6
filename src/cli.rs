//! Command-line interface definitions for Episode Tracker.
//!
//! Every option can also come from the YAML settings file passed with
//! `--config`; flags given on the command line win over the file.

use crate::fetchers::{ScanPolicy, SourceKind};
use chrono::NaiveDate;
use clap::Parser;

/// Command-line arguments for the Episode Tracker application.
///
/// # Examples
///
/// ```sh
/// # Podcast feeds into a local CSV file, using the stored watermark
/// episode_tracker --source-kind feed -s podcast_sources.csv -o output.csv
///
/// # YouTube channels into a spreadsheet, then sort it
/// episode_tracker --sheet-config sheet.txt --credentials service_account.json --sort
///
/// # Explicit date range, prompted interactively
/// episode_tracker --sheet-config sheet.txt --interactive
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long, env = "EPISODE_TRACKER_CONFIG")]
    pub config: Option<String>,

    /// Source list file (`name,url` lines after a header row)
    #[arg(short, long)]
    pub sources: Option<String>,

    /// Shape of the sources in the list
    #[arg(short = 'k', long, value_enum)]
    pub source_kind: Option<SourceKind>,

    /// File holding the date of the last successful run
    #[arg(long)]
    pub state_file: Option<String>,

    /// CSV output path (selects the CSV sink)
    #[arg(short, long, conflicts_with = "sheet_config")]
    pub output: Option<String>,

    /// Append to the CSV file instead of overwriting it, skipping rows already present
    #[arg(long)]
    pub append: bool,

    /// Destination file with `label:value` lines (selects the spreadsheet sink)
    #[arg(long)]
    pub sheet_config: Option<String>,

    /// Service-account credential JSON for the spreadsheet sink
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub credentials: Option<String>,

    /// First publish date to collect (YYYY-MM-DD); overrides the stored watermark
    #[arg(long, value_parser = parse_date)]
    pub since: Option<NaiveDate>,

    /// Last publish date to collect (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub until: Option<NaiveDate>,

    /// Prompt for the date range and offer to sort the destination afterwards
    #[arg(short, long)]
    pub interactive: bool,

    /// Sort the spreadsheet destination after writing
    #[arg(long)]
    pub sort: bool,

    /// How to scan each source's listing
    #[arg(long, value_enum)]
    pub scan: Option<ScanPolicy>,

    /// Fail instead of defaulting to today when the state file is corrupt
    #[arg(long)]
    pub strict_state: bool,
}

/// Parse a `YYYY-MM-DD` command-line date.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got {s:?}: {e}"))
}
