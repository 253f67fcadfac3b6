//! # Episode Tracker
//!
//! Collects podcast episodes and YouTube videos published since the last
//! successful run and records them in a CSV file or a spreadsheet.
//!
//! ## Usage
//!
//! ```sh
//! episode_tracker -k feed -s podcast_sources.csv -o output.csv
//! episode_tracker --sheet-config sheet.txt --credentials key.json --sort
//! ```
//!
//! ## Architecture
//!
//! 1. **Sources**: read `name,url` pairs from the source list
//! 2. **Watermark**: load the date of the last successful run
//! 3. **Fetching**: walk each source's listing, newest first, sequentially
//! 4. **Output**: write new rows to the sink, then advance the watermark

use chrono::NaiveDate;
use clap::Parser;
use std::error::Error;
use tracing::{debug, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod fetchers;
mod models;
mod normalize;
mod pipeline;
mod prompt;
mod sinks;
mod sources;
mod state;
mod utils;

use cli::Cli;
use config::Settings;
use fetchers::{Fetcher, HttpClient};
use models::{DateWindow, RunDate};
use pipeline::{RunPlan, plan_window};
use prompt::{MenuChoice, prompt_date_range, prompt_menu};
use sinks::Sink;
use sources::load_sources;
use state::{load_watermark, resolve_watermark};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let run_date = RunDate::today();
    info!(%run_date, "episode_tracker starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let settings = Settings::resolve(&args)?;
    let sources = load_sources(&settings.sources)?;
    let window = run_window(&args, &settings, run_date).await?;

    // Sink before fetching: an unwritable destination or bad credentials
    // should fail before any network fetching.
    let http = HttpClient::new(&settings.http)?;
    let sink = Sink::from_settings(&settings.sink, &http).await?;
    info!(%window, kind = ?settings.source_kind, "Collecting items");

    let plan = RunPlan {
        window,
        policy: settings.scan,
        abort_when_offline: settings.abort_when_offline,
        state_file: settings.state_file.clone(),
        advance_watermark: window.end.is_none(),
    };
    let fetcher = Fetcher::new(settings.source_kind, http);
    let report = pipeline::run(&fetcher, &sink, &sources, &plan, run_date).await?;
    info!(
        fetched = report.collected.total(),
        written = report.written.written,
        skipped = report.written.skipped,
        failed_sources = report.collected.failed.len(),
        watermark_saved = report.watermark_saved,
        "Run finished"
    );

    if args.sort {
        sink.sort().await?;
    } else if args.interactive && sink.supports_sort() && prompt_menu()? == MenuChoice::Sort {
        sink.sort().await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

/// Decide the publish-date window for this run.
///
/// The state file is only consulted when no explicit start is given; in
/// interactive mode it just supplies the prompt's default.
async fn run_window(
    args: &Cli,
    settings: &Settings,
    run_date: RunDate,
) -> Result<DateWindow, Box<dyn Error>> {
    if args.since.is_some() && !args.interactive {
        let fallback = run_date.date();
        return Ok(plan_window(args.since, args.until, fallback)?);
    }

    let loaded = load_watermark(&settings.state_file).await;
    let strict = settings.strict_state && !args.interactive;
    let watermark: NaiveDate = resolve_watermark(loaded, run_date, strict)?;

    if args.interactive {
        return Ok(prompt_date_range(watermark)?);
    }
    Ok(plan_window(None, args.until, watermark)?)
}
