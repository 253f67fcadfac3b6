//! One run: fetch every source, write the rows, advance the watermark.
//!
//! Sources are fetched strictly one after another. A source that fails is
//! logged and dropped; the rest of the run carries on. The exception is a
//! total loss of connectivity, which aborts the run before anything is
//! written so the watermark stays where it was.
//!
//! The watermark is only saved after the sink reports success. Sinks skip
//! rows they already hold, so a crash between those two steps is repaired by
//! simply running again.

use crate::config::ConfigError;
use crate::fetchers::{FetchError, ScanPolicy, SourceFetcher};
use crate::models::{DateWindow, Episode, OutputRow, RunDate, Source};
use crate::sinks::{RowSink, SinkError, WriteSummary};
use crate::state::{StateError, save_watermark};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::pin::pin;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("aborting run while fetching {source_name}: {error}")]
    Offline {
        source_name: String,
        error: FetchError,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Everything a run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub window: DateWindow,
    pub policy: ScanPolicy,
    pub abort_when_offline: bool,
    pub state_file: PathBuf,
    /// Whether a successful run moves the watermark to the run date.
    pub advance_watermark: bool,
}

/// Per-source outcome of the fetch phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Collected {
    /// Episodes in source-list order, grouped by source.
    pub episodes: Vec<(String, Vec<Episode>)>,
    /// Names of sources whose fetch failed.
    pub failed: Vec<String>,
}

impl Collected {
    pub fn total(&self) -> usize {
        self.episodes.iter().map(|(_, e)| e.len()).sum()
    }

    pub fn rows(&self, run_date: RunDate) -> Vec<OutputRow> {
        self.episodes
            .iter()
            .flat_map(|(_, episodes)| episodes)
            .map(|e| OutputRow::from_episode(e, run_date))
            .collect()
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub collected: Collected,
    pub written: WriteSummary,
    pub watermark_saved: bool,
}

/// The window for a run from explicit dates and the stored watermark.
///
/// An explicit start wins over the watermark; an explicit end bounds
/// either and must not precede the start.
pub fn plan_window(
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    watermark: NaiveDate,
) -> Result<DateWindow, ConfigError> {
    let start = since.unwrap_or(watermark);
    match until {
        Some(end) if end < start => {
            let origin = if since.is_some() { "--since" } else { "the stored watermark" };
            Err(ConfigError::DateRange(format!(
                "--until {end} is before {origin} {start}"
            )))
        }
        Some(end) => Ok(DateWindow::between(start, end)),
        None => Ok(DateWindow::since(start)),
    }
}

/// Fetch every source in order, dropping the ones that fail.
#[instrument(level = "info", skip_all, fields(window = %window, sources = sources.len()))]
pub async fn collect<F: SourceFetcher>(
    fetcher: &F,
    sources: &[Source],
    window: DateWindow,
    policy: ScanPolicy,
    abort_when_offline: bool,
) -> Result<Collected, PipelineError> {
    let mut collected = Collected::default();
    let mut results = pin!(stream::iter(sources).then(|source| async move {
        (source, fetcher.fetch(source, window, policy).await)
    }));

    while let Some((source, result)) = results.next().await {
        match result {
            Ok(episodes) => {
                info!(source = %source.name, count = episodes.len(), "Fetched source");
                collected.episodes.push((source.name.clone(), episodes));
            }
            Err(e) if e.is_offline() && abort_when_offline => {
                error!(source = %source.name, error = %e, "Lost connectivity; aborting run");
                return Err(PipelineError::Offline {
                    source_name: source.name.clone(),
                    error: e,
                });
            }
            Err(e) => {
                error!(source = %source.name, error = %e, "Fetch failed for source {}; skipping it", source.name);
                collected.failed.push(source.name.clone());
            }
        }
    }

    Ok(collected)
}

/// Run the whole pipeline once.
#[instrument(level = "info", skip_all, fields(%run_date))]
pub async fn run<F, S>(
    fetcher: &F,
    sink: &S,
    sources: &[Source],
    plan: &RunPlan,
    run_date: RunDate,
) -> Result<RunReport, PipelineError>
where
    F: SourceFetcher,
    S: RowSink,
{
    let collected = collect(
        fetcher,
        sources,
        plan.window,
        plan.policy,
        plan.abort_when_offline,
    )
    .await?;
    info!(
        episodes = collected.total(),
        failed = collected.failed.len(),
        "Fetch phase complete"
    );

    let rows = collected.rows(run_date);
    let written = sink.write(&rows).await?;

    if plan.advance_watermark {
        save_watermark(&plan.state_file, run_date).await?;
    } else {
        warn!(window = %plan.window, "Explicit end date; leaving the watermark unchanged");
    }

    Ok(RunReport {
        collected,
        written,
        watermark_saved: plan.advance_watermark,
    })
}
