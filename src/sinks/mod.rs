//! Destinations for collected rows.
//!
//! # Submodules
//!
//! - [`csv`]: local CSV file, overwritten or appended
//! - [`sheets`]: Google Sheets worksheet, appended row by row
//!
//! Both skip rows whose `(source, title, published)` key is already present
//! at the destination (for the CSV sink, only in append mode), so re-running
//! after a crash between writing rows and saving the watermark does not
//! duplicate anything.

pub mod csv;
pub mod sheets;

use crate::config::{ConfigError, Destination, SinkSettings};
use crate::fetchers::HttpClient;
use crate::models::{OutputRow, RowKey};
use itertools::Itertools;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use self::csv::CsvSink;
pub use self::sheets::{SheetsClient, SheetsSink};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("bad credentials {}: {reason}", path.display())]
    Credentials { path: PathBuf, reason: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{context} failed with HTTP {status}: {body}")]
    Api {
        context: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("worksheet {0:?} not found")]
    WorksheetNotFound(String),

    #[error("no credentials configured for the spreadsheet sink")]
    MissingCredentials,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("output path is not usable: {0}")]
    Unwritable(String),
}

/// Counts reported by a sink after writing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub skipped: usize,
}

/// Persists rows at a destination.
pub trait RowSink {
    async fn write(&self, rows: &[OutputRow]) -> Result<WriteSummary, SinkError>;
}

/// Drop rows whose key repeats within `rows` or already exists in `existing`.
pub fn new_rows<'a>(rows: &'a [OutputRow], existing: &HashSet<RowKey>) -> Vec<&'a OutputRow> {
    rows.iter()
        .unique_by(|r| r.key())
        .filter(|r| !existing.contains(&r.key()))
        .collect()
}

/// The sink strategy chosen for a run.
#[derive(Debug)]
pub enum Sink {
    Csv(CsvSink),
    Sheets(SheetsSink<SheetsClient>),
}

impl Sink {
    /// Build and validate the configured sink before anything is fetched.
    ///
    /// For CSV this checks the output directory is writable; for sheets it
    /// authenticates, so bad credentials fail the run up front.
    #[instrument(level = "info", skip_all)]
    pub async fn from_settings(settings: &SinkSettings, http: &HttpClient) -> Result<Self, SinkError> {
        match settings {
            SinkSettings::Csv { path, mode } => {
                crate::utils::ensure_writable_parent(path)
                    .await
                    .map_err(|e| SinkError::Unwritable(e.to_string()))?;
                info!(path = %path.display(), ?mode, "Using CSV sink");
                Ok(Sink::Csv(CsvSink::new(path.clone(), *mode)))
            }
            SinkSettings::Sheets {
                destination,
                credentials,
                append_delay_ms,
            } => {
                let destination = Destination::load(destination)?;
                let credentials = credentials
                    .clone()
                    .or_else(|| destination.credentials.clone())
                    .ok_or(SinkError::MissingCredentials)?;

                let client = SheetsClient::connect(
                    http.inner().clone(),
                    &credentials,
                    destination.spreadsheet_id.clone(),
                )
                .await?;
                info!(
                    spreadsheet = %destination.spreadsheet_id,
                    worksheet = %destination.worksheet,
                    "Using spreadsheet sink"
                );
                Ok(Sink::Sheets(SheetsSink::new(
                    client,
                    destination,
                    Duration::from_millis(*append_delay_ms),
                )))
            }
        }
    }

    /// Whether [`Sink::sort`] does anything for this destination.
    pub fn supports_sort(&self) -> bool {
        matches!(self, Sink::Sheets(_))
    }

    /// Sort the destination by source, publish date and title.
    pub async fn sort(&self) -> Result<(), SinkError> {
        match self {
            Sink::Sheets(sink) => sink.sort().await,
            Sink::Csv(_) => {
                warn!("Sorting is only available for the spreadsheet sink");
                Ok(())
            }
        }
    }
}

impl RowSink for Sink {
    async fn write(&self, rows: &[OutputRow]) -> Result<WriteSummary, SinkError> {
        match self {
            Sink::Csv(sink) => sink.write(rows).await,
            Sink::Sheets(sink) => sink.write(rows).await,
        }
    }
}
