//! Fetching new items from sources.
//!
//! Sources come in two shapes, selected per run with [`SourceKind`]:
//!
//! | Kind | Module | Listing | Per-item metadata |
//! |------|--------|---------|-------------------|
//! | Feed | [`feed`] | RSS/Atom `item`/`entry` elements | inline in the XML |
//! | Video | [`video`] | channel enumerator (video ids) | one lookup per video |
//!
//! Both walk their listing newest-first and run every publish date through a
//! [`Scan`], which applies the [`DateWindow`] and the [`ScanPolicy`].
//! Errors are reported per source; the pipeline decides whether a failure
//! drops that source or aborts the run.

pub mod feed;
pub mod http;
pub mod video;

use crate::models::{DateWindow, Episode, Source};
use crate::normalize::NormalizeError;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub use feed::FeedFetcher;
pub use http::HttpClient;
pub use video::{VideoFetcher, YoutubeChannelLister, YoutubeVideoInfo};

/// Shape of the sources listed for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Podcast RSS (or Atom) feeds.
    Feed,
    /// YouTube channels.
    Video,
}

/// How a source's listing is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ScanPolicy {
    /// Trust newest-first ordering and stop at the first item older than the
    /// window start. Ordering violations are logged.
    #[default]
    StopAtWatermark,
    /// Examine every item and keep those inside the window.
    FilterAll,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("cannot parse {what}: {reason}")]
    Parse { what: String, reason: String },

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error("no network connectivity (probe {probe} unreachable)")]
    Offline { probe: String },
}

impl FetchError {
    pub fn parse(what: impl Into<String>, reason: impl ToString) -> Self {
        FetchError::Parse {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// `true` when the machine itself appears to be offline.
    pub fn is_offline(&self) -> bool {
        matches!(self, FetchError::Offline { .. })
    }
}

/// Collects a source's items that fall inside the window.
pub trait SourceFetcher {
    async fn fetch(
        &self,
        source: &Source,
        window: DateWindow,
        policy: ScanPolicy,
    ) -> Result<Vec<Episode>, FetchError>;
}

/// What to do with the item just examined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Keep,
    Skip,
    Stop,
}

/// Window filter for one newest-first listing.
#[derive(Debug)]
pub struct Scan<'a> {
    source: &'a str,
    window: DateWindow,
    policy: ScanPolicy,
    previous: Option<NaiveDate>,
    out_of_order: usize,
}

impl<'a> Scan<'a> {
    pub fn new(source: &'a str, window: DateWindow, policy: ScanPolicy) -> Self {
        Self {
            source,
            window,
            policy,
            previous: None,
            out_of_order: 0,
        }
    }

    /// Classify the next item by its publish date.
    pub fn step(&mut self, published: NaiveDate) -> Step {
        if let Some(previous) = self.previous {
            if published > previous {
                self.out_of_order += 1;
                warn!(
                    source = %self.source,
                    %previous,
                    %published,
                    "Listing is not newest-first; older items may be missed"
                );
            }
        }
        self.previous = Some(published);

        if self.window.is_after(published) {
            Step::Skip
        } else if self.window.is_before(published) {
            match self.policy {
                ScanPolicy::StopAtWatermark => Step::Stop,
                ScanPolicy::FilterAll => Step::Skip,
            }
        } else {
            Step::Keep
        }
    }

    /// Number of ordering violations seen so far.
    pub fn out_of_order(&self) -> usize {
        self.out_of_order
    }
}

/// The source-kind strategy chosen for a run.
#[derive(Debug)]
pub enum Fetcher {
    Feed(FeedFetcher),
    Video(VideoFetcher<YoutubeChannelLister, YoutubeVideoInfo>),
}

impl Fetcher {
    pub fn new(kind: SourceKind, http: HttpClient) -> Self {
        match kind {
            SourceKind::Feed => Fetcher::Feed(FeedFetcher::new(http)),
            SourceKind::Video => Fetcher::Video(VideoFetcher::new(
                YoutubeChannelLister::new(http.clone()),
                YoutubeVideoInfo::new(http),
            )),
        }
    }
}

impl SourceFetcher for Fetcher {
    async fn fetch(
        &self,
        source: &Source,
        window: DateWindow,
        policy: ScanPolicy,
    ) -> Result<Vec<Episode>, FetchError> {
        match self {
            Fetcher::Feed(f) => f.fetch(source, window, policy).await,
            Fetcher::Video(f) => f.fetch(source, window, policy).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_scan_stops_at_first_older_item() {
        let mut scan = Scan::new("Acme", DateWindow::since(d(2024, 1, 12)), ScanPolicy::StopAtWatermark);
        assert_eq!(scan.step(d(2024, 1, 20)), Step::Keep);
        assert_eq!(scan.step(d(2024, 1, 12)), Step::Keep);
        assert_eq!(scan.step(d(2024, 1, 10)), Step::Stop);
    }

    #[test]
    fn test_scan_filter_all_keeps_going() {
        let mut scan = Scan::new("Acme", DateWindow::since(d(2024, 1, 12)), ScanPolicy::FilterAll);
        assert_eq!(scan.step(d(2024, 1, 10)), Step::Skip);
        assert_eq!(scan.step(d(2024, 1, 15)), Step::Keep);
        assert_eq!(scan.out_of_order(), 1);
    }

    #[test]
    fn test_scan_skips_items_after_end_without_stopping() {
        let window = DateWindow::between(d(2024, 1, 1), d(2024, 1, 31));
        let mut scan = Scan::new("Acme", window, ScanPolicy::StopAtWatermark);
        assert_eq!(scan.step(d(2024, 2, 10)), Step::Skip);
        assert_eq!(scan.step(d(2024, 1, 31)), Step::Keep);
        assert_eq!(scan.step(d(2023, 12, 31)), Step::Stop);
        assert_eq!(scan.out_of_order(), 0);
    }

    #[test]
    fn test_fetch_error_offline_classification() {
        assert!(FetchError::Offline { probe: "p".into() }.is_offline());
        assert!(!FetchError::parse("feed", "bad xml").is_offline());
    }
}
