//! Data models shared across the pipeline.
//!
//! - [`Source`]: a named channel or feed loaded from the source list
//! - [`Episode`]: one normalized item fetched from a source during a run
//! - [`OutputRow`]: the six-field unit persisted by every sink
//! - [`DateWindow`] / [`RunDate`]: the date bounds of a single run
//!
//! Episodes only live for the duration of one run; the sinks persist
//! [`OutputRow`]s built from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Date format used for every date written to a sink.
pub const ISO_DATE: &str = "%Y-%m-%d";

/// Placeholder flag written in the last column of every row.
pub const ROW_FLAG: &str = "0";

/// A named content source (YouTube channel or podcast feed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Display name, unique within one run.
    pub name: String,
    /// Channel or feed URL. Not validated.
    pub url: String,
}

impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// A normalized episode or video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Episode {
    /// Name of the [`Source`] the item came from.
    pub source: String,
    /// Title with any branding suffix removed.
    pub title: String,
    /// Calendar date the item was published.
    pub published: NaiveDate,
    /// Canonical `H:M:S` duration text.
    pub duration: String,
}

/// The date the current run started.
///
/// Captured once in `main` and passed down explicitly; nothing in the crate
/// reads the clock on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunDate(pub NaiveDate);

impl RunDate {
    pub fn today() -> Self {
        RunDate(chrono::Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for RunDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(ISO_DATE))
    }
}

/// Publish-date bounds for a run.
///
/// `start` is the watermark (or a user-supplied start date). When `end` is
/// set, items newer than it are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn since(start: NaiveDate) -> Self {
        Self { start, end: None }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// `true` iff `published >= start` and, when bounded, `published <= end`.
    pub fn contains(&self, published: NaiveDate) -> bool {
        published >= self.start && self.end.is_none_or(|end| published <= end)
    }

    /// Items older than the start terminate a newest-first scan.
    pub fn is_before(&self, published: NaiveDate) -> bool {
        published < self.start
    }

    /// Items newer than the end are skipped without terminating the scan.
    pub fn is_after(&self, published: NaiveDate) -> bool {
        self.end.is_some_and(|end| published > end)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}..={}", self.start.format(ISO_DATE), end.format(ISO_DATE)),
            None => write!(f, "{}..", self.start.format(ISO_DATE)),
        }
    }
}

/// One persisted row: source, title, published, run date, duration, flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub source: String,
    pub title: String,
    pub published: String,
    pub downloaded: String,
    pub duration: String,
    pub flag: String,
}

/// Identity of a row for idempotent appends: `(source, title, published)`.
pub type RowKey = (String, String, String);

impl OutputRow {
    pub fn from_episode(episode: &Episode, run_date: RunDate) -> Self {
        Self {
            source: episode.source.clone(),
            title: episode.title.clone(),
            published: episode.published.format(ISO_DATE).to_string(),
            downloaded: run_date.to_string(),
            duration: episode.duration.clone(),
            flag: ROW_FLAG.to_string(),
        }
    }

    pub fn key(&self) -> RowKey {
        (
            self.source.clone(),
            self.title.clone(),
            self.published.clone(),
        )
    }

    /// Fields in sink column order.
    pub fn to_fields(&self) -> [&str; 6] {
        [
            &self.source,
            &self.title,
            &self.published,
            &self.downloaded,
            &self.duration,
            &self.flag,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_window_lower_bound_is_inclusive() {
        let window = DateWindow::since(d(2024, 1, 12));
        assert!(window.contains(d(2024, 1, 12)));
        assert!(window.contains(d(2024, 3, 1)));
        assert!(!window.contains(d(2024, 1, 11)));
        assert!(window.is_before(d(2024, 1, 11)));
        assert!(!window.is_after(d(2099, 1, 1)));
    }

    #[test]
    fn test_window_with_end_date() {
        let window = DateWindow::between(d(2024, 1, 1), d(2024, 1, 31));
        assert!(window.contains(d(2024, 1, 31)));
        assert!(!window.contains(d(2024, 2, 1)));
        assert!(window.is_after(d(2024, 2, 1)));
        assert!(!window.is_before(d(2024, 2, 1)));
    }

    #[test]
    fn test_output_row_from_episode() {
        let episode = Episode {
            source: "Acme".to_string(),
            title: "Pilot".to_string(),
            published: d(2024, 1, 5),
            duration: "0:42:10".to_string(),
        };
        let row = OutputRow::from_episode(&episode, RunDate(d(2024, 1, 20)));

        assert_eq!(
            row.to_fields(),
            ["Acme", "Pilot", "2024-01-05", "2024-01-20", "0:42:10", "0"]
        );
        assert_eq!(
            row.key(),
            ("Acme".to_string(), "Pilot".to_string(), "2024-01-05".to_string())
        );
    }

    #[test]
    fn test_window_display() {
        assert_eq!(DateWindow::since(d(2024, 1, 2)).to_string(), "2024-01-02..");
        assert_eq!(
            DateWindow::between(d(2024, 1, 2), d(2024, 2, 3)).to_string(),
            "2024-01-02..=2024-02-03"
        );
    }
}
