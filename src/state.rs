//! The watermark: date of the last successful run.
//!
//! Stored as a single line of whitespace-separated integers, `YYYY M D`.
//! Loading distinguishes a missing file (first run, expected) from a file
//! that exists but cannot be parsed; [`resolve_watermark`] decides what to
//! do with each.

use crate::models::RunDate;
use chrono::{Datelike, NaiveDate};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot access state file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt state file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

/// Outcome of reading the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkState {
    Found(NaiveDate),
    Absent,
}

/// Read the watermark from `path` without applying any fallback.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_watermark(path: &Path) -> Result<WatermarkState, StateError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(WatermarkState::Absent),
        Err(e) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    parse_watermark(&text)
        .map(WatermarkState::Found)
        .map_err(|reason| StateError::Corrupt {
            path: path.to_path_buf(),
            reason,
        })
}

/// Parse the first line of a state file into a date.
pub fn parse_watermark(text: &str) -> Result<NaiveDate, String> {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| "file is empty".to_string())?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    let [y, m, d] = fields.as_slice() else {
        return Err(format!("expected `YYYY MM DD`, found {line:?}"));
    };

    let year = y.parse::<i32>().map_err(|e| format!("year {y:?}: {e}"))?;
    let month = m.parse::<u32>().map_err(|e| format!("month {m:?}: {e}"))?;
    let day = d.parse::<u32>().map_err(|e| format!("day {d:?}: {e}"))?;
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("{year}-{month}-{day} is not a calendar date"))
}

/// Turn a load result into the date the run should start from.
///
/// A missing file means this is the first run and the run date is used. A
/// corrupt file falls back to the run date with a warning, unless `strict`
/// is set, in which case the error is returned.
pub fn resolve_watermark(
    loaded: Result<WatermarkState, StateError>,
    run_date: RunDate,
    strict: bool,
) -> Result<NaiveDate, StateError> {
    match loaded {
        Ok(WatermarkState::Found(date)) => {
            info!(watermark = %date, "Loaded watermark");
            Ok(date)
        }
        Ok(WatermarkState::Absent) => {
            info!(watermark = %run_date, "No state file; starting from the run date");
            Ok(run_date.date())
        }
        Err(e) if strict => Err(e),
        Err(e) => {
            warn!(error = %e, watermark = %run_date, "Ignoring unreadable state file; starting from the run date");
            Ok(run_date.date())
        }
    }
}

/// Persist `run_date` as the new watermark.
///
/// Written to a sibling temp file and renamed into place so a crash never
/// leaves a half-written state file behind.
#[instrument(level = "info", skip_all, fields(path = %path.display(), %run_date))]
pub async fn save_watermark(path: &Path, run_date: RunDate) -> Result<(), StateError> {
    let date = run_date.date();
    let contents = format!("{} {} {}", date.year(), date.month(), date.day());

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let io_err = |e: std::io::Error| StateError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    fs::write(&tmp, contents).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;

    info!("Saved watermark");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_watermark() {
        assert_eq!(parse_watermark("2024 1 15").unwrap(), d(2024, 1, 15));
        assert_eq!(parse_watermark("2024 01 05\n").unwrap(), d(2024, 1, 5));
        assert_eq!(parse_watermark("\n  2023\t12  31 \n").unwrap(), d(2023, 12, 31));
    }

    #[test]
    fn test_parse_watermark_rejects_garbage() {
        assert!(parse_watermark("").is_err());
        assert!(parse_watermark("2024-01-15").is_err());
        assert!(parse_watermark("2024 13 1").is_err());
        assert!(parse_watermark("2024 1 1 1").is_err());
        assert!(parse_watermark("twenty 1 1").is_err());
    }

    #[tokio::test]
    async fn test_absent_file_defaults_to_run_date() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("internal_data.txt");
        let run_date = RunDate(d(2024, 3, 9));

        let loaded = load_watermark(&path).await;
        assert!(matches!(loaded, Ok(WatermarkState::Absent)));
        assert_eq!(resolve_watermark(loaded, run_date, true).unwrap(), run_date.date());
    }

    #[tokio::test]
    async fn test_reads_existing_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("internal_data.txt");
        std::fs::write(&path, "2024 1 15").unwrap();

        let loaded = load_watermark(&path).await.unwrap();
        assert_eq!(loaded, WatermarkState::Found(d(2024, 1, 15)));
    }

    #[tokio::test]
    async fn test_corrupt_file_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("internal_data.txt");
        std::fs::write(&path, "not a date").unwrap();
        let run_date = RunDate(d(2024, 3, 9));

        let lenient = resolve_watermark(load_watermark(&path).await, run_date, false).unwrap();
        assert_eq!(lenient, run_date.date());

        let strict = resolve_watermark(load_watermark(&path).await, run_date, true);
        assert!(matches!(strict, Err(StateError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("internal_data.txt");
        let run_date = RunDate(d(2024, 2, 7));

        save_watermark(&path, run_date).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "2024 2 7");
        assert_eq!(
            load_watermark(&path).await.unwrap(),
            WatermarkState::Found(run_date.date())
        );
        assert!(!dir.path().join("internal_data.txt.tmp").exists());
    }
}
