//! Pure normalization of titles, durations and publish dates.
//!
//! Upstream data comes in two shapes (video metadata and RSS/Atom XML) and
//! each publishes dates and durations differently. Everything is funnelled
//! into the same canonical forms here:
//!
//! - titles lose any `| Channel Brand` suffix
//! - durations become `H:M:S` text
//! - dates become a [`NaiveDate`]

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Separator after which publishers append channel branding.
pub const TITLE_SEPARATOR: char = '|';

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

static ISO8601_DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?T?(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?$").unwrap()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("malformed duration {0:?}")]
    Duration(String),

    #[error("unrecognized date {0:?}")]
    Date(String),
}

/// Cut a raw title at the first [`TITLE_SEPARATOR`] and trim it.
pub fn normalize_title(raw: &str) -> String {
    raw.split(TITLE_SEPARATOR)
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Zero-pad a duration to `H:M:S` based on how many components it has.
///
/// `"45"` becomes `"0:0:45"`, `"12:45"` becomes `"0:12:45"` and a value
/// that already has three components is returned as-is (after trimming).
/// Components are not carried, so `"3600"` becomes `"0:0:3600"`.
pub fn normalize_duration(raw: &str) -> Result<String, NormalizeError> {
    let raw = raw.trim();
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();

    let all_numeric = parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()));
    if !all_numeric {
        return Err(NormalizeError::Duration(raw.to_string()));
    }

    match parts.as_slice() {
        [s] => Ok(format!("0:0:{s}")),
        [m, s] => Ok(format!("0:{m}:{s}")),
        [h, m, s] => Ok(format!("{h}:{m}:{s}")),
        _ => Err(NormalizeError::Duration(raw.to_string())),
    }
}

/// Total seconds of an ISO-8601 duration such as `PT1H2M3S`.
///
/// YouTube publishes video length in this form on the watch page.
pub fn iso8601_duration_secs(raw: &str) -> Result<u64, NormalizeError> {
    let caps = ISO8601_DURATION
        .captures(raw.trim())
        .filter(|c| c.iter().skip(1).any(|g| g.is_some()))
        .ok_or_else(|| NormalizeError::Duration(raw.to_string()))?;

    let field = |i: usize| -> Result<u64, NormalizeError> {
        caps.get(i)
            .map(|m| m.as_str().parse::<u64>())
            .transpose()
            .map(|v| v.unwrap_or(0))
            .map_err(|_| NormalizeError::Duration(raw.to_string()))
    };

    let overflow = || NormalizeError::Duration(raw.to_string());
    [(1, 86_400u64), (2, 3_600), (3, 60), (4, 1)]
        .into_iter()
        .try_fold(0u64, |total, (i, unit)| {
            field(i)?
                .checked_mul(unit)
                .and_then(|secs| total.checked_add(secs))
                .ok_or_else(overflow)
        })
}

/// Month number (1-12) for a three-letter English abbreviation.
pub fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let abbrev = abbrev.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == abbrev)
        .map(|i| i as u32 + 1)
}

/// Parse a publish date as found in feeds and video metadata.
///
/// Tried in order:
/// 1. RFC 2822 (`Mon, 15 Jan 2024 08:00:00 +0000`), the RSS `pubDate` form
/// 2. `[Www,] DD Mon YYYY ...` through the month table, for feeds whose
///    timezone or weekday trips the strict parser
/// 3. ISO `YYYY-MM-DD`, optionally followed by a time (Atom, YouTube)
pub fn parse_pub_date(raw: &str) -> Result<NaiveDate, NormalizeError> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Ok(dt.date_naive());
    }
    if let Some(date) = parse_day_month_year(raw) {
        return Ok(date);
    }
    if let Some(date) = raw
        .get(..10)
        .and_then(|head| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
    {
        return Ok(date);
    }

    Err(NormalizeError::Date(raw.to_string()))
}

fn parse_day_month_year(raw: &str) -> Option<NaiveDate> {
    let mut tokens = raw.split_whitespace().peekable();
    if tokens.peek()?.ends_with(',') {
        tokens.next();
    }

    let day = tokens.next()?.parse::<u32>().ok()?;
    let month = month_from_abbrev(tokens.next()?)?;
    let year = tokens.next()?.parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_normalize_title_strips_branding() {
        assert_eq!(
            normalize_title("Episode Title | Channel Brand"),
            "Episode Title"
        );
        assert_eq!(normalize_title("A | B | C"), "A");
        assert_eq!(normalize_title("  No separator  "), "No separator");
        assert_eq!(normalize_title("| only brand"), "");
    }

    #[test]
    fn test_normalize_duration_shapes() {
        assert_eq!(normalize_duration("45").unwrap(), "0:0:45");
        assert_eq!(normalize_duration("12:45").unwrap(), "0:12:45");
        assert_eq!(normalize_duration("1:12:45").unwrap(), "1:12:45");
        assert_eq!(normalize_duration(" 3600 ").unwrap(), "0:0:3600");
    }

    #[test]
    fn test_normalize_duration_is_idempotent() {
        for raw in ["45", "12:45", "1:12:45"] {
            let once = normalize_duration(raw).unwrap();
            assert_eq!(normalize_duration(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_normalize_duration_rejects_garbage() {
        assert!(matches!(
            normalize_duration(""),
            Err(NormalizeError::Duration(_))
        ));
        assert!(normalize_duration("1:2:3:4").is_err());
        assert!(normalize_duration("12:xx").is_err());
        assert!(normalize_duration("-5").is_err());
    }

    #[test]
    fn test_iso8601_duration_secs() {
        assert_eq!(iso8601_duration_secs("PT1H2M3S").unwrap(), 3723);
        assert_eq!(iso8601_duration_secs("PT45S").unwrap(), 45);
        assert_eq!(iso8601_duration_secs("PT12M").unwrap(), 720);
        assert_eq!(iso8601_duration_secs("P1DT1S").unwrap(), 86_401);
        assert!(iso8601_duration_secs("PT").is_err());
        assert!(iso8601_duration_secs("1:00").is_err());
    }

    #[test]
    fn test_iso8601_duration_secs_overflow_is_an_error() {
        assert_eq!(
            iso8601_duration_secs("P999999999999999D"),
            Err(NormalizeError::Duration("P999999999999999D".to_string()))
        );
        assert!(iso8601_duration_secs("PT99999999999999999999S").is_err());
    }

    #[test]
    fn test_month_from_abbrev() {
        assert_eq!(month_from_abbrev("Jan"), Some(1));
        assert_eq!(month_from_abbrev("dec"), Some(12));
        assert_eq!(month_from_abbrev("September"), Some(9));
        assert_eq!(month_from_abbrev("Foo"), None);
        assert_eq!(month_from_abbrev("J"), None);
    }

    #[test]
    fn test_parse_pub_date_rfc2822() {
        assert_eq!(
            parse_pub_date("Mon, 15 Jan 2024 08:00:00 +0000").unwrap(),
            d(2024, 1, 15)
        );
    }

    #[test]
    fn test_parse_pub_date_month_table_fallback() {
        // Wrong weekday and a named zone the strict parser refuses.
        assert_eq!(
            parse_pub_date("Fri, 15 Jan 2024 08:00:00 CEST").unwrap(),
            d(2024, 1, 15)
        );
        assert_eq!(parse_pub_date("3 Feb 2023").unwrap(), d(2023, 2, 3));
    }

    #[test]
    fn test_parse_pub_date_iso() {
        assert_eq!(parse_pub_date("2024-01-20").unwrap(), d(2024, 1, 20));
        assert_eq!(
            parse_pub_date("2024-01-20T10:00:03-08:00").unwrap(),
            d(2024, 1, 20)
        );
    }

    #[test]
    fn test_parse_pub_date_rejects_garbage() {
        assert_eq!(
            parse_pub_date("yesterday"),
            Err(NormalizeError::Date("yesterday".to_string()))
        );
        assert!(parse_pub_date("31 Feb 2024").is_err());
    }
}
