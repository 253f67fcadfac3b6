//! Loading the list of tracked sources.
//!
//! The source list is a two-column delimited file with a header row:
//!
//! ```text
//! name,url
//! Acme Podcast,https://example.com/feed.xml
//! Some Channel,https://www.youtube.com/@somechannel
//! ```

use crate::config::ConfigError;
use crate::models::Source;
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, instrument};

/// Load sources from `path`.
///
/// Fails when the file cannot be opened or a data row does not have exactly
/// two fields. A name listed twice keeps its first position and takes the
/// last URL.
#[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
pub fn load_sources(path: impl AsRef<Path>) -> Result<Vec<Source>, ConfigError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let sources = parse_sources(file, path)?;
    info!(count = sources.len(), "Loaded sources");
    Ok(sources)
}

fn parse_sources<R: Read>(reader: R, path: &Path) -> Result<Vec<Source>, ConfigError> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut sources: Vec<Source> = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        if record.iter().all(str::is_empty) {
            continue;
        }
        if record.len() != 2 {
            return Err(ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: format!("line {line}: expected 2 fields, found {}", record.len()),
            });
        }

        let source = Source::new(&record[0], &record[1]);
        match sources.iter_mut().find(|s| s.name == source.name) {
            Some(existing) => {
                debug!(name = %source.name, line, "Duplicate source name; replacing URL");
                existing.url = source.url;
            }
            None => sources.push(source),
        }
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_logs::capture_logs;
    use std::io::Write;

    fn parse(text: &str) -> Result<Vec<Source>, ConfigError> {
        parse_sources(text.as_bytes(), Path::new("sources.csv"))
    }

    #[test]
    fn test_loads_single_source() {
        let sources = parse("name,url\nAcme,http://example.com/feed\n").unwrap();
        assert_eq!(sources, vec![Source::new("Acme", "http://example.com/feed")]);
    }

    #[test]
    fn test_header_only_is_empty() {
        assert!(parse("name,url\n").unwrap().is_empty());
    }

    #[test]
    fn test_skips_blank_lines_and_trims() {
        let sources = parse("name,url\n\n A , http://a \nB,http://b\n").unwrap();
        assert_eq!(
            sources,
            vec![Source::new("A", "http://a"), Source::new("B", "http://b")]
        );
    }

    #[test]
    fn test_rejects_wrong_field_count() {
        let err = parse("name,url\nAcme,http://a,extra\n").unwrap_err();
        match err {
            ConfigError::Malformed { reason, .. } => {
                assert!(reason.contains("line 2"), "{reason}");
                assert!(reason.contains("found 3"), "{reason}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(parse("name,url\nlonely\n").is_err());
    }

    #[test]
    fn test_duplicate_name_keeps_position_takes_last_url() {
        let sources = parse("name,url\nA,http://old\nB,http://b\nA,http://new\n").unwrap();
        assert_eq!(
            sources,
            vec![Source::new("A", "http://new"), Source::new("B", "http://b")]
        );
    }

    #[test]
    fn test_load_sources_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name,url").unwrap();
        writeln!(file, "Acme,http://example.com/feed").unwrap();
        let (logs, _guard) = capture_logs();

        let sources = load_sources(file.path()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Acme");

        let logged = logs.contents();
        let loaded: Vec<&str> = logged.lines().filter(|l| l.contains("Loaded sources")).collect();
        assert_eq!(loaded.len(), 1, "{logged}");
        assert!(loaded[0].contains("count=1"), "{}", loaded[0]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_sources(dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
