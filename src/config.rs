//! Runtime settings and destination configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file
//! (`--config`), then command-line flags. The defaults expect everything in
//! the working directory (`podcast_sources.csv`, `internal_data.txt`,
//! `output.csv`).
//!
//! ```yaml
//! sources: podcast_sources.csv
//! source_kind: feed
//! state_file: internal_data.txt
//! scan: stop_at_watermark
//! sink:
//!   kind: sheets
//!   destination: sheet.txt
//!   credentials: service_account.json
//!   append_delay_ms: 1000
//! ```
//!
//! The spreadsheet destination itself is described by a small `label:value`
//! file, see [`Destination`].

use crate::cli::Cli;
use crate::fetchers::{ScanPolicy, SourceKind};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("invalid settings file {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("{}: missing required label `{label}`", path.display())]
    MissingLabel { path: PathBuf, label: &'static str },

    #[error("invalid date range: {0}")]
    DateRange(String),
}

/// How the CSV sink treats an existing output file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvMode {
    /// Recreate the file on every run.
    #[default]
    Overwrite,
    /// Keep existing rows and append only rows not already present.
    Append,
}

/// Which sink receives the rows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkSettings {
    Csv {
        path: PathBuf,
        #[serde(default)]
        mode: CsvMode,
    },
    Sheets {
        /// `label:value` destination file.
        destination: PathBuf,
        /// Service-account JSON; falls back to the destination file's
        /// `credentials` label.
        #[serde(default)]
        credentials: Option<PathBuf>,
        /// Pause between row appends to stay under the API write quota.
        #[serde(default = "default_append_delay_ms")]
        append_delay_ms: u64,
    },
}

impl Default for SinkSettings {
    fn default() -> Self {
        SinkSettings::Csv {
            path: PathBuf::from("output.csv"),
            mode: CsvMode::Overwrite,
        }
    }
}

fn default_append_delay_ms() -> u64 {
    1000
}

/// HTTP client knobs shared by both source kinds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Fetched after a connect failure to tell a dead host from a dead link.
    pub connectivity_probe_url: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("episode_tracker/{}", env!("CARGO_PKG_VERSION")),
            connectivity_probe_url: "https://www.google.com/generate_204".to_string(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub sources: PathBuf,
    pub source_kind: SourceKind,
    pub state_file: PathBuf,
    pub scan: ScanPolicy,
    pub strict_state: bool,
    pub abort_when_offline: bool,
    pub sink: SinkSettings,
    pub http: HttpSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: PathBuf::from("podcast_sources.csv"),
            source_kind: SourceKind::Video,
            state_file: PathBuf::from("internal_data.txt"),
            scan: ScanPolicy::StopAtWatermark,
            strict_state: false,
            abort_when_offline: true,
            sink: SinkSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

impl Settings {
    /// Parse a YAML settings file.
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = serde_yaml::from_str(&text).map_err(|e| ConfigError::Yaml {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Loaded settings file");
        Ok(settings)
    }

    /// Build settings from the optional `--config` file plus CLI overrides.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut settings = match &cli.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        settings.apply_cli(cli);

        if let (Some(since), Some(until)) = (cli.since, cli.until) {
            if until < since {
                return Err(ConfigError::DateRange(format!(
                    "--until {until} is before --since {since}"
                )));
            }
        }
        Ok(settings)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(sources) = &cli.sources {
            self.sources = PathBuf::from(sources);
        }
        if let Some(kind) = cli.source_kind {
            self.source_kind = kind;
        }
        if let Some(state_file) = &cli.state_file {
            self.state_file = PathBuf::from(state_file);
        }
        if let Some(scan) = cli.scan {
            self.scan = scan;
        }
        self.strict_state |= cli.strict_state;

        if let Some(destination) = &cli.sheet_config {
            let (credentials, append_delay_ms) = match &self.sink {
                SinkSettings::Sheets {
                    credentials,
                    append_delay_ms,
                    ..
                } => (credentials.clone(), *append_delay_ms),
                SinkSettings::Csv { .. } => (None, default_append_delay_ms()),
            };
            self.sink = SinkSettings::Sheets {
                destination: PathBuf::from(destination),
                credentials,
                append_delay_ms,
            };
        } else if let Some(output) = &cli.output {
            let mode = match &self.sink {
                SinkSettings::Csv { mode, .. } => *mode,
                SinkSettings::Sheets { .. } => CsvMode::Overwrite,
            };
            self.sink = SinkSettings::Csv {
                path: PathBuf::from(output),
                mode,
            };
        }

        match &mut self.sink {
            SinkSettings::Csv { mode, .. } if cli.append => *mode = CsvMode::Append,
            SinkSettings::Sheets { credentials, .. } => {
                if let Some(path) = &cli.credentials {
                    *credentials = Some(PathBuf::from(path));
                }
            }
            _ => {}
        }
    }
}

/// Spreadsheet destination, read from `label:value` lines.
///
/// ```text
/// spreadsheet_id: 1AbCdEf...
/// worksheet: Episodes
/// sort_worksheet: Episodes
/// credentials: service_account.json
/// header_rows: 1
/// ```
///
/// Labels are case-insensitive and treat spaces and dashes as underscores,
/// so `Spreadsheet ID:` works too. Values may themselves contain colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub spreadsheet_id: String,
    pub worksheet: String,
    /// Worksheet the sort acts on; defaults to [`Destination::worksheet`].
    pub sort_worksheet: Option<String>,
    pub credentials: Option<PathBuf>,
    /// Rows at the top of the worksheet left in place when sorting.
    pub header_rows: u32,
}

impl Destination {
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut spreadsheet_id = None;
        let mut worksheet = None;
        let mut sort_worksheet = None;
        let mut credentials = None;
        let mut header_rows = 1;

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((label, value)) = line.split_once(':') else {
                return Err(ConfigError::Malformed {
                    path: path.to_path_buf(),
                    reason: format!("line {}: expected `label:value`", lineno + 1),
                });
            };
            let value = value.trim().to_string();
            let label = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");

            match label.as_str() {
                "spreadsheet_id" | "spreadsheet" | "sheet_id" => spreadsheet_id = Some(value),
                "worksheet" | "worksheet_name" | "sheet" => worksheet = Some(value),
                "sort_worksheet" => sort_worksheet = Some(value),
                "credentials" => credentials = Some(PathBuf::from(value)),
                "header_rows" => {
                    header_rows = value.parse().map_err(|_| ConfigError::Malformed {
                        path: path.to_path_buf(),
                        reason: format!("line {}: header_rows must be a number", lineno + 1),
                    })?;
                }
                other => debug!(label = other, "Ignoring unknown destination label"),
            }
        }

        Ok(Self {
            spreadsheet_id: spreadsheet_id.ok_or_else(|| ConfigError::MissingLabel {
                path: path.to_path_buf(),
                label: "spreadsheet_id",
            })?,
            worksheet: worksheet.ok_or_else(|| ConfigError::MissingLabel {
                path: path.to_path_buf(),
                label: "worksheet",
            })?,
            sort_worksheet,
            credentials,
            header_rows,
        })
    }

    pub fn sort_target(&self) -> &str {
        self.sort_worksheet.as_deref().unwrap_or(&self.worksheet)
    }
}
