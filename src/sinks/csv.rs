//! Local CSV sink.
//!
//! Rows are written without a header, six columns each:
//! `source,title,published,downloaded,duration,flag`. Fields containing
//! commas or quotes are quoted.

use super::{RowSink, SinkError, WriteSummary, new_rows};
use crate::config::CsvMode;
use crate::models::{OutputRow, RowKey};
use ::csv::{ReaderBuilder, WriterBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
    mode: CsvMode,
}

impl CsvSink {
    pub fn new(path: PathBuf, mode: CsvMode) -> Self {
        Self { path, mode }
    }

    fn io_err(&self, e: std::io::Error) -> SinkError {
        SinkError::Io {
            path: self.path.clone(),
            source: e,
        }
    }
}

/// Keys of the rows already in `path`; empty when the file does not exist.
pub async fn existing_keys(path: &Path) -> Result<HashSet<RowKey>, SinkError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => {
            return Err(SinkError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let mut keys = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(source), Some(title), Some(published)) = (record.get(0), record.get(1), record.get(2)) {
            keys.insert((source.to_string(), title.to_string(), published.to_string()));
        }
    }
    Ok(keys)
}

/// `true` when `path` is non-empty and its last byte is not a newline.
pub async fn missing_trailing_newline(path: &Path) -> std::io::Result<bool> {
    let mut file = match fs::File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata().await?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] != b'\n')
}

/// Serialize rows as header-less CSV.
pub fn encode_rows<'a>(rows: impl IntoIterator<Item = &'a OutputRow>) -> Result<Vec<u8>, SinkError> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.to_fields())?;
    }
    writer
        .into_inner()
        .map_err(|e| SinkError::Unwritable(e.to_string()))
}

impl RowSink for CsvSink {
    #[instrument(level = "info", skip_all, fields(path = %self.path.display(), mode = ?self.mode))]
    async fn write(&self, rows: &[OutputRow]) -> Result<WriteSummary, SinkError> {
        let existing = match self.mode {
            CsvMode::Overwrite => HashSet::new(),
            CsvMode::Append => existing_keys(&self.path).await?,
        };
        let fresh = new_rows(rows, &existing);
        let summary = WriteSummary {
            written: fresh.len(),
            skipped: rows.len() - fresh.len(),
        };
        let bytes = encode_rows(fresh)?;

        match self.mode {
            CsvMode::Overwrite => {
                fs::write(&self.path, &bytes).await.map_err(|e| self.io_err(e))?;
            }
            CsvMode::Append => {
                let repair = !bytes.is_empty()
                    && missing_trailing_newline(&self.path)
                        .await
                        .map_err(|e| self.io_err(e))?;
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await
                    .map_err(|e| self.io_err(e))?;
                if repair {
                    debug!("Existing file lacks a trailing newline; adding one");
                    file.write_all(b"\n").await.map_err(|e| self.io_err(e))?;
                }
                file.write_all(&bytes).await.map_err(|e| self.io_err(e))?;
                file.flush().await.map_err(|e| self.io_err(e))?;
            }
        }

        debug!(bytes = bytes.len(), "Wrote CSV rows");
        info!(written = summary.written, skipped = summary.skipped, "CSV sink updated");
        Ok(summary)
    }
}
