//! CSV sink.
//!
//! The header is fixed by the first batch (sorted field names). Fields first
//! seen in later batches are appended as extra columns; rows written before
//! them simply have fewer cells.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::client::Row;
use crate::error::{DumpError, Result};

use super::{Sink, cell_text, create_writer};

/// Writer for CSV format
pub struct CsvWriter {
    path: PathBuf,
    /// `None` until `init` and after `close`
    writer: Option<BufWriter<File>>,
    /// Column headers (field names)
    headers: Vec<String>,
    headers_written: bool,
    written: usize,
}

impl CsvWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            headers: Vec::new(),
            headers_written: false,
            written: 0,
        }
    }

    /// Collect field names from a batch, appending unseen ones in sorted order.
    fn collect_headers(&mut self, rows: &[Row]) -> usize {
        let new_fields: BTreeSet<&String> = rows
            .iter()
            .flat_map(|row| row.keys())
            .filter(|key| !self.headers.contains(key))
            .collect();
        let added = new_fields.len();
        let new_fields: Vec<String> = new_fields.into_iter().cloned().collect();
        self.headers.extend(new_fields);
        added
    }

    fn format_row(&self, row: &Row) -> String {
        self.headers
            .iter()
            .map(|field| Self::escape_csv_value(&cell_text(row.get(field))))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Quote a value containing a separator, quote or line break (RFC 4180).
    fn escape_csv_value(value: &str) -> String {
        if value.contains([',', '"', '\n', '\r']) {
            format!("\"{}\"", value.replace('"', "\"\""))
        } else {
            value.to_string()
        }
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| DumpError::Sink(format!("{} is not open", self.path.display())))
    }
}

#[async_trait]
impl Sink for CsvWriter {
    async fn init(&mut self) -> Result<()> {
        self.writer = Some(create_writer(&self.path).await?);
        debug!("Created CSV writer for: {}", self.path.display());
        Ok(())
    }

    async fn load_batch(&mut self, rows: &[Row]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let added = self.collect_headers(rows);
        if !self.headers_written {
            let line = self
                .headers
                .iter()
                .map(|h| Self::escape_csv_value(h))
                .collect::<Vec<_>>()
                .join(",");
            let writer = self.writer()?;
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            self.headers_written = true;
            debug!("Wrote CSV headers: {} fields", self.headers.len());
        } else if added > 0 {
            warn!(
                "{} new fields after the header was written, appended as extra columns",
                added
            );
        }

        let mut buf = String::new();
        for row in rows {
            buf.push_str(&self.format_row(row));
            buf.push('\n');
        }
        self.writer()?.write_all(buf.as_bytes()).await?;

        self.written += rows.len();
        debug!("Wrote {} rows to CSV (total: {})", rows.len(), self.written);
        Ok(rows.len())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            debug!(
                "Finalized CSV file: {} ({} rows)",
                self.path.display(),
                self.written
            );
        }
        Ok(())
    }
}
