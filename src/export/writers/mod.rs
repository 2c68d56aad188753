//! Sink contract and the file sinks built on it.
//!
//! A [`Sink`] is driven as `init`, then either `stream_output` (pipeline
//! mode) or repeated `load_batch` calls (batch mode), then `close`. The
//! caller always calls `close`, including after a failed `init`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::BufWriter;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressTracker;
use crate::client::{Document, Row};
use crate::error::{DumpError, Result};

pub mod csv;
pub mod jsonl;

pub use csv::CsvWriter;
pub use jsonl::JsonLWriter;

/// Rows buffered by the default [`Sink::stream_output`] before each `load_batch`.
pub const STREAM_BATCH: usize = 500;

/// Consumer of extracted rows.
#[async_trait]
pub trait Sink: Send {
    /// Prepare the destination.
    async fn init(&mut self) -> Result<()>;

    /// Write a batch of rows.
    ///
    /// # Returns
    /// * `Result<usize>` - Number of rows written
    async fn load_batch(&mut self, rows: &[Row]) -> Result<usize>;

    /// Consume `rows` until the queue closes or the run is cancelled.
    ///
    /// The default buffers [`STREAM_BATCH`] rows per `load_batch` call.
    async fn stream_output(&mut self, rows: &mut RowStream) -> Result<u64> {
        let mut batch = Vec::with_capacity(STREAM_BATCH);
        let mut written = 0u64;
        while let Some(row) = rows.next().await {
            batch.push(row);
            if batch.len() >= STREAM_BATCH {
                written += self.load_batch(&batch).await? as u64;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            written += self.load_batch(&batch).await? as u64;
        }
        Ok(written)
    }

    /// Flush and release the destination.
    async fn close(&mut self) -> Result<()>;
}

/// Receiving end of the pipeline queue, as seen by a sink.
///
/// Yields rows until the producer drops its sender or the shared
/// cancellation token fires.
pub struct RowStream {
    rx: mpsc::Receiver<Document>,
    cancel: CancellationToken,
    progress: Option<Arc<ProgressTracker>>,
    received: u64,
}

impl RowStream {
    pub fn new(rx: mpsc::Receiver<Document>, cancel: CancellationToken) -> Self {
        Self {
            rx,
            cancel,
            progress: None,
            received: 0,
        }
    }

    pub fn with_progress(mut self, progress: Arc<ProgressTracker>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn next(&mut self) -> Option<Row> {
        let doc = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            doc = self.rx.recv() => doc,
        }?;
        self.received += 1;
        if let Some(progress) = &self.progress {
            progress.update(self.received);
        }
        Some(doc.into_row())
    }

    /// Rows handed out so far.
    pub fn received(&self) -> u64 {
        self.received
    }
}

/// Plain-text rendering of a cell.
///
/// Strings are written raw, `null` as an empty cell, and arrays or objects
/// as compact JSON.
pub fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    JsonLines,
}

impl OutputFormat {
    /// Guess from a file extension, `None` when it is not recognised.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "csv" => Some(OutputFormat::Csv),
            "jsonl" | "ndjson" => Some(OutputFormat::JsonLines),
            _ => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "jsonl" | "ndjson" | "json-lines" => Ok(OutputFormat::JsonLines),
            other => Err(format!("unknown format '{other}', expected csv or jsonl")),
        }
    }
}

/// Build the file sink for `format`. The file is created on `init`.
pub fn file_sink(format: OutputFormat, path: impl AsRef<Path>) -> Box<dyn Sink> {
    let path = path.as_ref();
    match format {
        OutputFormat::Csv => Box::new(CsvWriter::new(path)),
        OutputFormat::JsonLines => Box::new(JsonLWriter::new(path)),
    }
}

/// Helper function to create a buffered file writer
pub(crate) async fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    validate_path(path)?;
    let file = File::create(path).await.map_err(|e| {
        DumpError::Sink(format!("Failed to create {}: {}", path.display(), e))
    })?;
    Ok(BufWriter::with_capacity(1024 * 1024, file))
}

fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(DumpError::Sink(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }
    Ok(())
}
