//! JSON Lines sink: one compact JSON object per row.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::client::Row;
use crate::error::{DumpError, Result};

use super::{Sink, create_writer};

/// Writer for JSON Lines format
pub struct JsonLWriter {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl JsonLWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            writer: None,
            written: 0,
        }
    }
}

#[async_trait]
impl Sink for JsonLWriter {
    async fn init(&mut self) -> Result<()> {
        self.writer = Some(create_writer(&self.path).await?);
        debug!("Created JSON Lines writer for: {}", self.path.display());
        Ok(())
    }

    async fn load_batch(&mut self, rows: &[Row]) -> Result<usize> {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row).map_err(DumpError::Encode)?;
            buf.push(b'\n');
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DumpError::Sink(format!("{} is not open", self.path.display())))?;
        writer.write_all(&buf).await?;

        self.written += rows.len();
        debug!(
            "Wrote {} rows to JSON Lines (total: {})",
            rows.len(),
            self.written
        );
        Ok(rows.len())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            debug!(
                "Finalized JSON Lines file: {} ({} rows)",
                self.path.display(),
                self.written
            );
        }
        Ok(())
    }
}
