//! Pull-mode export: iterator, transform, fixed-size `load_batch` calls.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::coordinator::ExportResult;
use super::progress::ProgressTracker;
use super::writers::Sink;
use crate::client::{Document, Row, SearchTransport, count_matches};
use crate::error::Result;
use crate::extract::{ExtractMode, QueryIterator};
use crate::query::QueryDescriptor;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Maps each extracted document to the row handed to the sink.
pub type Transform = Box<dyn Fn(Document) -> Row + Send + Sync>;

/// Drives a [`QueryIterator`] and loads rows into a sink in batches.
///
/// Runs on the caller's task; no queue is involved. The sink sees `init`,
/// then `load_batch` with at most `batch_size` rows per call, then `close`.
/// Rows already fetched when the iterator fails are still loaded before
/// the error is returned.
pub struct BatchExport {
    transport: Arc<dyn SearchTransport>,
    query: Arc<QueryDescriptor>,
    batch_size: usize,
    transform: Transform,
    show_progress: bool,
    cancel: CancellationToken,
}

impl BatchExport {
    pub fn new(transport: Arc<dyn SearchTransport>, query: Arc<QueryDescriptor>) -> Self {
        Self {
            transport,
            query,
            batch_size: DEFAULT_BATCH_SIZE,
            transform: Box::new(Document::into_row),
            show_progress: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Document) -> Row + Send + Sync + 'static,
    {
        self.transform = Box::new(transform);
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Count, then export. Zero matches returns without touching the sink.
    pub async fn run(&self, sink: Box<dyn Sink>) -> Result<ExportResult> {
        let started = Instant::now();
        let total = count_matches(self.transport.as_ref(), &self.query).await?;
        info!("{} documents match, exporting in batch mode", total);
        if total == 0 {
            return Ok(ExportResult {
                documents_exported: 0,
                total_matches: 0,
                mode: ExtractMode::Batch,
                elapsed_ms: started.elapsed().as_millis() as u64,
                cancelled: false,
            });
        }
        self.run_counted(sink, total, started).await
    }

    pub(crate) async fn run_counted(
        &self,
        mut sink: Box<dyn Sink>,
        total: u64,
        started: Instant,
    ) -> Result<ExportResult> {
        let progress = ProgressTracker::new(Some(total), self.show_progress);
        let mut iter = QueryIterator::new(
            self.transport.clone(),
            self.query.clone(),
            self.cancel.clone(),
        );

        let loaded = match sink.init().await {
            Ok(()) => self.load_all(&mut iter, sink.as_mut(), &progress).await,
            Err(e) => Err(e),
        };
        let closed = sink.close().await;
        progress.finish();
        let exported = loaded?;
        closed?;

        let result = ExportResult {
            documents_exported: exported,
            total_matches: total,
            mode: ExtractMode::Batch,
            elapsed_ms: started.elapsed().as_millis() as u64,
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            "Batch export finished: {} of {} documents, {} ms",
            exported, total, result.elapsed_ms
        );
        Ok(result)
    }

    async fn load_all(
        &self,
        iter: &mut QueryIterator,
        sink: &mut dyn Sink,
        progress: &ProgressTracker,
    ) -> Result<u64> {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut exported = 0u64;

        while iter.advance().await {
            let Some(doc) = iter.current() else { break };
            batch.push((self.transform)(doc));
            if batch.len() >= self.batch_size {
                exported += sink.load_batch(&batch).await? as u64;
                batch.clear();
                progress.update(exported);
                debug!("Loaded batch, {} rows so far", exported);
            }
        }
        if !batch.is_empty() {
            exported += sink.load_batch(&batch).await? as u64;
            progress.update(exported);
        }

        match iter.take_error() {
            Some(e) => Err(e),
            None => Ok(exported),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use serde_json::json;

    use super::*;
    use crate::testing::{MockCluster, RecordingSink, at, docs_every};

    const FIELD: &str = "ts";

    fn export(cluster: Arc<MockCluster>) -> BatchExport {
        let query = QueryDescriptor::builder()
            .index("logs")
            .time_field(FIELD)
            .start(at(0))
            .end(at(3600))
            .step(TimeDelta::minutes(10))
            .build()
            .unwrap();
        BatchExport::new(cluster, Arc::new(query))
    }

    #[tokio::test]
    async fn test_transform_applied_and_batches_filled() {
        let cluster = Arc::new(MockCluster::new(FIELD, docs_every(250, FIELD, 12)));
        let (sink, log) = RecordingSink::new();

        let result = export(cluster)
            .with_transform(|doc| {
                let mut row = Row::new();
                row.insert("id".to_string(), json!(doc.id));
                row
            })
            .run(Box::new(sink))
            .await
            .unwrap();

        assert_eq!(result.documents_exported, 250);
        let log = log.lock().unwrap();
        assert_eq!(log.batch_sizes, [100, 100, 50]);
        assert_eq!(log.rows[0], json!({"id": "doc-0"}).as_object().unwrap().clone());
        assert_eq!(log.calls.first(), Some(&"init"));
        assert_eq!(log.calls.last(), Some(&"close"));
    }

    #[tokio::test]
    async fn test_iterator_error_flushes_then_fails() {
        let mut cluster = MockCluster::new(FIELD, docs_every(60, FIELD, 60));
        cluster.fail_search_at = Some(4);
        let (sink, log) = RecordingSink::new();

        let err = export(Arc::new(cluster))
            .with_batch_size(25)
            .run(Box::new(sink))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(500));
        let log = log.lock().unwrap();
        assert_eq!(log.batch_sizes, [25, 5]);
        assert_eq!(log.calls.last(), Some(&"close"));
    }

    #[tokio::test]
    async fn test_zero_count_skips_sink() {
        let cluster = Arc::new(MockCluster::new(FIELD, vec![]));
        let (sink, log) = RecordingSink::new();

        let result = export(cluster).run(Box::new(sink)).await.unwrap();
        assert_eq!(result.documents_exported, 0);
        assert!(log.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_stops_iteration() {
        let cluster = Arc::new(MockCluster::new(FIELD, docs_every(60, FIELD, 60)));
        let (mut sink, log) = RecordingSink::new();
        sink.fail_load = true;

        let result = export(cluster.clone())
            .with_batch_size(5)
            .run(Box::new(sink))
            .await;

        assert!(result.is_err());
        assert_eq!(log.lock().unwrap().calls, ["init", "load_batch", "close"]);
        assert_eq!(cluster.searches().len(), 1);
    }
}
