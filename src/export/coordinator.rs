//! Streaming pipeline: one producer task, one consumer task, one bounded queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::BatchExport;
use super::progress::ProgressTracker;
use super::writers::{RowStream, Sink};
use crate::client::{SearchTransport, count_matches};
use crate::error::{DumpError, Result};
use crate::extract::scroll::DEFAULT_THROTTLE;
use crate::extract::{ExtractMode, Extractor, ScrollExtractor, WindowedExtractor};
use crate::query::QueryDescriptor;

/// Queue capacity used when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Result of an export operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResult {
    /// Rows accepted by the sink
    pub documents_exported: u64,
    /// Pre-flight count
    pub total_matches: u64,
    /// Mode actually used (`Auto` resolved)
    pub mode: ExtractMode,
    pub elapsed_ms: u64,
    /// The caller's token fired before the run completed
    pub cancelled: bool,
}

impl ExportResult {
    fn empty(mode: ExtractMode, started: Instant) -> Self {
        Self {
            documents_exported: 0,
            total_matches: 0,
            mode,
            elapsed_ms: started.elapsed().as_millis() as u64,
            cancelled: false,
        }
    }
}

/// Runs an extractor and a sink concurrently, joined by a bounded queue.
///
/// A pre-flight count comes first; zero matches returns immediately without
/// touching the sink. Otherwise the producer pushes documents into a queue
/// of `queue_capacity` while the consumer drives [`Sink::stream_output`].
/// Both share a child of the caller's cancellation token: whichever side
/// fails first cancels the other, and its error is the one returned once
/// both have settled. The sink is always closed once `init` has been called.
pub struct ExportPipeline {
    transport: Arc<dyn SearchTransport>,
    query: Arc<QueryDescriptor>,
    mode: ExtractMode,
    queue_capacity: usize,
    throttle: Duration,
    batch_size: usize,
    show_progress: bool,
    cancel: CancellationToken,
}

impl ExportPipeline {
    pub fn new(transport: Arc<dyn SearchTransport>, query: Arc<QueryDescriptor>) -> Self {
        Self {
            transport,
            query,
            mode: ExtractMode::Auto,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            throttle: DEFAULT_THROTTLE,
            batch_size: super::batch::DEFAULT_BATCH_SIZE,
            show_progress: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    /// Zero is treated as one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Pause between scroll pages.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Rows per `load_batch` call in batch mode.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.show_progress = enabled;
        self
    }

    /// Set cancellation token for this export operation
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Execute the export into `sink`.
    pub async fn run(&self, sink: Box<dyn Sink>) -> Result<ExportResult> {
        let started = Instant::now();
        let total = count_matches(self.transport.as_ref(), &self.query).await?;
        let mode = self.mode.resolve(total);
        info!("{} documents match, exporting in {} mode", total, mode);

        if total == 0 {
            return Ok(ExportResult::empty(mode, started));
        }

        if mode == ExtractMode::Batch {
            return BatchExport::new(self.transport.clone(), self.query.clone())
                .with_batch_size(self.batch_size)
                .with_progress(self.show_progress)
                .with_cancellation(self.cancel.clone())
                .run_counted(sink, total, started)
                .await;
        }

        let progress = Arc::new(ProgressTracker::new(Some(total), self.show_progress));
        let outcome = self
            .stream(self.extractor(mode), sink, progress.clone())
            .await;
        progress.finish();
        let exported = outcome?;

        let result = ExportResult {
            documents_exported: exported,
            total_matches: total,
            mode,
            elapsed_ms: started.elapsed().as_millis() as u64,
            cancelled: self.cancel.is_cancelled(),
        };
        info!(
            "Export {}: {} of {} documents, {} ms",
            if result.cancelled { "cancelled" } else { "completed" },
            result.documents_exported,
            total,
            result.elapsed_ms
        );
        Ok(result)
    }

    fn extractor(&self, mode: ExtractMode) -> Box<dyn Extractor> {
        match mode {
            ExtractMode::Scroll => Box::new(
                ScrollExtractor::new(self.transport.clone(), self.query.clone())
                    .with_throttle(self.throttle),
            ),
            _ => Box::new(WindowedExtractor::new(
                self.transport.clone(),
                self.query.clone(),
            )),
        }
    }

    async fn stream(
        &self,
        extractor: Box<dyn Extractor>,
        mut sink: Box<dyn Sink>,
        progress: Arc<ProgressTracker>,
    ) -> Result<u64> {
        let cancel = self.cancel.child_token();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let mut producer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                debug!("Producer started ({})", extractor.name());
                // the sender lives in this task only; any exit closes the queue
                let result = extractor.extract(&tx, &cancel).await;
                drop(tx);
                if let Err(ref e) = result {
                    debug!("Producer failed: {}", e);
                    cancel.cancel();
                }
                result
            })
        };

        let mut consumer = {
            let cancel = cancel.clone();
            let mut rows = RowStream::new(rx, cancel.clone()).with_progress(progress);
            tokio::spawn(async move {
                let streamed = match sink.init().await {
                    Ok(()) => sink.stream_output(&mut rows).await,
                    Err(e) => Err(e),
                };
                // unblock a producer waiting on a full queue
                drop(rows);
                let closed = sink.close().await;
                let result = match (streamed, closed) {
                    (Err(e), Err(close_err)) => {
                        warn!("Sink close failed after error: {}", close_err);
                        Err(e)
                    }
                    (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
                    (Ok(n), Ok(())) => Ok(n),
                };
                if let Err(ref e) = result {
                    debug!("Consumer failed: {}", e);
                    cancel.cancel();
                }
                result
            })
        };

        let first = tokio::select! {
            produced = &mut producer => Settled::Producer(joined(produced)),
            consumed = &mut consumer => Settled::Consumer(joined(consumed)),
        };
        let (produced, consumed, producer_first) = match first {
            Settled::Producer(produced) => (produced, joined(consumer.await), true),
            Settled::Consumer(consumed) => (joined(producer.await), consumed, false),
        };

        match (produced, consumed) {
            (Ok(()), Ok(exported)) => Ok(exported),
            (Err(e), Ok(_)) => Err(e),
            (Ok(()), Err(e)) => Err(e),
            (Err(producer_err), Err(consumer_err)) => {
                let (first, second) = if producer_first {
                    (producer_err, consumer_err)
                } else {
                    (consumer_err, producer_err)
                };
                warn!("Dropping later pipeline error: {}", second);
                Err(first)
            }
        }
    }
}

enum Settled {
    Producer(Result<()>),
    Consumer(Result<u64>),
}

fn joined<T>(outcome: std::result::Result<Result<T>, JoinError>) -> Result<T> {
    outcome.unwrap_or_else(|e| Err(DumpError::from(e)))
}
