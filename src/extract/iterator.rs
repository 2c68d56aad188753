//! Pull-based bucket walk.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::BucketCursor;
use crate::client::{Document, SearchTransport};
use crate::error::{DumpError, Result};
use crate::query::{QueryDescriptor, format_timestamp};

/// Has-next / value / error view over the windowed algorithm.
///
/// One page is buffered at a time. [`advance`](Self::advance) fetches
/// buckets until it finds a non-empty page or the range runs out; the first
/// error ends the sequence and is kept for [`last_error`](Self::last_error).
/// No scroll session is ever opened.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use esdump::client::SearchTransport;
/// # use esdump::extract::QueryIterator;
/// # use esdump::query::QueryDescriptor;
/// # async fn run(transport: Arc<dyn SearchTransport>, query: Arc<QueryDescriptor>) {
/// let mut iter = QueryIterator::new(transport, query, Default::default());
/// while iter.advance().await {
///     let doc = iter.current().unwrap();
///     println!("{}", doc.id);
/// }
/// if let Some(err) = iter.last_error() {
///     eprintln!("stopped early: {err}");
/// }
/// # }
/// ```
pub struct QueryIterator {
    transport: Arc<dyn SearchTransport>,
    query: Arc<QueryDescriptor>,
    cancel: CancellationToken,
    cursor: BucketCursor,
    buffer: VecDeque<Document>,
    error: Option<DumpError>,
    finished: bool,
}

impl QueryIterator {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        query: Arc<QueryDescriptor>,
        cancel: CancellationToken,
    ) -> Self {
        let cursor = BucketCursor::new(&query);
        Self {
            transport,
            query,
            cancel,
            cursor,
            buffer: VecDeque::new(),
            error: None,
            finished: false,
        }
    }

    /// `true` when a document is ready for [`current`](Self::current).
    pub async fn advance(&mut self) -> bool {
        loop {
            if !self.buffer.is_empty() {
                return true;
            }
            if self.finished {
                return false;
            }
            match self.fetch_next().await {
                Ok(true) => {}
                Ok(false) => self.finished = true,
                Err(e) => {
                    debug!("Iterator stopped: {}", e);
                    self.error = Some(e);
                    self.finished = true;
                }
            }
        }
    }

    /// Take the next buffered document. `None` unless the preceding
    /// [`advance`](Self::advance) returned `true`.
    pub fn current(&mut self) -> Option<Document> {
        self.buffer.pop_front()
    }

    pub fn last_error(&self) -> Option<&DumpError> {
        self.error.as_ref()
    }

    pub fn take_error(&mut self) -> Option<DumpError> {
        self.error.take()
    }

    /// Adapt into a stream that yields every document, then the stored
    /// error if the walk ended early.
    pub fn into_stream(self) -> impl Stream<Item = Result<Document>> {
        futures::stream::unfold(Some(self), |state| async move {
            let mut iter = state?;
            if iter.advance().await {
                let doc = iter.current()?;
                return Some((Ok(doc), Some(iter)));
            }
            iter.take_error().map(|e| (Err(e), None))
        })
    }

    /// Fetch one bucket into the buffer. `Ok(false)` once nothing is left.
    async fn fetch_next(&mut self) -> Result<bool> {
        if self.cancel.is_cancelled() {
            return Ok(false);
        }
        let Some((start, end)) = self.cursor.window() else {
            return Ok(false);
        };

        let body = self
            .query
            .with_sub_range(start, end)
            .with_size(self.query.search_size())
            .sorted_ascending(self.query.time_field());
        let page = self
            .transport
            .search(self.query.indices(), &body, None)
            .await?;
        debug!(
            "Iterator bucket {} ~ {}: {} documents",
            format_timestamp(&start),
            format_timestamp(&end),
            page.documents.len()
        );
        self.buffer.extend(self.cursor.advance(page)?);
        Ok(true)
    }
}
