//! Time-windowed extraction with plain searches.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{BucketCursor, Extractor, emit_all};
use crate::client::{Document, SearchTransport};
use crate::error::Result;
use crate::query::{QueryDescriptor, format_timestamp};

/// Walks the descriptor range in `step`-wide buckets, each fetched with one
/// ascending search of `search_size` hits.
pub struct WindowedExtractor {
    transport: Arc<dyn SearchTransport>,
    query: Arc<QueryDescriptor>,
}

impl WindowedExtractor {
    pub fn new(transport: Arc<dyn SearchTransport>, query: Arc<QueryDescriptor>) -> Self {
        Self { transport, query }
    }
}

#[async_trait]
impl Extractor for WindowedExtractor {
    async fn extract(
        &self,
        tx: &mpsc::Sender<Document>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut cursor = BucketCursor::new(&self.query);
        let mut emitted = 0u64;

        while let Some((start, end)) = cursor.window() {
            if cancel.is_cancelled() {
                debug!("Windowed extraction cancelled at {}", format_timestamp(&start));
                return Ok(());
            }

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
                "Bucket {} ~ {}: {} of {} matches",
                format_timestamp(&start),
                format_timestamp(&end),
                page.documents.len(),
                page.total
            );

            let documents = cursor.advance(page)?;
            emitted += documents.len() as u64;
            if !emit_all(tx, documents).await {
                return Ok(());
            }
        }

        info!("Windowed extraction finished, {} documents extracted", emitted);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "window"
    }
}
