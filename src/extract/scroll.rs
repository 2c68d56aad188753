//! Scroll-session extraction.
//!
//! `INIT -> OPEN -> DRAINING -> CLOSED`: the initial search opens a session,
//! every following page renews it, and the session is cleared exactly once on
//! the way out, whatever the reason for leaving.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Extractor, emit_all};
use crate::client::{Document, SearchTransport};
use crate::error::Result;
use crate::query::QueryDescriptor;

/// Lifetime requested on every page after the first.
pub const SCROLL_KEEP_ALIVE: Duration = Duration::from_secs(180);

/// Pause between page fetches.
pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(1);

/// A live server-side cursor. Dropping it without [`release`](Self::release) leaks it
/// until its lifetime runs out.
#[derive(Debug)]
struct ScrollSession {
    cursor_id: String,
    ttl: Duration,
}

impl ScrollSession {
    async fn release(self, transport: &dyn SearchTransport) -> Result<()> {
        debug!("Clearing scroll {}", self.cursor_id);
        transport.clear_scroll(&self.cursor_id).await
    }
}

/// Drains the full descriptor range through one scroll session.
pub struct ScrollExtractor {
    transport: Arc<dyn SearchTransport>,
    query: Arc<QueryDescriptor>,
    throttle: Duration,
}

impl ScrollExtractor {
    pub fn new(transport: Arc<dyn SearchTransport>, query: Arc<QueryDescriptor>) -> Self {
        Self {
            transport,
            query,
            throttle: DEFAULT_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    async fn drain(
        &self,
        first_page: Vec<Document>,
        session: &mut ScrollSession,
        tx: &mpsc::Sender<Document>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if first_page.is_empty() {
            return Ok(0);
        }
        let mut emitted = first_page.len() as u64;
        if !emit_all(tx, first_page).await {
            return Ok(emitted);
        }

        loop {
            if cancel.is_cancelled() {
                debug!("Scroll cancelled after {} documents", emitted);
                break;
            }

            let page = self
                .transport
                .scroll(&session.cursor_id, session.ttl)
                .await?;
            if let Some(next) = page.scroll_id {
                session.cursor_id = next;
            }
            if page.documents.is_empty() {
                break;
            }

            emitted += page.documents.len() as u64;
            if !emit_all(tx, page.documents).await {
                break;
            }
            debug!("Scrolled {} documents so far", emitted);

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.throttle) => {}
            }
        }
        Ok(emitted)
    }
}

#[async_trait]
impl Extractor for ScrollExtractor {
    async fn extract(
        &self,
        tx: &mpsc::Sender<Document>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let body = self.query.body().clone().with_size(self.query.page_size());
        let first = self
            .transport
            .search(self.query.indices(), &body, Some(self.query.scroll_ttl()))
            .await?;

        let Some(cursor_id) = first.scroll_id else {
            // no session was opened, nothing to release
            emit_all(tx, first.documents).await;
            return Ok(());
        };

        let mut session = ScrollSession {
            cursor_id,
            ttl: SCROLL_KEEP_ALIVE,
        };
        let drained = self.drain(first.documents, &mut session, tx, cancel).await;
        let released = session.release(self.transport.as_ref()).await;

        match (drained, released) {
            (Err(e), Err(release_err)) => {
                warn!("Failed to clear scroll after extraction error: {}", release_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(count), released) => {
                info!("Scroll finished, {} documents extracted", count);
                released
            }
        }
    }

    fn name(&self) -> &'static str {
        "scroll"
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::error::DumpError;
    use crate::testing::{MockCluster, at, docs_every};

    const FIELD: &str = "ts";

    fn query(page_size: usize) -> Arc<QueryDescriptor> {
        Arc::new(
            QueryDescriptor::builder()
                .index("logs")
                .time_field(FIELD)
                .start(at(0))
                .end(at(3600))
                .page_size(page_size)
                .build()
                .unwrap(),
        )
    }

    async fn run(
        cluster: Arc<MockCluster>,
        page_size: usize,
        cancel: CancellationToken,
    ) -> (Result<()>, Vec<Document>) {
        let extractor = ScrollExtractor::new(cluster, query(page_size)).with_throttle(Duration::ZERO);
        let (tx, mut rx) = mpsc::channel(1024);
        let result = extractor.extract(&tx, &cancel).await;
        drop(tx);
        let mut docs = Vec::new();
        while let Some(doc) = rx.recv().await {
            docs.push(doc);
        }
        (result, docs)
    }

    #[tokio::test]
    async fn test_drains_all_pages_and_releases_once() {
        let cluster = Arc::new(MockCluster::new(FIELD, docs_every(25, FIELD, 60)));
        let (result, docs) = run(cluster.clone(), 10, CancellationToken::new()).await;

        assert_ok!(result);
        assert_eq!(docs.len(), 25);
        // 10 + 10 + 5, then one empty page
        assert_eq!(cluster.scroll_calls(), 3);
        assert_eq!(cluster.cleared().len(), 1);
        assert_eq!(cluster.searches()[0].size, Some(10));
    }

    #[tokio::test]
    async fn test_failed_open_releases_nothing() {
        let mut cluster = MockCluster::new(FIELD, docs_every(5, FIELD, 60));
        cluster.fail_search_at = Some(1);
        let cluster = Arc::new(cluster);
        let (result, docs) = run(cluster.clone(), 2, CancellationToken::new()).await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert!(docs.is_empty());
        assert!(cluster.cleared().is_empty());
    }

    #[tokio::test]
    async fn test_page_error_still_releases_and_wins_over_release_error() {
        let mut cluster = MockCluster::new(FIELD, docs_every(30, FIELD, 60));
        cluster.fail_scroll_at = Some(2);
        cluster.fail_clear = true;
        let cluster = Arc::new(cluster);
        let (result, docs) = run(cluster.clone(), 10, CancellationToken::new()).await;

        let err = result.unwrap_err();
        assert!(matches!(err, DumpError::Response { status: 500, .. }));
        assert_eq!(docs.len(), 20);
        assert_eq!(cluster.cleared().len(), 1);
    }

    #[tokio::test]
    async fn test_release_error_reported_after_clean_drain() {
        let mut cluster = MockCluster::new(FIELD, docs_every(3, FIELD, 60));
        cluster.fail_clear = true;
        let cluster = Arc::new(cluster);
        let (result, docs) = run(cluster.clone(), 10, CancellationToken::new()).await;

        assert_err!(result);
        assert_eq!(docs.len(), 3);
    }

    #[tokio::test]
    async fn test_cancellation_skips_fetches_but_releases() {
        let cluster = Arc::new(MockCluster::new(FIELD, docs_every(30, FIELD, 60)));
        let extractor =
            ScrollExtractor::new(cluster.clone(), query(10)).with_throttle(Duration::ZERO);
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let consumer = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let first = rx.recv().await;
                cancel.cancel();
                let mut rest = 0;
                while rx.recv().await.is_some() {
                    rest += 1;
                }
                (first, rest)
            })
        };

        extractor.extract(&tx, &cancel).await.unwrap();
        drop(tx);
        let (first, rest) = consumer.await.unwrap();

        assert!(first.is_some());
        assert!(rest < 10, "first page at most, got {rest} more");
        assert_eq!(cluster.scroll_calls(), 0);
        assert_eq!(cluster.cleared().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_receiver_stops_and_releases() {
        let cluster = Arc::new(MockCluster::new(FIELD, docs_every(30, FIELD, 60)));
        let extractor =
            ScrollExtractor::new(cluster.clone(), query(10)).with_throttle(Duration::ZERO);
        let (tx, rx) = mpsc::channel(4);
        drop(rx);

        extractor
            .extract(&tx, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(cluster.scroll_calls(), 0);
        assert_eq!(cluster.cleared().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_result_releases_without_scrolling() {
        let cluster = Arc::new(MockCluster::new(FIELD, vec![]));
        let (result, docs) = run(cluster.clone(), 10, CancellationToken::new()).await;
        assert_ok!(result);
        assert!(docs.is_empty());
        assert_eq!(cluster.scroll_calls(), 0);
        assert_eq!(cluster.cleared(), vec!["cursor-1".to_string()]);
    }
}
