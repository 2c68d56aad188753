//! Extraction engine.
//!
//! Three ways to walk a [`QueryDescriptor`](crate::query::QueryDescriptor):
//!
//! - [`ScrollExtractor`] drains one server-side scroll session.
//! - [`WindowedExtractor`] walks the time range bucket by bucket with plain
//!   searches, narrowing a bucket whenever a page comes back truncated.
//! - [`QueryIterator`] runs the same bucket walk behind a pull interface.
//!
//! Push extractors never see the sink: they send documents into a bounded
//! channel and stop early when the receiving side goes away or the
//! cancellation token fires.

pub mod bucket;
pub mod iterator;
pub mod scroll;
pub mod windowed;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::Document;
use crate::error::Result;
use crate::query::WINDOW_CAP;

pub use bucket::BucketCursor;
pub use iterator::QueryIterator;
pub use scroll::ScrollExtractor;
pub use windowed::WindowedExtractor;

/// How a run walks the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// One scroll session over the whole range.
    Scroll,
    /// Bucketed searches pushed through the pipeline.
    Window,
    /// Bucketed searches pulled by [`QueryIterator`] and loaded in batches.
    Batch,
    /// `Scroll` below the window cap, `Window` at or above it.
    #[default]
    Auto,
}

impl ExtractMode {
    /// Replace `Auto` with a concrete mode for a result set of `count` matches.
    pub fn resolve(self, count: u64) -> Self {
        match self {
            ExtractMode::Auto if count < WINDOW_CAP => ExtractMode::Scroll,
            ExtractMode::Auto => ExtractMode::Window,
            other => other,
        }
    }
}

impl FromStr for ExtractMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scroll" => Ok(ExtractMode::Scroll),
            "window" | "windowed" => Ok(ExtractMode::Window),
            "batch" => Ok(ExtractMode::Batch),
            "auto" => Ok(ExtractMode::Auto),
            other => Err(format!(
                "unknown mode '{other}', expected scroll, window, batch or auto"
            )),
        }
    }
}

impl fmt::Display for ExtractMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExtractMode::Scroll => "scroll",
            ExtractMode::Window => "window",
            ExtractMode::Batch => "batch",
            ExtractMode::Auto => "auto",
        };
        f.write_str(name)
    }
}

/// Push-based extraction into a bounded channel.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Send every matching document into `tx`, in extraction order.
    ///
    /// Returns `Ok(())` when the result set is exhausted, when `cancel` fires,
    /// or when the receiver has been dropped.
    async fn extract(&self, tx: &mpsc::Sender<Document>, cancel: &CancellationToken)
    -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Send a page of documents. `false` means the receiver is gone.
pub(crate) async fn emit_all(tx: &mpsc::Sender<Document>, documents: Vec<Document>) -> bool {
    for doc in documents {
        if tx.send(doc).await.is_err() {
            return false;
        }
    }
    true
}
