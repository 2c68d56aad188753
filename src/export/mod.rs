//! Export runs: extraction wired to a sink.
//!
//! - [`ExportPipeline`] runs a push extractor and a sink as two concurrent
//!   tasks joined by a bounded queue (scroll and window modes, and batch mode
//!   by delegation).
//! - [`BatchExport`] pulls from a [`QueryIterator`](crate::extract::QueryIterator)
//!   and loads fixed-size batches on the caller's task.
//! - [`Sink`] is the consumer contract; [`CsvWriter`] and [`JsonLWriter`]
//!   implement it for files.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use esdump::client::EsClient;
//! use esdump::config::ConnectionConfig;
//! use esdump::export::{CsvWriter, ExportPipeline};
//! use esdump::query::{QueryDescriptor, parse_timestamp};
//!
//! # async fn run() -> esdump::error::Result<()> {
//! let client = EsClient::connect(&ConnectionConfig::default()).await?;
//! let query = QueryDescriptor::builder()
//!     .index("logs-*")
//!     .time_field("@timestamp")
//!     .start(parse_timestamp("2024-11-01").unwrap())
//!     .end(parse_timestamp("2024-11-02").unwrap())
//!     .build()?;
//!
//! let result = ExportPipeline::new(Arc::new(client), Arc::new(query))
//!     .run(Box::new(CsvWriter::new("logs.csv")))
//!     .await?;
//! println!("{} documents", result.documents_exported);
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod coordinator;
pub mod progress;
pub mod writers;

pub use batch::{BatchExport, Transform};
pub use coordinator::{ExportPipeline, ExportResult};
pub use progress::ProgressTracker;
pub use writers::{CsvWriter, JsonLWriter, OutputFormat, RowStream, Sink, file_sink};
