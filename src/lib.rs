//! esdump library
//!
//! Extracts time-ordered document sets from an Elasticsearch-compatible
//! cluster whose searches cap out at 10,000 hits, and streams them to a sink
//! without holding the result set in memory.
//!
//! # Modules
//!
//! - `query`: query descriptor, request body model, timestamps
//! - `client`: transport seam, HTTP client, request executor, wire model
//! - `extract`: scroll and windowed extractors, pull iterator
//! - `export`: streaming pipeline, batch runner, sinks, progress
//! - `config`: TOML configuration
//! - `error`: error types
//! - `cli`: command-line interface

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod query;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Document, EsClient, SearchTransport};
pub use config::Config;
pub use error::{DumpError, Result};
pub use export::{ExportPipeline, ExportResult, Sink};
pub use extract::{ExtractMode, QueryIterator};
pub use query::QueryDescriptor;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
