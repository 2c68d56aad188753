//! Command-line interface for esdump
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and flag overrides
//! - Query descriptor construction from flags
//! - Command dispatch (`export`, `count`)

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::{EsClient, count_matches};
use crate::config::Config;
use crate::error::{DumpError, Result, ValidationError};
use crate::export::{ExportPipeline, OutputFormat, file_sink};
use crate::extract::ExtractMode;
use crate::query::{BoolQuery, QueryDescriptor, parse_timestamp};

/// Time-windowed bulk export from an Elasticsearch-compatible cluster
#[derive(Parser, Debug)]
#[command(
    name = "esdump",
    version,
    about = "Bulk export from Elasticsearch past the 10,000-hit result window",
    long_about = "Exports every document matching a query over a time range, walking the range in
buckets or through a scroll session, and streams them to CSV or JSON Lines."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Cluster address, may be repeated (tried in order)
    #[arg(long = "host", value_name = "URL", global = true)]
    pub hosts: Vec<String>,

    /// Username for basic authentication
    #[arg(short = 'u', long, value_name = "USERNAME", global = true)]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(short = 'p', long, value_name = "PASSWORD", global = true)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Verbose mode (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Export matching documents to a file
    Export(ExportArgs),

    /// Print the number of matching documents
    Count(QueryArgs),
}

/// Query selection shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Index, alias or pattern to search, may be repeated
    #[arg(short = 'i', long = "index", value_name = "INDEX", required = true)]
    pub indices: Vec<String>,

    /// Timestamp field the range applies to
    #[arg(short = 't', long, value_name = "FIELD")]
    pub time_field: String,

    /// Range start, inclusive (RFC 3339, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DD`, UTC)
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub start: DateTime<Utc>,

    /// Range end, exclusive
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub end: DateTime<Utc>,

    /// Bucket width for windowed modes (`90s`, `30m`, `6h`, `1d`, `2w`)
    #[arg(long, value_name = "DURATION", value_parser = parse_step)]
    pub step: Option<TimeDelta>,

    /// Extra bool-query clauses as JSON (`{"filter": [...], "must_not": [...]}`)
    #[arg(long, value_name = "JSON", value_parser = parse_condition)]
    pub condition: Option<BoolQuery>,

    /// Aggregations carried verbatim in the request body, as a JSON object
    #[arg(long, value_name = "JSON", value_parser = parse_object)]
    pub aggs: Option<Map<String, Value>>,

    /// Documents per scroll page
    #[arg(long, value_name = "N")]
    pub page_size: Option<usize>,

    /// Hits requested per windowed search (at most 10000)
    #[arg(long, value_name = "N")]
    pub search_size: Option<usize>,

    /// Lifetime of the initial scroll session (`3m`, `180s`)
    #[arg(long, value_name = "DURATION", value_parser = parse_step)]
    pub scroll_ttl: Option<TimeDelta>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    #[command(flatten)]
    pub query: QueryArgs,

    /// Output file
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: PathBuf,

    /// Output format (csv, jsonl); guessed from the file extension when omitted
    #[arg(short = 'f', long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Extraction mode (scroll, window, batch, auto)
    #[arg(short = 'm', long, value_name = "MODE", default_value_t = ExtractMode::Auto)]
    pub mode: ExtractMode,

    /// Capacity of the queue between extraction and the writer
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,

    /// Rows per write in batch mode
    #[arg(long, value_name = "N")]
    pub batch_size: Option<usize>,

    /// Pause between scroll pages in milliseconds
    #[arg(long, value_name = "MS")]
    pub throttle_ms: Option<u64>,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// CLI interface handler
pub struct CliInterface {
    args: CliArgs,
    config: Config,
}

impl CliInterface {
    /// Parse arguments and load configuration
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    pub fn from_args(args: CliArgs) -> Result<Self> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;
        Self::apply_args_to_config(&mut config, &args);
        config.validate()?;
        Ok(Self { args, config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Run the selected subcommand.
    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Commands::Count(query_args) => self.run_count(query_args).await,
            Commands::Export(export_args) => self.run_export(export_args).await,
        }
    }

    async fn run_count(&self, query_args: &QueryArgs) -> Result<()> {
        let query = self.build_query(query_args)?;
        let client = EsClient::connect(&self.config.connection).await?;
        let count = count_matches(&client, &query).await?;
        println!("{}", count);
        Ok(())
    }

    async fn run_export(&self, export_args: &ExportArgs) -> Result<()> {
        let query = Arc::new(self.build_query(&export_args.query)?);
        let format = export_args
            .format
            .or_else(|| OutputFormat::from_path(&export_args.output))
            .unwrap_or_default();
        let client = EsClient::connect(&self.config.connection).await?;

        let cancel = CancellationToken::new();
        let ctrl_c = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        warn!("Interrupted, stopping export");
                        cancel.cancel();
                    }
                    Err(err) => eprintln!("Failed to listen for Ctrl+C: {}", err),
                }
            })
        };

        let export = &self.config.export;
        let outcome = ExportPipeline::new(Arc::new(client), query)
            .with_mode(export_args.mode)
            .with_queue_capacity(export.queue_capacity)
            .with_batch_size(export.batch_size)
            .with_throttle(export.throttle())
            .with_progress(!export_args.no_progress)
            .with_cancellation(cancel)
            .run(file_sink(format, &export_args.output))
            .await;
        ctrl_c.abort();

        let result = outcome?;
        println!(
            "{} {} of {} documents to {} ({} mode, {} ms)",
            if result.cancelled { "Cancelled after exporting" } else { "Exported" },
            result.documents_exported,
            result.total_matches,
            export_args.output.display(),
            result.mode,
            result.elapsed_ms
        );
        Ok(())
    }

    /// Turn query flags into a validated descriptor, filling unset sizes from the config.
    pub fn build_query(&self, args: &QueryArgs) -> Result<QueryDescriptor> {
        let export = &self.config.export;
        let scroll_ttl = match args.scroll_ttl {
            Some(ttl) => ttl.to_std().map_err(|_| {
                DumpError::from(ValidationError::InvalidValue {
                    field: "scroll_ttl",
                    reason: "must be a positive duration".to_string(),
                })
            })?,
            None => export.scroll_ttl(),
        };

        let mut builder = QueryDescriptor::builder()
            .indices(args.indices.iter().cloned())
            .time_field(&args.time_field)
            .start(args.start)
            .end(args.end)
            .page_size(args.page_size.unwrap_or(export.page_size))
            .search_size(args.search_size.unwrap_or(export.search_size))
            .scroll_ttl(scroll_ttl);
        if let Some(step) = args.step {
            builder = builder.step(step);
        }
        if let Some(condition) = &args.condition {
            builder = builder.condition(condition.clone());
        }
        if let Some(aggs) = &args.aggs {
            builder = builder.aggs(aggs.clone());
        }

        let query = builder.build()?;
        debug!(
            "Query body: {}",
            String::from_utf8_lossy(query.encoded_body())
        );
        Ok(query)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        if !args.hosts.is_empty() {
            config.connection.hosts = args.hosts.clone();
        }
        if let Some(username) = &args.username {
            config.connection.username = Some(username.clone());
        }
        if let Some(password) = &args.password {
            config.connection.password = Some(password.clone());
        }
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
        if let Commands::Export(export) = &args.command {
            if let Some(capacity) = export.queue_capacity {
                config.export.queue_capacity = capacity;
            }
            if let Some(size) = export.batch_size {
                config.export.batch_size = size;
            }
            if let Some(throttle) = export.throttle_ms {
                config.export.throttle_ms = throttle;
            }
        }
    }
}

fn parse_time(input: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(input).ok_or_else(|| format!("unrecognised timestamp '{input}'"))
}

/// Parse `<n><unit>` with unit `s`, `m`, `h`, `d` or `w`.
pub fn parse_step(input: &str) -> std::result::Result<TimeDelta, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("missing unit in '{input}' (use s, m, h, d or w)"))?;
    let (digits, unit) = input.split_at(split);
    let n: i64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{input}'"))?;
    if n == 0 {
        return Err("duration must be greater than zero".to_string());
    }
    let delta = match unit {
        "s" => TimeDelta::try_seconds(n),
        "m" => TimeDelta::try_minutes(n),
        "h" => TimeDelta::try_hours(n),
        "d" => TimeDelta::try_days(n),
        "w" => TimeDelta::try_weeks(n),
        _ => return Err(format!("unknown unit '{unit}' (use s, m, h, d or w)")),
    };
    delta.ok_or_else(|| format!("duration '{input}' is out of range"))
}

/// Accepts a bare bool query, `{"bool": {...}}` or `{"query": {"bool": {...}}}`.
fn parse_condition(input: &str) -> std::result::Result<BoolQuery, String> {
    let mut value: Value =
        serde_json::from_str(input).map_err(|e| format!("invalid JSON: {e}"))?;
    for wrapper in ["query", "bool"] {
        if let Some(inner) = value.get_mut(wrapper) {
            value = inner.take();
        }
    }
    serde_json::from_value(value).map_err(|e| format!("invalid bool query: {e}"))
}

fn parse_object(input: &str) -> std::result::Result<Map<String, Value>, String> {
    match serde_json::from_str(input) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {e}")),
    }
}
