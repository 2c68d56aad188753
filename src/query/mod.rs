//! Query descriptor: what to extract and how to page through it.
//!
//! A [`QueryDescriptor`] is built once through [`QueryBuilder`], validated in a
//! single step at [`QueryBuilder::build`], and never mutated afterwards.
//! Extractors derive per-bucket bodies from it with
//! [`QueryDescriptor::with_sub_range`], which works on a copy.

pub mod body;
pub mod time;

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::error::{Result, ValidationError};

pub use body::{BoolQuery, CountBody, Query, SearchBody, range_clause};
pub use time::{TIMESTAMP_FORMAT, format_timestamp, parse_timestamp, timestamp_from_value};

/// Largest result window a single query may count or return exactly.
pub const WINDOW_CAP: u64 = 10_000;

/// Documents per scroll page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Lifetime requested when opening a scroll session.
pub const DEFAULT_SCROLL_TTL: Duration = Duration::from_secs(180);

/// Immutable extraction request.
#[derive(Debug, Clone)]
pub struct QueryDescriptor {
    indices: Vec<String>,
    time_field: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: TimeDelta,
    page_size: usize,
    search_size: usize,
    scroll_ttl: Duration,
    body: SearchBody,
    encoded: Vec<u8>,
}

impl QueryDescriptor {
    pub fn builder() -> QueryBuilder {
        QueryBuilder::default()
    }

    pub fn indices(&self) -> &[String] {
        &self.indices
    }

    pub fn time_field(&self) -> &str {
        &self.time_field
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Bucket width. Equals the whole range when no step was configured.
    pub fn step(&self) -> TimeDelta {
        self.step
    }

    /// Documents per scroll page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Hits requested by each windowed search.
    pub fn search_size(&self) -> usize {
        self.search_size
    }

    pub fn scroll_ttl(&self) -> Duration {
        self.scroll_ttl
    }

    /// Base body covering the full `[start, end)` range.
    pub fn body(&self) -> &SearchBody {
        &self.body
    }

    /// Base body as sent on the wire, serialized once at build time.
    pub fn encoded_body(&self) -> &[u8] {
        &self.encoded
    }

    /// Copy of the base body with the time-range filter replaced by `[start, end)`.
    ///
    /// User-supplied clauses, including the ones in `filter`, are left as they are.
    pub fn with_sub_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SearchBody {
        let mut body = self.body.clone();
        for clause in body.query.bool.filter.iter_mut() {
            if body::is_range_on(clause, &self.time_field) {
                *clause = range_clause(&self.time_field, &start, &end);
            }
        }
        body
    }
}

/// Builder for [`QueryDescriptor`]. Setters overwrite; validation happens in [`build`](Self::build).
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    indices: Vec<String>,
    time_field: Option<String>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    step: Option<TimeDelta>,
    page_size: Option<usize>,
    search_size: Option<usize>,
    scroll_ttl: Option<Duration>,
    condition: BoolQuery,
    aggs: Option<Map<String, Value>>,
}

impl QueryBuilder {
    /// Add an index (or alias / pattern) to search. Duplicates are ignored.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        let index = index.into();
        if !self.indices.contains(&index) {
            self.indices.push(index);
        }
        self
    }

    pub fn indices<I, S>(self, indices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        indices.into_iter().fold(self, |builder, index| builder.index(index))
    }

    pub fn time_field(mut self, field: impl Into<String>) -> Self {
        self.time_field = Some(field.into());
        self
    }

    pub fn start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    pub fn end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn step(mut self, step: TimeDelta) -> Self {
        self.step = Some(step);
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn search_size(mut self, size: usize) -> Self {
        self.search_size = Some(size);
        self
    }

    pub fn scroll_ttl(mut self, ttl: Duration) -> Self {
        self.scroll_ttl = Some(ttl);
        self
    }

    /// Merge a user condition into the clauses set so far.
    pub fn condition(mut self, condition: BoolQuery) -> Self {
        self.condition.merge(condition);
        self
    }

    pub fn filter(mut self, clause: Value) -> Self {
        self.condition.filter.push(clause);
        self
    }

    pub fn must(mut self, clause: Value) -> Self {
        self.condition.must.push(clause);
        self
    }

    pub fn must_not(mut self, clause: Value) -> Self {
        self.condition.must_not.push(clause);
        self
    }

    pub fn should(mut self, clause: Value) -> Self {
        self.condition.should.push(clause);
        self
    }

    pub fn aggs(mut self, aggs: Map<String, Value>) -> Self {
        self.aggs = Some(aggs);
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> Result<QueryDescriptor> {
        let time_field = self
            .time_field
            .filter(|field| !field.trim().is_empty())
            .ok_or(ValidationError::MissingField("time_field"))?;
        let start = self.start.ok_or(ValidationError::MissingField("start_time"))?;
        let end = self.end.ok_or(ValidationError::MissingField("end_time"))?;
        if start >= end {
            return Err(ValidationError::EmptyRange {
                start: format_timestamp(&start),
                end: format_timestamp(&end),
            }
            .into());
        }

        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(invalid("page_size", "must be greater than zero"));
        }
        let search_size = self.search_size.unwrap_or(WINDOW_CAP as usize);
        if search_size == 0 || search_size as u64 > WINDOW_CAP {
            return Err(invalid(
                "search_size",
                format!("must be between 1 and {WINDOW_CAP}"),
            ));
        }
        let step = match self.step {
            Some(step) if step <= TimeDelta::zero() => {
                return Err(invalid("step", "must be a positive duration"));
            }
            Some(step) => step,
            None => end - start,
        };

        let mut body = SearchBody {
            aggs: self.aggs,
            ..SearchBody::default()
        };
        body.query.bool = self.condition;
        body.query
            .bool
            .filter
            .push(range_clause(&time_field, &start, &end));
        let encoded = body.encode()?;

        Ok(QueryDescriptor {
            indices: self.indices,
            time_field,
            start,
            end,
            step,
            page_size,
            search_size,
            scroll_ttl: self.scroll_ttl.unwrap_or(DEFAULT_SCROLL_TTL),
            body,
            encoded,
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> crate::error::DumpError {
    ValidationError::InvalidValue {
        field,
        reason: reason.into(),
    }
    .into()
}
