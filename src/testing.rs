//! In-memory cluster and sink doubles for extractor and export tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde_json::{Map, json};

use crate::client::{Document, Row, SearchPage, SearchTransport, TotalRelation};
use crate::error::{DumpError, Result};
use crate::export::Sink;
use crate::query::{SearchBody, WINDOW_CAP, format_timestamp};

/// `2024-11-07T00:00:00Z` plus `secs` seconds.
pub(crate) fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 7, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

pub(crate) fn doc_at(n: usize, field: &str, secs: i64) -> Document {
    doc_stamped(n, field, &format_timestamp(&at(secs)))
}

/// Document whose time field holds `stamp` verbatim.
pub(crate) fn doc_stamped(n: usize, field: &str, stamp: &str) -> Document {
    let mut source = Map::new();
    source.insert(field.to_string(), json!(stamp));
    source.insert("n".to_string(), json!(n));
    Document {
        id: format!("doc-{n}"),
        index: "logs".to_string(),
        score: None,
        source,
    }
}

/// `count` documents, one every `spacing_secs` seconds starting at `at(0)`.
pub(crate) fn docs_every(count: usize, field: &str, spacing_secs: i64) -> Vec<Document> {
    (0..count)
        .map(|n| doc_at(n, field, n as i64 * spacing_secs))
        .collect()
}

pub(crate) fn server_error() -> DumpError {
    DumpError::Response {
        status: 500,
        body: json!({"error": {"type": "search_phase_execution_exception"}}),
    }
}

#[derive(Default)]
struct MockState {
    searches: Vec<SearchBody>,
    scroll_calls: usize,
    cleared: Vec<String>,
    cursors: HashMap<String, (usize, Vec<Document>)>,
    next_cursor: usize,
}

/// Honours the time-range filter, ascending order, `size`, window-cap
/// reporting and scroll sessions. Failures are injected by call number.
pub(crate) struct MockCluster {
    time_field: String,
    documents: Vec<Document>,
    state: Mutex<MockState>,
    pub fail_search_at: Option<usize>,
    pub fail_scroll_at: Option<usize>,
    pub fail_clear: bool,
}

impl MockCluster {
    pub(crate) fn new(time_field: &str, mut documents: Vec<Document>) -> Self {
        documents.sort_by_key(|doc| doc.timestamp(time_field));
        Self {
            time_field: time_field.to_string(),
            documents,
            state: Mutex::new(MockState::default()),
            fail_search_at: None,
            fail_scroll_at: None,
            fail_clear: false,
        }
    }

    pub(crate) fn searches(&self) -> Vec<SearchBody> {
        self.state.lock().unwrap().searches.clone()
    }

    pub(crate) fn scroll_calls(&self) -> usize {
        self.state.lock().unwrap().scroll_calls
    }

    pub(crate) fn cleared(&self) -> Vec<String> {
        self.state.lock().unwrap().cleared.clone()
    }

    fn matching(&self, body: &SearchBody) -> Vec<Document> {
        let range = body.time_range(&self.time_field);
        self.documents
            .iter()
            .filter(|doc| match (range, doc.timestamp(&self.time_field)) {
                (Some((start, end)), Some(ts)) => start <= ts && ts < end,
                (None, _) => true,
                (Some(_), None) => false,
            })
            .cloned()
            .collect()
    }

    fn open_cursor(state: &mut MockState, page_size: usize, remaining: Vec<Document>) -> String {
        state.next_cursor += 1;
        let id = format!("cursor-{}", state.next_cursor);
        state.cursors.insert(id.clone(), (page_size, remaining));
        id
    }
}

#[async_trait]
impl SearchTransport for MockCluster {
    async fn count(&self, _indices: &[String], body: &SearchBody) -> Result<u64> {
        Ok(self.matching(body).len() as u64)
    }

    async fn search(
        &self,
        _indices: &[String],
        body: &SearchBody,
        scroll: Option<Duration>,
    ) -> Result<SearchPage> {
        let mut state = self.state.lock().unwrap();
        state.searches.push(body.clone());
        if self.fail_search_at == Some(state.searches.len()) {
            return Err(server_error());
        }

        let mut matching = self.matching(body);
        let (total, relation) = if matching.len() as u64 >= WINDOW_CAP {
            (WINDOW_CAP, TotalRelation::LowerBound)
        } else {
            (matching.len() as u64, TotalRelation::Exact)
        };
        let size = body.size.unwrap_or(10).min(matching.len());
        let remaining = matching.split_off(size);
        let scroll_id = scroll.map(|_| Self::open_cursor(&mut state, size.max(1), remaining));

        Ok(SearchPage {
            total,
            relation,
            documents: matching,
            scroll_id,
        })
    }

    async fn scroll(&self, scroll_id: &str, _ttl: Duration) -> Result<SearchPage> {
        let mut state = self.state.lock().unwrap();
        state.scroll_calls += 1;
        if self.fail_scroll_at == Some(state.scroll_calls) {
            return Err(server_error());
        }
        let (page_size, mut documents) =
            state
                .cursors
                .remove(scroll_id)
                .ok_or_else(|| DumpError::Response {
                    status: 404,
                    body: json!({"error": "search_context_missing_exception"}),
                })?;
        let remaining = documents.split_off(page_size.min(documents.len()));
        let next = Self::open_cursor(&mut state, page_size, remaining);
        Ok(SearchPage {
            total: 0,
            relation: TotalRelation::Exact,
            documents,
            scroll_id: Some(next),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cleared.push(scroll_id.to_string());
        state.cursors.remove(scroll_id);
        if self.fail_clear {
            return Err(server_error());
        }
        Ok(())
    }
}

/// What a [`RecordingSink`] saw, kept behind an `Arc` so tests can inspect it
/// after the sink has been moved into a pipeline.
#[derive(Default)]
pub(crate) struct SinkLog {
    pub calls: Vec<&'static str>,
    pub rows: Vec<Row>,
    pub batch_sizes: Vec<usize>,
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub log: Arc<Mutex<SinkLog>>,
    pub fail_init: bool,
    pub fail_load: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> (Self, Arc<Mutex<SinkLog>>) {
        let sink = Self::default();
        let log = sink.log.clone();
        (sink, log)
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn init(&mut self) -> Result<()> {
        self.log.lock().unwrap().calls.push("init");
        if self.fail_init {
            return Err(DumpError::Sink("init refused".to_string()));
        }
        Ok(())
    }

    async fn load_batch(&mut self, rows: &[Row]) -> Result<usize> {
        let mut log = self.log.lock().unwrap();
        log.calls.push("load_batch");
        if self.fail_load {
            return Err(DumpError::Sink("disk full".to_string()));
        }
        log.batch_sizes.push(rows.len());
        log.rows.extend_from_slice(rows);
        Ok(rows.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().calls.push("close");
        Ok(())
    }
}
