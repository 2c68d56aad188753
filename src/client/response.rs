//! Wire model of search, scroll and count responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::{WINDOW_CAP, timestamp_from_value};

/// A document source: string keys, heterogeneous JSON values.
pub type Row = Map<String, Value>;

/// One hit as returned by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_index", default)]
    pub index: String,
    /// `null` when the search is sorted.
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Row,
}

impl Document {
    /// Look up a source value by dotted path (`a.b.c` walks nested objects).
    pub fn field(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.source.get(path) {
            return Some(value);
        }
        let mut parts = path.split('.');
        let mut current = self.source.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    pub fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.field(field).and_then(timestamp_from_value)
    }

    pub fn into_row(self) -> Row {
        self.source
    }
}

/// Whether `hits.total.value` is exact or was capped by the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TotalRelation {
    #[default]
    #[serde(rename = "eq")]
    Exact,
    #[serde(rename = "gte")]
    LowerBound,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Total {
    #[serde(default)]
    pub value: u64,
    #[serde(default)]
    pub relation: TotalRelation,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Total,
    #[serde(default)]
    pub hits: Vec<Document>,
}

/// Body of a `_search` or `_search/scroll` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub hits: Hits,
}

/// Body of a `_count` response.
#[derive(Debug, Clone, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// One page of results, as handed to extractors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub total: u64,
    pub relation: TotalRelation,
    pub documents: Vec<Document>,
    /// Present when the page belongs to a scroll session.
    pub scroll_id: Option<String>,
}

impl SearchPage {
    /// The cluster stopped counting at the window cap: matches may be missing from this page.
    pub fn hit_window_cap(&self) -> bool {
        self.relation == TotalRelation::LowerBound && self.total >= WINDOW_CAP
    }

    /// More documents match than this page delivered.
    pub fn is_truncated(&self) -> bool {
        self.hit_window_cap() || (self.documents.len() as u64) < self.total
    }
}

impl From<SearchResponse> for SearchPage {
    fn from(response: SearchResponse) -> Self {
        Self {
            total: response.hits.total.value,
            relation: response.hits.total.relation,
            documents: response.hits.hits,
            scroll_id: response.scroll_id.filter(|id| !id.is_empty()),
        }
    }
}
