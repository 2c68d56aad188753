//! Request body model: `{query:{bool:{filter,must,must_not,should}}, size, sort, aggs}`.
//!
//! Clauses are opaque JSON documents. The only clause the crate ever inspects
//! is the synthetic time-range filter it injects itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::time::{format_timestamp, parse_timestamp};
use crate::error::{DumpError, Result};

/// Boolean query composition, carried verbatim to the cluster.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Value>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.must.is_empty()
            && self.must_not.is_empty()
            && self.should.is_empty()
    }

    /// Append every clause of `other`, keeping the existing ones first.
    pub fn merge(&mut self, other: BoolQuery) {
        self.filter.extend(other.filter);
        self.must.extend(other.must);
        self.must_not.extend(other.must_not);
        self.should.extend(other.should);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub bool: BoolQuery,
}

/// Search request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchBody {
    pub query: Query,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggs: Option<Map<String, Value>>,
}

/// The `_count` endpoint only accepts the query part of a body.
#[derive(Debug, Serialize)]
pub struct CountBody<'a> {
    pub query: &'a Query,
}

impl SearchBody {
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Sort ascending on `field`, replacing any previous sort.
    pub fn sorted_ascending(mut self, field: &str) -> Self {
        self.sort = vec![json!({ field: { "order": "asc" } })];
        self
    }

    pub fn count_body(&self) -> CountBody<'_> {
        CountBody { query: &self.query }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(DumpError::Encode)
    }

    /// Bounds of the range filter on `field`, if the body carries one.
    pub fn time_range(&self, field: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let clause = self
            .query
            .bool
            .filter
            .iter()
            .find(|clause| is_range_on(clause, field))?;
        let bounds = clause.get("range")?.get(field)?;
        let start = parse_timestamp(bounds.get("gte")?.as_str()?)?;
        let end = parse_timestamp(bounds.get("lt")?.as_str()?)?;
        Some((start, end))
    }
}

/// `{"range": {field: {"gte": start, "lt": end}}}` — inclusive lower, exclusive upper.
pub fn range_clause(field: &str, start: &DateTime<Utc>, end: &DateTime<Utc>) -> Value {
    json!({
        "range": {
            field: {
                "gte": format_timestamp(start),
                "lt": format_timestamp(end),
            }
        }
    })
}

pub(crate) fn is_range_on(clause: &Value, field: &str) -> bool {
    clause
        .get("range")
        .and_then(Value::as_object)
        .is_some_and(|range| range.contains_key(field))
}
