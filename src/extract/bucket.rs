//! Bucket cursor shared by the windowed extractor and the pull iterator.

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use tracing::debug;

use crate::client::{Document, SearchPage};
use crate::error::{DumpError, Result};
use crate::query::{QueryDescriptor, format_timestamp};

/// `[start, end)` of the bucket being queried.
///
/// Both bounds only move forward and `end` never passes the range end. A
/// truncated page narrows the bucket (moves `start` up to the last timestamp
/// seen) instead of advancing to the next one.
#[derive(Debug, Clone)]
pub struct BucketCursor {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: TimeDelta,
    range_end: DateTime<Utc>,
    time_field: String,
}

impl BucketCursor {
    pub fn new(query: &QueryDescriptor) -> Self {
        let start = to_millis(query.start());
        let range_end = to_millis(query.end());
        Self {
            start,
            end: clamp_end(start, query.step(), range_end),
            step: query.step(),
            range_end,
            time_field: query.time_field().to_string(),
        }
    }

    /// Current bucket, or `None` once the range is exhausted.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        (self.start < self.end).then_some((self.start, self.end))
    }

    /// Consume the page fetched for the current bucket and move the cursor.
    ///
    /// Returns the documents to emit. When the page is truncated the trailing
    /// documents sharing the last timestamp are held back: the narrowed
    /// bucket starts at that timestamp (inclusive) and fetches them again.
    pub fn advance(&mut self, page: SearchPage) -> Result<Vec<Document>> {
        if !page.is_truncated() {
            self.start = self.end;
            self.end = clamp_end(self.start, self.step, self.range_end);
            return Ok(page.documents);
        }

        let mut documents = page.documents;
        let last = documents.last().ok_or_else(|| {
            DumpError::decode_msg(format!(
                "page reports {} matches but carries no documents",
                page.total
            ))
        })?;
        let boundary = last.timestamp(&self.time_field).map(to_millis).ok_or_else(|| {
            DumpError::decode_msg(format!(
                "document {} has no parsable `{}` value",
                last.id, self.time_field
            ))
        })?;
        if boundary < self.start {
            return Err(DumpError::decode_msg(format!(
                "document {} is timestamped {} before its bucket start {}",
                last.id,
                format_timestamp(&boundary),
                format_timestamp(&self.start)
            )));
        }

        let held = documents
            .iter()
            .rev()
            .take_while(|doc| doc.timestamp(&self.time_field).map(to_millis) == Some(boundary))
            .count();
        if held == documents.len() && boundary == self.start {
            return Err(DumpError::WindowStalled {
                timestamp: format_timestamp(&boundary),
            });
        }

        debug!(
            "Truncated page ({} of {} matches), narrowing bucket to {} ~ {}",
            documents.len(),
            page.total,
            format_timestamp(&boundary),
            format_timestamp(&self.end)
        );
        documents.truncate(documents.len() - held);
        self.start = boundary;
        Ok(documents)
    }
}

/// Bounds travel at millisecond precision, so ties are grouped at it too.
fn to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::milliseconds(1)).unwrap_or(ts)
}

fn clamp_end(start: DateTime<Utc>, step: TimeDelta, range_end: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_add_signed(step)
        .map_or(range_end, |end| end.min(range_end))
}
