//! Raw schema adapter: parse/validate raw catalog and event payloads.
//!
//! Extraction is field-name-keyed with per-field presence validation;
//! unknown fields are ignored, and optional numeric/string fields default
//! to null — never zero. `year` is required, with `0` meaning "release
//! year unknown" (a real value supplied by the source, not a default).
//!
//! Parsing is pure: no side effects, no partial ingestion. A malformed
//! event line rejects the entire batch, since log batches are expected
//! well-formed.

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Action marker for qualifying interaction events. Events with any other
/// `page` value are dropped before dimension/fact derivation.
pub const PLAY_ACTION: &str = "NextSong";

/// One catalog metadata record (one JSON object per source file).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCatalogRecord {
    /// Source item identifier.
    pub item_id: String,
    /// Creator natural key.
    pub creator_id: String,
    /// Creator display name.
    pub creator_name: String,
    /// Creator location, if known.
    #[serde(default)]
    pub creator_location: Option<String>,
    /// Creator latitude, if known.
    #[serde(default)]
    pub creator_latitude: Option<f64>,
    /// Creator longitude, if known.
    #[serde(default)]
    pub creator_longitude: Option<f64>,
    /// Item title.
    pub title: String,
    /// Item duration in seconds.
    pub duration: f64,
    /// Release year; `0` means unknown.
    pub year: i32,
    /// Item count in the source payload, if present.
    #[serde(default)]
    pub num_items: Option<i32>,
}

/// One interaction log record (one JSON object per log line).
///
/// Only `page` and `ts` are required at parse time: non-qualifying pages
/// (auth, navigation) legitimately omit playback fields. Fields that are
/// mandatory on qualifying rows are enforced by the builders.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEventRecord {
    /// Action/page type; see [`PLAY_ACTION`].
    pub page: String,
    /// Actor identifier.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Actor first name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Actor last name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Actor gender.
    #[serde(default)]
    pub gender: Option<String>,
    /// Subscription level at event time.
    #[serde(default)]
    pub level: Option<String>,
    /// Session identifier.
    #[serde(default)]
    pub session_id: Option<i64>,
    /// Geographic location string.
    #[serde(default)]
    pub location: Option<String>,
    /// Client-agent string.
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Played item title.
    #[serde(default)]
    pub title: Option<String>,
    /// Played item's creator name.
    #[serde(default)]
    pub creator_name: Option<String>,
    /// Played duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    /// Event timestamp, epoch milliseconds.
    pub ts: i64,
}

impl RawEventRecord {
    /// Returns true if this event carries the qualifying action marker.
    #[must_use]
    pub fn is_play(&self) -> bool {
        self.page == PLAY_ACTION
    }
}

/// Parses one catalog record payload.
///
/// # Errors
///
/// Returns [`PipelineError::Schema`] if the payload is not a JSON object of
/// the expected shape.
pub fn parse_catalog_record(payload: &[u8]) -> Result<RawCatalogRecord> {
    serde_json::from_slice(payload).map_err(|e| PipelineError::Schema {
        message: format!("catalog record: {e}"),
    })
}

/// Parses an event log batch: one JSON object per line.
///
/// The whole batch is rejected on the first malformed or blank line — there
/// is no per-line skip.
///
/// # Errors
///
/// Returns [`PipelineError::Schema`] naming the offending line number.
pub fn parse_event_batch(payload: &[u8]) -> Result<Vec<RawEventRecord>> {
    let text = std::str::from_utf8(payload).map_err(|e| PipelineError::Schema {
        message: format!("event batch is not UTF-8: {e}"),
    })?;

    let mut records = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let lineno = idx + 1;
        if line.trim().is_empty() {
            return Err(PipelineError::Schema {
                message: format!("event batch line {lineno}: blank line"),
            });
        }
        let record: RawEventRecord =
            serde_json::from_str(line).map_err(|e| PipelineError::Schema {
                message: format!("event batch line {lineno}: {e}"),
            })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CATALOG: &str = r#"{
        "item_id": "S1", "creator_id": "C1", "creator_name": "Artist X",
        "creator_location": "Oakland, CA", "creator_latitude": 37.8,
        "creator_longitude": -122.27, "title": "Song A",
        "duration": 200.5, "year": 2005, "num_items": 1
    }"#;

    #[test]
    fn catalog_record_full_payload() {
        let record = parse_catalog_record(FULL_CATALOG.as_bytes()).expect("parse");
        assert_eq!(record.item_id, "S1");
        assert_eq!(record.creator_latitude, Some(37.8));
        assert_eq!(record.year, 2005);
    }

    #[test]
    fn catalog_record_missing_optionals_default_to_null() {
        let payload = r#"{"item_id":"S2","creator_id":"C2","creator_name":"B",
                          "title":"T","duration":10.0,"year":0}"#;
        let record = parse_catalog_record(payload.as_bytes()).expect("parse");
        assert_eq!(record.creator_location, None);
        assert_eq!(record.creator_latitude, None);
        assert_eq!(record.creator_longitude, None);
        assert_eq!(record.num_items, None);
        // year 0 is a real "unknown" value, not a default.
        assert_eq!(record.year, 0);
    }

    #[test]
    fn catalog_record_ignores_unknown_fields() {
        let payload = r#"{"item_id":"S3","creator_id":"C3","creator_name":"B",
                          "title":"T","duration":10.0,"year":1999,
                          "extra_field":"ignored","another":42}"#;
        assert!(parse_catalog_record(payload.as_bytes()).is_ok());
    }

    #[test]
    fn catalog_record_missing_required_field_is_schema_error() {
        let payload = r#"{"item_id":"S4","creator_id":"C4","creator_name":"B",
                          "title":"T","year":1999}"#;
        let err = parse_catalog_record(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn event_batch_parses_sparse_non_play_lines() {
        let payload = concat!(
            r#"{"page":"Home","ts":1541121934796,"user_id":"U1"}"#,
            "\n",
            r#"{"page":"NextSong","ts":1541121934796,"user_id":"U1","level":"free","session_id":583,"title":"Song A","creator_name":"Artist X","duration":200.5}"#,
            "\n",
        );
        let records = parse_event_batch(payload.as_bytes()).expect("parse");
        assert_eq!(records.len(), 2);
        assert!(!records[0].is_play());
        assert!(records[1].is_play());
        assert_eq!(records[0].title, None);
    }

    #[test]
    fn malformed_line_fails_whole_batch() {
        let payload = concat!(
            r#"{"page":"Home","ts":1}"#,
            "\n",
            "not json at all",
            "\n",
            r#"{"page":"Home","ts":2}"#,
        );
        let err = parse_event_batch(payload.as_bytes()).unwrap_err();
        let PipelineError::Schema { message } = err else {
            panic!("expected schema error");
        };
        assert!(message.contains("line 2"));
    }

    #[test]
    fn blank_interior_line_fails_whole_batch() {
        let payload = concat!(r#"{"page":"Home","ts":1}"#, "\n", "\n", r#"{"page":"Home","ts":2}"#);
        let err = parse_event_batch(payload.as_bytes()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema { .. }));
    }

    #[test]
    fn trailing_newline_is_not_a_blank_line() {
        let payload = concat!(r#"{"page":"Home","ts":1}"#, "\n");
        let records = parse_event_batch(payload.as_bytes()).expect("parse");
        assert_eq!(records.len(), 1);
    }
}
