use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::BorrowedFormatItem,
    macros::format_description,
};

use super::StoreError;

/// Layout used for persisted record timestamps (UTC).
pub const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

const DEFAULT_IMPORTANCE: f64 = 0.5;

/// A long-term memory block as persisted on disk and returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Generated identifier; also the file stem of the stored record.
    pub id: String,
    /// Stored text.
    pub content: String,
    /// Creation time formatted with [`TIMESTAMP_FORMAT`].
    pub timestamp: String,
    /// Caller-supplied weight in `[0.0, 1.0]`.
    pub importance: f64,
    /// Optional keywords carried by imported blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    /// Optional tags carried by imported blocks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl MemoryRecord {
    /// Normalize a loosely shaped block into the standard record form.
    ///
    /// Text is read from `context` first, then `content`. Missing fields fall back to empty
    /// strings, empty lists, and an importance of `0.5`.
    pub fn normalize(value: &Value) -> Self {
        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_owned);
        let list = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            id: text("id").unwrap_or_default(),
            content: text("context").or_else(|| text("content")).unwrap_or_default(),
            timestamp: text("timestamp").unwrap_or_default(),
            importance: value
                .get("importance")
                .and_then(Value::as_f64)
                .unwrap_or(DEFAULT_IMPORTANCE),
            keywords: list("keywords"),
            tags: list("tags"),
        }
    }

    /// Parsed creation time, if the stored timestamp is well formed.
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

/// Current UTC time rendered with [`TIMESTAMP_FORMAT`].
pub fn now_timestamp() -> Result<String, StoreError> {
    format_timestamp(OffsetDateTime::now_utc())
}

/// Render a point in time with [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: OffsetDateTime) -> Result<String, StoreError> {
    Ok(at.format(TIMESTAMP_FORMAT)?)
}

/// Parse a [`TIMESTAMP_FORMAT`] string as a UTC instant.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(raw, TIMESTAMP_FORMAT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
