//! Log event model and payload parser.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Level used when a payload carries none
pub const DEFAULT_LEVEL: &str = "info";

/// One streamed code-worker log line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    pub id: String,
    /// ISO-8601 timestamp as sent by the backend
    pub timestamp: String,
    pub worker: Option<String>,
    pub stage: Option<String>,
    pub category: Option<String>,
    pub job_id: Option<String>,
    pub repo: Option<String>,
    /// Always lower-case
    pub level: String,
    pub message: String,
    /// Pre-formatted line, used verbatim when present
    pub pretty_text: Option<String>,
}

/// Parses one raw stream payload into a [`LogEvent`].
///
/// Returns `None` when the payload is not a JSON object or lacks a non-empty
/// `id` or timestamp (`ts`, or `timestamp`). Optional fields are coerced to
/// strings; `level` is lower-cased and defaults to `"info"`, `message`
/// defaults to `""`.
pub fn parse_log_payload(payload: &str) -> Option<LogEvent> {
    let value: Value = serde_json::from_str(payload).ok()?;
    let fields = value.as_object()?;

    let id = coerce(fields, &["id"])?;
    let timestamp = coerce(fields, &["ts", "timestamp"])?;

    let level = coerce(fields, &["level"])
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|| DEFAULT_LEVEL.to_string());

    Some(LogEvent {
        id,
        timestamp,
        worker: coerce(fields, &["worker"]),
        stage: coerce(fields, &["stage"]),
        category: coerce(fields, &["category"]),
        job_id: coerce(fields, &["jobId"]),
        repo: coerce(fields, &["repo"]),
        level,
        message: coerce(fields, &["message"]).unwrap_or_default(),
        pretty_text: coerce(fields, &["pretty", "prettyText"]),
    })
}

/// First present key wins. Null, empty strings, `false`, zero, objects and
/// arrays count as absent.
fn coerce(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(number_text(n)),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    })
}

/// Integral values print without a fractional part, even when written as `1e3`
fn number_text(n: &Number) -> String {
    if let Some(v) = n.as_i64() {
        return v.to_string();
    }
    if let Some(v) = n.as_u64() {
        return v.to_string();
    }
    match n.as_f64() {
        Some(v) if v.is_finite() => v.to_string(),
        _ => n.to_string(),
    }
}
