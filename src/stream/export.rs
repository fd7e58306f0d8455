//! Rendering and export of buffered log lines.

use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::event::{LogEvent, DEFAULT_LEVEL};
use crate::utils::AppError;

/// Stage shown when an event carries none
pub const DEFAULT_STAGE: &str = "runtime";

/// Renders one event as a display line
///
/// `prettyText` wins when present, otherwise
/// `[timestamp] [LEVEL] [stage] message`.
pub fn render_line(event: &LogEvent) -> String {
    if let Some(pretty) = &event.pretty_text {
        return pretty.clone();
    }

    let level = if event.level.is_empty() {
        DEFAULT_LEVEL
    } else {
        &event.level
    };

    format!(
        "[{}] [{}] [{}] {}",
        event.timestamp,
        level.to_uppercase(),
        event.stage.as_deref().unwrap_or(DEFAULT_STAGE),
        event.message
    )
}

/// Rendered lines joined with newlines
pub fn visible_text(events: &[LogEvent]) -> String {
    events.iter().map(render_line).collect::<Vec<_>>().join("\n")
}

/// Writes the visible lines to `writer`, returning the number of lines written
///
/// Nothing is written for an empty buffer.
pub fn copy_visible<W: Write>(writer: &mut W, events: &[LogEvent]) -> Result<usize, AppError> {
    if events.is_empty() {
        return Ok(0);
    }

    writer.write_all(visible_text(events).as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(events.len())
}

/// `code-worker-logs-<unix millis>.txt`
pub fn download_file_name(now: DateTime<Utc>) -> String {
    format!("code-worker-logs-{}.txt", now.timestamp_millis())
}

/// Saves the visible lines into `dir`
///
/// Returns `None` without touching the filesystem when there is nothing to save.
pub fn write_download(
    dir: &Path,
    events: &[LogEvent],
    now: DateTime<Utc>,
) -> Result<Option<PathBuf>, AppError> {
    if events.is_empty() {
        return Ok(None);
    }

    fs::create_dir_all(dir).map_err(|e| {
        error!(error = %e, dir = %dir.display(), "Failed to create export directory");
        AppError::Io(e)
    })?;

    let path = dir.join(download_file_name(now));
    fs::write(&path, visible_text(events)).map_err(|e| {
        error!(error = %e, file = %path.display(), "Failed to write log export");
        AppError::Io(e)
    })?;

    info!(file = %path.display(), lines = events.len(), "Saved log export");
    Ok(Some(path))
}

/// Formats an ISO-8601 timestamp as `MM/DD/YYYY, HH:MM:SS` (24h, UTC)
///
/// Values that do not parse are returned unchanged.
pub fn format_timestamp(value: &str) -> String {
    match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => parsed
            .with_timezone(&Utc)
            .format("%m/%d/%Y, %H:%M:%S")
            .to_string(),
        Err(_) => value.to_string(),
    }
}
