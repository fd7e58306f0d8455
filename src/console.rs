//! Terminal front-end for the stream controller
//!
//! Parses stdin commands and executes them against a [`StreamController`].

use chrono::Utc;
use std::io::Write;
use std::str::FromStr;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::stream::{copy_visible, format_timestamp, write_download, StreamController, StreamStatus};
use crate::utils::AppError;

pub const HELP: &str = "commands: connect [base_url] [job_id] | disconnect | clear | copy | download | status | help | quit";

/// One user command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Missing values fall back to the configured defaults
    Connect {
        base_url: Option<String>,
        job_id: Option<String>,
    },
    Disconnect,
    Clear,
    Copy,
    Download,
    Status,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut parts = line.split_whitespace();
        let Some(name) = parts.next() else {
            return Err(HELP.to_string());
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "connect" | "c" => Command::Connect {
                base_url: parts.next().map(str::to_string),
                job_id: parts.next().map(str::to_string),
            },
            "disconnect" | "d" => Command::Disconnect,
            "clear" => Command::Clear,
            "copy" => Command::Copy,
            "download" | "save" => Command::Download,
            "status" | "s" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(format!("unknown command {:?}; {}", other, HELP)),
        };

        if parts.next().is_some() {
            return Err(format!("too many arguments; {}", HELP));
        }
        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Status bar line: state, text, retries, lines and last heartbeat
pub fn format_status(status: &StreamStatus) -> String {
    let mut line = format!(
        "[{}] {} | Retries: {} | Lines: {}",
        status.state.as_str().to_uppercase(),
        status.text,
        status.retry_attempt,
        status.line_count
    );
    if let Some(heartbeat) = status.last_heartbeat_at {
        line.push_str(" | Heartbeat: ");
        line.push_str(&format_timestamp(&heartbeat.to_rfc3339()));
    }
    if status.dropped_count > 0 {
        line.push_str(&format!(" | Dropped: {}", status.dropped_count));
    }
    line
}

/// Executes commands against one controller
pub struct Console<'a> {
    controller: &'a StreamController,
    config: &'a AppConfig,
}

impl<'a> Console<'a> {
    pub fn new(controller: &'a StreamController, config: &'a AppConfig) -> Self {
        Self { controller, config }
    }

    /// Export failures are reported on `out` and never end the session.
    /// `Err` means `out` itself could not be written.
    pub fn execute<W: Write>(&self, command: Command, out: &mut W) -> Result<Flow, AppError> {
        match command {
            Command::Connect { base_url, job_id } => {
                let base_url = base_url.unwrap_or_else(|| self.config.stream_base_url.clone());
                let job_id = job_id.unwrap_or_else(|| self.config.stream_job_id.clone());
                self.controller.connect(&base_url, &job_id);
            }
            Command::Disconnect => self.controller.disconnect(),
            Command::Clear => {
                self.controller.clear();
                writeln!(out, "Logs cleared.")?;
            }
            Command::Copy => match copy_visible(out, &self.controller.snapshot()) {
                Ok(0) => writeln!(out, "No logs to copy.")?,
                Ok(copied) => info!(lines = copied, "Copied visible logs"),
                Err(e) => {
                    error!(error = %e, code = e.error_code(), "Failed to copy visible logs");
                    // The writer itself may be what failed
                    let _ = writeln!(out, "Unable to copy logs.");
                }
            },
            Command::Download => {
                let saved = write_download(
                    &self.config.export_dir,
                    &self.controller.snapshot(),
                    Utc::now(),
                );
                match saved {
                    Ok(Some(path)) => writeln!(out, "Saved {}", path.display())?,
                    Ok(None) => writeln!(out, "No logs to save.")?,
                    Err(e) => {
                        error!(error = %e, code = e.error_code(), "Failed to save logs");
                        writeln!(out, "Unable to save logs: {}", e)?;
                    }
                }
            }
            Command::Status => writeln!(out, "{}", format_status(&self.controller.status()))?,
            Command::Help => writeln!(out, "{}", HELP)?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}
