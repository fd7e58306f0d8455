//! Tracing setup for the log viewer
//!
//! stdout is reserved for rendered stream lines, so diagnostics go to stderr
//! (format chosen by `LOG_CONSOLE`) and to a daily JSON file under `LOG_DIR`.

use std::path::PathBuf;
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,codeworker_logs=debug";
const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "codeworker-logs.log";

/// How diagnostics are written to stderr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// One JSON object per line
    Json,
    /// Single-line human readable output
    Compact,
    /// File output only
    Off,
}

impl FromStr for ConsoleFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(ConsoleFormat::Json),
            "compact" | "text" => Ok(ConsoleFormat::Compact),
            "off" | "none" => Ok(ConsoleFormat::Off),
            other => Err(format!("unknown console log format {:?}", other)),
        }
    }
}

/// Logging settings, read before the rest of the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub dir: PathBuf,
    pub console: ConsoleFormat,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            console: ConsoleFormat::Compact,
        }
    }
}

impl LogOptions {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unknown `LOG_CONSOLE` values fall back to compact output
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let dir = lookup("LOG_DIR")
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.dir);
        let console = lookup("LOG_CONSOLE")
            .and_then(|value| value.parse().ok())
            .unwrap_or(defaults.console);
        Self { dir, console }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides the default filter `info,codeworker_logs=debug`.
/// Hold the returned guard until exit or buffered file lines are lost.
/// A subscriber that is already installed is left in place.
pub fn init_logging(options: &LogOptions) -> WorkerGuard {
    let appender = rolling::daily(&options.dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .with_ansi(false)
        .with_writer(file_writer);

    let json_console = (options.console == ConsoleFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(std::io::stderr)
    });
    let compact_console = (options.console == ConsoleFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(json_console)
        .with(compact_console)
        .try_init();

    if let Err(err) = installed {
        use std::error::Error;
        let already_set = err
            .source()
            .and_then(|s| s.downcast_ref::<tracing::dispatcher::SetGlobalDefaultError>())
            .is_some();
        if !already_set {
            eprintln!("Failed to initialize tracing: {}", err);
        }
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn options_from(pairs: &[(&str, &str)]) -> LogOptions {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogOptions::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn should_default_to_compact_console_in_logs_dir() {
        let options = options_from(&[]);

        assert_eq!(options, LogOptions::default());
        assert_eq!(options.dir, PathBuf::from("logs"));
        assert_eq!(options.console, ConsoleFormat::Compact);
    }

    #[test]
    fn should_read_dir_and_console_format() {
        let options = options_from(&[("LOG_DIR", "/var/log/viewer"), ("LOG_CONSOLE", "JSON")]);

        assert_eq!(options.dir, PathBuf::from("/var/log/viewer"));
        assert_eq!(options.console, ConsoleFormat::Json);
    }

    #[test]
    fn should_fall_back_on_unknown_console_format() {
        let options = options_from(&[("LOG_CONSOLE", "rainbow"), ("LOG_DIR", "  ")]);

        assert_eq!(options.console, ConsoleFormat::Compact);
        assert_eq!(options.dir, PathBuf::from("logs"));
    }

    #[test]
    fn should_parse_console_format_aliases() {
        assert_eq!("off".parse::<ConsoleFormat>(), Ok(ConsoleFormat::Off));
        assert_eq!("none".parse::<ConsoleFormat>(), Ok(ConsoleFormat::Off));
        assert_eq!("text".parse::<ConsoleFormat>(), Ok(ConsoleFormat::Compact));
        assert!("xml".parse::<ConsoleFormat>().is_err());
    }

    #[test]
    fn should_tolerate_repeated_initialization() {
        let dir = std::env::temp_dir().join(format!("test_logging_{}", uuid::Uuid::new_v4()));
        let options = LogOptions {
            dir: dir.clone(),
            console: ConsoleFormat::Off,
        };

        let first = init_logging(&options);
        let second = init_logging(&options);

        drop(second);
        drop(first);
        std::fs::remove_dir_all(&dir).ok();
    }
}
