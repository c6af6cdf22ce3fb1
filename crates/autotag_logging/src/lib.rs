//! Shared logging utilities for autotag binaries.
//!
//! Logs go to stdout so container runtimes and log shippers pick them up.
//! Structured context is carried as `tracing` fields, e.g.
//! `info!(node_ref = %event.node_ref, stage = "detect", "Package detected")`.

use anyhow::{anyhow, Result};
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Crates whose level follows the configured application level.
const APP_TARGETS: &[&str] = &[
    "autotag_consumer",
    "autotag_worker",
    "autotag_repository",
    "autotag_protocol",
];

/// Dependencies that are too chatty below `warn`.
const QUIET_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "redis", "rustls"];

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Expected: text or json", s)),
        }
    }
}

/// Logging configuration shared by autotag binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Level name (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: &'a str,
    pub format: LogFormat,
}

/// Build the default filter directive for a level.
///
/// `RUST_LOG`, when set, replaces this entirely.
pub fn default_directive(level: &str) -> String {
    let level = level.trim().to_lowercase();
    let mut parts = vec!["warn".to_string()];
    parts.extend(APP_TARGETS.iter().map(|target| format!("{}={}", target, level)));
    parts.extend(QUIET_TARGETS.iter().map(|target| format!("{}=warn", target)));
    parts.join(",")
}

/// Initialize tracing with a stdout writer.
///
/// Returns an error when a global subscriber is already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config.level)))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let layer = match config.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_current_span(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    tracing::info!(app = config.app_name, level = config.level, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_default_directive_scopes_level() {
        let directive = default_directive("DEBUG");
        assert!(directive.starts_with("warn,"));
        assert!(directive.contains("autotag_worker=debug"));
        assert!(directive.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directive).is_ok());
    }
}
