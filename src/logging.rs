//! Diagnostic logging.
//!
//! Everything the operator needs is printed on stdout by the console; this module sets
//! up the `tracing` subscriber that writes the diagnostic log to stderr. Output format
//! and detail come from the `[application]` section of the configuration:
//!
//! ```toml
//! [application]
//! log_level = "info"          # fallback when RUST_LOG is unset
//! log_format = "json"         # compact (default), pretty or json
//! log_span_events = true      # log span open/close, e.g. each capture session
//! log_source_location = true  # file:line on every event
//! log_ansi = false            # colors for compact and pretty output
//! ```
//!
//! # Example
//! ```no_run
//! use pressure_logger::{config::LoggerConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LoggerConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Layout of diagnostic log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per line, for log collectors
    Json,
}

/// Subscriber settings derived from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    /// Used when `RUST_LOG` is unset or invalid
    pub level: Level,
    /// Output layout
    pub format: OutputFormat,
    /// Emit an event when a span opens and closes
    pub span_events: bool,
    /// Include file and line of the call site
    pub source_location: bool,
    /// Color escapes; never applied to JSON
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new(Level::WARN)
    }
}

impl TracingConfig {
    /// Compact, colored output at `level`.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            format: OutputFormat::Compact,
            span_events: false,
            source_location: false,
            ansi: true,
        }
    }

    /// Settings from the `[application]` section.
    pub fn from_config(config: &LoggerConfig) -> Result<Self, String> {
        let app = &config.application;
        Ok(Self {
            level: parse_log_level(&app.log_level)?,
            format: app.log_format,
            span_events: app.log_span_events,
            source_location: app.log_source_location,
            ansi: app.log_ansi,
        })
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string().to_lowercase()))
    }

    fn layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_writer(std::io::stderr)
            .with_span_events(spans)
            .with_file(self.source_location)
            .with_line_number(self.source_location)
            .with_ansi(self.ansi && self.format != OutputFormat::Json);

        match self.format {
            OutputFormat::Pretty => base.pretty().with_filter(self.filter()).boxed(),
            OutputFormat::Compact => base.compact().with_filter(self.filter()).boxed(),
            OutputFormat::Json => base.json().with_filter(self.filter()).boxed(),
        }
    }
}

/// Install the subscriber described by the configuration.
pub fn init_from_config(config: &LoggerConfig) -> Result<(), String> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Only the first call installs anything; later calls return the first call's outcome.
pub fn init(config: TracingConfig) -> Result<(), String> {
    static INSTALLED: OnceLock<Result<(), String>> = OnceLock::new();
    INSTALLED
        .get_or_init(|| {
            tracing_subscriber::registry()
                .with(config.layer())
                .try_init()
                .map_err(|e| format!("Failed to initialize tracing: {}", e))
        })
        .clone()
}

/// Parse a level name, case-insensitively.
pub fn parse_log_level(level: &str) -> Result<Level, String> {
    level.trim().parse::<Level>().map_err(|_| {
        format!(
            "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
            level
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("trace"), Ok(Level::TRACE));
        assert_eq!(parse_log_level("Debug"), Ok(Level::DEBUG));
        assert_eq!(parse_log_level("INFO"), Ok(Level::INFO));
        assert_eq!(parse_log_level("warn"), Ok(Level::WARN));
        assert_eq!(parse_log_level("error"), Ok(Level::ERROR));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_defaults_follow_application_section() {
        let config = LoggerConfig::default();
        let tracing_config = TracingConfig::from_config(&config).unwrap();
        assert_eq!(tracing_config, TracingConfig::default());
    }

    #[test]
    fn test_application_section_selects_output() {
        let mut config = LoggerConfig::default();
        config.application.log_level = "debug".to_string();
        config.application.log_format = OutputFormat::Json;
        config.application.log_span_events = true;
        config.application.log_source_location = true;
        config.application.log_ansi = false;

        let tracing_config = TracingConfig::from_config(&config).unwrap();
        assert_eq!(tracing_config.level, Level::DEBUG);
        assert_eq!(tracing_config.format, OutputFormat::Json);
        assert!(tracing_config.span_events);
        assert!(tracing_config.source_location);
        assert!(!tracing_config.ansi);
    }

    #[test]
    fn test_bad_level_is_rejected() {
        let mut config = LoggerConfig::default();
        config.application.log_level = "loud".to_string();
        assert!(TracingConfig::from_config(&config).is_err());
    }

    #[test]
    fn test_every_format_builds_a_layer() {
        for format in [OutputFormat::Pretty, OutputFormat::Compact, OutputFormat::Json] {
            let config = TracingConfig {
                format,
                ..TracingConfig::new(Level::INFO)
            };
            let _ = config.layer();
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        assert!(init(TracingConfig::new(Level::ERROR)).is_ok());
        assert!(init(TracingConfig::new(Level::ERROR)).is_ok());
    }
}
