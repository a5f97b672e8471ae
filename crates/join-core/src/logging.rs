//! Logging setup
//!
//! The library only emits `tracing` events. Hosts and test harnesses install
//! a subscriber once through [`setup_logging`]; a second install fails and
//! leaves the first one in place.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::TestWriter;
use tracing_subscriber::EnvFilter;

use crate::errors::{JoinError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Subscriber settings, loadable from the `[logging]` part of a host config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level. `RUST_LOG`, when set, takes precedence.
    pub level: String,
    pub format: LogFormat,
    pub source_location: bool,
    /// Emit span open/close events
    pub span_events: bool,
    /// Write through libtest's output capture
    #[serde(skip)]
    pub test_writer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            source_location: false,
            span_events: false,
            test_writer: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_source_location(mut self) -> Self {
        self.source_location = true;
        self
    }

    pub fn with_span_events(mut self) -> Self {
        self.span_events = true;
        self
    }

    pub fn for_tests(mut self) -> Self {
        self.test_writer = true;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: LoggingConfig = toml::from_str(s)
            .map_err(|e| JoinError::Config(format!("Invalid logging config: {}", e)))?;
        parse_log_level(&config.level)?;
        Ok(config)
    }
}

/// Install the global subscriber described by `config`
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let writer = if config.test_writer {
        BoxMakeWriter::new(TestWriter::new())
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_span_events(span_events)
        .with_file(config.source_location)
        .with_line_number(config.source_location);

    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| JoinError::Config(format!("Logging already initialized: {}", e)))
}

pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| JoinError::Config(format!("Invalid log level: {}", level)))
}
