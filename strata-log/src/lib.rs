//! Strata logging setup
//!
//! Installs a [`tracing`] subscriber configured from `STRATA_*` environment
//! variables. Library crates only emit events through the `tracing` macros;
//! binaries call [`init`] once at startup and tests call [`init_for_tests`].
//!
//! # Environment Variables
//!
//! - `STRATA_DEBUG=1` - Enable debug logging
//! - `STRATA_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `STRATA_LOG_FORMAT=pretty|compact|json` - Set output format
//! - `STRATA_LOG_COLOR=1|0` - Enable/disable colors
//! - `STRATA_LOG_TIMESTAMPS=1|0` - Include timestamps
//! - `RUST_LOG` - Full filter directives, overriding the level
//!
//! Flags accept `1`, `true`, `yes` or `on`, case-insensitively.
//!
//! # Usage
//!
//! ```no_run
//! strata_log::init().expect("logging already initialized");
//! tracing::info!(port = 8080, "Server started");
//! ```

#![warn(missing_docs)]

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use tracing_subscriber::fmt::{self, writer::BoxMakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Most verbose
    Trace,
    /// Diagnostic detail
    Debug,
    /// Normal operation
    Info,
    /// Degraded but continuing
    Warn,
    /// Least verbose
    Error,
    /// No logging
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Directive understood by [`EnvFilter`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single-line
    Compact,
    /// One JSON object per event
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether ANSI colors are enabled
    pub color: bool,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether to include the event target
    pub targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Compact,
            color: false,
            timestamps: true,
            targets: true,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl LogConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    ///
    /// Unknown level or format names fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let debug = lookup("STRATA_DEBUG")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.debug);

        let level = lookup("STRATA_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { defaults.level });

        let format = lookup("STRATA_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(defaults.format);

        // NO_COLOR wins over a terminal, but not over an explicit setting.
        let color = lookup("STRATA_LOG_COLOR")
            .map(|v| parse_flag(&v))
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let timestamps = lookup("STRATA_LOG_TIMESTAMPS")
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.timestamps);

        Self {
            debug,
            level,
            format,
            color: color && format != Format::Json,
            timestamps,
            targets: defaults.targets,
        }
    }

    /// Set the level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Build the event filter. `RUST_LOG` takes precedence over `level`.
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    fn layer(&self, writer: BoxMakeWriter) -> Box<dyn Layer<Registry> + Send + Sync> {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(self.color)
            .with_target(self.targets);

        match (self.format, self.timestamps) {
            (Format::Pretty, true) => layer.pretty().boxed(),
            (Format::Pretty, false) => layer.pretty().without_time().boxed(),
            (Format::Compact, true) => layer.compact().boxed(),
            (Format::Compact, false) => layer.compact().without_time().boxed(),
            (Format::Json, true) => layer.json().boxed(),
            (Format::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// Global configuration, read from the environment once.
static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

/// Install the global subscriber from the environment, writing to stderr.
///
/// Fails if a global subscriber is already installed.
pub fn init() -> Result<(), TryInitError> {
    init_with(config())
}

/// Install the global subscriber from an explicit configuration.
pub fn init_with(config: &LogConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(config.layer(BoxMakeWriter::new(std::io::stderr)))
        .with(config.filter())
        .try_init()
}

static TEST_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let config = config().clone().with_format(Format::Compact);
    // Another harness may have installed a subscriber first; keep it.
    let _ = tracing_subscriber::registry()
        .with(config.layer(BoxMakeWriter::new(fmt::TestWriter::new())))
        .with(config.filter())
        .try_init();
});

/// Install a subscriber whose output is captured by the test harness.
///
/// Safe to call from every test; only the first call has an effect.
pub fn init_for_tests() {
    Lazy::force(&TEST_SUBSCRIBER);
}
