//! Tracing infrastructure
//!
//! Structured logging for the writeout buffer and its driver, built on the
//! `tracing` and `tracing-subscriber` crates:
//! - Pretty, compact or JSON output
//! - Environment-based filtering (`RUST_LOG` overrides the configured level)
//! - Integration with [`WriteoutConfig`]
//!
//! # Example
//! ```no_run
//! use daq_writeout::{config::WriteoutConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = WriteoutConfig::load()?;
//! logging::init_from_config(&config)?;
//! info!("Writeout started");
//! # Ok(())
//! # }
//! ```

use crate::config::WriteoutConfig;
use crate::error::{WriteoutError, WriteoutResult};
use tracing::{Level, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Pretty-printed format with colors (for development)
    Pretty,
    /// Compact format without colors
    Compact,
    /// JSON format for log aggregation
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = WriteoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(WriteoutError::Configuration(format!(
                "Invalid log format '{other}'. Must be one of: pretty, compact, json"
            ))),
        }
    }
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level
    pub level: Level,
    /// Output format
    pub format: OutputFormat,
    /// Whether to include span events (NEW, CLOSE)
    pub with_span_events: bool,
    /// Whether to include file and line numbers
    pub with_file_and_line: bool,
    /// Whether to enable ANSI colors (only for Pretty format)
    pub with_ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: OutputFormat::Compact,
            with_span_events: false,
            with_file_and_line: false,
            with_ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Create tracing config from the loaded configuration
    pub fn from_config(config: &WriteoutConfig) -> WriteoutResult<Self> {
        let level = parse_log_level(&config.application.log_level)?;
        Ok(Self {
            level,
            ..Default::default()
        })
    }

    /// Create tracing config with custom level
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Set output format
    #[must_use]
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable span events
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.with_span_events = enabled;
        self
    }

    /// Enable or disable ANSI colors
    #[must_use]
    pub fn with_ansi(mut self, enabled: bool) -> Self {
        self.with_ansi = enabled;
        self
    }
}

/// Initialize tracing from the loaded configuration
pub fn init_from_config(config: &WriteoutConfig) -> WriteoutResult<()> {
    init(LoggingConfig::from_config(config)?)
}

/// Initialize tracing with custom configuration
///
/// Idempotent: if a global subscriber is already installed this returns `Ok(())`.
pub fn init(config: LoggingConfig) -> WriteoutResult<()> {
    let layer = fmt_layer(&config);
    match tracing_subscriber::registry().with(layer).try_init() {
        Ok(()) => Ok(()),
        // Already initialized: expected in tests and when embedded.
        Err(_) if tracing::dispatcher::has_been_set() => Ok(()),
        Err(e) => Err(WriteoutError::Configuration(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}

/// Formatting layer for `config`, filtered by `RUST_LOG` or the configured level.
fn fmt_layer<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string().to_lowercase()));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.with_file_and_line)
        .with_line_number(config.with_file_and_line);

    match config.format {
        OutputFormat::Pretty => base
            .pretty()
            .with_ansi(config.with_ansi)
            .with_filter(env_filter)
            .boxed(),
        OutputFormat::Compact => base.compact().with_ansi(false).with_filter(env_filter).boxed(),
        OutputFormat::Json => base.json().with_filter(env_filter).boxed(),
    }
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> WriteoutResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(WriteoutError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))),
    }
}
