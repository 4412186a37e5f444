//! Configuration loading using Figment.
//!
//! Configuration is layered:
//! 1. Built-in defaults (the EMCAL readout timing)
//! 2. A TOML file (optional; missing files are skipped)
//! 3. Environment variables prefixed with `DAQ_WRITEOUT_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use daq_writeout::config::WriteoutConfig;
//!
//! let config = WriteoutConfig::load_from("config/writeout.toml")?;
//! config.validate()?;
//! println!("Buffer depth: {}", config.buffer.time_bins);
//! # Ok::<(), daq_writeout::error::WriteoutError>(())
//! ```
//!
//! Environment override example: `DAQ_WRITEOUT_TRIGGER__LIVE_TIME=2000`.

use crate::error::{WriteoutError, WriteoutResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment prefix for overrides.
pub const ENV_PREFIX: &str = "DAQ_WRITEOUT_";

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/writeout.toml";

/// Read-only source of the trigger timing constants.
pub trait ParameterSource {
    /// Length of the live (recording) part of a window.
    fn live_time(&self) -> u64;
    /// Dead time following the live part.
    fn busy_time(&self) -> u64;
    /// Lead time ahead of a trigger during which bins are already recorded.
    fn pre_trigger_time(&self) -> u64;
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteoutConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Buffer geometry
    pub buffer: BufferConfig,
    /// Trigger timing
    pub trigger: SimParams,
    /// Output sink selection
    pub output: OutputConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "daq-writeout".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Buffer geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of future time bins (one readout window).
    pub time_bins: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self { time_bins: 15 }
    }
}

/// Trigger timing parameters, in ns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Live time of a readout window
    pub live_time: u64,
    /// Busy (dead) time after the live window
    pub busy_time: u64,
    /// Pre-trigger lead time
    pub pre_trigger_time: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            live_time: 1500,
            busy_time: 35000,
            pre_trigger_time: 600,
        }
    }
}

impl SimParams {
    /// Explicit timing values.
    #[must_use]
    pub fn new(live_time: u64, busy_time: u64, pre_trigger_time: u64) -> Self {
        Self {
            live_time,
            busy_time,
            pre_trigger_time,
        }
    }
}

impl ParameterSource for SimParams {
    fn live_time(&self) -> u64 {
        self.live_time
    }

    fn busy_time(&self) -> u64 {
        self.busy_time
    }

    fn pre_trigger_time(&self) -> u64 {
        self.pre_trigger_time
    }
}

/// Sink used by the command-line driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per window
    #[default]
    Jsonl,
    /// One CSV row per digit entry
    Csv,
    /// One JSON object per collapsed readout event
    Events,
    /// Keep windows in memory and only report counts
    Memory,
}

impl OutputFormat {
    /// File extension for the format, if it writes a file.
    #[must_use]
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Jsonl | OutputFormat::Events => Some("jsonl"),
            OutputFormat::Csv => Some("csv"),
            OutputFormat::Memory => None,
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" => Ok(OutputFormat::Jsonl),
            "csv" => Ok(OutputFormat::Csv),
            "events" => Ok(OutputFormat::Events),
            "memory" => Ok(OutputFormat::Memory),
            other => Err(format!(
                "Invalid output format '{other}'. Must be one of: jsonl, csv, events, memory"
            )),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Sink format
    pub format: OutputFormat,
    /// Output directory, used when `path` is not set
    pub directory: PathBuf,
    /// Explicit output file
    pub path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::default(),
            directory: PathBuf::from("data"),
            path: None,
        }
    }
}

impl WriteoutConfig {
    /// Load configuration from the default file and environment variables
    pub fn load() -> WriteoutResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> WriteoutResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider stack, exposed for callers that add their own layers.
    #[must_use]
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(WriteoutConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> WriteoutResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(WriteoutError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.buffer.time_bins == 0 {
            return Err(WriteoutError::Configuration(
                "buffer.time_bins must be > 0".to_string(),
            ));
        }

        let Some(window) = self.trigger.live_time.checked_add(self.trigger.busy_time) else {
            return Err(WriteoutError::Configuration(format!(
                "trigger.live_time + trigger.busy_time overflows ({} + {})",
                self.trigger.live_time, self.trigger.busy_time
            )));
        };
        if self.trigger.pre_trigger_time > window {
            return Err(WriteoutError::Configuration(format!(
                "trigger.pre_trigger_time {} exceeds live_time + busy_time ({})",
                self.trigger.pre_trigger_time, window
            )));
        }

        if let Some(path) = &self.output.path {
            if path.as_os_str().is_empty() {
                return Err(WriteoutError::Configuration(
                    "output.path must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}
