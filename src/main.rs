//! CLI Entry Point for daq-writeout
//!
//! Provides a command-line interface for:
//! - Replaying a deposit/advance script through the writeout buffer into a sink
//! - Checking a configuration file
//!
//! # Usage
//!
//! Replay a script, writing windows as JSON lines:
//! ```bash
//! daq-writeout run demos/emcal_sweep.json --config config/writeout.toml --output out/windows.jsonl
//! ```
//!
//! Validate configuration:
//! ```bash
//! daq-writeout check-config --config config/writeout.toml
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_writeout::config::{OutputFormat, WriteoutConfig, DEFAULT_CONFIG_PATH};
use daq_writeout::logging::{self, LoggingConfig};
use daq_writeout::replay::ReplayScript;
use daq_writeout::sink::{DigitStream, JsonLinesSink, MemorySink, WindowSink};
use daq_writeout::{InteractionRecord, LabeledDigit, WriteoutBuffer};
use std::path::{Path, PathBuf};
use tracing::info;

type BoxedSink = Box<dyn WindowSink<LabeledDigit, InteractionRecord>>;

#[derive(Parser)]
#[command(name = "daq-writeout")]
#[command(about = "Time-windowed digit writeout for simulated detector readout", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: logging::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON script through the buffer
    Run {
        /// Path to the replay script
        script: PathBuf,

        /// Sink format, overriding the configuration (jsonl, csv, events, memory)
        #[arg(long)]
        format: Option<OutputFormat>,

        /// Output file, overriding the configuration
        #[arg(long)]
        output: Option<PathBuf>,

        /// Buffer depth in time bins, overriding the configuration
        #[arg(long)]
        time_bins: Option<usize>,
    },

    /// Load and validate the configuration, then print it
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = WriteoutConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let level = logging::parse_log_level(&config.application.log_level)?;
    logging::init(LoggingConfig::new(level).with_format(cli.log_format))?;

    match cli.command {
        Commands::Run {
            script,
            format,
            output,
            time_bins,
        } => {
            let mut config = config;
            if let Some(format) = format {
                config.output.format = format;
            }
            if output.is_some() {
                config.output.path = output;
            }
            if let Some(time_bins) = time_bins {
                config.buffer.time_bins = time_bins;
            }
            run_script(&script, &config)
        }
        Commands::CheckConfig => check_config(&config),
    }
}

fn check_config(config: &WriteoutConfig) -> Result<()> {
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(config)?);
    println!("Configuration OK");
    Ok(())
}

fn run_script(script_path: &Path, config: &WriteoutConfig) -> Result<()> {
    config.validate()?;
    let script = ReplayScript::load(script_path)
        .with_context(|| format!("Failed to load script {}", script_path.display()))?;
    info!(
        script = %script_path.display(),
        steps = script.steps.len(),
        "Loaded replay script"
    );

    let sink = build_sink(config)?;
    let mut buffer: WriteoutBuffer<BoxedSink> =
        WriteoutBuffer::with_params(config.buffer.time_bins, &config.trigger, sink)?;
    let summary = script.run(&mut buffer)?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn output_path(config: &WriteoutConfig, extension: &str) -> PathBuf {
    config.output.path.clone().unwrap_or_else(|| {
        let file_name = format!(
            "writeout_{}.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            extension
        );
        config.output.directory.join(file_name)
    })
}

fn build_sink(config: &WriteoutConfig) -> Result<BoxedSink> {
    let format = config.output.format;
    let Some(extension) = format.extension() else {
        info!("Keeping windows in memory");
        return Ok(Box::new(MemorySink::<LabeledDigit, InteractionRecord>::new()));
    };

    let path = output_path(config, extension);
    info!(path = %path.display(), ?format, "Opening output");
    let sink: BoxedSink = match format {
        OutputFormat::Events => Box::new(DigitStream::new(JsonLinesSink::create(&path)?)),
        OutputFormat::Csv => csv_sink(&path)?,
        OutputFormat::Jsonl | OutputFormat::Memory => Box::new(JsonLinesSink::create(&path)?),
    };
    Ok(sink)
}

#[cfg(feature = "storage_csv")]
fn csv_sink(path: &Path) -> Result<BoxedSink> {
    Ok(Box::new(daq_writeout::sink::CsvSink::create(path)?))
}

#[cfg(not(feature = "storage_csv"))]
fn csv_sink(_path: &Path) -> Result<BoxedSink> {
    Err(daq_writeout::WriteoutError::FeatureNotEnabled("storage_csv".to_string()).into())
}
