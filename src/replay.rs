//! Scripted replay of deposit and time-advance steps.
//!
//! A replay script stands in for the simulation loop that normally drives the
//! buffer: it lists, in order, the contributions deposited per channel and the
//! time records that advance the readout clock. Scripts are JSON:
//!
//! ```json
//! { "steps": [
//!     { "sweep":   { "from": 0, "to": 1400, "step": 100 } },
//!     { "deposit": { "channel": 42, "contributions": [ { "digit": { "channel": 42, "amplitude": 1.5, "time": 10.0 } } ] } },
//!     { "advance": { "time_ns": 1500 } }
//! ] }
//! ```
//!
//! After the last step the buffer is finished, so an unterminated window is
//! discarded exactly as at the end of a real run.

use crate::buffer::WriteoutBuffer;
use crate::digit::LabeledDigit;
use crate::error::{WriteoutError, WriteoutResult};
use crate::record::InteractionRecord;
use crate::sink::WindowSink;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// One driver action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayStep {
    /// Advance the clock to an absolute time.
    Advance {
        /// Absolute time in ns.
        time_ns: u64,
    },
    /// Advance repeatedly from `from` to `to` inclusive.
    Sweep {
        /// First time.
        from: u64,
        /// Last time (inclusive).
        to: u64,
        /// Increment between advances.
        step: u64,
    },
    /// Deposit one contribution per future bin into a channel.
    Deposit {
        /// Target channel.
        channel: u32,
        /// Contributions, one per future bin.
        contributions: Vec<LabeledDigit>,
    },
    /// Reconfigure the buffer depth.
    Resize {
        /// New number of bins.
        time_bins: usize,
    },
}

/// Ordered list of driver actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    /// Steps in execution order.
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
}

/// What a replay did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    /// Steps executed.
    pub steps: usize,
    /// Time records processed.
    pub advances: u64,
    /// Deposit calls made.
    pub deposits: u64,
    /// Windows handed to the sink.
    pub windows_flushed: u64,
    /// Bins aged out of the past queue unflushed.
    pub bins_evicted: u64,
    /// Bins with digits dropped at end of run.
    pub bins_discarded: u64,
}

impl ReplayScript {
    /// Parse a script from JSON text.
    pub fn from_json(text: &str) -> WriteoutResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a script file.
    pub fn load(path: impl AsRef<Path>) -> WriteoutResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Execute every step against `buffer`, then finish it.
    #[instrument(skip_all, fields(steps = self.steps.len()))]
    pub fn run<S>(&self, buffer: &mut WriteoutBuffer<S>) -> WriteoutResult<ReplaySummary>
    where
        S: WindowSink<LabeledDigit, InteractionRecord>,
    {
        let mut summary = ReplaySummary::default();
        for step in &self.steps {
            match step {
                ReplayStep::Advance { time_ns } => {
                    buffer.advance(InteractionRecord::from_time_ns(*time_ns))?;
                    summary.advances += 1;
                }
                ReplayStep::Sweep { from, to, step } => {
                    if *step == 0 {
                        return Err(WriteoutError::Configuration(
                            "sweep step must be > 0".to_string(),
                        ));
                    }
                    let mut time = *from;
                    while time <= *to {
                        buffer.advance(InteractionRecord::from_time_ns(time))?;
                        summary.advances += 1;
                        match time.checked_add(*step) {
                            Some(next) => time = next,
                            None => break,
                        }
                    }
                }
                ReplayStep::Deposit {
                    channel,
                    contributions,
                } => {
                    buffer.add_digits(*channel, contributions.clone())?;
                    summary.deposits += 1;
                }
                ReplayStep::Resize { time_bins } => {
                    buffer.resize(*time_bins)?;
                }
            }
            summary.steps += 1;
            debug!(step = summary.steps, "Replay step applied");
        }
        buffer.finish()?;

        let stats = buffer.stats();
        summary.windows_flushed = stats.windows_flushed;
        summary.bins_evicted = stats.bins_evicted;
        summary.bins_discarded = stats.bins_discarded_at_finish;
        info!(
            advances = summary.advances,
            deposits = summary.deposits,
            windows = summary.windows_flushed,
            "Replay complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimParams;
    use crate::sink::MemorySink;

    #[test]
    fn parses_every_step_kind() {
        let script = ReplayScript::from_json(
            r#"{ "steps": [
                { "advance": { "time_ns": 1500 } },
                { "sweep": { "from": 0, "to": 200, "step": 100 } },
                { "deposit": { "channel": 3, "contributions": [
                    { "digit": { "channel": 3, "amplitude": 1.0, "time": 0.0 } }
                ] } },
                { "resize": { "time_bins": 4 } }
            ] }"#,
        )
        .unwrap();

        assert_eq!(script.steps.len(), 4);
        assert_eq!(script.steps[0], ReplayStep::Advance { time_ns: 1500 });
        assert!(matches!(
            &script.steps[2],
            ReplayStep::Deposit { channel: 3, contributions } if contributions[0].labels.is_empty()
        ));
    }

    #[test]
    fn sweep_drives_a_full_window() {
        let script = ReplayScript {
            steps: vec![ReplayStep::Sweep {
                from: 0,
                to: 3000,
                step: 100,
            }],
        };
        let mut buffer: WriteoutBuffer<MemorySink<LabeledDigit, InteractionRecord>> =
            WriteoutBuffer::with_params(15, &SimParams::new(1000, 500, 200), MemorySink::new())
                .unwrap();

        let summary = script.run(&mut buffer).unwrap();

        assert_eq!(summary.advances, 31);
        assert_eq!(summary.windows_flushed, 1);
        assert_eq!(buffer.sink().windows()[0].trigger.map(|r| r.time_ns), Some(1500));
    }

    #[test]
    fn sweep_ending_at_time_limit_terminates() {
        let script = ReplayScript {
            steps: vec![ReplayStep::Sweep {
                from: u64::MAX - 50,
                to: u64::MAX,
                step: 100,
            }],
        };
        let mut buffer: WriteoutBuffer<MemorySink<LabeledDigit, InteractionRecord>> =
            WriteoutBuffer::with_params(3, &SimParams::new(1000, 500, 200), MemorySink::new())
                .unwrap();

        let summary = script.run(&mut buffer).unwrap();

        assert_eq!(summary.advances, 1);
        assert_eq!(buffer.last_event_time(), u64::MAX - 50);
        assert_eq!(buffer.stats().triggers, 1);
    }

    #[test]
    fn zero_step_sweep_is_rejected() {
        let script = ReplayScript {
            steps: vec![ReplayStep::Sweep {
                from: 0,
                to: 100,
                step: 0,
            }],
        };
        let mut buffer: WriteoutBuffer<MemorySink<LabeledDigit, InteractionRecord>> =
            WriteoutBuffer::new(3, MemorySink::new()).unwrap();
        assert!(script.run(&mut buffer).is_err());
    }
}
