//! Digit contributions deposited into the writeout buffer.
//!
//! The buffer itself only needs to move a contribution's timestamp and know
//! which channel it belongs to; [`Contribution`] captures exactly that, plus
//! the merge rule used when a window is collapsed into one digit per channel.
//! [`LabeledDigit`] is the concrete payload used by the simulation: an energy
//! deposit together with the Monte-Carlo truth labels that produced it.

use serde::{Deserialize, Serialize};

/// A value that can be deposited into a time bin.
pub trait Contribution: Clone {
    /// Time of the contribution in the buffer's time units.
    fn timestamp(&self) -> f64;

    /// Overwrite the contribution's time.
    fn set_timestamp(&mut self, timestamp: f64);

    /// Channel the contribution was produced in.
    fn channel(&self) -> u32;

    /// Merge another contribution of the same channel into this one.
    fn accumulate(&mut self, other: &Self);

    /// Shift the contribution's time by `offset`.
    fn shift_timestamp(&mut self, offset: f64) {
        let shifted = self.timestamp() + offset;
        self.set_timestamp(shifted);
    }
}

/// Raw readout value of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Digit {
    /// Channel (tower) identifier.
    pub channel: u32,
    /// Deposited amplitude.
    pub amplitude: f64,
    /// Time of the deposit.
    pub time: f64,
}

impl Digit {
    /// Create a digit.
    #[must_use]
    pub fn new(channel: u32, amplitude: f64, time: f64) -> Self {
        Self {
            channel,
            amplitude,
            time,
        }
    }
}

/// Monte-Carlo truth reference carried by a digit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct McLabel {
    /// Track that produced the deposit.
    pub track_id: i32,
    /// Simulated event the track belongs to.
    pub event_id: i32,
    /// Source (signal or background stream) of the event.
    pub source_id: i32,
    /// Fraction of the digit amplitude attributed to this label.
    pub amplitude_fraction: f64,
}

impl McLabel {
    /// Create a label.
    #[must_use]
    pub fn new(track_id: i32, event_id: i32, source_id: i32, amplitude_fraction: f64) -> Self {
        Self {
            track_id,
            event_id,
            source_id,
            amplitude_fraction,
        }
    }

    fn same_origin(&self, other: &McLabel) -> bool {
        self.track_id == other.track_id
            && self.event_id == other.event_id
            && self.source_id == other.source_id
    }
}

/// Digit together with the truth labels that contributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledDigit {
    /// Readout value.
    pub digit: Digit,
    /// Truth labels, fractions summing to one for a positive amplitude.
    #[serde(default)]
    pub labels: Vec<McLabel>,
}

impl LabeledDigit {
    /// Digit with a single label owning the whole amplitude.
    #[must_use]
    pub fn new(digit: Digit, label: McLabel) -> Self {
        Self {
            digit,
            labels: vec![McLabel {
                amplitude_fraction: 1.0,
                ..label
            }],
        }
    }

    /// Digit without truth information.
    #[must_use]
    pub fn unlabeled(digit: Digit) -> Self {
        Self {
            digit,
            labels: Vec::new(),
        }
    }

    /// Amplitude of the digit.
    #[must_use]
    pub fn amplitude(&self) -> f64 {
        self.digit.amplitude
    }
}

impl Contribution for LabeledDigit {
    fn timestamp(&self) -> f64 {
        self.digit.time
    }

    fn set_timestamp(&mut self, timestamp: f64) {
        self.digit.time = timestamp;
    }

    fn channel(&self) -> u32 {
        self.digit.channel
    }

    fn accumulate(&mut self, other: &Self) {
        let own = self.digit.amplitude;
        let theirs = other.digit.amplitude;
        let total = own + theirs;

        // Fractions are stored relative to each digit's own amplitude; convert to
        // absolute amplitudes, merge, then renormalise against the sum.
        let mut merged: Vec<McLabel> = self
            .labels
            .iter()
            .map(|label| McLabel {
                amplitude_fraction: label.amplitude_fraction * own,
                ..*label
            })
            .collect();
        for label in &other.labels {
            let absolute = label.amplitude_fraction * theirs;
            match merged.iter_mut().find(|known| known.same_origin(label)) {
                Some(known) => known.amplitude_fraction += absolute,
                None => merged.push(McLabel {
                    amplitude_fraction: absolute,
                    ..*label
                }),
            }
        }
        if total > 0.0 {
            for label in &mut merged {
                label.amplitude_fraction /= total;
            }
        }

        self.labels = merged;
        self.digit.amplitude = total;
        self.digit.time = self.digit.time.min(other.digit.time);
    }
}
