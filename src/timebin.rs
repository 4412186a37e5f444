//! Discrete readout time bins.
//!
//! A [`TimeBin`] covers one sampling interval of [`BIN_WIDTH`] time units and
//! holds every digit contribution deposited into it, keyed by channel. Bins are
//! recycled rather than dropped: [`TimeBin::reset`] clears the flags and empties
//! the channel map in place so the map's allocation survives the next window.

use std::collections::HashMap;

/// Width of one readout sample, in the buffer's time units (ns).
pub const BIN_WIDTH: u64 = 100;

/// Align a time down to the start of its bin.
#[must_use]
pub fn align_to_bin(time: u64) -> u64 {
    (time / BIN_WIDTH) * BIN_WIDTH
}

/// Number of whole samples contained in `time`.
#[must_use]
pub fn samples_in(time: u64) -> u64 {
    time / BIN_WIDTH
}

/// One sampling interval of the readout timeline.
#[derive(Debug, Clone)]
pub struct TimeBin<D, R> {
    /// Bin-aligned start time of the interval.
    pub timestamp: u64,
    /// Whether the bin lies inside a window that is being recorded.
    pub record_mode: bool,
    /// Whether the bin is the last one of its recording window.
    pub is_window_end: bool,
    /// Whether the trigger of the window was raised in this bin.
    pub is_trigger_bin: bool,
    /// Trigger record attached when the window opened.
    pub trigger_record: Option<R>,
    /// Accumulated contributions per channel.
    pub digits_by_channel: HashMap<u32, Vec<D>>,
}

impl<D, R> Default for TimeBin<D, R> {
    fn default() -> Self {
        Self {
            timestamp: 0,
            record_mode: false,
            is_window_end: false,
            is_trigger_bin: false,
            trigger_record: None,
            digits_by_channel: HashMap::new(),
        }
    }
}

impl<D, R> TimeBin<D, R> {
    /// Restore the bin to its freshly-created state, keeping the map allocation.
    pub fn reset(&mut self) {
        self.timestamp = 0;
        self.record_mode = false;
        self.is_window_end = false;
        self.is_trigger_bin = false;
        self.trigger_record = None;
        self.digits_by_channel.clear();
    }

    /// Append a contribution to the channel's list, creating the list on first use.
    pub fn push_digit(&mut self, channel: u32, digit: D) {
        self.digits_by_channel.entry(channel).or_default().push(digit);
    }

    /// Contributions recorded for `channel`, if any.
    #[must_use]
    pub fn channel(&self, channel: u32) -> Option<&[D]> {
        self.digits_by_channel.get(&channel).map(Vec::as_slice)
    }

    /// True when no channel has an entry in this bin.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.digits_by_channel.is_empty()
    }

    /// Total number of contributions across all channels.
    #[must_use]
    pub fn digit_count(&self) -> usize {
        self.digits_by_channel.values().map(Vec::len).sum()
    }

    /// Channels present in the bin, sorted ascending.
    #[must_use]
    pub fn channels(&self) -> Vec<u32> {
        let mut channels: Vec<u32> = self.digits_by_channel.keys().copied().collect();
        channels.sort_unstable();
        channels
    }
}
