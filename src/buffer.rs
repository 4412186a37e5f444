//! Time-windowed digit writeout buffer.
//!
//! The buffer models the rolling acquisition window of a detector readout. It
//! owns two bounded queues of [`TimeBin`]s sharing one timeline:
//!
//! - **future**: exactly `buffer_size` upcoming bins, index 0 being "now".
//!   Simulated contributions are deposited here, one per bin.
//! - **past**: at most `buffer_size` bins that the current time has already
//!   passed while recording. When the bin closing a window arrives here, the
//!   whole past queue is handed to the [`WindowSink`] and the buffer is cleared.
//!
//! # Window lifecycle
//!
//! ```text
//!  advance(t) ──► move elapsed bins future → past ──► window end reached? ──► sink.flush + clear
//!             └─► t - trigger >= live + busy            → trigger: open window, stamp bins
//!             └─► t - trigger >= live + busy - pretrig  → pre-trigger: stamp bins
//! ```
//!
//! Stamping marks every future bin as recording and assigns consecutive
//! bin-aligned timestamps starting at `align_to_bin(t)`. The trigger additionally
//! flags the front bin as the trigger bin (carrying the time record) and the
//! back bin as the window end, so a window spans exactly `buffer_size` bins.
//!
//! # Data loss policy
//!
//! - Bins pushed out of a full past queue are dropped without being flushed.
//! - The advance loop stops moving bins as soon as the front future bin is idle,
//!   so elapsed samples during idle periods are not forwarded.
//! - At [`WriteoutBuffer::finish`] an unterminated window is discarded.
//!
//! # Example
//! ```
//! use daq_writeout::{
//!     buffer::WriteoutBuffer, config::SimParams, digit::LabeledDigit,
//!     record::InteractionRecord, sink::MemorySink,
//! };
//!
//! let params = SimParams::new(1000, 500, 200);
//! let mut buffer: WriteoutBuffer<MemorySink<LabeledDigit, InteractionRecord>> =
//!     WriteoutBuffer::with_params(15, &params, MemorySink::new())?;
//! for t in (0..=3000).step_by(100) {
//!     buffer.advance(InteractionRecord::from_time_ns(t))?;
//! }
//! buffer.finish()?;
//! assert_eq!(buffer.sink().windows().len(), 1);
//! # Ok::<(), daq_writeout::error::WriteoutError>(())
//! ```

use crate::config::{ParameterSource, SimParams};
use crate::digit::{Contribution, LabeledDigit};
use crate::error::{WriteoutError, WriteoutResult};
use crate::record::{InteractionRecord, TimeRecord};
use crate::ring::BinRing;
use crate::sink::{WindowSink, WindowView};
use crate::timebin::{align_to_bin, samples_in, TimeBin, BIN_WIDTH};
use tracing::{debug, info, trace, warn};

/// Counters describing what happened to the bins over the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteoutStats {
    /// Windows handed to the sink.
    pub windows_flushed: u64,
    /// Triggers raised.
    pub triggers: u64,
    /// Pre-trigger stamping passes.
    pub pre_triggers: u64,
    /// Bins dropped from the past queue without being flushed.
    pub bins_evicted: u64,
    /// Bins holding digits that were discarded at end of run.
    pub bins_discarded_at_finish: u64,
}

/// Sliding two-queue readout buffer feeding completed windows to a sink.
pub struct WriteoutBuffer<S, D = LabeledDigit, R = InteractionRecord> {
    buffer_size: usize,
    future: BinRing<TimeBin<D, R>>,
    past: BinRing<TimeBin<D, R>>,
    /// Reset bins waiting to be reused as fresh future bins.
    spare: Vec<TimeBin<D, R>>,
    timing: SimParams,
    trigger_time: u64,
    last_event_time: u64,
    phase: u8,
    sink: S,
    stats: WriteoutStats,
}

impl<S, D, R> WriteoutBuffer<S, D, R>
where
    S: WindowSink<D, R>,
    D: Contribution,
    R: TimeRecord,
{
    /// Create a buffer of `n_time_bins` empty future bins.
    ///
    /// Timing starts at the default parameters; call
    /// [`WriteoutBuffer::initialize`] before the first advance.
    pub fn new(n_time_bins: usize, sink: S) -> WriteoutResult<Self> {
        if n_time_bins == 0 {
            return Err(WriteoutError::InvalidBufferSize);
        }
        let mut future = BinRing::with_capacity(n_time_bins);
        for _ in 0..n_time_bins {
            future.push_back(TimeBin::default());
        }
        Ok(Self {
            buffer_size: n_time_bins,
            future,
            past: BinRing::with_capacity(n_time_bins),
            spare: Vec::with_capacity(n_time_bins),
            timing: SimParams::default(),
            trigger_time: 0,
            last_event_time: 0,
            phase: 0,
            sink,
            stats: WriteoutStats::default(),
        })
    }

    /// Create and initialize in one step.
    pub fn with_params(
        n_time_bins: usize,
        params: &impl ParameterSource,
        sink: S,
    ) -> WriteoutResult<Self> {
        let mut buffer = Self::new(n_time_bins, sink)?;
        buffer.initialize(params)?;
        Ok(buffer)
    }

    /// Load the trigger timing from `params` and initialize the sink.
    pub fn initialize(&mut self, params: &impl ParameterSource) -> WriteoutResult<()> {
        self.timing = SimParams::new(
            params.live_time(),
            params.busy_time(),
            params.pre_trigger_time(),
        );
        let window_span = (self.buffer_size as u64).saturating_mul(BIN_WIDTH);
        if self.window_length() < window_span {
            warn!(
                live_time = self.timing.live_time,
                busy_time = self.timing.busy_time,
                window_span,
                "Trigger period shorter than the readout window; windows will overlap"
            );
        }
        info!(
            buffer_size = self.buffer_size,
            live_time = self.timing.live_time,
            busy_time = self.timing.busy_time,
            pre_trigger_time = self.timing.pre_trigger_time,
            "WriteoutBuffer initialized"
        );
        self.sink.init()
    }

    fn window_length(&self) -> u64 {
        self.timing.live_time.saturating_add(self.timing.busy_time)
    }

    fn fresh_bin(&mut self) -> TimeBin<D, R> {
        self.spare.pop().unwrap_or_default()
    }

    fn recycle(&mut self, mut bin: TimeBin<D, R>) {
        if self.spare.len() < self.buffer_size {
            bin.reset();
            self.spare.push(bin);
        }
    }

    /// Pad the future queue back to `buffer_size` bins.
    pub fn reserve(&mut self) {
        let missing = self.buffer_size.saturating_sub(self.future.len());
        if missing > 0 {
            debug!(missing, "Padding future queue with empty bins");
        }
        for _ in 0..missing {
            let bin = self.fresh_bin();
            self.future.push_back(bin);
        }
    }

    /// Reset every future bin in place and empty the past queue.
    pub fn clear(&mut self) {
        for bin in self.future.iter_mut() {
            bin.reset();
        }
        while let Some(bin) = self.past.pop_front() {
            self.recycle(bin);
        }
    }

    /// Change the buffer depth.
    ///
    /// Shrinking drops the farthest future bins and the oldest past bins.
    /// Growing leaves the future queue short; [`WriteoutBuffer::reserve`] pads it
    /// before the next use.
    pub fn resize(&mut self, n_time_bins: usize) -> WriteoutResult<()> {
        if n_time_bins == 0 {
            return Err(WriteoutError::InvalidBufferSize);
        }
        let old_size = self.buffer_size;
        self.buffer_size = n_time_bins;

        let dropped_future = self.future.set_capacity(n_time_bins, false);
        if dropped_future.iter().any(|bin| bin.is_window_end) {
            warn!(
                old_size,
                new_size = n_time_bins,
                "Resize dropped the end of the open window"
            );
        }
        let dropped_past = self.past.set_capacity(n_time_bins, true);
        self.stats.bins_evicted += dropped_past.len() as u64;

        self.spare.truncate(n_time_bins);
        for bin in dropped_future.into_iter().chain(dropped_past) {
            self.recycle(bin);
        }
        info!(old_size, new_size = n_time_bins, "WriteoutBuffer resized");
        Ok(())
    }

    /// Deposit one contribution per future bin for `channel`.
    ///
    /// Contribution `i` is appended to future bin `i`, its timestamp shifted by
    /// the bin-aligned time elapsed since the last trigger. The call is rejected
    /// without touching any bin unless exactly one contribution per bin is given.
    pub fn add_digits(&mut self, channel: u32, contributions: Vec<D>) -> WriteoutResult<()> {
        self.reserve();
        if contributions.len() != self.buffer_size {
            return Err(WriteoutError::ContributionCount {
                expected: self.buffer_size,
                actual: contributions.len(),
            });
        }

        let offset = align_to_bin(self.last_event_time.saturating_sub(self.trigger_time)) as f64;
        for (bin, mut digit) in self.future.iter_mut().zip(contributions) {
            digit.shift_timestamp(offset);
            bin.push_digit(channel, digit);
        }
        Ok(())
    }

    /// Move the front future bin to the past queue, replacing it with a fresh
    /// bin. Returns true when the moved bin closes a window.
    fn step_forward(&mut self) -> bool {
        let Some(bin) = self.future.pop_front() else {
            return false;
        };
        let fresh = self.fresh_bin();
        self.future.push_back(fresh);

        trace!(timestamp = bin.timestamp, "Bin moved to past queue");
        let window_end = bin.is_window_end;
        if let Some(evicted) = self.past.push_back(bin) {
            self.stats.bins_evicted += 1;
            if !evicted.is_empty() {
                warn!(
                    timestamp = evicted.timestamp,
                    digits = evicted.digit_count(),
                    "Evicted recorded bin without flushing"
                );
            }
            self.recycle(evicted);
        }
        window_end
    }

    /// Hand the past queue to the sink, then clear the whole buffer.
    ///
    /// The buffer is cleared even when the sink fails; the error is returned.
    fn flush_window(&mut self) -> WriteoutResult<()> {
        let (head, tail) = self.past.as_slices();
        let window = WindowView::new(head, tail);
        let trigger = window.first().and_then(|bin| bin.trigger_record.as_ref());
        if trigger.is_none() {
            warn!(
                bins = window.len(),
                "Flushing window whose oldest bin carries no trigger record"
            );
        }
        info!(
            bins = window.len(),
            digits = window.digit_count(),
            start = window.first().map_or(0, |bin| bin.timestamp),
            end = window.last().map_or(0, |bin| bin.timestamp),
            "Flushing readout window"
        );
        let result = self.sink.flush(window, trigger);

        self.stats.windows_flushed += 1;
        self.clear();
        result
    }

    /// Mark every future bin as recording with consecutive aligned timestamps.
    fn stamp_record_mode(&mut self, event_time: u64) {
        let mut timestamp = align_to_bin(event_time);
        for bin in self.future.iter_mut() {
            bin.record_mode = true;
            bin.timestamp = timestamp;
            timestamp = timestamp.saturating_add(BIN_WIDTH);
        }
    }

    /// Advance the current time to the record's time.
    ///
    /// Elapsed samples move bins from the future to the past queue (flushing a
    /// completed window), then trigger and pre-trigger conditions are evaluated.
    /// A sink failure is reported after the transition has completed.
    pub fn advance(&mut self, record: R) -> WriteoutResult<()> {
        self.reserve();
        let event_time = record.time_ns();
        if event_time < self.last_event_time {
            warn!(
                event_time,
                last_event_time = self.last_event_time,
                "Time record earlier than the previous one"
            );
        }

        let elapsed = samples_in(event_time.saturating_sub(self.trigger_time));
        let consumed = samples_in(self.last_event_time.saturating_sub(self.trigger_time));
        let sample_difference = elapsed.saturating_sub(consumed);

        let mut flushed = Ok(());
        for _ in 0..sample_difference {
            if !self.future.front().is_some_and(|bin| bin.record_mode) {
                break;
            }
            if self.step_forward() {
                flushed = self.flush_window();
                break;
            }
        }

        let window_length = self.window_length();
        if event_time.saturating_sub(self.trigger_time) >= window_length {
            self.trigger_time = event_time;
            if let Some(front) = self.future.front_mut() {
                front.is_trigger_bin = true;
                front.trigger_record = Some(record);
            }
            if let Some(back) = self.future.back_mut() {
                back.is_window_end = true;
            }
            self.stamp_record_mode(event_time);
            self.stats.triggers += 1;
            debug!(trigger_time = event_time, "Trigger raised, window opened");
        }

        let pre_trigger_threshold = window_length.saturating_sub(self.timing.pre_trigger_time);
        if event_time.saturating_sub(self.trigger_time) >= pre_trigger_threshold {
            self.stamp_record_mode(event_time);
            self.stats.pre_triggers += 1;
            debug!(event_time, "Pre-trigger, future bins recording");
        }

        self.last_event_time = event_time;
        // Always below 4.
        self.phase = ((event_time % BIN_WIDTH) / 25) as u8;
        flushed
    }

    /// End-of-run flush.
    ///
    /// Drains recording, non-empty bins into the past queue until a window end
    /// is flushed or an idle or empty bin is met. Whatever remains is discarded
    /// and the sink is finalized.
    pub fn finish(&mut self) -> WriteoutResult<()> {
        self.reserve();
        let mut flushed = Ok(());
        let mut window_closed = false;
        for _ in 0..self.buffer_size {
            match self.future.front() {
                Some(bin) if bin.record_mode && !bin.is_empty() => {}
                _ => break,
            }
            if self.step_forward() {
                flushed = self.flush_window();
                window_closed = true;
                break;
            }
        }

        if !window_closed {
            let discarded = self.past.iter().filter(|bin| !bin.is_empty()).count()
                + self.future.iter().filter(|bin| !bin.is_empty()).count();
            if discarded > 0 {
                info!(
                    bins = discarded,
                    "Discarding unterminated window at end of run"
                );
            }
            self.stats.bins_discarded_at_finish += discarded as u64;
        }
        self.clear();

        info!(
            windows = self.stats.windows_flushed,
            evicted = self.stats.bins_evicted,
            "WriteoutBuffer finished"
        );
        let finalized = self.sink.finalize();
        flushed.and(finalized)
    }
}

impl<S, D, R> WriteoutBuffer<S, D, R> {
    /// Configured number of bins per queue.
    #[must_use]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Future bins, "now" first.
    pub fn future(&self) -> impl Iterator<Item = &TimeBin<D, R>> + '_ {
        self.future.iter()
    }

    /// Past bins, oldest first.
    pub fn past(&self) -> impl Iterator<Item = &TimeBin<D, R>> + '_ {
        self.past.iter()
    }

    /// Future bin at `index`.
    #[must_use]
    pub fn future_bin(&self, index: usize) -> Option<&TimeBin<D, R>> {
        self.future.get(index)
    }

    /// Number of future bins currently held.
    #[must_use]
    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// Number of past bins currently held.
    #[must_use]
    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    /// Time of the last trigger.
    #[must_use]
    pub fn trigger_time(&self) -> u64 {
        self.trigger_time
    }

    /// Time of the last processed time record.
    #[must_use]
    pub fn last_event_time(&self) -> u64 {
        self.last_event_time
    }

    /// Quarter-sample offset (0..4) of the last time record within its bin.
    #[must_use]
    pub fn phase(&self) -> u8 {
        self.phase
    }

    /// Trigger timing in use.
    #[must_use]
    pub fn timing(&self) -> SimParams {
        self.timing
    }

    /// Run counters.
    #[must_use]
    pub fn stats(&self) -> WriteoutStats {
        self.stats
    }

    /// Borrow the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutably borrow the sink.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consume the buffer, returning the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digit::Digit;
    use crate::sink::MemorySink;
    use tracing_test::traced_test;

    type TestBuffer = WriteoutBuffer<MemorySink<LabeledDigit, u64>, LabeledDigit, u64>;

    fn buffer(size: usize, live: u64, busy: u64, pre: u64) -> TestBuffer {
        WriteoutBuffer::with_params(size, &SimParams::new(live, busy, pre), MemorySink::new())
            .unwrap()
    }

    fn contributions(channel: u32, size: usize) -> Vec<LabeledDigit> {
        (0..size)
            .map(|i| LabeledDigit::unlabeled(Digit::new(channel, 1.0, i as f64 * 10.0)))
            .collect()
    }

    fn timestamps(buffer: &TestBuffer) -> Vec<u64> {
        buffer.future().map(|bin| bin.timestamp).collect()
    }

    #[test]
    fn zero_bins_rejected() {
        let result: WriteoutResult<TestBuffer> = WriteoutBuffer::new(0, MemorySink::new());
        assert!(matches!(result, Err(WriteoutError::InvalidBufferSize)));
    }

    #[test]
    fn initialize_loads_timing_and_inits_sink() {
        let buffer = buffer(4, 1000, 500, 200);
        assert_eq!(buffer.timing(), SimParams::new(1000, 500, 200));
        assert!(buffer.sink().is_initialized());
        assert_eq!(buffer.future_len(), 4);
        assert_eq!(buffer.past_len(), 0);
    }

    #[test]
    fn wrong_contribution_count_leaves_bins_untouched() {
        let mut buffer = buffer(4, 1000, 500, 200);
        let err = buffer.add_digits(1, contributions(1, 3)).unwrap_err();

        assert!(matches!(
            err,
            WriteoutError::ContributionCount {
                expected: 4,
                actual: 3
            }
        ));
        assert!(buffer.future().all(TimeBin::is_empty));
    }

    #[test]
    fn deposit_places_contribution_i_in_bin_i_with_offset() {
        let mut buffer = buffer(3, 1000, 500, 200);
        buffer.advance(1500).unwrap(); // trigger at 1500
        buffer.advance(1730).unwrap(); // 230 since trigger -> offset 200

        buffer.add_digits(42, contributions(42, 3)).unwrap();

        for i in 0..3 {
            let digits = buffer.future_bin(i).and_then(|bin| bin.channel(42)).unwrap();
            assert_eq!(digits.len(), 1);
            assert_eq!(digits[0].timestamp(), i as f64 * 10.0 + 200.0);
        }
    }

    #[test]
    fn repeated_deposits_append_in_order() {
        let mut buffer = buffer(2, 1000, 500, 200);
        let first = vec![
            LabeledDigit::unlabeled(Digit::new(42, 1.0, 0.0)),
            LabeledDigit::unlabeled(Digit::new(42, 1.0, 0.0)),
        ];
        let second = vec![
            LabeledDigit::unlabeled(Digit::new(42, 2.0, 0.0)),
            LabeledDigit::unlabeled(Digit::new(42, 2.0, 0.0)),
        ];
        buffer.add_digits(42, first).unwrap();
        buffer.add_digits(42, second).unwrap();

        let digits = buffer.future_bin(0).and_then(|bin| bin.channel(42)).unwrap();
        assert_eq!(
            digits.iter().map(LabeledDigit::amplitude).collect::<Vec<_>>(),
            vec![1.0, 2.0]
        );
    }

    #[test]
    fn trigger_stamps_consecutive_timestamps() {
        let mut buffer = buffer(5, 1000, 500, 200);
        buffer.advance(1549).unwrap();

        assert_eq!(buffer.trigger_time(), 1549);
        assert_eq!(timestamps(&buffer), vec![1500, 1600, 1700, 1800, 1900]);
        assert!(buffer.future().all(|bin| bin.record_mode));

        let front = buffer.future_bin(0).unwrap();
        assert!(front.is_trigger_bin);
        assert_eq!(front.trigger_record, Some(1549));
        assert!(buffer.future_bin(4).unwrap().is_window_end);
        assert_eq!(buffer.future().filter(|bin| bin.is_window_end).count(), 1);
        assert_eq!(buffer.future().filter(|bin| bin.is_trigger_bin).count(), 1);
    }

    #[test]
    fn pre_trigger_primes_bins_without_opening_window() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.advance(1300).unwrap();

        assert_eq!(buffer.trigger_time(), 0);
        assert_eq!(timestamps(&buffer), vec![1300, 1400, 1500, 1600]);
        assert!(buffer.future().all(|bin| bin.record_mode));
        assert!(buffer.future().all(|bin| !bin.is_trigger_bin && !bin.is_window_end));
        assert_eq!(buffer.stats().pre_triggers, 1);
        assert_eq!(buffer.stats().triggers, 0);
    }

    #[test]
    fn trigger_and_pre_trigger_in_same_call_match_pre_trigger_alone() {
        // A pre-trigger lead equal to the full period makes both conditions fire.
        let mut both = buffer(6, 1000, 500, 1500);
        both.advance(1520).unwrap();
        assert_eq!(both.stats().triggers, 1);
        assert_eq!(both.stats().pre_triggers, 1);

        let mut pre_only = buffer(6, 1000, 500, 200);
        pre_only.stamp_record_mode(1520);

        assert_eq!(timestamps(&both), timestamps(&pre_only));
        assert!(timestamps(&both)
            .windows(2)
            .all(|pair| pair[1] - pair[0] == BIN_WIDTH));
    }

    #[test]
    fn idle_front_bin_stops_forwarding() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.advance(900).unwrap();

        assert_eq!(buffer.past_len(), 0);
        assert_eq!(buffer.future_len(), 4);
        assert_eq!(buffer.last_event_time(), 900);
    }

    #[test]
    fn phase_tracks_quarter_samples() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.advance(1175).unwrap();
        assert_eq!(buffer.phase(), 3);
        buffer.advance(1210).unwrap();
        assert_eq!(buffer.phase(), 0);
    }

    #[test]
    fn window_flushes_once_with_trigger_bin_first() {
        let mut buffer = buffer(15, 1000, 500, 200);
        for t in (0..=3000).step_by(100) {
            buffer.advance(t).unwrap();
            buffer.add_digits(7, contributions(7, 15)).unwrap();
        }

        let windows = buffer.sink().windows();
        assert_eq!(windows.len(), 1);
        let window = &windows[0];
        assert_eq!(window.len(), 15);
        assert_eq!(window.trigger, Some(1500));
        assert!(window.bins[0].is_trigger_bin);
        assert!(window.bins[14].is_window_end);
        assert_eq!(window.bins[0].timestamp, 1500);
        assert_eq!(window.bins[14].timestamp, 2900);
        assert_eq!(buffer.stats().bins_evicted, 2);
        // The flush happened at t=3000, which also raised the next trigger.
        assert_eq!(buffer.trigger_time(), 3000);
        assert_eq!(buffer.past_len(), 0);
    }

    #[test]
    fn queue_sizes_hold_over_long_runs() {
        let mut buffer = buffer(6, 400, 300, 250);
        for t in (0..20_000).step_by(70) {
            buffer.advance(t).unwrap();
            buffer.add_digits(1, contributions(1, 6)).unwrap();
            assert_eq!(buffer.future_len(), 6);
            assert!(buffer.past_len() <= 6);
        }
        assert!(buffer.stats().windows_flushed > 0);
    }

    #[test]
    fn finish_without_closed_window_flushes_nothing() {
        let mut buffer = buffer(15, 1000, 500, 200);
        for t in (0..=1600).step_by(100) {
            buffer.advance(t).unwrap();
        }
        buffer.finish().unwrap();

        assert!(buffer.sink().windows().is_empty());
        assert!(buffer.sink().is_finalized());
        assert_eq!(buffer.future_len(), 15);
        assert_eq!(buffer.past_len(), 0);
    }

    #[test]
    fn finish_flushes_window_when_every_bin_has_digits() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.advance(1500).unwrap();
        buffer.add_digits(3, contributions(3, 4)).unwrap();

        buffer.finish().unwrap();

        let windows = buffer.sink().windows();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].timestamps(), vec![1500, 1600, 1700, 1800]);
        assert_eq!(buffer.stats().bins_discarded_at_finish, 0);
    }

    #[test]
    fn finish_discards_unterminated_window() {
        let mut buffer = buffer(4, 1000, 500, 200);
        // Pre-trigger only: bins record but no window end exists.
        buffer.advance(1300).unwrap();
        buffer.add_digits(3, contributions(3, 4)).unwrap();

        buffer.finish().unwrap();

        assert!(buffer.sink().windows().is_empty());
        assert_eq!(buffer.stats().bins_discarded_at_finish, 4);
        assert_eq!(buffer.past_len(), 0);
    }

    #[test]
    fn finish_stops_at_empty_bin() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.advance(1500).unwrap();
        buffer.add_digits(3, contributions(3, 4)).unwrap();
        buffer.advance(1600).unwrap();
        buffer.clear();
        buffer.advance(3000).unwrap();

        buffer.finish().unwrap();

        assert!(buffer.sink().windows().is_empty());
        assert_eq!(buffer.stats().bins_discarded_at_finish, 0);
    }

    #[test]
    fn resize_then_reserve_restores_queue() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.resize(6).unwrap();
        assert_eq!(buffer.future_len(), 4);

        buffer.reserve();
        assert_eq!(buffer.future_len(), 6);

        buffer.resize(3).unwrap();
        assert_eq!(buffer.future_len(), 3);
        assert!(buffer.resize(0).is_err());
    }

    #[test]
    fn clear_resets_bins_in_place() {
        let mut buffer = buffer(3, 1000, 500, 200);
        buffer.advance(1500).unwrap();
        buffer.add_digits(1, contributions(1, 3)).unwrap();
        buffer.advance(1600).unwrap();

        buffer.clear();

        assert_eq!(buffer.past_len(), 0);
        assert_eq!(buffer.future_len(), 3);
        assert!(buffer
            .future()
            .all(|bin| bin.is_empty() && !bin.record_mode && bin.timestamp == 0));
    }

    /// Sink whose every flush fails.
    #[derive(Default)]
    struct FailingSink {
        flush_calls: usize,
        finalized: bool,
    }

    impl WindowSink<LabeledDigit, u64> for FailingSink {
        fn flush(
            &mut self,
            _window: WindowView<'_, LabeledDigit, u64>,
            _trigger: Option<&u64>,
        ) -> WriteoutResult<()> {
            self.flush_calls += 1;
            Err(WriteoutError::Sink("disk full".to_string()))
        }

        fn finalize(&mut self) -> WriteoutResult<()> {
            self.finalized = true;
            Ok(())
        }
    }

    fn failing_buffer(size: usize) -> WriteoutBuffer<FailingSink, LabeledDigit, u64> {
        WriteoutBuffer::with_params(
            size,
            &SimParams::new(1000, 500, 200),
            FailingSink::default(),
        )
        .unwrap()
    }

    #[test]
    fn failed_flush_in_advance_still_clears_buffer() {
        let mut buffer = failing_buffer(3);
        let mut failures = Vec::new();
        for t in (0..=1800).step_by(100) {
            if let Err(err) = buffer.advance(t) {
                assert!(matches!(err, WriteoutError::Sink(_)));
                failures.push(t);
            }
        }

        assert_eq!(failures, vec![1800]);
        assert_eq!(buffer.past_len(), 0);
        assert_eq!(buffer.future_len(), 3);
        assert_eq!(buffer.stats().windows_flushed, 1);
        assert_eq!(buffer.sink().flush_calls, 1);
    }

    #[test]
    fn failed_flush_in_finish_still_finalizes() {
        let mut buffer = failing_buffer(4);
        buffer.advance(1500).unwrap();
        buffer.add_digits(3, contributions(3, 4)).unwrap();

        let err = buffer.finish().unwrap_err();

        assert!(matches!(err, WriteoutError::Sink(_)));
        assert!(buffer.sink().finalized);
        assert_eq!(buffer.past_len(), 0);
        assert_eq!(buffer.stats().windows_flushed, 1);
        assert!(buffer.future().all(TimeBin::is_empty));
    }

    #[test]
    fn extreme_timing_saturates_instead_of_overflowing() {
        let mut buffer = buffer(3, u64::MAX, 10, 0);
        assert_eq!(buffer.timing().live_time, u64::MAX);

        // The period saturates at u64::MAX, so only the last instant triggers.
        buffer.advance(u64::MAX - 1).unwrap();
        assert_eq!(buffer.stats().triggers, 0);

        buffer.advance(u64::MAX).unwrap();
        assert_eq!(buffer.stats().triggers, 1);
        assert_eq!(buffer.trigger_time(), u64::MAX);

        let stamped = timestamps(&buffer);
        assert_eq!(stamped[0], align_to_bin(u64::MAX));
        assert_eq!(stamped[2], u64::MAX);
        assert!(stamped.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    #[traced_test]
    fn evicting_recorded_bins_is_logged() {
        let mut buffer = buffer(3, 1000, 500, 500);
        // Pre-trigger at 1000 primes bins; deposits land before the trigger.
        buffer.advance(1000).unwrap();
        buffer.add_digits(5, contributions(5, 3)).unwrap();
        for t in (1100..=1500).step_by(100) {
            buffer.advance(t).unwrap();
            buffer.add_digits(5, contributions(5, 3)).unwrap();
        }

        assert!(buffer.stats().bins_evicted > 0);
        assert!(logs_contain("Evicted recorded bin without flushing"));
    }

    #[test]
    #[traced_test]
    fn backwards_time_is_logged_and_consumes_nothing() {
        let mut buffer = buffer(4, 1000, 500, 200);
        buffer.advance(1500).unwrap();
        buffer.advance(1200).unwrap();

        assert_eq!(buffer.past_len(), 0);
        assert!(logs_contain("Time record earlier than the previous one"));
    }
}
