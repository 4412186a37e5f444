//! Persistence sinks for completed readout windows.
//!
//! When a window closes, the writeout buffer hands its past bins to a
//! [`WindowSink`] as a [`WindowView`]: a borrowed, read-only, oldest-first view
//! that is only valid for the duration of the `flush` call. Sinks that need the
//! data afterwards must copy it (see [`MemorySink`]).
//!
//! Available sinks:
//! - [`MemorySink`]: keeps owned copies of every window (tests, replay driver)
//! - [`JsonLinesSink`]: one JSON object per window
//! - [`CsvSink`]: one row per digit entry (feature `storage_csv`)
//! - [`DigitStream`]: collapses each window into one summed digit per channel

#[cfg(feature = "storage_csv")]
pub mod csv;
pub mod jsonl;
pub mod stream;

#[cfg(feature = "storage_csv")]
pub use self::csv::CsvSink;
pub use jsonl::JsonLinesSink;
pub use stream::{DigitStream, EventWriter, ReadoutEvent};

use crate::error::WriteoutResult;
use crate::timebin::TimeBin;
use std::iter::Chain;
use std::slice;

/// Destination of completed readout windows.
pub trait WindowSink<D, R> {
    /// Prepare the sink before the first window (open files, write headers).
    fn init(&mut self) -> WriteoutResult<()> {
        Ok(())
    }

    /// Persist one completed window.
    ///
    /// `trigger` is the record attached to the oldest bin of the view. The view
    /// is never empty and is ordered by time; it must not be retained.
    fn flush(&mut self, window: WindowView<'_, D, R>, trigger: Option<&R>) -> WriteoutResult<()>;

    /// Called once at end of run, after the final flush attempt.
    fn finalize(&mut self) -> WriteoutResult<()> {
        Ok(())
    }
}

impl<D, R, S: WindowSink<D, R> + ?Sized> WindowSink<D, R> for Box<S> {
    fn init(&mut self) -> WriteoutResult<()> {
        (**self).init()
    }

    fn flush(&mut self, window: WindowView<'_, D, R>, trigger: Option<&R>) -> WriteoutResult<()> {
        (**self).flush(window, trigger)
    }

    fn finalize(&mut self) -> WriteoutResult<()> {
        (**self).finalize()
    }
}

/// Ordered read-only view over the past bins of a closed window.
///
/// The bins live in a circular buffer, so the view is made of up to two
/// contiguous runs; iteration always yields oldest to newest.
#[derive(Debug)]
pub struct WindowView<'a, D, R> {
    head: &'a [TimeBin<D, R>],
    tail: &'a [TimeBin<D, R>],
}

impl<D, R> Clone for WindowView<'_, D, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D, R> Copy for WindowView<'_, D, R> {}

impl<'a, D, R> WindowView<'a, D, R> {
    /// View over two runs, `head` preceding `tail` in time.
    #[must_use]
    pub fn new(head: &'a [TimeBin<D, R>], tail: &'a [TimeBin<D, R>]) -> Self {
        Self { head, tail }
    }

    /// Number of bins in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.head.len() + self.tail.len()
    }

    /// True when the view holds no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate bins oldest to newest.
    pub fn iter(&self) -> Chain<slice::Iter<'a, TimeBin<D, R>>, slice::Iter<'a, TimeBin<D, R>>> {
        self.head.iter().chain(self.tail.iter())
    }

    /// Bin at position `index`, 0 being the oldest.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&'a TimeBin<D, R>> {
        if index < self.head.len() {
            self.head.get(index)
        } else {
            self.tail.get(index - self.head.len())
        }
    }

    /// Oldest bin.
    #[must_use]
    pub fn first(&self) -> Option<&'a TimeBin<D, R>> {
        self.get(0)
    }

    /// Newest bin.
    #[must_use]
    pub fn last(&self) -> Option<&'a TimeBin<D, R>> {
        self.tail.last().or_else(|| self.head.last())
    }

    /// Total number of digit entries across all bins and channels.
    #[must_use]
    pub fn digit_count(&self) -> usize {
        self.iter().map(TimeBin::digit_count).sum()
    }

    /// Owned copy of every bin, for sinks that outlive the flush call.
    #[must_use]
    pub fn to_vec(&self) -> Vec<TimeBin<D, R>>
    where
        D: Clone,
        R: Clone,
    {
        self.iter().cloned().collect()
    }
}

impl<'a, D, R> IntoIterator for WindowView<'a, D, R> {
    type Item = &'a TimeBin<D, R>;
    type IntoIter = Chain<slice::Iter<'a, TimeBin<D, R>>, slice::Iter<'a, TimeBin<D, R>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.head.iter().chain(self.tail.iter())
    }
}

/// Owned copy of a flushed window.
#[derive(Debug, Clone)]
pub struct FlushedWindow<D, R> {
    /// Trigger record handed to the sink alongside the window.
    pub trigger: Option<R>,
    /// Bins of the window, oldest first.
    pub bins: Vec<TimeBin<D, R>>,
}

impl<D, R> FlushedWindow<D, R> {
    /// Number of bins in the window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    /// True when the window holds no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Timestamps of the bins, oldest first.
    #[must_use]
    pub fn timestamps(&self) -> Vec<u64> {
        self.bins.iter().map(|bin| bin.timestamp).collect()
    }

    /// Contributions of `channel` across the whole window, in bin order.
    pub fn channel_digits(&self, channel: u32) -> impl Iterator<Item = &D> + '_ {
        self.bins
            .iter()
            .filter_map(move |bin| bin.channel(channel))
            .flatten()
    }
}

/// Sink that keeps owned copies of every flushed window.
#[derive(Debug, Clone)]
pub struct MemorySink<D, R> {
    windows: Vec<FlushedWindow<D, R>>,
    initialized: bool,
    finalized: bool,
}

impl<D, R> Default for MemorySink<D, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, R> MemorySink<D, R> {
    /// Empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self {
            windows: Vec::new(),
            initialized: false,
            finalized: false,
        }
    }

    /// Windows received so far, in flush order.
    #[must_use]
    pub fn windows(&self) -> &[FlushedWindow<D, R>] {
        &self.windows
    }

    /// Take ownership of the received windows.
    #[must_use]
    pub fn into_windows(self) -> Vec<FlushedWindow<D, R>> {
        self.windows
    }

    /// Whether `init` was called.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether `finalize` was called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }
}

impl<D: Clone, R: Clone> WindowSink<D, R> for MemorySink<D, R> {
    fn init(&mut self) -> WriteoutResult<()> {
        self.initialized = true;
        Ok(())
    }

    fn flush(&mut self, window: WindowView<'_, D, R>, trigger: Option<&R>) -> WriteoutResult<()> {
        self.windows.push(FlushedWindow {
            trigger: trigger.cloned(),
            bins: window.to_vec(),
        });
        Ok(())
    }

    fn finalize(&mut self) -> WriteoutResult<()> {
        self.finalized = true;
        Ok(())
    }
}
