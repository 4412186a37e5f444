//! Window-to-event collapsing stream.
//!
//! A readout window holds many contributions per channel spread over its bins.
//! [`DigitStream`] merges them with [`Contribution::accumulate`] into a single
//! digit per channel and forwards the resulting [`ReadoutEvent`] to an
//! [`EventWriter`].

use super::{WindowSink, WindowView};
use crate::digit::Contribution;
use crate::error::WriteoutResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// One triggered readout: the trigger record and one digit per fired channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutEvent<D, R> {
    /// Trigger record of the window.
    pub trigger: Option<R>,
    /// Timestamp of the first bin of the window.
    pub start: u64,
    /// Merged digits, sorted by channel.
    pub digits: Vec<D>,
}

/// Consumer of collapsed readout events.
pub trait EventWriter<D, R> {
    /// Persist one event.
    fn write_event(&mut self, event: ReadoutEvent<D, R>) -> WriteoutResult<()>;

    /// Flush buffered output at end of run.
    fn finish(&mut self) -> WriteoutResult<()> {
        Ok(())
    }
}

impl<D, R> EventWriter<D, R> for Vec<ReadoutEvent<D, R>> {
    fn write_event(&mut self, event: ReadoutEvent<D, R>) -> WriteoutResult<()> {
        self.push(event);
        Ok(())
    }
}

/// Sink that sums every channel over the window before writing.
pub struct DigitStream<W> {
    writer: W,
    events: u64,
}

impl<W> DigitStream<W> {
    /// Stream into `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer, events: 0 }
    }

    /// Number of events written.
    #[must_use]
    pub fn events(&self) -> u64 {
        self.events
    }

    /// Borrow the event writer.
    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Recover the event writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Merge every contribution of the window into one digit per channel.
pub fn collapse_window<D: Contribution, R>(window: &WindowView<'_, D, R>) -> Vec<D> {
    let mut merged: BTreeMap<u32, D> = BTreeMap::new();
    for bin in window.iter() {
        for (&channel, digits) in &bin.digits_by_channel {
            for digit in digits {
                merged
                    .entry(channel)
                    .and_modify(|sum| sum.accumulate(digit))
                    .or_insert_with(|| digit.clone());
            }
        }
    }
    merged.into_values().collect()
}

impl<D, R, W> WindowSink<D, R> for DigitStream<W>
where
    D: Contribution,
    R: Clone,
    W: EventWriter<D, R>,
{
    fn flush(&mut self, window: WindowView<'_, D, R>, trigger: Option<&R>) -> WriteoutResult<()> {
        let digits = collapse_window(&window);
        debug!(
            bins = window.len(),
            channels = digits.len(),
            "Collapsed readout window"
        );
        self.writer.write_event(ReadoutEvent {
            trigger: trigger.cloned(),
            start: window.first().map_or(0, |bin| bin.timestamp),
            digits,
        })?;
        self.events += 1;
        Ok(())
    }

    fn finalize(&mut self) -> WriteoutResult<()> {
        self.writer.finish()
    }
}
