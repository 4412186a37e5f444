//! JSON-lines window writer.
//!
//! Every flushed window becomes a single line holding the trigger record and
//! the window's bins, channels sorted ascending inside each bin.

use super::{EventWriter, ReadoutEvent, WindowSink, WindowView};
use crate::error::{WriteoutError, WriteoutResult};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct WindowLine<'a, D, R> {
    window: u64,
    trigger: Option<&'a R>,
    start: u64,
    end: u64,
    bins: Vec<BinLine<'a, D>>,
}

#[derive(Serialize)]
struct BinLine<'a, D> {
    timestamp: u64,
    trigger_bin: bool,
    window_end: bool,
    channels: Vec<ChannelLine<'a, D>>,
}

#[derive(Serialize)]
struct ChannelLine<'a, D> {
    channel: u32,
    digits: &'a [D],
}

/// Writes each window as one JSON object per line.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    path: Option<PathBuf>,
    windows_written: u64,
    closed: bool,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Create (or truncate) a file at `path`, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> WriteoutResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut sink = Self::new(BufWriter::new(file));
        sink.path = Some(path.to_path_buf());
        Ok(sink)
    }
}

impl<W: Write> JsonLinesSink<W> {
    /// Wrap an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            path: None,
            windows_written: 0,
            closed: false,
        }
    }

    /// Number of windows written so far.
    #[must_use]
    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn ensure_open(&self) -> WriteoutResult<()> {
        if self.closed {
            return Err(WriteoutError::Sink(
                "JSON-lines writer already shut down".to_string(),
            ));
        }
        Ok(())
    }

    fn shut_down(&mut self) -> WriteoutResult<()> {
        self.writer.flush()?;
        self.closed = true;
        Ok(())
    }
}

impl<D: Serialize, R: Serialize, W: Write> WindowSink<D, R> for JsonLinesSink<W> {
    fn init(&mut self) -> WriteoutResult<()> {
        if let Some(path) = &self.path {
            info!("JSON-lines writer will write windows to '{}'.", path.display());
        }
        Ok(())
    }

    fn flush(&mut self, window: WindowView<'_, D, R>, trigger: Option<&R>) -> WriteoutResult<()> {
        self.ensure_open()?;
        let bins = window
            .iter()
            .map(|bin| {
                let mut channels: Vec<ChannelLine<'_, D>> = bin
                    .digits_by_channel
                    .iter()
                    .map(|(&channel, digits)| ChannelLine {
                        channel,
                        digits: digits.as_slice(),
                    })
                    .collect();
                channels.sort_unstable_by_key(|line| line.channel);
                BinLine {
                    timestamp: bin.timestamp,
                    trigger_bin: bin.is_trigger_bin,
                    window_end: bin.is_window_end,
                    channels,
                }
            })
            .collect();

        let line = WindowLine {
            window: self.windows_written,
            trigger,
            start: window.first().map_or(0, |bin| bin.timestamp),
            end: window.last().map_or(0, |bin| bin.timestamp),
            bins,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.windows_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> WriteoutResult<()> {
        self.shut_down()?;
        info!(windows = self.windows_written, "JSON-lines writer shut down.");
        Ok(())
    }
}

impl<D: Serialize, R: Serialize, W: Write> EventWriter<D, R> for JsonLinesSink<W> {
    fn write_event(&mut self, event: ReadoutEvent<D, R>) -> WriteoutResult<()> {
        self.ensure_open()?;
        serde_json::to_writer(&mut self.writer, &event)?;
        self.writer.write_all(b"\n")?;
        self.windows_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> WriteoutResult<()> {
        self.shut_down()?;
        info!(events = self.windows_written, "JSON-lines event writer shut down.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timebin::TimeBin;

    #[test]
    fn writes_one_line_per_window() {
        let mut trigger_bin: TimeBin<u32, u64> = TimeBin {
            timestamp: 1500,
            is_trigger_bin: true,
            ..TimeBin::default()
        };
        trigger_bin.push_digit(9, 90);
        trigger_bin.push_digit(2, 20);
        let end_bin = TimeBin {
            timestamp: 1600,
            is_window_end: true,
            ..TimeBin::default()
        };
        let bins = vec![trigger_bin, end_bin];

        let mut sink = JsonLinesSink::new(Vec::new());
        sink.flush(WindowView::new(&bins, &[]), Some(&1500)).unwrap();
        sink.flush(WindowView::new(&bins[1..], &[]), None).unwrap();
        WindowSink::<u32, u64>::finalize(&mut sink).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["trigger"], 1500);
        assert_eq!(lines[0]["start"], 1500);
        assert_eq!(lines[0]["end"], 1600);
        assert_eq!(lines[0]["bins"][0]["channels"][0]["channel"], 2);
        assert_eq!(lines[0]["bins"][0]["channels"][1]["digits"][0], 90);
        assert_eq!(lines[1]["window"], 1);
        assert!(lines[1]["trigger"].is_null());
    }

    #[test]
    fn writes_collapsed_events() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_event(ReadoutEvent {
            trigger: Some(1500u64),
            start: 1500,
            digits: vec![3u32, 4],
        })
        .unwrap();
        EventWriter::<u32, u64>::finish(&mut sink).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let event: ReadoutEvent<u32, u64> = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(event.digits, vec![3, 4]);
        assert_eq!(event.trigger, Some(1500));
    }

    #[test]
    fn rejects_windows_after_shut_down() {
        let bins: Vec<TimeBin<u32, u64>> = vec![TimeBin {
            timestamp: 1500,
            is_window_end: true,
            ..TimeBin::default()
        }];
        let mut sink = JsonLinesSink::new(Vec::new());
        WindowSink::<u32, u64>::finalize(&mut sink).unwrap();

        let err = sink.flush(WindowView::new(&bins, &[]), Some(&1500)).unwrap_err();
        assert!(matches!(err, WriteoutError::Sink(_)));
        assert_eq!(sink.windows_written(), 0);
        assert!(sink.into_inner().is_empty());
    }
}
