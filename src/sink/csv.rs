//! CSV window writer: one row per labeled digit entry.

use super::{WindowSink, WindowView};
use crate::digit::LabeledDigit;
use crate::error::WriteoutResult;
use crate::record::TimeRecord;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const HEADER: [&str; 9] = [
    "window",
    "trigger_time",
    "bin_timestamp",
    "trigger_bin",
    "window_end",
    "channel",
    "amplitude",
    "time",
    "labels",
];

/// A writer for CSV files.
pub struct CsvSink<W: Write> {
    writer: csv::Writer<W>,
    path: Option<PathBuf>,
    windows_written: u64,
}

impl CsvSink<File> {
    /// Create (or truncate) a CSV file at `path`, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> WriteoutResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut sink = Self::new(File::create(path)?);
        sink.path = Some(path.to_path_buf());
        Ok(sink)
    }
}

impl<W: Write> CsvSink<W> {
    /// Wrap an arbitrary writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            path: None,
            windows_written: 0,
        }
    }

    /// Number of windows written so far.
    #[must_use]
    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    /// Flush and recover the underlying writer.
    pub fn into_inner(self) -> WriteoutResult<W> {
        self.writer
            .into_inner()
            .map_err(|err| crate::error::WriteoutError::Io(err.into_error()))
    }
}

fn format_labels(digit: &LabeledDigit) -> String {
    digit
        .labels
        .iter()
        .map(|label| {
            format!(
                "{}:{}:{}:{:.4}",
                label.track_id, label.event_id, label.source_id, label.amplitude_fraction
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

impl<R: TimeRecord, W: Write> WindowSink<LabeledDigit, R> for CsvSink<W> {
    fn init(&mut self) -> WriteoutResult<()> {
        self.writer.write_record(HEADER)?;
        if let Some(path) = &self.path {
            info!("CSV writer will write windows to '{}'.", path.display());
        }
        Ok(())
    }

    fn flush(
        &mut self,
        window: WindowView<'_, LabeledDigit, R>,
        trigger: Option<&R>,
    ) -> WriteoutResult<()> {
        let window_index = self.windows_written.to_string();
        let trigger_time = trigger.map_or_else(String::new, |record| record.time_ns().to_string());

        for bin in window {
            let timestamp = bin.timestamp.to_string();
            for channel in bin.channels() {
                for digit in bin.channel(channel).unwrap_or_default() {
                    self.writer.write_record([
                        window_index.as_str(),
                        trigger_time.as_str(),
                        timestamp.as_str(),
                        if bin.is_trigger_bin { "1" } else { "0" },
                        if bin.is_window_end { "1" } else { "0" },
                        channel.to_string().as_str(),
                        digit.digit.amplitude.to_string().as_str(),
                        digit.digit.time.to_string().as_str(),
                        format_labels(digit).as_str(),
                    ])?;
                }
            }
        }
        self.windows_written += 1;
        Ok(())
    }

    fn finalize(&mut self) -> WriteoutResult<()> {
        self.writer.flush()?;
        info!(windows = self.windows_written, "CSV writer shut down.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digit::{Digit, McLabel};
    use crate::timebin::TimeBin;

    #[test]
    fn writes_header_and_one_row_per_digit() {
        let mut bin: TimeBin<LabeledDigit, u64> = TimeBin {
            timestamp: 1500,
            is_trigger_bin: true,
            ..TimeBin::default()
        };
        bin.push_digit(
            42,
            LabeledDigit::new(Digit::new(42, 2.5, 1510.0), McLabel::new(3, 1, 0, 1.0)),
        );
        bin.push_digit(42, LabeledDigit::unlabeled(Digit::new(42, 0.5, 1520.0)));
        let bins = vec![bin];

        let mut sink = CsvSink::new(Vec::new());
        WindowSink::<LabeledDigit, u64>::init(&mut sink).unwrap();
        sink.flush(WindowView::new(&bins, &[]), Some(&1500u64)).unwrap();

        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("window,trigger_time,bin_timestamp"));
        assert_eq!(rows[1], "0,1500,1500,1,0,42,2.5,1510,3:1:0:1.0000");
        assert_eq!(rows[2], "0,1500,1500,1,0,42,0.5,1520,");
    }
}
