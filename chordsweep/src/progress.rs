// Progress reporting.
//
// The dispatcher reports each resolved work unit through `ProgressSink` and
// never reads anything back, so swapping the sink (or silencing it) cannot
// change what gets generated.
//
// Log lines share stderr with the bar. `LogWriter` is the `tracing` writer for
// that case: each formatted line is printed with the bar suspended, so it
// lands above the bar instead of inside it.

use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

/// Observer for completed work units. Called only from the dispatcher thread.
pub trait ProgressSink {
    /// `n` more units have resolved (successfully or not).
    fn advance(&self, n: u64);

    /// The run is over; no further `advance` calls follow.
    fn finish(&self) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn advance(&self, _n: u64) {}
}

/// Terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        // Falls back to indicatif's default style if the template is rejected.
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] [{bar:40.green/dim}] {human_pos}/{human_len} seq ({per_sec}, eta {eta})",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        BarProgress { bar }
    }

    /// A log writer that prints above this bar.
    pub fn log_writer(&self) -> LogWriter {
        LogWriter {
            bar: Some(self.bar.clone()),
        }
    }
}

impl ProgressSink for BarProgress {
    fn advance(&self, n: u64) {
        self.bar.inc(n);
    }

    fn finish(&self) {
        self.bar.finish();
    }
}

/// Stderr writer for `tracing_subscriber`, optionally coordinated with a bar.
#[derive(Clone, Default)]
pub struct LogWriter {
    bar: Option<ProgressBar>,
}

impl LogWriter {
    /// Plain stderr, for runs without a bar.
    pub fn stderr() -> Self {
        Self::default()
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.bar {
            Some(bar) => bar.suspend(|| io::stderr().write_all(buf))?,
            None => io::stderr().write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_tracks_position() {
        let progress = BarProgress::new(10);
        progress.advance(3);
        progress.advance(4);
        assert_eq!(progress.bar.position(), 7);
        progress.finish();
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_log_lines_leave_bar_untouched() {
        let progress = BarProgress {
            bar: ProgressBar::hidden(),
        };
        progress.bar.set_length(5);
        progress.advance(2);

        let mut writer = progress.log_writer().make_writer();
        assert_eq!(writer.write(b"WARN work unit failed\n").unwrap(), 22);
        writer.flush().unwrap();

        assert_eq!(progress.bar.position(), 2);
        assert!(!progress.bar.is_finished());
        assert_eq!(LogWriter::stderr().write(b"").unwrap(), 0);
    }
}
