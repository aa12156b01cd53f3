//! Progress reporting sinks.

use log::debug;
use std::cell::Cell;

/// Receives one tick per unit of work.
///
/// Reporting is fire-and-forget: implementations must not block and have no
/// way to fail the caller.
pub trait ProgressSink {
    /// Called with the number of completed units out of `total`.
    fn report(&self, done: usize, total: usize);
}

/// Discards all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _done: usize, _total: usize) {}
}

/// Logs progress at `debug` level every `percent_step` percent.
#[derive(Debug)]
pub struct LogProgress {
    label: String,
    percent_step: usize,
    last_percent: Cell<Option<usize>>,
}

impl LogProgress {
    #[must_use]
    pub fn new(label: &str, percent_step: usize) -> Self {
        Self {
            label: label.to_string(),
            percent_step: percent_step.max(1),
            last_percent: Cell::new(None),
        }
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, done: usize, total: usize) {
        if total == 0 {
            return;
        }
        let percent = done.min(total) * 100 / total;
        let bucket = percent / self.percent_step;
        if self.last_percent.get() != Some(bucket) {
            self.last_percent.set(Some(bucket));
            debug!("{}: {done}/{total} ({percent}%)", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_progress_buckets() {
        let progress = LogProgress::new("spectra", 25);
        for i in 1..=8 {
            progress.report(i, 8);
        }
        assert_eq!(progress.last_percent.get(), Some(4));
        progress.report(0, 0);
        assert_eq!(progress.last_percent.get(), Some(4));
    }
}
