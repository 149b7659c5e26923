use serde::Serialize;
use std::sync::Mutex;

pub struct MetricsRecorder {
    inner: Mutex<ScanMetrics>,
}

/// Counters for the reconciliation loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanMetrics {
    pub ticks: usize,
    pub errors: usize,
    /// Ticks skipped because the previous one was still running.
    pub skipped: usize,
    /// Tick results dropped because the session ended first.
    pub discarded: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ScanMetrics::default()),
        }
    }

    pub fn record_tick(&self) {
        self.update(|metrics| metrics.ticks += 1);
    }

    pub fn record_error(&self) {
        self.update(|metrics| metrics.errors += 1);
    }

    pub fn record_skipped(&self) {
        self.update(|metrics| metrics.skipped += 1);
    }

    pub fn record_discarded(&self) {
        self.update(|metrics| metrics.discarded += 1);
    }

    pub fn snapshot(&self) -> ScanMetrics {
        if let Ok(metrics) = self.inner.lock() {
            *metrics
        } else {
            ScanMetrics::default()
        }
    }

    fn update(&self, f: impl FnOnce(&mut ScanMetrics)) {
        if let Ok(mut metrics) = self.inner.lock() {
            f(&mut metrics);
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
