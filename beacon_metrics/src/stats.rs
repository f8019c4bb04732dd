use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Running counters for one pipeline. Shared between producers and the
/// flush worker, so every field is atomic.
#[derive(Debug, Default)]
pub struct PipelineStats {
    recorded: AtomicU64,
    dropped: AtomicU64,
    batches_flushed: AtomicU64,
    events_emitted: AtomicU64,
    emit_failures: AtomicU64,
    events_discarded: AtomicU64,
    shutdown_timeouts: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_accepted(&self) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the drop total including this one.
    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_flush(&self, events: usize) {
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.events_emitted.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_emit_failure(&self, events: usize) {
        self.emit_failures.fetch_add(1, Ordering::Relaxed);
        self.events_discarded.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, events: usize) {
        self.events_discarded.fetch_add(events as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_shutdown_timeout(&self) {
        self.shutdown_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let recorded = self.recorded.load(Ordering::Relaxed);
        let dropped = self.dropped.load(Ordering::Relaxed);
        let batches_flushed = self.batches_flushed.load(Ordering::Relaxed);
        let emit_failures = self.emit_failures.load(Ordering::Relaxed);

        let offered = recorded + dropped;
        let drop_rate = if offered > 0 {
            dropped as f64 / offered as f64
        } else {
            0.0
        };

        let attempts = batches_flushed + emit_failures;
        let emit_success_rate = if attempts > 0 {
            batches_flushed as f64 / attempts as f64
        } else {
            1.0
        };

        StatsSnapshot {
            recorded,
            dropped,
            batches_flushed,
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            emit_failures,
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            shutdown_timeouts: self.shutdown_timeouts.load(Ordering::Relaxed),
            drop_rate,
            emit_success_rate,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StatsSnapshot {
    /// Events admitted to the buffer
    pub recorded: u64,
    /// Events refused because the buffer was full or the pipeline was stopping
    pub dropped: u64,
    pub batches_flushed: u64,
    pub events_emitted: u64,
    pub emit_failures: u64,
    /// Events lost with a failed batch or abandoned at the shutdown deadline
    pub events_discarded: u64,
    pub shutdown_timeouts: u64,
    pub drop_rate: f64,
    pub emit_success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_rates() {
        let stats = PipelineStats::new();
        for _ in 0..3 {
            stats.record_accepted();
        }
        assert_eq!(stats.record_dropped(), 1);

        stats.record_flush(2);
        stats.record_emit_failure(1);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.recorded, 3);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.drop_rate, 0.25);
        assert_eq!(snapshot.events_emitted, 2);
        assert_eq!(snapshot.events_discarded, 1);
        assert_eq!(snapshot.emit_success_rate, 0.5);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = PipelineStats::new().snapshot();
        assert_eq!(snapshot.drop_rate, 0.0);
        assert_eq!(snapshot.emit_success_rate, 1.0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = PipelineStats::new();
        stats.record_accepted();

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["recorded"], 1);
        assert_eq!(json["dropped"], 0);
        assert_eq!(json["emit_success_rate"], 1.0);
    }
}
