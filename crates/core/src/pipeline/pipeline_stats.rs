use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of [`PipelineStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_seen: u64,
    pub dropped_paused: u64,
    pub dropped_throttled: u64,
    pub submitted: u64,
    pub detections: u64,
    pub failures: u64,
    pub alerts: u64,
    pub stale_results: u64,
}

impl StatsSnapshot {
    /// Frames that reached the pipeline but never went to the detector.
    pub fn dropped(&self) -> u64 {
        self.dropped_paused + self.dropped_throttled
    }
}

/// Counters updated from the capture thread and the detector thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_seen: AtomicU64,
    dropped_paused: AtomicU64,
    dropped_throttled: AtomicU64,
    submitted: AtomicU64,
    detections: AtomicU64,
    failures: AtomicU64,
    alerts: AtomicU64,
    stale_results: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_seen: self.frames_seen.load(Ordering::Relaxed),
            dropped_paused: self.dropped_paused.load(Ordering::Relaxed),
            dropped_throttled: self.dropped_throttled.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            stale_results: self.stale_results.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_frame(&self) {
        self.frames_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_paused(&self) {
        self.dropped_paused.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttled(&self) {
        self.dropped_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_alert(&self) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale(&self) {
        self.stale_results.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let stats = PipelineStats::new();
        stats.record_frame();
        stats.record_frame();
        stats.record_frame();
        stats.record_paused();
        stats.record_throttled();
        stats.record_submitted();
        stats.record_detection();
        stats.record_alert();

        let snapshot = stats.snapshot();

        assert_eq!(snapshot.frames_seen, 3);
        assert_eq!(snapshot.dropped(), 2);
        assert_eq!(snapshot.submitted, 1);
        assert_eq!(snapshot.alerts, 1);
        assert_eq!(snapshot.failures, 0);
    }
}
