use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Admits at most one frame per `interval`; everything else is dropped.
///
/// Not a queue: a rejected frame is gone. The check-and-update is atomic,
/// so concurrent callers can never both be admitted inside one interval.
pub struct FrameThrottle {
    interval: Duration,
    last_admitted: Mutex<Option<Instant>>,
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Admits `now` iff at least `interval` has passed since the last
    /// admission. An instant earlier than the last admission is rejected.
    pub fn admit(&self, now: Instant) -> bool {
        let mut last = self
            .last_admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.interval => false,
            Some(prev) if now < prev => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Forgets the last admission so the next frame is admitted.
    pub fn reset(&self) {
        *self
            .last_admitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const INTERVAL: Duration = Duration::from_millis(800);

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    #[test]
    fn test_first_frame_is_admitted() {
        let throttle = FrameThrottle::new(INTERVAL);
        assert!(throttle.admit(Instant::now()));
    }

    #[rstest]
    #[case::just_short(799, false)]
    #[case::exactly_interval(800, true)]
    #[case::well_after(2_000, true)]
    fn test_second_frame_gap(#[case] gap_ms: u64, #[case] admitted: bool) {
        let throttle = FrameThrottle::new(INTERVAL);
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert_eq!(throttle.admit(at(t0, gap_ms)), admitted);
    }

    #[test]
    fn test_rejected_frames_do_not_move_window() {
        let throttle = FrameThrottle::new(INTERVAL);
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        assert!(!throttle.admit(at(t0, 500)));
        assert!(!throttle.admit(at(t0, 700)));
        assert!(throttle.admit(at(t0, 800)));
    }

    #[test]
    fn test_admitted_frames_pairwise_separated() {
        let throttle = FrameThrottle::new(INTERVAL);
        let t0 = Instant::now();
        // ~30 fps stream over 5 seconds.
        let admitted: Vec<Instant> = (0..150)
            .map(|i| at(t0, i * 33))
            .filter(|&t| throttle.admit(t))
            .collect();

        assert!(admitted.len() >= 6);
        for pair in admitted.windows(2) {
            assert!(pair[1] > pair[0]);
            assert!(pair[1] - pair[0] >= INTERVAL);
        }
    }

    #[test]
    fn test_earlier_instant_is_rejected() {
        let throttle = FrameThrottle::new(INTERVAL);
        let t0 = Instant::now();
        assert!(throttle.admit(at(t0, 5_000)));
        assert!(!throttle.admit(t0));
    }

    #[test]
    fn test_reset_admits_next_frame() {
        let throttle = FrameThrottle::new(INTERVAL);
        let t0 = Instant::now();
        assert!(throttle.admit(t0));
        throttle.reset();
        assert!(throttle.admit(at(t0, 10)));
    }

    #[test]
    fn test_concurrent_callers_admit_once_per_instant() {
        let throttle = Arc::new(FrameThrottle::new(INTERVAL));
        let admitted = Arc::new(AtomicUsize::new(0));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let throttle = throttle.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    if throttle.admit(now) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
