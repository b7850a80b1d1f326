//! Sliding-window health metrics for the circuit breaker.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Snapshot of the window after pruning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WindowSnapshot {
    /// Total recorded outcomes inside the window.
    pub total: u32,
    /// Recorded failures inside the window.
    pub failures: u32,
}

impl WindowSnapshot {
    /// Failure ratio over the window; zero when empty.
    pub fn failure_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.failures) / f64::from(self.total)
        }
    }
}

/// Time-bounded buffer of classified outcomes.
///
/// Owned exclusively by one breaker core and only touched under its lock.
/// Entries are appended in completion order; entries older than the
/// sampling duration are pruned before every read so stale bursts cannot
/// hold the circuit open or closed incorrectly.
#[derive(Debug)]
pub(crate) struct SlidingWindow {
    sampling_duration: Duration,
    entries: VecDeque<Entry>,
    failures: u32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    recorded_at: Instant,
    failure: bool,
}

impl SlidingWindow {
    pub(crate) fn new(sampling_duration: Duration) -> Self {
        Self {
            sampling_duration,
            entries: VecDeque::new(),
            failures: 0,
        }
    }

    /// Records one classified outcome at `now`.
    pub(crate) fn record(&mut self, now: Instant, failure: bool) {
        self.prune(now);
        self.entries.push_back(Entry {
            recorded_at: now,
            failure,
        });
        if failure {
            self.failures += 1;
        }
    }

    /// Drops entries that left the trailing window.
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(front) = self.entries.front() {
            if now.duration_since(front.recorded_at) < self.sampling_duration {
                break;
            }
            if front.failure {
                self.failures -= 1;
            }
            self.entries.pop_front();
        }
    }

    /// Prunes, then returns the current totals.
    pub(crate) fn snapshot(&mut self, now: Instant) -> WindowSnapshot {
        self.prune(now);
        WindowSnapshot {
            total: u32::try_from(self.entries.len()).unwrap_or(u32::MAX),
            failures: self.failures,
        }
    }

    /// Discards all entries.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(3);

    #[tokio::test(start_paused = true)]
    async fn test_records_and_counts() {
        let mut window = SlidingWindow::new(WINDOW);
        let now = Instant::now();

        window.record(now, true);
        window.record(now, false);
        window.record(now, true);

        let snapshot = window.snapshot(now);
        assert_eq!(snapshot.total, 3);
        assert_eq!(snapshot.failures, 2);
        assert!((snapshot.failure_ratio() - 2.0 / 3.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_sampling_duration() {
        let mut window = SlidingWindow::new(WINDOW);
        let start = Instant::now();

        window.record(start, true);
        tokio::time::advance(Duration::from_secs(2)).await;
        window.record(Instant::now(), true);

        // First entry is now 3s old and falls out; second survives.
        tokio::time::advance(Duration::from_secs(1)).await;
        let snapshot = window.snapshot(Instant::now());
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_failures_never_accumulate() {
        // 4 failures spread across 4 seconds with a 3-second window: at no
        // point do more than 3 coexist, and with 1s spacing the window
        // holds at most 3 entries right before each new record.
        let mut window = SlidingWindow::new(WINDOW);
        let mut max_total = 0;

        for _ in 0..4 {
            window.record(Instant::now(), true);
            max_total = max_total.max(window.snapshot(Instant::now()).total);
            tokio::time::advance(Duration::from_secs(1)).await;
        }

        assert!(max_total <= 3);
        // After the last advance the oldest entry has expired again.
        assert_eq!(window.snapshot(Instant::now()).total, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_resets_counters() {
        let mut window = SlidingWindow::new(WINDOW);
        window.record(Instant::now(), true);
        window.clear();

        let snapshot = window.snapshot(Instant::now());
        assert_eq!(snapshot.total, 0);
        assert_eq!(snapshot.failures, 0);
        assert!((snapshot.failure_ratio()).abs() < f64::EPSILON);
    }
}
