//! Backoff formulas and jitter for retry delays.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound of the jitter factor range.
pub const JITTER_MIN_FACTOR: f64 = 0.8;
/// Upper bound of the jitter factor range.
pub const JITTER_MAX_FACTOR: f64 = 1.2;

/// Backoff formula mapping attempt number to a base wait duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackoffKind {
    /// delay = base
    #[default]
    Constant,
    /// delay = base * (attempt + 1)
    Linear,
    /// delay = base * 2^attempt
    Exponential,
}

/// Computes the wait before the retry following `attempt` (zero-based).
///
/// The formula result is clamped to `max_delay`; jitter then multiplies by
/// a uniform factor in [0.8, 1.2] to decorrelate concurrent retriers, and
/// the result is clamped again so `max_delay` is never exceeded.
#[must_use]
pub(crate) fn compute_delay(
    kind: BackoffKind,
    base_delay: Duration,
    max_delay: Option<Duration>,
    use_jitter: bool,
    attempt: u32,
) -> Duration {
    let base_ms = u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX);
    let raw_ms = match kind {
        BackoffKind::Constant => base_ms,
        BackoffKind::Linear => base_ms.saturating_mul(u64::from(attempt) + 1),
        BackoffKind::Exponential => base_ms.saturating_mul(2u64.saturating_pow(attempt)),
    };

    let cap_ms = max_delay.map(|max| u64::try_from(max.as_millis()).unwrap_or(u64::MAX));
    let capped_ms = cap_ms.map_or(raw_ms, |cap| raw_ms.min(cap));

    let jittered_ms = if use_jitter && capped_ms > 0 {
        let factor = rand::thread_rng().gen_range(JITTER_MIN_FACTOR..=JITTER_MAX_FACTOR);
        #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let scaled = (capped_ms as f64 * factor).round() as u64;
        scaled
    } else {
        capped_ms
    };

    let final_ms = cap_ms.map_or(jittered_ms, |cap| jittered_ms.min(cap));
    Duration::from_millis(final_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_millis(100);

    #[test]
    fn test_constant_backoff() {
        for attempt in [0, 1, 5] {
            let delay = compute_delay(BackoffKind::Constant, BASE, None, false, attempt);
            assert_eq!(delay, BASE);
        }
    }

    #[test]
    fn test_linear_backoff() {
        let delays: Vec<_> = (0..3)
            .map(|attempt| compute_delay(BackoffKind::Linear, BASE, None, false, attempt))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300)
            ]
        );
    }

    #[test]
    fn test_exponential_backoff() {
        let delays: Vec<_> = (0..4)
            .map(|attempt| compute_delay(BackoffKind::Exponential, BASE, None, false, attempt))
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );
    }

    #[test]
    fn test_max_delay_caps_formula() {
        let delay = compute_delay(
            BackoffKind::Exponential,
            Duration::from_secs(1),
            Some(Duration::from_secs(5)),
            false,
            10,
        );
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_overflow_saturates() {
        let delay = compute_delay(BackoffKind::Exponential, Duration::from_secs(1), None, false, 200);
        assert_eq!(delay, Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..100 {
            let delay = compute_delay(BackoffKind::Constant, BASE, None, true, 0);
            assert!(delay >= Duration::from_millis(80), "delay {delay:?} below jitter floor");
            assert!(delay <= Duration::from_millis(120), "delay {delay:?} above jitter ceiling");
        }
    }

    #[test]
    fn test_jitter_never_exceeds_max_delay() {
        let max = Duration::from_millis(100);
        for _ in 0..100 {
            let delay = compute_delay(BackoffKind::Constant, BASE, Some(max), true, 0);
            assert!(delay <= max);
        }
    }

    #[test]
    fn test_zero_base_delay() {
        let delay = compute_delay(BackoffKind::Exponential, Duration::ZERO, None, true, 3);
        assert_eq!(delay, Duration::ZERO);
    }
}
