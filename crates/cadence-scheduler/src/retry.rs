use std::time::Duration;

use cadence_channels::ErrorClass;
use cadence_core::config::RetryConfig;
use rand::Rng;

/// Shortest delay ever returned, so a retried `run_at` is strictly later
/// than the attempt that failed.
const MIN_DELAY: Duration = Duration::from_secs(1);

/// Exponential backoff with proportional jitter and a hard attempt ceiling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base: Duration,
    max: Duration,
    /// In `[0, 1]`.
    jitter_fraction: f64,
}

impl RetryPolicy {
    /// Out-of-range inputs are clamped: at least one attempt, `max >= base`,
    /// jitter within `[0, 1]`.
    pub fn new(max_attempts: u32, base: Duration, max: Duration, jitter_fraction: f64) -> Self {
        let base = base.max(MIN_DELAY);
        let jitter_fraction = if jitter_fraction.is_finite() {
            jitter_fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            max_attempts: max_attempts.max(1),
            base,
            max: max.max(base),
            jitter_fraction,
        }
    }

    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self::new(
            cfg.max_attempts,
            Duration::from_secs(cfg.base_delay_secs),
            Duration::from_secs(cfg.max_delay_secs),
            cfg.jitter_fraction,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the next attempt, given `attempt_count` attempts made so
    /// far (including the one that just failed).
    ///
    /// `None` means stop: the failure is permanent or the ceiling is reached.
    /// A platform `retry_after` hint raises the delay but never lowers it.
    pub fn next_delay(
        &self,
        attempt_count: u32,
        class: ErrorClass,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        if class == ErrorClass::Permanent || attempt_count >= self.max_attempts {
            return None;
        }
        let jitter = if self.jitter_fraction > 0.0 {
            rand::rng().random_range(0.0..=self.jitter_fraction)
        } else {
            0.0
        };
        let computed = self.delay_with_jitter(attempt_count, jitter);
        Some(match retry_after {
            Some(hint) => computed.max(hint),
            None => computed,
        })
    }

    /// `min(max, base * 2^(attempt-1) * (1 + jitter))`, rounded to whole
    /// milliseconds.
    fn delay_with_jitter(&self, attempt_count: u32, jitter: f64) -> Duration {
        let exp = attempt_count.saturating_sub(1).min(62) as i32;
        let secs = self.base.as_secs_f64() * 2f64.powi(exp) * (1.0 + jitter);
        let capped = secs.min(self.max.as_secs_f64());
        let delay = Duration::from_millis((capped * 1000.0).round() as u64);
        delay.max(MIN_DELAY)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy::new(
            5,
            Duration::from_secs(30),
            Duration::from_secs(3600),
            jitter,
        )
    }

    #[test]
    fn doubles_without_jitter() {
        let p = policy(0.0);
        let delays: Vec<_> = (1..5)
            .map(|n| p.next_delay(n, ErrorClass::Transient, None).unwrap())
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120),
                Duration::from_secs(240),
            ]
        );
    }

    #[test]
    fn ceiling_stops_retries() {
        let p = policy(0.1);
        assert!(p.next_delay(5, ErrorClass::Transient, None).is_none());
        assert!(p.next_delay(9, ErrorClass::Transient, None).is_none());
    }

    #[test]
    fn retry_after_hint_wins_when_longer() {
        let p = policy(0.0);
        let hint = Duration::from_secs(900);
        assert_eq!(
            p.next_delay(1, ErrorClass::Transient, Some(hint)),
            Some(hint)
        );
        assert_eq!(
            p.next_delay(1, ErrorClass::Transient, Some(Duration::from_secs(5))),
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn capped_at_max_delay() {
        let p = RetryPolicy::new(50, Duration::from_secs(30), Duration::from_secs(100), 0.5);
        assert_eq!(
            p.next_delay(20, ErrorClass::Transient, None),
            Some(Duration::from_secs(100))
        );
    }

    #[test]
    fn clamps_bad_inputs() {
        let p = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO, f64::NAN);
        assert_eq!(p.max_attempts(), 1);
        assert_eq!(p.base, MIN_DELAY);
        assert_eq!(p.max, MIN_DELAY);
        assert_eq!(p.jitter_fraction, 0.0);
        assert_eq!(policy(7.0).jitter_fraction, 1.0);
    }

    proptest! {
        #[test]
        fn permanent_never_retries(attempt in 0u32..100, hint in proptest::option::of(0u64..10_000)) {
            let p = policy(0.2);
            let hint = hint.map(Duration::from_secs);
            prop_assert!(p.next_delay(attempt, ErrorClass::Permanent, hint).is_none());
        }

        #[test]
        fn delays_never_decrease(
            base in 1u64..600,
            extra in 0u64..20_000,
            jitter in 0.0f64..=1.0,
            max_attempts in 2u32..20,
        ) {
            let p = RetryPolicy::new(
                max_attempts,
                Duration::from_secs(base),
                Duration::from_secs(base + extra),
                jitter,
            );
            let mut prev = Duration::ZERO;
            for attempt in 1..max_attempts {
                let d = p.next_delay(attempt, ErrorClass::Transient, None).unwrap();
                prop_assert!(d >= MIN_DELAY);
                prop_assert!(d <= p.max);
                prop_assert!(d >= prev, "attempt {attempt}: {d:?} < {prev:?}");
                prev = d;
            }
            prop_assert!(p.next_delay(max_attempts, ErrorClass::Transient, None).is_none());
        }

        #[test]
        fn jitter_stays_within_fraction(attempt in 1u32..6, jitter in 0.0f64..=1.0) {
            let p = RetryPolicy::new(10, Duration::from_secs(10), Duration::from_secs(1_000_000), jitter);
            let d = p.next_delay(attempt, ErrorClass::Transient, None).unwrap().as_secs_f64();
            let floor = 10.0 * 2f64.powi(attempt as i32 - 1);
            prop_assert!(d >= floor - 0.001);
            prop_assert!(d <= floor * (1.0 + jitter) + 0.001);
        }
    }
}
