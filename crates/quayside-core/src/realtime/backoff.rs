// ── Reconnect backoff ──
//
// delay = min(base * 2^retry, max) + jitter, jitter uniform in [0, 250ms).

use std::time::Duration;

use rand::Rng;

/// Exclusive upper bound of the random jitter added to every delay.
pub const MAX_JITTER: Duration = Duration::from_millis(250);

/// Retry counter ceiling. Keeps the exponent bounded; `max` still caps the
/// resulting delay.
pub const MAX_RETRY_COUNT: u32 = 10;

const MAX_JITTER_MICROS: u64 = 250_000;

/// Exponential backoff with additive jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

impl Backoff {
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// `min(base * 2^retry, max)`, with `retry` clamped to [`MAX_RETRY_COUNT`].
    pub fn delay_without_jitter(&self, retry: u32) -> Duration {
        let exponent = retry.min(MAX_RETRY_COUNT);
        self.base.saturating_mul(1 << exponent).min(self.max)
    }

    /// Delay for `retry` plus a caller-supplied jitter in `[0, MAX_JITTER)`.
    pub fn delay(&self, retry: u32, jitter: Duration) -> Duration {
        self.delay_without_jitter(retry) + jitter
    }

    /// Delay for `retry` with fresh random jitter.
    pub fn next_delay(&self, retry: u32) -> Duration {
        self.delay(retry, random_jitter())
    }

    /// Counter value after scheduling one more retry.
    pub fn next_retry_count(retry: u32) -> u32 {
        retry.saturating_add(1).min(MAX_RETRY_COUNT)
    }
}

/// Uniformly distributed jitter in `[0, MAX_JITTER)`.
pub fn random_jitter() -> Duration {
    Duration::from_micros(rand::thread_rng().gen_range(0..MAX_JITTER_MICROS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_follows_capped_doubling() {
        let backoff = Backoff::default();
        for n in 0..=MAX_RETRY_COUNT {
            let expected = (1000_u64 << n).min(30_000);
            assert_eq!(
                backoff.delay_without_jitter(n),
                Duration::from_millis(expected),
                "retry {n}"
            );
        }
    }

    #[test]
    fn exponent_is_clamped_beyond_ceiling() {
        let backoff = Backoff::new(Duration::from_millis(10), Duration::from_secs(3600));
        assert_eq!(backoff.delay_without_jitter(10), Duration::from_millis(10_240));
        assert_eq!(backoff.delay_without_jitter(25), Duration::from_millis(10_240));
        assert_eq!(backoff.delay_without_jitter(u32::MAX), Duration::from_millis(10_240));
    }

    #[test]
    fn jitter_stays_in_range() {
        for _ in 0..2_000 {
            let jitter = random_jitter();
            assert!(jitter < MAX_JITTER, "jitter {jitter:?} out of range");
        }
    }

    #[test]
    fn randomized_delay_is_base_plus_bounded_jitter() {
        let backoff = Backoff::default();
        for n in 0..=MAX_RETRY_COUNT {
            let floor = backoff.delay_without_jitter(n);
            let delay = backoff.next_delay(n);
            assert!(delay >= floor && delay < floor + MAX_JITTER, "retry {n}: {delay:?}");
        }
    }

    #[test]
    fn retry_count_saturates_at_ceiling() {
        assert_eq!(Backoff::next_retry_count(0), 1);
        assert_eq!(Backoff::next_retry_count(9), 10);
        assert_eq!(Backoff::next_retry_count(10), 10);
    }
}
