use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_INITIAL_DELAY_MS: u64 = 3000;
const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Reconnect delay policy.
///
/// The first delay after a connection that reached `Open` is always
/// `initial_delay_ms`; consecutive failed attempts grow it by `multiplier` up to
/// `max_delay_ms`. `jitter` shaves a random fraction (at most `jitter`) off each
/// delay so that clients dropped together do not all come back together.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: 0.0,
        }
    }
}

impl BackoffConfig {
    /// Same delay every time.
    #[cfg(test)]
    pub fn fixed(delay: Duration) -> Self {
        let ms = delay.as_millis() as u64;
        Self {
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = Duration::from_millis(config.initial_delay_ms);
        let max = Duration::from_millis(config.max_delay_ms).max(initial);
        let multiplier = if config.multiplier.is_finite() {
            config.multiplier.max(1.0)
        } else {
            1.0
        };
        let jitter = if config.jitter.is_finite() {
            config.jitter.clamp(0.0, 1.0)
        } else {
            0.0
        };

        Self {
            initial,
            max,
            multiplier,
            jitter,
            current: initial,
        }
    }

    /// Delay to wait before the next attempt; advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current;
        // f64 product: `Duration::mul_f64` panics past `Duration::MAX`
        let grown = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier);
        self.current = grown.map_or(self.max, |grown| grown.max(base).min(self.max));

        if self.jitter > 0.0 {
            let cut = rand::rng().random_range(0.0..=self.jitter);
            base.mul_f64(1.0 - cut).min(base)
        } else {
            base
        }
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grows_and_caps() {
        let mut backoff = Backoff::new(&BackoffConfig::default());

        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        assert_eq!(backoff.next_delay(), Duration::from_secs(6));
        assert_eq!(backoff.next_delay(), Duration::from_secs(12));
        assert_eq!(backoff.next_delay(), Duration::from_secs(24));
        assert_eq!(backoff.next_delay(), Duration::from_secs(48));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Duration::from_secs(60));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(&BackoffConfig::default());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_fixed() {
        let mut backoff = Backoff::new(&BackoffConfig::fixed(Duration::from_millis(250)));

        for _ in 0..5 {
            assert_eq!(backoff.next_delay(), Duration::from_millis(250));
        }
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = BackoffConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
            multiplier: 1.0,
            jitter: 0.5,
        };
        let mut backoff = Backoff::new(&config);

        for _ in 0..100 {
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(500), "{:?}", delay);
            assert!(delay <= Duration::from_millis(1000), "{:?}", delay);
        }
    }

    #[test]
    fn test_huge_growth_saturates_at_max() {
        let config = BackoffConfig {
            initial_delay_ms: 3000,
            max_delay_ms: u64::MAX,
            multiplier: 1e20,
            jitter: 0.0,
        };
        let mut backoff = Backoff::new(&config);
        let max = Duration::from_millis(u64::MAX);

        assert_eq!(backoff.next_delay(), Duration::from_secs(3));
        for _ in 0..10 {
            assert!(backoff.next_delay() <= max);
        }
        assert_eq!(backoff.next_delay(), max);
    }

    #[test]
    fn test_huge_growth_with_jitter_does_not_panic() {
        let config = BackoffConfig {
            initial_delay_ms: u64::MAX,
            max_delay_ms: u64::MAX,
            multiplier: f64::MAX,
            jitter: 1.0,
        };
        let mut backoff = Backoff::new(&config);

        for _ in 0..10 {
            assert!(backoff.next_delay() <= Duration::from_millis(u64::MAX));
        }
    }

    #[test]
    fn test_nonsense_values_are_sanitised() {
        let config = BackoffConfig {
            initial_delay_ms: 2000,
            max_delay_ms: 10,
            multiplier: 0.1,
            jitter: 7.0,
        };
        let backoff = Backoff::new(&config);

        assert_eq!(backoff.max, Duration::from_millis(2000));
        assert_eq!(backoff.multiplier, 1.0);
        assert_eq!(backoff.jitter, 1.0);
    }
}
