use core::time::Duration;

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyError {
    #[error("a retry policy needs at least one attempt")]
    ZeroAttempts,

    #[error("backoff factor must be a finite number no smaller than 1, got {0}")]
    InvalidFactor(f64),
}

/// Bounds and pacing of conflict retries.
///
/// The delay slept after the `n`th failed attempt is
/// `initial_backoff * factor^(n-1)`, clamped to `max_backoff` when one is
/// set, plus a uniformly random jitter in `[0, jitter]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    factor: f64,
    jitter: Option<Duration>,
    max_backoff: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        factor: f64,
    ) -> Result<Self, PolicyError> {
        if max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }

        if !factor.is_finite() || factor < 1.0 {
            return Err(PolicyError::InvalidFactor(factor));
        }

        Ok(Self {
            max_attempts,
            initial_backoff,
            factor,
            jitter: None,
            max_backoff: None,
        })
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = Some(jitter);
        self
    }

    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = None;
        self
    }

    #[must_use]
    pub const fn with_max_backoff(mut self, cap: Duration) -> Self {
        self.max_backoff = Some(cap);
        self
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    #[must_use]
    pub const fn factor(&self) -> f64 {
        self.factor
    }

    #[must_use]
    pub const fn jitter(&self) -> Option<Duration> {
        self.jitter
    }

    /// Deterministic part of the wait after `attempt` (1-based) failed.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let nanos = self.initial_backoff.as_nanos() as f64 * self.factor.powi(exponent);

        // Float-to-int casts saturate, so an overflowing product becomes u64::MAX.
        let delay = Duration::from_nanos(nanos as u64);

        match self.max_backoff {
            Some(cap) => delay.min(cap),
            None => delay,
        }
    }

    /// Full wait after `attempt` failed, jitter included.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt);

        let Some(jitter) = self.jitter.filter(|j| !j.is_zero()) else {
            return base;
        };

        let bound = u64::try_from(jitter.as_nanos()).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=bound);

        base.saturating_add(Duration::from_nanos(extra))
    }
}

impl Default for RetryPolicy {
    /// Five attempts, 10ms apart, with up to 1ms of jitter.
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
            factor: 1.0,
            jitter: Some(Duration::from_millis(1)),
            max_backoff: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_bounds() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_millis(10), 2.0),
            Err(PolicyError::ZeroAttempts)
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::from_millis(10), 0.5),
            Err(PolicyError::InvalidFactor(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::from_millis(10), f64::NAN),
            Err(PolicyError::InvalidFactor(_))
        ));
        assert!(matches!(
            RetryPolicy::new(3, Duration::from_millis(10), f64::INFINITY),
            Err(PolicyError::InvalidFactor(_))
        ));
    }

    #[test]
    fn backoff_grows_geometrically() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), 2.0).expect("valid policy");

        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(40));
    }

    #[test]
    fn backoff_never_shrinks() {
        let policy = RetryPolicy::new(50, Duration::from_millis(3), 1.5).expect("valid policy");

        for attempt in 1..50 {
            assert!(
                policy.backoff(attempt + 1) >= policy.backoff(attempt),
                "backoff shrank after attempt {attempt}"
            );
        }
    }

    #[test]
    fn cap_clamps_backoff() {
        let policy = RetryPolicy::new(10, Duration::from_millis(10), 10.0)
            .expect("valid policy")
            .with_max_backoff(Duration::from_millis(500));

        assert_eq!(policy.backoff(2), Duration::from_millis(100));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 1.0)
            .expect("valid policy")
            .with_jitter(Duration::from_millis(5));

        for _ in 0..100 {
            let delay = policy.delay(1);
            assert!(delay >= Duration::from_millis(10), "delay {delay:?} below base");
            assert!(delay <= Duration::from_millis(15), "delay {delay:?} above bound");
        }
    }

    #[test]
    fn default_mirrors_conventional_retry() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.backoff(4), Duration::from_millis(10));
        assert_eq!(policy.jitter(), Some(Duration::from_millis(1)));
    }
}
