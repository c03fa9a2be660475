use std::time::Duration;

/// Exponential backoff schedule with a hard cap and a small jitter band.
///
/// The first failure waits `base`, doubling on each subsequent failure until
/// `cap` is reached. Jitter spreads concurrent workers so they do not hammer
/// a recovering endpoint in lockstep.
///
/// ```
/// use std::time::Duration;
/// use tideline::fetch::BackoffPolicy;
///
/// let policy = BackoffPolicy::default().with_jitter(0.0);
/// assert_eq!(policy.delay_for(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(2), Duration::from_secs(2));
/// assert_eq!(policy.delay_for(3), Duration::from_secs(4));
/// assert_eq!(policy.delay_for(10), Duration::from_secs(60));
/// ```
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_CAP)
    }
}

impl BackoffPolicy {
    pub const DEFAULT_BASE: Duration = Duration::from_secs(1);
    pub const DEFAULT_CAP: Duration = Duration::from_secs(60);
    const DEFAULT_JITTER: f64 = 0.1;

    #[must_use]
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            jitter: Self::DEFAULT_JITTER,
        }
    }

    /// Set the jitter band as a fraction of the computed delay (0.0 disables).
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before the next attempt, given how many failures have occurred
    /// so far (1-based).
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        let raw = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);
        self.apply_jitter(raw)
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }
        // Uniform in [1 - jitter, 1 + jitter].
        let factor = 1.0 + self.jitter * (rand::random::<f64>() * 2.0 - 1.0);
        delay.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_cap() {
        let policy = BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(60))
            .with_jitter(0.0);
        let delays: Vec<u64> = (1..=8).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = BackoffPolicy::new(Duration::from_secs(4), Duration::from_secs(60))
            .with_jitter(0.25);
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_secs(3), "delay too short: {delay:?}");
            assert!(delay <= Duration::from_secs(5), "delay too long: {delay:?}");
        }
    }

    #[test]
    fn huge_failure_counts_do_not_overflow() {
        let policy = BackoffPolicy::default().with_jitter(0.0);
        assert_eq!(policy.delay_for(u32::MAX), BackoffPolicy::DEFAULT_CAP);
    }
}
