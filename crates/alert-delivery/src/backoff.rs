//! Exponential backoff with optional jitter.
//!
//! Pure: given the same attempt number and random source, the delay is
//! fully determined. The random generator is passed in by the caller so
//! tests can seed it.

use std::time::Duration;

use rand::Rng;

/// Parameters for the backoff curve.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub max: Duration,
    /// Growth factor between consecutive attempts.
    pub multiplier: f64,
    /// When set, the clamped delay is scaled by a uniform draw from
    /// [0.5, 1.0) so simultaneously-failing deliveries do not retry in
    /// lockstep.
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the given 1-based attempt number fails.
    ///
    /// `base * multiplier^(attempt-1)`, clamped to `max`, then jittered
    /// into `[0.5, 1.0)` of the clamped value when jitter is enabled.
    #[must_use]
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent as i32);
        let clamped = raw.min(self.max.as_secs_f64());

        let secs = if self.jitter {
            clamped * rng.gen_range(0.5..1.0)
        } else {
            clamped
        };

        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixed_policy(jitter: bool) -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_secs(2),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn exponential_without_jitter_is_exact() {
        let policy = fixed_policy(false);
        let mut rng = StdRng::seed_from_u64(0);

        assert_eq!(policy.delay(1, &mut rng), Duration::from_secs(2));
        assert_eq!(policy.delay(2, &mut rng), Duration::from_secs(4));
        assert_eq!(policy.delay(3, &mut rng), Duration::from_secs(8));
        assert_eq!(policy.delay(4, &mut rng), Duration::from_secs(16));
    }

    #[test]
    fn delay_never_exceeds_max() {
        let policy = fixed_policy(false);
        let mut rng = StdRng::seed_from_u64(0);

        for attempt in 1..=40 {
            assert!(
                policy.delay(attempt, &mut rng) <= policy.max,
                "attempt {attempt} exceeded max"
            );
        }
    }

    #[test]
    fn jitter_stays_within_half_to_full_of_clamped() {
        let policy = fixed_policy(true);
        let mut rng = StdRng::seed_from_u64(42);

        for attempt in 1..=20 {
            let no_jitter = fixed_policy(false).delay(attempt, &mut rng);
            let jittered = policy.delay(attempt, &mut rng);
            assert!(jittered >= no_jitter.mul_f64(0.5) - Duration::from_millis(1));
            assert!(jittered < no_jitter + Duration::from_millis(1));
        }
    }

    #[test]
    fn jitter_is_deterministic_under_a_fixed_seed() {
        let policy = fixed_policy(true);
        let a = policy.delay(3, &mut StdRng::seed_from_u64(7));
        let b = policy.delay(3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = fixed_policy(false);
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(policy.delay(u32::MAX, &mut rng), policy.max);
    }
}
