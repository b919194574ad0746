//! Backoff mathematics shared by recovery and reconnection
//!
//! `delay(n) = min(base * multiplier^(n-1), max)` for attempt `n >= 1`,
//! optionally perturbed by a symmetric jitter ratio (±10% by default).

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default jitter ratio (±10%)
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

/// Exponential backoff curve with a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay before the second attempt, in milliseconds
    pub base_delay_ms: u64,
    /// Ceiling applied before jitter, in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor per attempt
    pub multiplier: f64,
    /// Symmetric jitter ratio in `[0, 1)`
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_jitter_ratio() -> f64 {
    DEFAULT_JITTER_RATIO
}

impl Backoff {
    /// Create curve with the default ±10% jitter
    #[inline]
    #[must_use]
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            multiplier,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }

    /// With jitter ratio (clamped to `[0, 0.99]`)
    #[inline]
    #[must_use]
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 0.99);
        self
    }

    /// Without jitter; delays are exactly the computed curve
    #[inline]
    #[must_use]
    pub fn without_jitter(self) -> Self {
        self.with_jitter(0.0)
    }

    /// Un-jittered delay in milliseconds for a 1-based attempt index
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1);
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        #[allow(clippy::cast_precision_loss)]
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(exponent);
        #[allow(clippy::cast_precision_loss)]
        let cap = self.max_delay_ms as f64;
        if !raw.is_finite() || raw >= cap {
            return self.max_delay_ms;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = raw.round() as u64;
        ms.min(self.max_delay_ms)
    }

    /// Un-jittered delay for a 1-based attempt index
    #[inline]
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_for(attempt))
    }

    /// Jittered delay using the thread-local RNG
    #[must_use]
    pub fn jittered_delay_for(&self, attempt: u32) -> Duration {
        self.jittered_delay_with(attempt, &mut rand::rng())
    }

    /// Jittered delay using a caller-supplied RNG
    #[must_use]
    pub fn jittered_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay_for(attempt);
        if self.jitter_ratio <= 0.0 || base == 0 {
            return Duration::from_millis(base);
        }
        let factor = rng.random_range(-self.jitter_ratio..=self.jitter_ratio);
        #[allow(clippy::cast_precision_loss)]
        let jittered = base as f64 * (1.0 + factor);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = jittered.max(0.0).round() as u64;
        Duration::from_millis(ms)
    }

    /// Un-jittered schedule of waits between `attempts` attempts
    #[must_use]
    pub fn schedule(&self, attempts: u32) -> Vec<Duration> {
        (1..attempts).map(|n| self.delay_for(n)).collect()
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(1_000, 30_000, 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn exponential_curve_is_capped() {
        let backoff = Backoff::new(1_000, 3_000, 2.0);
        assert_eq!(backoff.base_delay_for(1), 1_000);
        assert_eq!(backoff.base_delay_for(2), 2_000);
        assert_eq!(backoff.base_delay_for(3), 3_000);
        assert_eq!(backoff.base_delay_for(30), 3_000);
    }

    #[test]
    fn attempt_zero_is_treated_as_first() {
        let backoff = Backoff::new(500, 10_000, 2.0);
        assert_eq!(backoff.base_delay_for(0), 500);
    }

    #[test]
    fn huge_exponent_saturates_to_cap() {
        let backoff = Backoff::new(1_000, 60_000, 10.0);
        assert_eq!(backoff.base_delay_for(u32::MAX), 60_000);
    }

    #[test]
    fn schedule_has_one_wait_between_each_attempt() {
        let backoff = Backoff::new(1_000, 30_000, 2.0);
        assert_eq!(
            backoff.schedule(3),
            vec![Duration::from_millis(1_000), Duration::from_millis(2_000)]
        );
        assert!(backoff.schedule(1).is_empty());
    }

    #[test]
    fn without_jitter_is_exact() {
        let backoff = Backoff::new(1_000, 30_000, 2.0).without_jitter();
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            backoff.jittered_delay_with(2, &mut rng),
            Duration::from_millis(2_000)
        );
    }

    proptest! {
        #[test]
        fn delays_are_non_decreasing_up_to_cap(
            base in 1u64..5_000,
            cap in 5_000u64..120_000,
            multiplier in 1.0f64..4.0,
        ) {
            let backoff = Backoff::new(base, cap, multiplier);
            let mut previous = 0;
            for attempt in 1..40 {
                let delay = backoff.base_delay_for(attempt);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= cap);
                previous = delay;
            }
        }

        #[test]
        fn jitter_stays_within_ratio(seed in any::<u64>(), attempt in 1u32..10) {
            let backoff = Backoff::new(1_000, 30_000, 2.0);
            let mut rng = StdRng::seed_from_u64(seed);
            let base = backoff.base_delay_for(attempt);
            let jittered = u64::try_from(backoff.jittered_delay_with(attempt, &mut rng).as_millis()).unwrap();
            let lower = base * 9 / 10;
            let upper = base * 11 / 10 + 1;
            prop_assert!(jittered >= lower && jittered <= upper, "{} not in [{}, {}]", jittered, lower, upper);
        }
    }
}
