//! Poll interval policy.

use rand::Rng;
use std::time::Duration;

/// How long to wait between poll cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPolicy {
    /// Always wait the same amount of time.
    Fixed(Duration),
    /// Wait twice the last round-trip time, bounded and jittered.
    Adaptive {
        /// Floor of the final interval.
        min: Duration,
        /// Ceiling of the base interval before jitter.
        max: Duration,
        /// Jitter as a percentage of the base interval (0-100).
        jitter_percent: u8,
    },
}

impl IntervalPolicy {
    /// Computes the next interval using the thread-local RNG.
    pub fn next_interval(&self, last_duration: Duration) -> Duration {
        self.next_interval_with(last_duration, &mut rand::thread_rng())
    }

    /// Computes the next interval drawing jitter from `rng`.
    ///
    /// Adaptive mode clamps `2 × last_duration` into `[min, max]`, scales it by
    /// a factor drawn uniformly from `[1 - j, 1 + j]` and floors the result at
    /// `min`. The jittered value may exceed `max`.
    pub fn next_interval_with<R: Rng + ?Sized>(
        &self,
        last_duration: Duration,
        rng: &mut R,
    ) -> Duration {
        match *self {
            IntervalPolicy::Fixed(interval) => interval,
            IntervalPolicy::Adaptive {
                min,
                max,
                jitter_percent,
            } => {
                let base = last_duration.saturating_mul(2).max(min).min(max);
                let spread = f64::from(jitter_percent.min(100)) / 100.0;
                if spread == 0.0 {
                    return base.max(min);
                }
                let factor = 1.0 + rng.gen_range(-spread..=spread);
                Duration::try_from_secs_f64(base.as_secs_f64() * factor)
                    .unwrap_or(base)
                    .max(min)
            }
        }
    }
}
