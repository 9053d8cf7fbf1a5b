use std::future::Future;
use std::time::Duration;

use rand::Rng;

const DEFAULT_MAX_ATTEMPTS: u32 = 50;
const DEFAULT_BASE: Duration = Duration::from_secs(1);
const DEFAULT_MAX: Duration = Duration::from_secs(64);
/// Upper bound for a configured ceiling; keeps the round counter far from overflow.
const MAX_ATTEMPTS_LIMIT: u32 = 10_000;
const MAX_DOUBLINGS: u32 = 16;

/// Exponential delay between failed upload rounds: `base * 2^(round - 1)`,
/// capped at `max`. With jitter the delay is drawn uniformly from
/// `[0, cap]` so that several clients do not retry in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: bool) -> Self {
        Self { base, max, jitter }
    }

    /// Longest wait after the `round`-th consecutive failure (1-based).
    fn cap(&self, round: u32) -> Duration {
        let doublings = round.saturating_sub(1).min(MAX_DOUBLINGS);
        self.base.saturating_mul(1 << doublings).min(self.max)
    }

    fn delay_after<R: Rng + ?Sized>(&self, round: u32, rng: &mut R) -> Duration {
        let cap = self.cap(round);
        if self.jitter && !cap.is_zero() {
            rng.gen_range(Duration::ZERO..=cap)
        } else {
            cap
        }
    }
}

/// Delay schedule plus the ceiling on failed upload rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Backoff,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// `max_attempts` is clamped to `1..=MAX_ATTEMPTS_LIMIT`.
    pub fn new(backoff: Backoff, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_LIMIT),
        }
    }

    /// Wait before recovering from the `failed_rounds`-th failure.
    pub fn delay_after(&self, failed_rounds: u32) -> Duration {
        self.backoff
            .delay_after(failed_rounds, &mut rand::thread_rng())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Backoff::new(DEFAULT_BASE, DEFAULT_MAX, true),
            DEFAULT_MAX_ATTEMPTS,
        )
    }
}

/// Suspends the upload between failed rounds.
pub trait Sleeper {
    fn sleep(&self, delay: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn steady(base_ms: u64, max_ms: u64) -> Backoff {
        Backoff::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(max_ms),
            false,
        )
    }

    #[test]
    fn default_schedule_doubles_from_one_second_up_to_a_minute() {
        let backoff = Backoff {
            jitter: false,
            ..RetryPolicy::default().backoff
        };
        let schedule: Vec<u64> = (1..=9).map(|round| backoff.cap(round).as_secs()).collect();
        assert_eq!(schedule, vec![1, 2, 4, 8, 16, 32, 64, 64, 64]);
        assert_eq!(backoff.cap(RetryPolicy::default().max_attempts), Duration::from_secs(64));
    }

    #[test]
    fn steady_backoff_ignores_rng() {
        let backoff = steady(250, 1_000);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(backoff.delay_after(2, &mut rng), Duration::from_millis(500));
        assert_eq!(backoff.delay_after(u32::MAX, &mut rng), Duration::from_millis(1_000));
    }

    #[test]
    fn jittered_delay_stays_within_round_cap() {
        let backoff = Backoff::new(Duration::from_millis(250), Duration::from_secs(2), true);
        let mut rng = StdRng::seed_from_u64(42);
        for round in 1..=12 {
            let delay = backoff.delay_after(round, &mut rng);
            assert!(delay <= backoff.cap(round), "round {round}: {delay:?}");
        }
    }

    #[test]
    fn zero_base_never_waits() {
        let policy = RetryPolicy::new(Backoff::new(Duration::ZERO, Duration::ZERO, true), 3);
        assert_eq!(policy.delay_after(1), Duration::ZERO);
        assert_eq!(policy.delay_after(3), Duration::ZERO);
    }

    #[test]
    fn ceiling_is_clamped() {
        let backoff = steady(0, 0);
        assert_eq!(RetryPolicy::new(backoff, 0).max_attempts, 1);
        assert_eq!(
            RetryPolicy::new(backoff, u32::MAX).max_attempts,
            MAX_ATTEMPTS_LIMIT
        );
        assert_eq!(RetryPolicy::default().max_attempts, 50);
    }
}
