// src/crawl/retry.rs
// =============================================================================
// Bounded retries with randomized exponential backoff.
//
// Probes cross a best-effort multi-hop network, so a single lost packet
// should not mark a node as missing. Before attempt `i` (counting from 0,
// including the very first attempt) we sleep for:
//
//   uniform(0, base) * 2^i
//
// The random factor spreads out the thousands of probes that fan out at the
// same moment, so they don't all retry in lockstep.
// =============================================================================

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Default number of attempts per probe
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default upper bound of the random backoff factor
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// How many times to try a remote call, and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Upper bound (exclusive) of the random delay before attempt 0
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts,
            base_delay,
        }
    }

    /// Largest delay that can precede `attempt`: `base * 2^attempt`
    pub fn ceiling(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }

    /// Picks the delay before `attempt` using `rng`
    pub fn backoff<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        // Drawn in nanoseconds so sub-millisecond bases keep their jitter
        let base_ns = u64::try_from(self.base_delay.as_nanos()).unwrap_or(u64::MAX);
        let jitter = Duration::from_nanos(rng.gen_range(0..base_ns));
        jitter.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }
}

/// Runs `call` until it succeeds or `policy.attempts` runs out.
///
/// Returns the first success, or the error from the last attempt. A policy
/// with zero attempts is treated as one attempt so there is always an
/// outcome to report.
pub async fn with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    what: &str,
    mut call: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        // thread_rng() is not Send, so keep it out of the await below
        let delay = policy.backoff(attempt, &mut rand::thread_rng());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                debug!(what, attempt, max = attempts, error = %err, "attempt failed");
                if attempt >= attempts {
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_stays_under_ceiling() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(7);
        for attempt in 0..5 {
            for _ in 0..200 {
                let delay = policy.backoff(attempt, &mut rng);
                assert!(delay < policy.ceiling(attempt), "attempt {}: {:?}", attempt, delay);
            }
        }
    }

    #[test]
    fn test_ceiling_doubles_per_attempt() {
        let policy = RetryPolicy::default();
        let ceilings: Vec<_> = (0..5).map(|i| policy.ceiling(i).as_millis()).collect();
        assert_eq!(ceilings, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(policy.backoff(4, &mut rng), Duration::ZERO);
    }

    #[test]
    fn test_sub_millisecond_base_still_jitters() {
        let policy = RetryPolicy::new(5, Duration::from_micros(500));
        let mut rng = StdRng::seed_from_u64(3);
        let delays: Vec<_> = (0..50).map(|_| policy.backoff(2, &mut rng)).collect();
        assert!(delays.iter().any(|d| !d.is_zero()));
        assert!(delays.iter().all(|d| *d < policy.ceiling(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_make_exactly_five_calls() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let started = tokio::time::Instant::now();

        let result: Result<(), String> = with_backoff(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("failure {}", n)) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(result.unwrap_err(), "failure 4");
        // Sum of the ceilings 1s + 2s + 4s + 8s + 16s
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<u32, String> = with_backoff(&policy, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("lost".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(0, Duration::ZERO);
        let _: Result<(), &str> = with_backoff(&policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
