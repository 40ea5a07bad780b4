//! Bounded retry of an async operation.
//!
//! `run` executes an operation up to `max_attempts` times, waiting a
//! backoff delay between attempts. Only transient errors are retried; a
//! fatal error or an open circuit stops the loop on first occurrence. The
//! backoff sleep is the engine's only suspension point besides the wrapped
//! operation itself.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::backoff::BackoffPolicy;
use crate::error::{DeliveryError, ErrorClass};

/// Retry limits for one delivery.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard cap on operation invocations, including the first.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// What happened across the whole retry loop.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, DeliveryError>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    pub elapsed: Duration,
}

impl<T> RetryOutcome<T> {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Run `operation` with bounded retry.
///
/// The operation is invoked at most `policy.max_attempts` times regardless
/// of how its errors classify. Composing two policies does not multiply the
/// budget; callers own policy composition.
pub async fn run<T, F, Fut, R>(
    policy: &RetryPolicy,
    rng: &mut R,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DeliveryError>>,
    R: Rng,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    elapsed: started.elapsed(),
                }
            }
            Err(err) => {
                let stop = match err.class() {
                    ErrorClass::Transient => attempts >= max_attempts,
                    // Fatal errors cannot be fixed by retrying; an open
                    // circuit stays open for the whole reset window, so
                    // hammering it within one cycle is wasted work.
                    ErrorClass::Fatal | ErrorClass::CircuitOpen => true,
                };

                if stop {
                    return RetryOutcome {
                        result: Err(err),
                        attempts,
                        elapsed: started.elapsed(),
                    };
                }

                let delay = policy.backoff.delay(attempts, rng);
                tracing::debug!(
                    target: "alert_delivery",
                    attempt = attempts,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient delivery failure, backing off before retry"
                );
                sleep(delay).await;
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
    use std::sync::Arc;
    use uuid::Uuid;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                max: Duration::from_millis(1),
                multiplier: 1.0,
                jitter: false,
            },
        }
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = run(&fast_policy(3), &mut rng, || async { Ok::<_, DeliveryError>(7) }).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn never_exceeds_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut rng = StdRng::seed_from_u64(0);

        let counter = Arc::clone(&calls);
        let outcome = run(&fast_policy(3), &mut rng, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DeliveryError::Http { status: 503 })
            }
        })
        .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_error_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut rng = StdRng::seed_from_u64(0);

        let counter = Arc::clone(&calls);
        let outcome = run(&fast_policy(5), &mut rng, move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(DeliveryError::Http { status: 401 })
            }
        })
        .await;

        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn circuit_open_stops_immediately() {
        let mut rng = StdRng::seed_from_u64(0);
        let channel_id = Uuid::new_v4();

        let outcome = run(&fast_policy(5), &mut rng, move || async move {
            Err::<(), _>(DeliveryError::CircuitOpen(channel_id))
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert!(matches!(
            outcome.result,
            Err(DeliveryError::CircuitOpen(id)) if id == channel_id
        ));
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut rng = StdRng::seed_from_u64(0);

        let counter = Arc::clone(&calls);
        let outcome = run(&fast_policy(3), &mut rng, move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(DeliveryError::Http { status: 500 })
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn zero_max_attempts_still_runs_once() {
        let mut rng = StdRng::seed_from_u64(0);
        let outcome = run(&fast_policy(0), &mut rng, || async {
            Ok::<_, DeliveryError>(())
        })
        .await;
        assert_eq!(outcome.attempts, 1);
    }
}
