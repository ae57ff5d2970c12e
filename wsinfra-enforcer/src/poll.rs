//! Bounded "wait until predicate is true" primitive.
//!
//! The poller is a pure control-flow combinator: the only side effects are the
//! predicate's own calls and the sleeps between attempts. There is no
//! cancellation token; dropping the returned future is the only way to stop it.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EnforcerError;

/// Result of one predicate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T, P> {
    /// Condition reached.
    Ready(T),
    /// Not yet; carries what was observed this time.
    Pending(P),
    /// The condition can never become true.
    Failed(String),
}

/// Poll interval and attempt bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSpec {
    pub interval_secs: u64,
    /// `None` polls until the condition is reached or fails.
    pub max_attempts: Option<u32>,
}

impl PollSpec {
    pub const fn bounded(interval_secs: u64, max_attempts: u32) -> Self {
        Self {
            interval_secs,
            max_attempts: Some(max_attempts),
        }
    }

    pub const fn unbounded(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            max_attempts: None,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Why a poll did not produce a value.
#[derive(Debug)]
pub enum PollError<P> {
    /// `max_attempts` consecutive pending results; carries the last one.
    Timeout { attempts: u32, last: P },
    /// The predicate reported that the condition can never become true.
    Failed(String),
    /// The predicate itself returned an error.
    Predicate(EnforcerError),
}

/// Invoke `predicate` until it is ready, fails, or `spec.max_attempts`
/// pending results were seen.
///
/// The first call happens immediately; a sleep of `spec.interval()` follows
/// every pending result except the last one.
pub async fn await_condition<T, P, F, Fut>(
    spec: PollSpec,
    mut predicate: F,
) -> Result<T, PollError<P>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollOutcome<T, P>, EnforcerError>>,
{
    let mut attempts: u32 = 0;
    loop {
        match predicate().await.map_err(PollError::Predicate)? {
            PollOutcome::Ready(value) => return Ok(value),
            PollOutcome::Failed(reason) => return Err(PollError::Failed(reason)),
            PollOutcome::Pending(last) => {
                attempts = attempts.saturating_add(1);
                if spec.max_attempts.is_some_and(|max| attempts >= max) {
                    return Err(PollError::Timeout { attempts, last });
                }
                debug!("Condition pending after {} attempts, sleeping", attempts);
                tokio::time::sleep(spec.interval()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_immediate_ready_does_not_sleep() {
        let start = Instant::now();
        let calls = Cell::new(0);

        let value = await_condition(PollSpec::bounded(3, 20), || {
            calls.set(calls.get() + 1);
            async { Ok::<_, EnforcerError>(PollOutcome::<_, ()>::Ready(42)) }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(calls.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_after_max_attempts() {
        let start = Instant::now();
        let calls = Cell::new(0u32);

        let err = await_condition(PollSpec::bounded(3, 20), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { Ok::<_, EnforcerError>(PollOutcome::<(), _>::Pending(n)) }
        })
        .await
        .unwrap_err();

        match err {
            PollError::Timeout { attempts, last } => {
                assert_eq!(attempts, 20);
                assert_eq!(last, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(calls.get(), 20);
        // 19 sleeps between 20 attempts
        assert_eq!(start.elapsed(), Duration::from_secs(3 * 19));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_after_some_pending() {
        let start = Instant::now();
        let calls = Cell::new(0u32);

        let value = await_condition(PollSpec::bounded(1, 240), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                Ok::<_, EnforcerError>(if n < 4 {
                    PollOutcome::Pending(n)
                } else {
                    PollOutcome::Ready("up")
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "up");
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_aborts_without_retry() {
        let calls = Cell::new(0u32);

        let err = await_condition(PollSpec::unbounded(20), || {
            calls.set(calls.get() + 1);
            async { Ok::<_, EnforcerError>(PollOutcome::<(), ()>::Failed("deleted".into())) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Failed(reason) if reason == "deleted"));
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_propagates() {
        let err = await_condition(PollSpec::bounded(1, 5), || async {
            Err::<PollOutcome<(), ()>, _>(EnforcerError::service(
                "describe_instance",
                "AccessDenied",
            ))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, PollError::Predicate(EnforcerError::Service { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_keeps_polling() {
        let calls = Cell::new(0u32);

        let value = await_condition(PollSpec::unbounded(20), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move {
                Ok::<_, EnforcerError>(if n < 100 {
                    PollOutcome::Pending(())
                } else {
                    PollOutcome::Ready(n)
                })
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 100);
    }
}
