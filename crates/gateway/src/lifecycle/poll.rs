//! Timed retry combinator shared by every polling phase.

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    /// The success predicate held for `value`.
    Settled { value: T, attempts: u32 },
    /// The attempt budget ran out; `last` is the final observation.
    Exhausted { last: T, attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Settled { attempts, .. } | PollOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Probes until `settled` holds, `failed` yields an error, or the budget runs out.
///
/// The first probe runs immediately and `policy.interval` is slept between
/// probes. Probe errors are returned as-is without retrying. A zero budget is
/// treated as one attempt.
pub async fn poll_until<T, P, Fut, S, F>(
    policy: &PollPolicy,
    mut probe: P,
    settled: S,
    failed: F,
) -> Result<PollOutcome<T>>
where
    P: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    S: Fn(&T) -> bool,
    F: Fn(&T) -> Option<Error>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let value = probe(attempt).await?;

        if let Some(err) = failed(&value) {
            return Err(err);
        }
        if settled(&value) {
            return Ok(PollOutcome::Settled {
                value,
                attempts: attempt,
            });
        }
        if attempt >= max_attempts {
            return Ok(PollOutcome::Exhausted {
                last: value,
                attempts: attempt,
            });
        }

        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn settles_without_sleeping_on_first_hit() {
        let policy = PollPolicy::new(Duration::from_secs(5), 30);
        let started = Instant::now();

        let outcome = poll_until(&policy, |_| async { Ok(3) }, |v| *v == 3, |_| None)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Settled { value: 3, attempts: 1 });
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_attempts_until_budget_is_spent() {
        let policy = PollPolicy::new(Duration::from_secs(5), 4);
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let outcome = poll_until(
            &policy,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(attempt) }
            },
            |_| false,
            |_| None,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { last: 4, attempts: 4 });
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_predicate_stops_polling() {
        let policy = PollPolicy::new(Duration::from_secs(2), 10);

        let result = poll_until(
            &policy,
            |attempt| async move { Ok(attempt) },
            |_| false,
            |v| (*v == 2).then(|| Error::Internal("boom".into())),
        )
        .await;

        assert!(matches!(result, Err(Error::Internal(msg)) if msg == "boom"));
    }

    #[tokio::test]
    async fn probe_errors_are_not_retried() {
        let policy = PollPolicy::new(Duration::from_millis(1), 10);
        let calls = AtomicU32::new(0);

        let result: Result<PollOutcome<u32>> = poll_until(
            &policy,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Provider { status: 503, message: "unavailable".into() }) }
            },
            |_| true,
            |_| None,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_budget_still_probes_once() {
        let policy = PollPolicy::new(Duration::from_millis(1), 0);
        let outcome = poll_until(&policy, |_| async { Ok("x") }, |_| false, |_| None)
            .await
            .unwrap();
        assert_eq!(outcome.attempts(), 1);
    }
}
