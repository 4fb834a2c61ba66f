//! Bounded retry with fixed spacing.
//!
//! The delay is injected so callers decide how to wait (real sleep in the
//! lifecycle, a recording closure in tests).

use std::time::Duration;

/// Fixed retry budget: at most `max_attempts` tries, `delay` between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Result of a retry loop.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// Attempts actually performed (1..=max_attempts, or 0 if the budget is 0).
    pub attempts: u32,
    /// First success, or the error from the last attempt.
    pub result: Result<T, Option<E>>,
}

/// Call `op` until it succeeds or the budget is exhausted.
///
/// `op` receives the 1-based attempt number. The first success ends the loop
/// immediately. `wait` is called between attempts, never after the last one.
pub fn retry_fixed<T, E>(
    policy: RetryPolicy,
    mut wait: impl FnMut(Duration),
    mut op: impl FnMut(u32) -> Result<T, E>,
) -> RetryOutcome<T, E> {
    let mut last_err = None;
    for attempt in 1..=policy.max_attempts {
        match op(attempt) {
            Ok(value) => {
                return RetryOutcome {
                    attempts: attempt,
                    result: Ok(value),
                };
            }
            Err(err) => last_err = Some(err),
        }
        if attempt < policy.max_attempts {
            wait(policy.delay);
        }
    }
    RetryOutcome {
        attempts: policy.max_attempts,
        result: Err(last_err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn succeeds_on_kth_attempt() {
        let mut waits = Vec::new();
        let outcome = retry_fixed(policy(5), |d| waits.push(d), |attempt| {
            if attempt < 3 { Err("not ready") } else { Ok(attempt) }
        });
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, Ok(3));
        assert_eq!(waits, vec![Duration::from_millis(250); 2]);
    }

    #[test]
    fn exhausts_budget_and_keeps_last_error() {
        let mut waits = 0;
        let outcome = retry_fixed(policy(4), |_| waits += 1, |attempt| {
            Err::<(), _>(format!("attempt {attempt}"))
        });
        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.result, Err(Some("attempt 4".to_string())));
        assert_eq!(waits, 3);
    }

    #[test]
    fn first_success_short_circuits() {
        let mut calls = 0;
        let outcome = retry_fixed(policy(10), |_| {}, |_| {
            calls += 1;
            Ok::<_, ()>(())
        });
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_budget_never_calls() {
        let outcome = retry_fixed(policy(0), |_| {}, |_| Ok::<_, ()>(()));
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.result, Err(None));
    }
}
