//! Bounded-attempt retry policy, expressed as a pure state machine.
//!
//! The client drives [`RetryState`] in a loop: `Attempting` performs one request and feeds
//! its [`Attempt`] classification to [`RetryPolicy::step`], `Backoff` sleeps through the
//! injected sleeper, and `Succeeded` / `Failed` end the call. Keeping `step` free of I/O
//! makes the bound and the delay schedule testable without a clock.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Classification of one failed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Auth(String),
    RateLimited { retry_after: Option<Duration> },
    NotFound(String),
    Transient(String),
    Fatal { status: u16, message: String },
    Parse(String),
}

impl Attempt {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Attempt::RateLimited { .. } | Attempt::Transient(_))
    }

    fn into_error(self, attempts: u32) -> ApiError {
        match self {
            Attempt::Auth(message) => ApiError::Auth { message },
            Attempt::RateLimited { .. } => ApiError::RateLimited { attempts },
            Attempt::NotFound(resource) => ApiError::NotFound { resource },
            Attempt::Transient(message) => ApiError::Transient { attempts, message },
            Attempt::Fatal { status, message } => ApiError::Fatal { status, message },
            Attempt::Parse(message) => ApiError::Parse { message },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryState<T> {
    Attempting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(T),
    Failed(ApiError),
}

impl<T> RetryState<T> {
    pub fn start() -> Self {
        RetryState::Attempting { attempt: 1 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total requests per call, first one included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: u64::try_from(base_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn attempts_bound(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Delay before attempt `attempt + 1`. A server hint wins over the exponential schedule,
    /// both are capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let cap = self.max_delay();
        if let Some(hint) = retry_after {
            return hint.min(cap);
        }
        let exponent = attempt.saturating_sub(1).min(31);
        let millis = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(millis).min(cap)
    }

    /// Advance the state machine after attempt number `attempt` produced `outcome`.
    pub fn step<T>(&self, attempt: u32, outcome: Result<T, Attempt>) -> RetryState<T> {
        match outcome {
            Ok(value) => RetryState::Succeeded(value),
            Err(failure) if failure.is_retryable() && attempt < self.attempts_bound() => {
                let retry_after = match &failure {
                    Attempt::RateLimited { retry_after } => *retry_after,
                    _ => None,
                };
                RetryState::Backoff {
                    attempt,
                    delay: self.delay_for(attempt, retry_after),
                }
            }
            Err(failure) => RetryState::Failed(failure.into_error(attempt)),
        }
    }
}

/// Parse a `Retry-After` header given in whole seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(4, Duration::from_millis(100), Duration::from_millis(500))
    }

    #[test]
    fn success_short_circuits() {
        let state = policy().step(1, Ok::<_, Attempt>(7));
        assert_eq!(state, RetryState::Succeeded(7));
    }

    #[test]
    fn exponential_schedule_is_capped() {
        let p = policy();
        assert_eq!(p.delay_for(1, None), Duration::from_millis(100));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(200));
        assert_eq!(p.delay_for(3, None), Duration::from_millis(400));
        assert_eq!(p.delay_for(4, None), Duration::from_millis(500));
        assert_eq!(p.delay_for(60, None), Duration::from_millis(500));
    }

    #[test]
    fn retry_after_hint_wins_but_is_clamped() {
        let p = policy();
        assert_eq!(
            p.delay_for(1, Some(Duration::from_millis(300))),
            Duration::from_millis(300)
        );
        assert_eq!(
            p.delay_for(1, Some(Duration::from_secs(60))),
            Duration::from_millis(500)
        );
    }

    #[test]
    fn rate_limit_backs_off_until_bound_then_fails() {
        let p = policy();
        let limited = || Err::<(), _>(Attempt::RateLimited { retry_after: None });

        for attempt in 1..4 {
            assert!(matches!(
                p.step(attempt, limited()),
                RetryState::Backoff { attempt: a, .. } if a == attempt
            ));
        }
        assert_eq!(
            p.step(4, limited()),
            RetryState::Failed(ApiError::RateLimited { attempts: 4 })
        );
    }

    #[test]
    fn transient_exhaustion_reports_transient() {
        let state = policy().step::<()>(4, Err(Attempt::Transient("503".into())));
        assert_eq!(
            state,
            RetryState::Failed(ApiError::Transient {
                attempts: 4,
                message: "503".into()
            })
        );
    }

    #[test]
    fn auth_and_not_found_fail_immediately() {
        let p = policy();
        assert!(matches!(
            p.step::<()>(1, Err(Attempt::Auth("403".into()))),
            RetryState::Failed(ApiError::Auth { .. })
        ));
        assert!(matches!(
            p.step::<()>(1, Err(Attempt::NotFound("team".into()))),
            RetryState::Failed(ApiError::NotFound { .. })
        ));
    }

    #[test]
    fn oversized_delays_saturate() {
        let p = RetryPolicy::new(3, Duration::MAX, Duration::MAX);
        assert_eq!(p.base_delay_ms, u64::MAX);
        assert_eq!(p.max_delay_ms, u64::MAX);
        assert_eq!(p.delay_for(2, None), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn zero_attempts_means_one() {
        let p = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert!(matches!(
            p.step::<()>(1, Err(Attempt::Transient("x".into()))),
            RetryState::Failed(ApiError::Transient { attempts: 1, .. })
        ));
    }

    #[test]
    fn parses_integral_retry_after() {
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}
