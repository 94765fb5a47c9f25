//! Guarded execution of a rate-limited call.
//!
//! Wraps the check → mark → call → cooldown-on-429 sequence every consumer
//! of the breaker repeats.

use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitBreaker;

/// Errors that can tell whether they were caused by rate limiting.
pub trait RateLimitSignal {
    fn is_rate_limited(&self) -> bool;
}

impl RateLimitSignal for StatusCode {
    fn is_rate_limited(&self) -> bool {
        *self == StatusCode::TOO_MANY_REQUESTS
    }
}

impl RateLimitSignal for reqwest::Error {
    fn is_rate_limited(&self) -> bool {
        self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
    }
}

/// Outcome of [`CircuitBreaker::guard`].
#[derive(Debug)]
pub enum GuardedCall<T, E> {
    /// The breaker refused the call; nothing ran.
    Blocked,
    /// The call ran and succeeded.
    Completed(T),
    /// The call was rate limited; a global cooldown is now active.
    RateLimited { error: E, cooldown: Duration },
    /// The call failed for another reason. The key stays marked.
    Failed(E),
}

impl<T, E> GuardedCall<T, E> {
    pub fn is_blocked(&self) -> bool {
        matches!(self, GuardedCall::Blocked)
    }

    /// The successful value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            GuardedCall::Completed(value) => Some(value),
            _ => None,
        }
    }
}

impl CircuitBreaker {
    /// Run `call` for `key` if the breaker admits it.
    ///
    /// The key is reserved before `call` starts, so concurrent callers for
    /// the same key see at most one run. A rate-limited error triggers the
    /// default cooldown.
    pub async fn guard<T, E, F, Fut>(&self, key: &str, call: F) -> GuardedCall<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RateLimitSignal,
    {
        if !self.can_fetch(key) || !self.try_mark(key) {
            return GuardedCall::Blocked;
        }

        match call().await {
            Ok(value) => GuardedCall::Completed(value),
            Err(error) if error.is_rate_limited() => {
                let cooldown = self.trigger_default_cooldown();
                GuardedCall::RateLimited { error, cooldown }
            }
            Err(error) => {
                tracing::debug!(key, "Guarded call failed, key stays marked for the session");
                GuardedCall::Failed(error)
            }
        }
    }
}
