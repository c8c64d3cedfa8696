//! Retry policy selection and delay shaping.
//!
//! The pipeline only decides *whether* to retry and *how long* to wait; the
//! waiting itself is delegated to `tokio::time`. No individual step retries
//! on its own.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::Method;

use crate::error::HttpClientError;

/// Retry selector. Off by default.
#[derive(Clone, Default)]
pub enum RetryPolicy {
    /// Never retry.
    #[default]
    Off,
    /// Retry transient transport faults, but only for idempotent methods.
    Safe,
    /// Caller-supplied predicate over the attempt error.
    Custom(Arc<dyn Fn(&HttpClientError) -> bool + Send + Sync>),
}

impl RetryPolicy {
    /// Decide whether the failed attempt should be retried.
    pub fn should_retry(&self, method: &Method, error: &HttpClientError) -> bool {
        match self {
            Self::Off => false,
            Self::Safe => error.is_retryable() && is_idempotent(method),
            Self::Custom(predicate) => predicate(error),
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("Off"),
            Self::Safe => f.write_str("Safe"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

fn is_idempotent(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
    )
}

/// Delay between attempts: a fixed duration or a function of the attempt
/// count (1-indexed).
#[derive(Clone)]
pub enum RetryDelay {
    /// The same delay before every retry.
    Fixed(Duration),
    /// Delay computed from the attempt number.
    Backoff(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(250))
    }
}

impl RetryDelay {
    /// Delay to wait before the given attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Backoff(f) => f(attempt),
        }
    }
}

impl fmt::Debug for RetryDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::Backoff(_) => f.write_str("Backoff(..)"),
        }
    }
}
