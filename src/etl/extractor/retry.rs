//! Retry policy for page fetches
//!
//! Decides which fetch failures are worth another attempt and how long to
//! wait before it. The default reproduces the upstream client's historical
//! behavior: a retryable status is retried forever, immediately. Anything
//! else fails the run on the first occurrence.

use std::time::Duration;

use crate::etl::error::FetchError;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries per page (`None` = unbounded)
    pub max_retries: Option<u32>,

    /// Delay before the first retry (zero = retry immediately)
    pub initial_backoff: Duration,

    /// Upper bound for the delay between retries
    pub max_backoff: Duration,

    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub backoff_multiplier: f64,

    /// Also retry transport errors (network, DNS, timeout).
    ///
    /// Off by default: a failed round trip aborts the run.
    pub retry_transport_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            retry_transport_errors: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a bounded policy with exponential backoff.
    pub fn new(
        max_retries: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries: Some(max_retries),
            initial_backoff,
            max_backoff,
            backoff_multiplier,
            retry_transport_errors: false,
        }
    }

    /// Creates a policy with no retries (fail immediately).
    pub fn no_retry() -> Self {
        Self {
            max_retries: Some(0),
            ..Self::default()
        }
    }

    pub fn with_transport_retries(mut self, enabled: bool) -> Self {
        self.retry_transport_errors = enabled;
        self
    }

    /// Whether this kind of error is ever retried under this policy.
    pub fn is_retryable(&self, err: &FetchError) -> bool {
        match err {
            FetchError::RetryableStatus { .. } => true,
            FetchError::Transport(_) => self.retry_transport_errors,
            FetchError::FatalStatus { .. } | FetchError::Decode(_) => false,
        }
    }

    /// Whether to try again after `retries` retries have already been spent.
    pub fn should_retry(&self, err: &FetchError, retries: u32) -> bool {
        self.is_retryable(err) && self.max_retries.map_or(true, |max| retries < max)
    }

    /// Delay before retry number `retry` (zero-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }

        let factor = self.backoff_multiplier.max(1.0).powi(retry.min(64) as i32);
        let nanos = (self.initial_backoff.as_nanos() as f64 * factor).round();
        let nanos = if nanos >= u64::MAX as f64 {
            u64::MAX
        } else {
            nanos as u64
        };
        let backoff = Duration::from_nanos(nanos);

        if self.max_backoff.is_zero() {
            backoff
        } else {
            backoff.min(self.max_backoff)
        }
    }
}
