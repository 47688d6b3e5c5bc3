//! Bounded retry with a fixed delay and status classification.
//!
//! Only transient failures are retried: HTTP 429, 5xx, and network-level
//! errors (connect/timeout/read). Permanent rejections (400, 401, any other
//! 4xx) fail immediately instead of burning the retry budget — a bad API key
//! does not get better by waiting a second.

use std::time::Duration;

use reqwest::StatusCode;

/// Retry budget and pacing for [`query`](crate::PerplexityClient::query).
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt
    /// (0 = fail on the first non-2xx).
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries and the default delay.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Total attempts the policy allows (initial attempt + retries).
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Whether a non-2xx status is worth retrying.
///
/// 429 and every 5xx are assumed transient. Everything else in 4xx space is
/// a permanent rejection of this exact request.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
