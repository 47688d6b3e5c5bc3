//! Error taxonomy for the client.
//!
//! Callers see exactly three failure shapes from [`PerplexityClient`](crate::PerplexityClient):
//! bad configuration at construction, a request that the retry policy gave up
//! on, or a 2xx response whose body could not be parsed. Cost-estimation
//! failures never surface here — they degrade to a zero cost inside the
//! query path (see [`cost`](crate::cost)).

use reqwest::StatusCode;

/// Failures surfaced to callers of the client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal to construction: the client
    /// is never returned half-initialized.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The API returned a non-2xx status and the retry policy is exhausted
    /// (immediately, for permanent statuses like 401).
    #[error("request failed with HTTP {status} after {attempts} attempt(s)")]
    RequestFailed {
        status: StatusCode,
        /// Total attempts made, including the initial one.
        attempts: u32,
    },

    /// A 2xx response whose body was not valid JSON or lacked
    /// `choices[0].message.content`. Never retried — resending the same
    /// request cannot fix a malformed response shape.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Network-level failure (connect, timeout, body read) that persisted
    /// through the retry budget.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_failed_display_carries_status_and_attempts() {
        let err = Error::RequestFailed {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            attempts: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("500"), "got: {msg}");
        assert!(msg.contains("4 attempt"), "got: {msg}");
    }

    #[test]
    fn config_error_display() {
        let err = Error::Config("PPLX_API_KEY not set".into());
        assert!(err.to_string().contains("PPLX_API_KEY"));
    }
}
