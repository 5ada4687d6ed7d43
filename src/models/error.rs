//! Error types for flowgate.
//!
//! Four outcomes matter to callers and stay distinct:
//! - invalid input (rejected before any network activity)
//! - transient transport failures (retried up to a deadline)
//! - remote job failure (terminal, never retried)
//! - poll deadline exceeded (we gave up waiting, the job may still run)

use std::time::Duration;
use thiserror::Error;

/// Top-level error type for flowgate.
#[derive(Debug, Error)]
pub enum FlowgateError {
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    /// Bad caller input, detected before any request is made.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },

    /// The remote service reported the job itself failed. Terminal;
    /// retrying would not change the outcome.
    #[error("Job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// The poll deadline elapsed before a terminal status was observed.
    /// Distinct from `JobFailed`: the remote job may still be running.
    #[error("Job {job_id} not finished after {waited:?} ({checks} checks)")]
    DeadlineExceeded {
        job_id: String,
        waited: Duration,
        checks: u32,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowgateError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Transient transport failures qualify; invalid input, auth failures,
    /// and terminal job outcomes do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => RETRYABLE_STATUSES.contains(status),
            _ => false,
        }
    }

    /// Get retry delay hint in seconds, if the server provided one.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

/// HTTP statuses worth retrying, mirroring the upstream services'
/// documented transient set.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Result type alias for flowgate.
pub type Result<T> = std::result::Result<T, FlowgateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(FlowgateError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(FlowgateError::RateLimited {
            retry_after_secs: 2.0
        }
        .is_retryable());
        assert!(FlowgateError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());

        assert!(!FlowgateError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!FlowgateError::AuthenticationFailed.is_retryable());
        assert!(!FlowgateError::InvalidInput("deadline must be non-zero".into()).is_retryable());
        assert!(!FlowgateError::JobFailed {
            job_id: "job-1".into(),
            reason: "oom".into()
        }
        .is_retryable());
        assert!(!FlowgateError::DeadlineExceeded {
            job_id: "job-1".into(),
            waited: Duration::from_secs(60),
            checks: 12
        }
        .is_retryable());
    }

    #[test]
    fn test_retry_after_hint() {
        let err = FlowgateError::RateLimited {
            retry_after_secs: 1.5,
        };
        assert_eq!(err.retry_after(), Some(1.5));
        assert_eq!(FlowgateError::AuthenticationFailed.retry_after(), None);
    }
}
