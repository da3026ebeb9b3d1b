//! Bounded exponential-backoff retry for a single API call.
//!
//! Shared by the object and association submitters:
//! - HTTP 429 (rate limited) → retry
//! - HTTP 5xx (server error) → retry
//! - Transport error (connection refused, timeout) → retry
//! - Any other HTTP 4xx → fail immediately, no backoff spent
//! - Backoff before retry `n` (zero-based): `retry_delay × 2^n`
//!
//! The loop is explicit and the sleep goes through a [`Sleeper`], so tests
//! can count and inspect every wait without real time passing.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;

use crate::client::{ApiRequest, Transport};
use crate::config::ImportConfig;
use crate::progress::{ImportEvent, ImportObserver};

/// Why a chunk (or probe) could not be completed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("rate_limited: max retries exceeded")]
    RateLimited,
    #[error("HTTP {status}: {body}")]
    Server { status: u16, body: String },
    #[error("HTTP {status}: {body}")]
    Client { status: u16, body: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("unknown association type: {0}")]
    UnknownAssociation(String),
}

impl SubmitError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SubmitError::RateLimited | SubmitError::Server { .. } | SubmitError::Transport(_)
        )
    }
}

/// Waits between attempts and between chunks.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and remembers every requested wait.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
    }
}

/// Retry budget and pacing, taken from `[import]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub inter_chunk_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ImportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            inter_chunk_delay: config.inter_chunk_delay(),
        }
    }

    /// Wait before retry number `attempt` (zero-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
    }
}

/// Send `request`, retrying retryable failures, and parse a 2xx body as JSON.
///
/// An empty 2xx body parses as `null`.
pub async fn send_with_retry(
    transport: &dyn Transport,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    observer: &dyn ImportObserver,
    label: &str,
    request: &ApiRequest,
) -> Result<Value, SubmitError> {
    let mut attempt = 0u32;
    loop {
        let err = match transport.send(request).await {
            Ok(response) if (200..300).contains(&response.status) => {
                if response.body.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&response.body)
                    .map_err(|e| SubmitError::InvalidResponse(e.to_string()));
            }
            Ok(response) if response.status == 429 => SubmitError::RateLimited,
            Ok(response) if response.status >= 500 => SubmitError::Server {
                status: response.status,
                body: response.body,
            },
            Ok(response) => SubmitError::Client {
                status: response.status,
                body: response.body,
            },
            Err(e) => SubmitError::Transport(e.0),
        };

        if !err.is_retryable() || attempt >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        tracing::warn!(
            label,
            attempt = attempt + 1,
            delay_secs = delay.as_secs_f64(),
            error = %err,
            "retrying request"
        );
        observer.report(ImportEvent::Retry {
            label: label.to_string(),
            attempt: attempt + 1,
            delay,
            reason: err.to_string(),
        });
        sleeper.sleep(delay).await;
        attempt += 1;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::client::{ApiResponse, TransportError};
    use crate::progress::NoProgress;

    fn probe() -> ApiRequest {
        ApiRequest::get("/probe")
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_success() {
        let transport = ScriptedTransport::new(
            vec![
                Ok(ApiResponse::new(429, "slow down")),
                Ok(ApiResponse::new(429, "slow down")),
            ],
            |_| ApiResponse::new(200, r#"{"ok":true}"#),
        );
        let sleeper = RecordingSleeper::new();
        let value = send_with_retry(&transport, &sleeper, &policy(2), &NoProgress, "t", &probe())
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(transport.request_count(), 3);
        assert_eq!(
            sleeper.sleeps(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_rate_limit_exhausted() {
        let transport = ScriptedTransport::new(vec![], |_| ApiResponse::new(429, ""));
        let sleeper = RecordingSleeper::new();
        let err = send_with_retry(&transport, &sleeper, &policy(3), &NoProgress, "t", &probe())
            .await
            .unwrap_err();
        assert_eq!(err, SubmitError::RateLimited);
        assert_eq!(transport.request_count(), 4);
        assert_eq!(sleeper.sleeps().len(), 3);
        assert!(err.to_string().starts_with("rate_limited"));
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let transport = ScriptedTransport::new(vec![], |_| ApiResponse::new(400, "bad input"));
        let sleeper = RecordingSleeper::new();
        let err = send_with_retry(&transport, &sleeper, &policy(3), &NoProgress, "t", &probe())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SubmitError::Client {
                status: 400,
                body: "bad input".into()
            }
        );
        assert_eq!(transport.request_count(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_server_and_transport_errors_retried() {
        let transport = ScriptedTransport::new(
            vec![
                Ok(ApiResponse::new(503, "unavailable")),
                Err(TransportError("connection reset".into())),
            ],
            |_| ApiResponse::new(200, ""),
        );
        let sleeper = RecordingSleeper::new();
        let value = send_with_retry(&transport, &sleeper, &policy(3), &NoProgress, "t", &probe())
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
        assert_eq!(sleeper.sleeps().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_on_first_server_error() {
        let transport = ScriptedTransport::new(vec![], |_| ApiResponse::new(500, "oops"));
        let sleeper = RecordingSleeper::new();
        let err = send_with_retry(&transport, &sleeper, &policy(0), &NoProgress, "t", &probe())
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Server { status: 500, .. }));
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let transport = ScriptedTransport::new(vec![], |_| ApiResponse::new(200, "not json"));
        let err = send_with_retry(
            &transport,
            &RecordingSleeper::new(),
            &policy(3),
            &NoProgress,
            "t",
            &probe(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SubmitError::InvalidResponse(_)));
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy(5);
        assert_eq!(p.backoff(0), Duration::from_secs(2));
        assert_eq!(p.backoff(1), Duration::from_secs(4));
        assert_eq!(p.backoff(3), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_keeps_doubling_past_small_attempts() {
        let p = RetryPolicy {
            max_retries: 40,
            retry_delay: Duration::from_millis(1),
            inter_chunk_delay: Duration::ZERO,
        };
        assert_eq!(p.backoff(20), Duration::from_millis(1 << 20));
        assert_eq!(p.backoff(31), Duration::from_millis(1 << 31));
        assert_eq!(p.backoff(40), Duration::from_millis(u32::MAX as u64));
    }
}
