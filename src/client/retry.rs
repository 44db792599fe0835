//! Retry/backoff engine wrapped around single HTTP attempts
//!
//! Per attempt `i` in `0..retries`:
//! - every attempt runs under a `timeout` deadline; expiry drops the in-flight call
//! - 2xx: decode the body and stop
//! - 4xx other than 408: surface immediately, client errors do not improve on retry
//! - 5xx, 408, deadline expiry, transport failure: retry after `base * 2^i`,
//!   or surface the failure if `i` was the last attempt

use bytes::Bytes;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::{ApiError, STATUS_TIMEOUT};
use super::response::decode_success;
use crate::locale::Locale;
use crate::observability::Metrics;

/// Upper bound on attempts per call
///
/// The last backoff exponent is `MAX_ATTEMPTS - 2`, so every delay in a call
/// stays strictly larger than the one before it.
pub const MAX_ATTEMPTS: u32 = 21;

/// Attempt count and timing for one logical request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; 0 is treated as 1, anything above [`MAX_ATTEMPTS`] as the cap
    pub retries: u32,
    pub timeout: Duration,
    pub backoff_base: Duration,
    /// Larger base used after timeout-class failures (GET only)
    pub timeout_backoff_base: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Deadline expiry or HTTP 408: the backend is slow
    Timeout,
    /// 5xx or a broken connection
    Generic,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.retries.clamp(1, MAX_ATTEMPTS)
    }

    /// Delay before attempt `attempt + 1`
    pub fn backoff_delay(&self, attempt: u32, class: FailureClass) -> Duration {
        let base = match (class, self.timeout_backoff_base) {
            (FailureClass::Timeout, Some(base)) => base,
            _ => self.backoff_base,
        };
        base.saturating_mul(2u32.saturating_pow(attempt.min(MAX_ATTEMPTS - 1)))
    }
}

/// Status line and full body of one HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: Bytes,
}

/// A failure below HTTP: no status line was received
#[derive(Debug, Clone)]
pub enum TransportError {
    TimedOut,
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::TimedOut
        } else {
            TransportError::Other(error.to_string())
        }
    }
}

/// Everything an attempt loop needs besides the attempt itself
pub struct AttemptContext<'a> {
    pub endpoint: &'a str,
    pub locale: Locale,
    pub metrics: &'a Metrics,
    /// Caller cancellation
    pub signal: Option<&'a CancellationToken>,
    /// Client teardown
    pub shutdown: &'a CancellationToken,
}

impl AttemptContext<'_> {
    async fn cancelled(&self) {
        match self.signal {
            Some(signal) => {
                tokio::select! {
                    _ = signal.cancelled() => {}
                    _ = self.shutdown.cancelled() => {}
                }
            }
            None => self.shutdown.cancelled().await,
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == STATUS_TIMEOUT
}

/// Run `attempt` under `policy`, producing the decoded body or exactly one [`ApiError`]
pub async fn execute<F, Fut>(
    policy: &RetryPolicy,
    ctx: &AttemptContext<'_>,
    mut attempt: F,
) -> Result<Value, ApiError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<HttpReply, TransportError>>,
{
    let attempts = policy.attempts();
    let mut index = 0;

    loop {
        let started = Instant::now();
        ctx.metrics.request_sent();
        debug!(endpoint = ctx.endpoint, attempt = index + 1, attempts, "Sending request");

        let outcome = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ApiError::cancelled(ctx.endpoint, ctx.locale)),
            outcome = tokio::time::timeout(policy.timeout, attempt(index)) => outcome,
        };
        let elapsed = started.elapsed();

        let (error, class) = match outcome {
            Ok(Ok(reply)) if (200..300).contains(&reply.status) => {
                if index > 0 {
                    debug!(endpoint = ctx.endpoint, attempts = index + 1, "Request succeeded after retry");
                }
                return decode_success(ctx.endpoint, &reply.body, ctx.locale);
            }
            Ok(Ok(reply)) => {
                let error = ApiError::from_response(reply.status, &reply.body, ctx.locale);
                if !is_retryable_status(reply.status) {
                    debug!(endpoint = ctx.endpoint, status = reply.status, "Client error, not retrying");
                    return Err(error);
                }
                let class = if reply.status == STATUS_TIMEOUT {
                    FailureClass::Timeout
                } else {
                    FailureClass::Generic
                };
                (error, class)
            }
            Ok(Err(TransportError::TimedOut)) | Err(_) => {
                ctx.metrics.attempt_timed_out();
                (
                    ApiError::timeout(ctx.endpoint, policy.timeout, elapsed, ctx.locale),
                    FailureClass::Timeout,
                )
            }
            Ok(Err(TransportError::Other(reason))) => (
                ApiError::transport(ctx.endpoint, reason, ctx.locale),
                FailureClass::Generic,
            ),
        };

        if index + 1 >= attempts {
            warn!(
                endpoint = ctx.endpoint,
                attempts,
                status = error.status,
                error = %error,
                "Request failed after retries"
            );
            return Err(error);
        }

        let delay = policy.backoff_delay(index, class);
        ctx.metrics.retry_scheduled();
        warn!(
            endpoint = ctx.endpoint,
            attempt = index + 1,
            status = error.status,
            delay_ms = delay.as_millis() as u64,
            "Request failed, retrying"
        );

        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ApiError::cancelled(ctx.endpoint, ctx.locale)),
            _ = tokio::time::sleep(delay) => {}
        }

        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(retries: u32, timeout_ms: u64) -> RetryPolicy {
        RetryPolicy {
            retries,
            timeout: Duration::from_millis(timeout_ms),
            backoff_base: Duration::from_millis(1000),
            timeout_backoff_base: Some(Duration::from_millis(1500)),
        }
    }

    fn reply(status: u16, body: serde_json::Value) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status,
            body: Bytes::from(body.to_string()),
        })
    }

    struct Harness {
        metrics: Metrics,
        shutdown: CancellationToken,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                metrics: Metrics::new(),
                shutdown: CancellationToken::new(),
            }
        }

        fn ctx<'a>(&'a self, signal: Option<&'a CancellationToken>) -> AttemptContext<'a> {
            AttemptContext {
                endpoint: "/x",
                locale: Locale::En,
                metrics: &self.metrics,
                signal,
                shutdown: &self.shutdown,
            }
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = policy(5, 100);
        assert_eq!(policy.backoff_delay(0, FailureClass::Generic), Duration::from_millis(1000));
        assert_eq!(policy.backoff_delay(1, FailureClass::Generic), Duration::from_millis(2000));
        assert_eq!(policy.backoff_delay(2, FailureClass::Generic), Duration::from_millis(4000));
        assert_eq!(policy.backoff_delay(0, FailureClass::Timeout), Duration::from_millis(1500));
        assert_eq!(policy.backoff_delay(2, FailureClass::Timeout), Duration::from_millis(6000));
    }

    #[test]
    fn test_backoff_strictly_increases_for_any_failure_mix() {
        let policy = policy(8, 100);
        let classes = [FailureClass::Generic, FailureClass::Timeout];

        for attempt in 0..6 {
            for &now in &classes {
                for &next in &classes {
                    assert!(
                        policy.backoff_delay(attempt + 1, next) > policy.backoff_delay(attempt, now),
                        "attempt {} {:?} -> {:?}",
                        attempt,
                        now,
                        next
                    );
                }
            }
        }
    }

    #[test]
    fn test_attempts_are_capped() {
        assert_eq!(policy(0, 100).attempts(), 1);
        assert_eq!(policy(MAX_ATTEMPTS, 100).attempts(), MAX_ATTEMPTS);
        assert_eq!(policy(500, 100).attempts(), MAX_ATTEMPTS);
    }

    #[test]
    fn test_backoff_increases_up_to_the_attempt_cap() {
        let policy = policy(MAX_ATTEMPTS, 1);
        let last_gap = policy.attempts() - 1;

        for attempt in 1..last_gap {
            assert!(
                policy.backoff_delay(attempt, FailureClass::Generic)
                    > policy.backoff_delay(attempt - 1, FailureClass::Timeout),
                "attempt {}",
                attempt
            );
        }
    }

    #[test]
    fn test_mutations_use_generic_base_for_timeouts() {
        let policy = RetryPolicy {
            timeout_backoff_base: None,
            ..policy(3, 100)
        };
        assert_eq!(policy.backoff_delay(1, FailureClass::Timeout), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound_surfaces_last_failure() {
        let harness = Harness::new();
        let calls = AtomicU32::new(0);

        let result = execute(&policy(4, 1000), &harness.ctx(None), |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { reply(503, json!({ "detail": format!("unavailable #{}", i + 1) })) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.status, 503);
        assert_eq!(err.message, "unavailable #4");
        assert_eq!(harness.metrics.snapshot().retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_not_retried() {
        let harness = Harness::new();
        let calls = AtomicU32::new(0);

        let err = execute(&policy(5, 1000), &harness.ctx(None), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { reply(404, json!({ "detail": "Budget not found" })) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Budget not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_408_is_retried() {
        let harness = Harness::new();
        let calls = AtomicU32::new(0);

        let value = execute(&policy(2, 1000), &harness.ctx(None), |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if i == 0 {
                    reply(408, json!({}))
                } else {
                    reply(200, json!({ "ok": true }))
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(value, json!({ "ok": true }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_classified_as_408() {
        let harness = Harness::new();
        let started = Instant::now();

        let err = execute(&policy(2, 100), &harness.ctx(None), |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            reply(200, json!({}))
        })
        .await
        .unwrap_err();

        assert_eq!(err.status, 408);
        assert_eq!(err.detail["timeout_ms"], 100);
        assert!(err.is_timeout());
        assert_eq!(harness.metrics.snapshot().timeouts, 2);
        // two deadlines plus one timeout-class backoff
        assert!(started.elapsed() >= Duration::from_millis(100 + 1500 + 100));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_twice_then_succeeds() {
        let harness = Harness::new();
        let calls = Arc::new(AtomicU32::new(0));

        let value = execute(&policy(3, 100), &harness.ctx(None), |i| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if i < 2 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                reply(200, json!({ "success": true, "data": { "v": 1 } }))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, json!({ "v": 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_retried_then_500() {
        let harness = Harness::new();
        let calls = AtomicU32::new(0);

        let err = execute(&policy(3, 1000), &harness.ctx(None), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(TransportError::Other("connection refused".to_string())) }
        })
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.status, 500);
        assert_eq!(err.detail["error"], "connection refused");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_when_retries_zero() {
        let harness = Harness::new();
        let calls = AtomicU32::new(0);

        let _ = execute(&policy(0, 1000), &harness.ctx(None), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { reply(500, json!({})) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_stops_during_backoff() {
        let harness = Harness::new();
        let signal = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let canceller = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let err = execute(&policy(5, 100), &harness.ctx(Some(&signal)), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { reply(502, json!({})) }
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_in_flight_attempt() {
        let harness = Harness::new();
        harness.shutdown.cancel();

        let err = execute(&policy(3, 10_000), &harness.ctx(None), |_| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            reply(200, json!({}))
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
    }
}
