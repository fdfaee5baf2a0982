//! Throttled, retrying chokepoint for every outbound call.
//!
//! Wraps any [`HttpClient`] with:
//! - pacing: call starts are at least `min_interval` apart (governor, burst 1)
//! - retry with linear backoff (`base_delay * attempt`) on transport failure
//! - `Retry-After` waits on 429 that do not consume the failure budget
//! - a per-call timeout
//!
//! ```text
//! send(request)
//!     │
//!     ├─► wait for pacing permit
//!     ├─► client.execute ──► 429 ──► sleep(Retry-After) ──┐
//!     │        │                                          │
//!     │        └─► failure ──► sleep(base * n) ───────────┤
//!     │                                                   │
//!     └───────────────────────────────◄───────────────────┘
//! ```

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use tracing::{debug, error, warn};

use super::http::{HttpClient, HttpRequest, HttpResponse};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Tuning for [`ThrottledTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Minimum spacing between the start of two calls
    pub min_interval: Duration,
    /// Attempts per call before giving up on transport failures
    pub max_attempts: u32,
    /// Backoff unit; also the rate-limit wait when no hint is given
    pub base_delay: Duration,
    /// Per-call timeout unless the request overrides it
    pub timeout: Duration,
    /// Rate-limit waits tolerated per call before the 429 is handed back
    pub max_rate_limit_waits: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(1),
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            max_rate_limit_waits: 10,
        }
    }
}

/// The single outbound chokepoint. Shared by every gateway via `Arc`.
pub struct ThrottledTransport {
    client: Arc<dyn HttpClient>,
    limiter: Option<DefaultRateLimiter>,
    config: TransportConfig,
}

impl ThrottledTransport {
    pub fn new(client: Arc<dyn HttpClient>, config: TransportConfig) -> Self {
        let limiter = Quota::with_period(config.min_interval)
            .map(|quota| RateLimiter::direct(quota.allow_burst(NonZeroU32::MIN)));
        Self {
            client,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Send a request, returning `None` when no response could be obtained.
    ///
    /// HTTP error statuses are returned as responses for the caller to
    /// interpret; only connection-level failures are retried.
    pub async fn send(&self, request: HttpRequest) -> Option<HttpResponse> {
        let endpoint = request.log_target();
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let mut attempt: u32 = 1;
        let mut rate_limit_waits: u32 = 0;

        loop {
            self.wait_for_permit().await;
            debug!(
                method = %request.method,
                endpoint = %endpoint,
                attempt,
                "sending request"
            );

            match self.client.execute(&request, timeout).await {
                Ok(response)
                    if response.status == StatusCode::TOO_MANY_REQUESTS
                        && rate_limit_waits < self.config.max_rate_limit_waits =>
                {
                    let wait = response.retry_after().unwrap_or(self.config.base_delay);
                    rate_limit_waits += 1;
                    warn!(
                        endpoint = %endpoint,
                        wait_secs = wait.as_secs_f64(),
                        rate_limit_waits,
                        "rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                }
                Ok(response) => return Some(response),
                Err(failure) if attempt < self.config.max_attempts => {
                    warn!(
                        endpoint = %endpoint,
                        attempt,
                        error = %failure,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(self.config.base_delay * attempt).await;
                    attempt += 1;
                }
                Err(failure) => {
                    error!(
                        endpoint = %endpoint,
                        attempts = attempt,
                        error = %failure,
                        "request failed after all attempts"
                    );
                    return None;
                }
            }
        }
    }

    async fn wait_for_permit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockHttpClient, MockReply};
    use reqwest::header::RETRY_AFTER;
    use reqwest::Method;
    use std::time::Instant;

    const URL: &str = "https://api.example.com/ping";

    fn config(min_interval: Duration) -> TransportConfig {
        TransportConfig {
            min_interval,
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
            max_rate_limit_waits: 10,
        }
    }

    #[tokio::test]
    async fn test_pacing_spaces_call_starts() {
        let mock = Arc::new(MockHttpClient::new().on(Method::GET, URL, MockReply::ok("{}")));
        let interval = Duration::from_millis(100);
        let transport = ThrottledTransport::new(mock.clone(), config(interval));

        for _ in 0..4 {
            assert!(transport.send(HttpRequest::get(URL)).await.is_some());
        }

        let starts: Vec<Instant> = mock.calls().iter().map(|c| c.started).collect();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(
                gap >= interval.mul_f64(0.95),
                "calls started {:?} apart",
                gap
            );
        }
    }

    #[tokio::test]
    async fn test_retries_until_third_attempt_succeeds() {
        let mock = Arc::new(
            MockHttpClient::new()
                .on(Method::GET, URL, MockReply::failure("connection reset"))
                .on(Method::GET, URL, MockReply::failure("connection reset"))
                .on(Method::GET, URL, MockReply::ok(r#"{"ok":true}"#)),
        );
        let transport = ThrottledTransport::new(mock.clone(), config(Duration::ZERO));

        let response = transport.send(HttpRequest::get(URL)).await;

        assert_eq!(mock.calls().len(), 3);
        let response = response.expect("third attempt succeeds");
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_yield_no_response() {
        let mock = Arc::new(
            MockHttpClient::new().on(Method::GET, URL, MockReply::failure("dns error")),
        );
        let transport = ThrottledTransport::new(mock.clone(), config(Duration::ZERO));

        let response = transport.send(HttpRequest::get(URL)).await;

        assert!(response.is_none());
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_backoff_grows_with_attempt_number() {
        let mock = Arc::new(
            MockHttpClient::new().on(Method::GET, URL, MockReply::failure("timeout")),
        );
        let mut cfg = config(Duration::ZERO);
        cfg.base_delay = Duration::from_millis(50);
        let transport = ThrottledTransport::new(mock.clone(), cfg);

        let started = Instant::now();
        assert!(transport.send(HttpRequest::get(URL)).await.is_none());

        // 50ms after attempt 1, 100ms after attempt 2
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_rate_limit_waits_for_retry_after_without_spending_attempts() {
        let mock = Arc::new(
            MockHttpClient::new()
                .on(Method::GET, URL, MockReply::failure("reset"))
                .on(
                    Method::GET,
                    URL,
                    MockReply::status(429, "").with_header(RETRY_AFTER, "1"),
                )
                .on(Method::GET, URL, MockReply::failure("reset"))
                .on(Method::GET, URL, MockReply::ok("{}")),
        );
        let transport = ThrottledTransport::new(mock.clone(), config(Duration::ZERO));

        let response = transport.send(HttpRequest::get(URL)).await;

        // two failures + one 429 + success: the 429 did not use up attempt 3
        assert_eq!(mock.calls().len(), 4);
        assert_eq!(response.map(|r| r.status), Some(StatusCode::OK));

        let calls = mock.calls();
        let waited = calls[2].started.duration_since(calls[1].started);
        assert!(waited >= Duration::from_secs(1), "waited only {:?}", waited);
    }

    #[tokio::test]
    async fn test_rate_limit_without_hint_uses_base_delay() {
        let mock = Arc::new(
            MockHttpClient::new()
                .on(Method::GET, URL, MockReply::status(429, ""))
                .on(Method::GET, URL, MockReply::ok("{}")),
        );
        let mut cfg = config(Duration::ZERO);
        cfg.base_delay = Duration::from_millis(80);
        let transport = ThrottledTransport::new(mock.clone(), cfg);

        assert!(transport.send(HttpRequest::get(URL)).await.is_some());

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].started.duration_since(calls[0].started) >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_persistent_rate_limit_is_handed_back() {
        let mock = Arc::new(
            MockHttpClient::new().on(
                Method::GET,
                URL,
                MockReply::status(429, "slow down").with_header(RETRY_AFTER, "0"),
            ),
        );
        let mut cfg = config(Duration::ZERO);
        cfg.max_rate_limit_waits = 2;
        let transport = ThrottledTransport::new(mock.clone(), cfg);

        let response = transport.send(HttpRequest::get(URL)).await;

        assert_eq!(response.map(|r| r.status), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_error_statuses_are_returned_not_retried() {
        let mock = Arc::new(
            MockHttpClient::new().on(Method::GET, URL, MockReply::status(503, "maintenance")),
        );
        let transport = ThrottledTransport::new(mock.clone(), config(Duration::ZERO));

        let response = transport.send(HttpRequest::get(URL)).await.expect("response");

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body, "maintenance");
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_request_timeout_override_reaches_client() {
        let mock = Arc::new(MockHttpClient::new().on(Method::GET, URL, MockReply::ok("{}")));
        let transport = ThrottledTransport::new(mock.clone(), config(Duration::ZERO));

        transport
            .send(HttpRequest::get(URL).with_timeout(Duration::from_secs(2)))
            .await;
        transport.send(HttpRequest::get(URL)).await;

        let calls = mock.calls();
        assert_eq!(calls[0].timeout, Duration::from_secs(2));
        assert_eq!(calls[1].timeout, Duration::from_secs(5));
    }
}
