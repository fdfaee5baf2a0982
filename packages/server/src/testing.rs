//! Testing utilities including mock implementations.
//!
//! These let the gateways, the orchestrator and the scheduler run end to end
//! without network access or a real notifier.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};

use crate::domains::notify::{Notice, Notifier};
use crate::domains::sync::CycleReport;
use crate::error::TransportFailure;
use crate::kernel::http::{HttpClient, HttpRequest, HttpResponse, RequestBody};
use crate::kernel::transport::TransportConfig;

/// Scripted outcome for one mocked HTTP attempt.
#[derive(Debug, Clone)]
pub enum MockReply {
    Response {
        status: StatusCode,
        headers: HeaderMap,
        body: String,
    },
    Failure(String),
}

impl MockReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::status(200, body)
    }

    pub fn json(value: serde_json::Value) -> Self {
        Self::ok(value.to_string())
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Response {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Self::Response { headers, .. } = &mut self {
            headers.insert(name, HeaderValue::from_str(value).unwrap());
        }
        self
    }
}

/// Record of a call made to the mock client.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    /// URL including the query string
    pub url: String,
    pub headers: HeaderMap,
    pub body: RequestBody,
    pub timeout: Duration,
    pub started: Instant,
}

impl RecordedCall {
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn json_body(&self) -> Option<&serde_json::Value> {
        match &self.body {
            RequestBody::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        match &self.body {
            RequestBody::Form(fields) => fields
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }
}

struct Route {
    method: Method,
    prefix: String,
    replies: VecDeque<MockReply>,
}

/// A mock HTTP client with scripted replies.
///
/// Replies are matched by method and the longest URL prefix (query string
/// included). Each route plays its replies in order and repeats the last
/// one once exhausted. Unmatched calls get a 404.
#[derive(Default)]
pub struct MockHttpClient {
    routes: RwLock<Vec<Route>>,
    calls: RwLock<Vec<RecordedCall>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `method` on URLs starting with `prefix`.
    pub fn on(self, method: Method, prefix: impl Into<String>, reply: MockReply) -> Self {
        self.push(method, prefix, reply);
        self
    }

    /// Same as [`on`](Self::on) for an already shared mock.
    pub fn push(&self, method: Method, prefix: impl Into<String>, reply: MockReply) {
        let prefix = prefix.into();
        let mut routes = self.routes.write().unwrap();
        match routes
            .iter_mut()
            .find(|r| r.method == method && r.prefix == prefix)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                method,
                prefix,
                replies: VecDeque::from([reply]),
            }),
        }
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().unwrap().clone()
    }

    /// Calls whose URL starts with `prefix`.
    pub fn calls_to(&self, method: Method, prefix: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.url.starts_with(prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.write().unwrap().clear();
    }

    fn next_reply(&self, method: &Method, url: &str) -> Option<MockReply> {
        let mut routes = self.routes.write().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| &r.method == method && url.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())?;

        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        let url = request.full_url();
        self.calls.write().unwrap().push(RecordedCall {
            method: request.method.clone(),
            url: url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            timeout,
            started: Instant::now(),
        });

        match self.next_reply(&request.method, &url) {
            Some(MockReply::Response {
                status,
                headers,
                body,
            }) => Ok(HttpResponse {
                status,
                headers,
                body,
            }),
            Some(MockReply::Failure(message)) => Err(TransportFailure(message)),
            None => Ok(HttpResponse::new(StatusCode::NOT_FOUND, "no mock route")),
        }
    }
}

/// A notifier that remembers every notice it was handed.
#[derive(Default)]
pub struct RecordingNotifier {
    notices: RwLock<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.read().unwrap().clone()
    }

    pub fn summaries(&self) -> Vec<CycleReport> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Summary(report) => Some(report),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notices()
            .into_iter()
            .filter_map(|n| match n {
                Notice::Error { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notice: Notice) {
        self.notices.write().unwrap().push(notice);
    }
}

/// Transport settings that keep tests fast: no pacing, 10ms backoff.
pub fn fast_transport_config() -> TransportConfig {
    TransportConfig {
        min_interval: Duration::ZERO,
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
        max_rate_limit_waits: 3,
    }
}
