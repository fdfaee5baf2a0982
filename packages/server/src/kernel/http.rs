//! HTTP seam: request/response descriptors and the client trait.
//!
//! Everything outbound is described as an [`HttpRequest`] and answered with an
//! [`HttpResponse`] so the transport, the gateways and the tests never touch
//! reqwest types beyond `Method`, `StatusCode` and `HeaderMap`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::TransportFailure;

/// User-Agent sent on every outbound request.
pub const USER_AGENT: &str = "HH-Bitrix-Integration/2.0 (integration@company.uz)";

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// One logical outbound call.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Overrides the transport's default timeout.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            body: RequestBody::Json(body),
            ..Self::new(Method::POST, url)
        }
    }

    pub fn post_form<K, V>(url: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            body: RequestBody::Form(fields),
            ..Self::new(Method::POST, url)
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Origin plus the final path segment, for logs.
    ///
    /// Middle segments are dropped because webhook and bot URLs carry their
    /// credentials there.
    pub fn log_target(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(parsed) => {
                let origin = parsed.origin().ascii_serialization();
                let segments: Vec<&str> = parsed
                    .path_segments()
                    .map(|s| s.filter(|seg| !seg.is_empty()).collect())
                    .unwrap_or_default();
                match segments.as_slice() {
                    [] => origin,
                    [only] => format!("{origin}/{only}"),
                    [.., last] => format!("{origin}/…/{last}"),
                }
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// URL with the query string appended, as it goes on the wire.
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.url, separator, query)
    }
}

/// A response that made it back: status, headers and the raw body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: reqwest::header::HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    /// Delay named by a `Retry-After` header given in whole seconds.
    pub fn retry_after(&self) -> Option<Duration> {
        self.headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Performs a single HTTP attempt. Pacing and retries live above this.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// Production client backed by a pooled `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self, TransportFailure> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(
        &self,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportFailure> {
        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .headers(request.headers.clone())
            .timeout(timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_url_encodes_query() {
        let request = HttpRequest::get("https://api.hh.ru/negotiations")
            .with_query("vacancy_id", "42")
            .with_query("per_page", 100)
            .with_query("page", 0);

        assert_eq!(
            request.full_url(),
            "https://api.hh.ru/negotiations?vacancy_id=42&per_page=100&page=0"
        );
    }

    #[test]
    fn test_full_url_without_query() {
        let request = HttpRequest::get("https://api.hh.ru/me");
        assert_eq!(request.full_url(), "https://api.hh.ru/me");
    }

    #[test]
    fn test_log_target_hides_path_credentials() {
        let bot = HttpRequest::get("https://api.telegram.org/bot123:SECRET/sendMessage");
        assert_eq!(bot.log_target(), "https://api.telegram.org/…/sendMessage");

        let webhook = HttpRequest::get("https://corp.bitrix24.ru/rest/1/s3cr3t/crm.lead.add.json");
        assert_eq!(webhook.log_target(), "https://corp.bitrix24.ru/…/crm.lead.add.json");

        let me = HttpRequest::get("https://api.hh.ru/me");
        assert_eq!(me.log_target(), "https://api.hh.ru/me");
    }

    #[test]
    fn test_retry_after_seconds() {
        let response = HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, "")
            .with_header(RETRY_AFTER, "7");
        assert_eq!(response.retry_after(), Some(Duration::from_secs(7)));

        let missing = HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(missing.retry_after(), None);

        let http_date = HttpResponse::new(StatusCode::TOO_MANY_REQUESTS, "")
            .with_header(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(http_date.retry_after(), None);
    }

    #[test]
    fn test_form_request() {
        let request = HttpRequest::post_form(
            "https://hh.ru/oauth/token",
            [("grant_type", "refresh_token"), ("refresh_token", "r1")],
        );
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.body,
            RequestBody::Form(vec![
                ("grant_type".into(), "refresh_token".into()),
                ("refresh_token".into(), "r1".into()),
            ])
        );
    }
}
