//! HTTP boundary of the destination client.
//!
//! [`CloudClient`](crate::remote::CloudClient) describes every call as an
//! [`HttpRequest`] value and hands it to an [`HttpTransport`]. Body encoding
//! and `Retry-After` interpretation live here so the client only deals in API
//! paths, parameters and decoded responses.

use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// The two verbs the cloud web API uses: reads are `GET`, writes are `POST`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: vec![("Accept".to_string(), JSON_CONTENT_TYPE.to_string())],
            body: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Form-encode `pairs` as the body, in order.
    #[must_use]
    pub fn form(mut self, pairs: &[(&str, &str)]) -> Self {
        self.body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish()
            .into_bytes();
        self.header("Content-Type", FORM_CONTENT_TYPE)
    }

    /// Raw body with its content type.
    #[must_use]
    pub fn payload(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.body = body;
        self.header("Content-Type", content_type)
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Decoded form fields; empty unless the body is form-encoded.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        if self.header_value("Content-Type") != Some(FORM_CONTENT_TYPE) {
            return Vec::new();
        }
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn with_json(mut self, value: &serde_json::Value) -> Self {
        self.body = value.to_string().into_bytes();
        self.with_header("Content-Type", JSON_CONTENT_TYPE)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, for error messages.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// How long the service asked us to wait, if it said so.
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("Retry-After")
            .and_then(|value| parse_retry_after(value, Utc::now()))
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date. A date in the past
/// means no wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http client setup failed: {0}")]
    Setup(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[cfg(test)]
    #[error("no response queued for {method} {url}")]
    Unrouted { method: HttpMethod, url: String },
}

/// Carries requests to the service. Implementations only move bytes; status
/// codes are interpreted by the caller.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

#[cfg(feature = "http")]
pub mod reqwest_transport {
    use super::*;

    const USER_AGENT: &str = concat!("voyage/", env!("CARGO_PKG_VERSION"));

    /// Production transport over a pooled reqwest client.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        /// Every request, body download included, must finish within `timeout`.
        pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .build()
                .map_err(|e| HttpError::Setup(e.to_string()))?;
            Ok(Self { client })
        }
    }

    fn classify(url: &str, e: reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout { url: url.to_string() }
        } else {
            HttpError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        }
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let HttpRequest {
                method,
                url,
                headers,
                body,
            } = request;
            let mut builder = match method {
                HttpMethod::Get => self.client.get(&url),
                HttpMethod::Post => self.client.post(&url).body(body),
            };
            for (name, value) in &headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|e| classify(&url, e))?;
            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.bytes().await.map_err(|e| classify(&url, e))?.to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

#[cfg(test)]
pub(crate) use mock::MockTransport;


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn form_body_is_encoded_in_order_and_typed() {
        let request = HttpRequest::post("https://cloud.example/api/user_groups/create")
            .bearer("secret")
            .form(&[("organization", "acme"), ("name", "dev ops & qa")]);

        assert_eq!(request.header_value("content-type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(request.header_value("Authorization"), Some("Bearer secret"));
        assert_eq!(
            String::from_utf8(request.body.clone()).unwrap(),
            "organization=acme&name=dev+ops+%26+qa"
        );
        assert_eq!(
            request.form_pairs(),
            vec![
                ("organization".to_string(), "acme".to_string()),
                ("name".to_string(), "dev ops & qa".to_string()),
            ]
        );
    }

    #[test]
    fn later_headers_replace_earlier_ones() {
        let request = HttpRequest::post("https://cloud.example/api/ce/submit")
            .form(&[("a", "b")])
            .payload(JSON_CONTENT_TYPE, b"{}".to_vec());
        assert_eq!(request.header_value("Content-Type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(request.headers.iter().filter(|(k, _)| k == "Content-Type").count(), 1);
        assert!(request.form_pairs().is_empty());
    }

    #[test]
    fn retry_after_accepts_seconds_and_dates() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(parse_retry_after(" 5 ", now), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:30 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:27:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }

    #[test]
    fn response_reads_retry_after_case_insensitively() {
        let response = HttpResponse::new(429).with_header("retry-after", "4");
        assert!(!response.is_success());
        assert_eq!(response.retry_after(), Some(Duration::from_secs(4)));
        assert_eq!(HttpResponse::new(204).retry_after(), None);
        assert!(HttpResponse::new(204).is_success());
    }

    #[tokio::test]
    async fn mock_routes_ignore_query_and_answer_in_order() {
        let transport = MockTransport::new();
        let endpoint = "https://cloud.example/api/ce/task";
        transport.respond(HttpMethod::Get, endpoint, HttpResponse::new(202));
        transport.respond(HttpMethod::Get, endpoint, HttpResponse::new(200));

        let request = HttpRequest::get(format!("{endpoint}?id=T1"));
        assert_eq!(transport.send(request.clone()).await.unwrap().status, 202);
        assert_eq!(transport.send(request.clone()).await.unwrap().status, 200);
        assert!(matches!(
            transport.send(request.clone()).await,
            Err(HttpError::Unrouted { method: HttpMethod::Get, .. })
        ));
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(transport.requests()[0], request);
    }

    #[tokio::test]
    #[cfg(feature = "http")]
    async fn reqwest_transport_reports_unusable_urls() {
        let transport = reqwest_transport::ReqwestTransport::with_timeout(Duration::from_secs(1)).unwrap();
        let err = transport.send(HttpRequest::get("not a url")).await.unwrap_err();
        assert!(matches!(err, HttpError::Transport { .. }));
    }
}
