//! XRPC dispatch
//!
//! Sends an [`XrpcRequest`] over HTTP, classifies the outcome into the
//! [`ErrorKind`] taxonomy and retries transient failures of idempotent
//! requests a bounded number of times.

use super::error::{ErrorKind, XrpcError, XrpcErrorResponse};
use super::request::{Body, HttpMethod, Idempotency, XrpcRequest};
use reqwest::{Client as ReqwestClient, Method, Response as ReqwestResponse, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy for transient failures
///
/// The delay between attempts is fixed; `max_attempts` counts the first
/// attempt, so the default sends a request at most three times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first
    pub max_attempts: usize,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    /// Create a retry configuration with the given attempt ceiling
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Set the pause between attempts
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Never retry
    pub fn disabled() -> Self {
        Self::new(1)
    }
}

/// Run `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the attempt ceiling is reached
///
/// # Examples
/// ```
/// use atproto_client::xrpc::{retry, RetryConfig, XrpcError};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), XrpcError> {
/// let config = RetryConfig::new(3).with_delay(Duration::from_millis(10));
/// let value = retry(&config, XrpcError::is_retryable, || async {
///     Ok::<_, XrpcError>(42)
/// })
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry<F, Fut, T, E>(
    config: &RetryConfig,
    should_retry: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                if !should_retry(&err) || attempt >= max_attempts {
                    return Err(err);
                }

                tracing::warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "Transient failure, retrying in {:?}",
                    config.delay
                );
                sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Configuration for the HTTP layer
#[derive(Debug, Clone)]
pub struct XrpcClientConfig {
    /// Total request timeout
    pub timeout: Duration,
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Headers added to every request
    pub default_headers: Vec<(String, String)>,
    /// Retry policy for idempotent requests
    pub retry: RetryConfig,
}

impl Default for XrpcClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("atproto-sdk/{}", env!("CARGO_PKG_VERSION")),
            default_headers: Vec::new(),
            retry: RetryConfig::default(),
        }
    }
}

impl XrpcClientConfig {
    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((key.into(), value.into()));
        self
    }

    /// Set retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// Undecoded 2xx response
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: HashMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Get a header value by name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Decode the body as JSON
    ///
    /// An empty body decodes as `null`, which lets `()` and `Option<T>`
    /// outputs accept bodiless 200 responses.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, XrpcError> {
        let body: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(body).map_err(|e| {
            XrpcError::with_kind(
                ErrorKind::Decode,
                self.status,
                "ParseError",
                format!("Failed to parse JSON: {}", e),
            )
            .with_response(
                String::from_utf8_lossy(&self.body).into_owned(),
                self.headers.clone(),
            )
        })
    }
}

/// HTTP dispatcher for XRPC requests
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct XrpcClient {
    client: ReqwestClient,
    config: XrpcClientConfig,
}

impl XrpcClient {
    /// Create a new dispatcher
    pub fn new(config: XrpcClientConfig) -> Result<Self, XrpcError> {
        let client = ReqwestClient::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                XrpcError::with_kind(
                    ErrorKind::Unknown,
                    0,
                    "ClientBuildError",
                    format!("Failed to build HTTP client: {}", e),
                )
            })?;

        Ok(Self { client, config })
    }

    /// Get the client configuration
    pub fn config(&self) -> &XrpcClientConfig {
        &self.config
    }

    /// Send a request, retrying transient failures if it is idempotent
    pub async fn send_raw(&self, request: &XrpcRequest) -> Result<RawResponse, XrpcError> {
        match request.idempotency() {
            Idempotency::NonIdempotent => self.send_once(request).await,
            Idempotency::Idempotent => {
                retry(&self.config.retry, XrpcError::is_retryable, || {
                    self.send_once(request)
                })
                .await
            }
        }
    }

    /// Send a request and decode the JSON response
    pub async fn send<T: DeserializeOwned>(&self, request: &XrpcRequest) -> Result<T, XrpcError> {
        self.send_raw(request).await?.json()
    }

    /// Send a request whose response body is irrelevant
    pub async fn send_unit(&self, request: &XrpcRequest) -> Result<(), XrpcError> {
        self.send_raw(request).await.map(|_| ())
    }

    async fn send_once(&self, request: &XrpcRequest) -> Result<RawResponse, XrpcError> {
        let method = match request.method() {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut req = self.client.request(method, request.url().clone());

        for (key, value) in &self.config.default_headers {
            req = req.header(key, value);
        }

        req = req.header("Accept", request.accept());
        if let Some(content_type) = request.content_type() {
            req = req.header("Content-Type", content_type);
        }
        if let Some(authorization) = request.authorization() {
            req = req.header("Authorization", authorization);
        }

        match request.body() {
            Body::Empty => {}
            Body::Json(data) | Body::Bytes { data, .. } => {
                req = req.body(data.clone());
            }
        }

        tracing::debug!(
            method = request.method().as_str(),
            path = request.url().path(),
            "Sending XRPC request"
        );

        let response = req.send().await.map_err(map_reqwest_error)?;
        parse_response(response).await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> XrpcError {
    if e.is_timeout() {
        XrpcError::timeout(format!("Request timed out: {}", e))
    } else {
        XrpcError::transport(format!("Request failed: {}", e))
    }
}

async fn parse_response(response: ReqwestResponse) -> Result<RawResponse, XrpcError> {
    let status = response.status();

    let mut headers = HashMap::new();
    for (key, value) in response.headers() {
        if let Ok(value_str) = value.to_str() {
            headers.insert(key.as_str().to_ascii_lowercase(), value_str.to_string());
        }
    }

    let body = response.bytes().await.map_err(map_reqwest_error)?.to_vec();

    if status.is_success() {
        tracing::debug!(status = status.as_u16(), bytes = body.len(), "XRPC response");
        return Ok(RawResponse {
            status: status.as_u16(),
            headers,
            body,
        });
    }

    Err(error_from_response(status, body, headers))
}

fn error_from_response(
    status: StatusCode,
    body: Vec<u8>,
    headers: HashMap<String, String>,
) -> XrpcError {
    let text = String::from_utf8_lossy(&body).into_owned();
    let parsed: XrpcErrorResponse = serde_json::from_slice(&body).unwrap_or_default();
    let reason = status.canonical_reason().unwrap_or("Unknown");

    let error = parsed.error.unwrap_or_else(|| reason.replace(' ', ""));
    let message = parsed.message.unwrap_or_else(|| {
        if text.trim().is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            format!("HTTP {}: {}", status.as_u16(), text)
        }
    });

    let retry_after = headers
        .get("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok());
    let www_authenticate = headers.get("www-authenticate").cloned();

    let error = XrpcError::new(status.as_u16(), error, message)
        .with_retry_after(retry_after)
        .with_www_authenticate(www_authenticate)
        .with_response(text, headers);

    tracing::debug!(
        status = status.as_u16(),
        kind = ?error.kind(),
        code = error.error(),
        "XRPC error response"
    );
    error
}
