//! XRPC error taxonomy
//!
//! Every failure the dispatch layer can produce is an [`XrpcError`] tagged
//! with an [`ErrorKind`]. The kind decides the retry policy; the remaining
//! fields carry what the server told us (status, short-code, message,
//! `Retry-After`, `WWW-Authenticate`) so callers can report or react to it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of an XRPC failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The service URL could not be parsed
    InvalidRequestUrl,
    /// No service URL was configured
    EmptyServiceUrl,
    /// An authenticated call was attempted without a session
    MissingActiveSession,
    /// 400
    BadRequest,
    /// 401, or a rejected/expired token
    AuthenticationFailed,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 413
    PayloadTooLarge,
    /// 426
    UpgradeRequired,
    /// 429
    RateLimited,
    /// 500
    ServerError,
    /// 501
    NotImplemented,
    /// 502
    BadGateway,
    /// 503
    ServiceUnavailable,
    /// 504
    GatewayTimeout,
    /// Connection-level failure before a response arrived
    Transport,
    /// Connect or request timeout elapsed
    Timeout,
    /// A 2xx body could not be decoded into the requested type
    Decode,
    /// Anything else; status, body and headers are preserved
    Unknown,
}

impl ErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::BadRequest,
            401 => ErrorKind::AuthenticationFailed,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            405 => ErrorKind::MethodNotAllowed,
            413 => ErrorKind::PayloadTooLarge,
            426 => ErrorKind::UpgradeRequired,
            429 => ErrorKind::RateLimited,
            500 => ErrorKind::ServerError,
            501 => ErrorKind::NotImplemented,
            502 => ErrorKind::BadGateway,
            503 => ErrorKind::ServiceUnavailable,
            504 => ErrorKind::GatewayTimeout,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether the dispatcher retries this kind on its own
    ///
    /// Rate limiting is deliberately absent: it is surfaced with the
    /// server's `Retry-After` hint and the caller decides when to come back.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::BadGateway
                | ErrorKind::ServiceUnavailable
                | ErrorKind::GatewayTimeout
                | ErrorKind::Transport
                | ErrorKind::Timeout
        )
    }

    /// Whether the failure is a configuration problem the caller must fix
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidRequestUrl | ErrorKind::EmptyServiceUrl
        )
    }
}

/// XRPC error with kind, HTTP status and server-provided details
///
/// # Examples
/// ```
/// use atproto_client::xrpc::{ErrorKind, XrpcError};
///
/// let error = XrpcError::new(404, "NotFound", "Record not found");
/// assert_eq!(error.kind(), ErrorKind::NotFound);
/// assert_eq!(error.status(), 404);
/// assert!(!error.is_retryable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpcError {
    kind: ErrorKind,
    /// HTTP status code, 0 when no response was received
    status: u16,
    /// Error short-code (e.g., "InvalidRequest", "ExpiredToken")
    error: String,
    /// Human-readable error message
    message: String,
    /// Seconds to wait, from `Retry-After`
    retry_after: Option<u64>,
    /// Challenge from `WWW-Authenticate`
    www_authenticate: Option<String>,
    /// Raw response body, kept for diagnostics
    body: Option<String>,
    /// Response headers, kept for diagnostics
    headers: HashMap<String, String>,
}

impl XrpcError {
    /// Create an error from an HTTP status, classifying it by status
    pub fn new(status: u16, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::from_status(status), status, error, message)
    }

    /// Create an error with an explicit kind
    pub fn with_kind(
        kind: ErrorKind,
        status: u16,
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            error: error.into(),
            message: message.into(),
            retry_after: None,
            www_authenticate: None,
            body: None,
            headers: HashMap::new(),
        }
    }

    /// A call requiring authentication was made without a session
    pub fn missing_session() -> Self {
        Self::with_kind(
            ErrorKind::MissingActiveSession,
            0,
            "MissingActiveSession",
            "No active session - please login first",
        )
    }

    /// Connection-level failure
    pub fn transport(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Transport, 0, "NetworkError", message)
    }

    /// Timeout while connecting or waiting for the response
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Timeout, 0, "Timeout", message)
    }

    /// Attach the `Retry-After` hint in seconds
    pub fn with_retry_after(mut self, seconds: Option<u64>) -> Self {
        self.retry_after = seconds;
        self
    }

    /// Attach the `WWW-Authenticate` challenge
    pub fn with_www_authenticate(mut self, challenge: Option<String>) -> Self {
        self.www_authenticate = challenge;
        self
    }

    /// Attach the raw body and headers of the failed response
    pub fn with_response(mut self, body: String, headers: HashMap<String, String>) -> Self {
        self.body = Some(body);
        self.headers = headers;
        self
    }

    /// Reclassify while keeping every other field
    pub fn into_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the error code
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Seconds the server asked us to wait before retrying
    pub fn retry_after(&self) -> Option<u64> {
        self.retry_after
    }

    /// Authentication challenge sent with a 401
    pub fn www_authenticate(&self) -> Option<&str> {
        self.www_authenticate.as_deref()
    }

    /// Raw body of the failed response
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Headers of the failed response
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Whether the dispatcher may retry this error
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether the call might succeed later without a configuration change
    pub fn is_recoverable(&self) -> bool {
        self.is_retryable()
            || matches!(
                self.kind,
                ErrorKind::RateLimited | ErrorKind::AuthenticationFailed
            )
    }

    /// Whether the server rejected the bearer token itself
    ///
    /// The PDS answers an expired or revoked token either with a 401 or with a
    /// 400 carrying `ExpiredToken` / `InvalidToken`.
    pub fn is_token_rejection(&self) -> bool {
        self.kind == ErrorKind::AuthenticationFailed
            || matches!(self.error.as_str(), "ExpiredToken" | "InvalidToken")
    }
}

impl std::fmt::Display for XrpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "XRPC error {} ({:?}): {} - {}",
            self.status, self.kind, self.error, self.message
        )?;
        if let Some(seconds) = self.retry_after {
            write!(f, " (retry after {}s)", seconds)?;
        }
        Ok(())
    }
}

impl std::error::Error for XrpcError {}

/// Standard XRPC error response format
///
/// Servers are not consistent about including `message`, so both fields
/// are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XrpcErrorResponse {
    /// Error code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorKind::from_status(400), ErrorKind::BadRequest);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::AuthenticationFailed);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Forbidden);
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(405), ErrorKind::MethodNotAllowed);
        assert_eq!(ErrorKind::from_status(413), ErrorKind::PayloadTooLarge);
        assert_eq!(ErrorKind::from_status(426), ErrorKind::UpgradeRequired);
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(501), ErrorKind::NotImplemented);
        assert_eq!(ErrorKind::from_status(502), ErrorKind::BadGateway);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServiceUnavailable);
        assert_eq!(ErrorKind::from_status(504), ErrorKind::GatewayTimeout);
        assert_eq!(ErrorKind::from_status(418), ErrorKind::Unknown);
    }

    #[test]
    fn test_retryable_kinds() {
        for status in [502, 503, 504] {
            assert!(XrpcError::new(status, "x", "y").is_retryable(), "{status}");
        }
        for status in [400, 401, 403, 404, 405, 413, 426, 429, 500, 501] {
            assert!(!XrpcError::new(status, "x", "y").is_retryable(), "{status}");
        }
        assert!(XrpcError::transport("reset").is_retryable());
        assert!(XrpcError::timeout("slow").is_retryable());
        assert!(!XrpcError::missing_session().is_retryable());
    }

    #[test]
    fn test_recoverable() {
        assert!(XrpcError::new(429, "RateLimitExceeded", "slow down").is_recoverable());
        assert!(XrpcError::new(401, "AuthRequired", "login").is_recoverable());
        assert!(!XrpcError::new(400, "InvalidRequest", "bad").is_recoverable());
        assert!(!XrpcError::new(500, "InternalServerError", "oops").is_recoverable());
    }

    #[test]
    fn test_token_rejection() {
        assert!(XrpcError::new(401, "AuthRequired", "").is_token_rejection());
        assert!(XrpcError::new(400, "ExpiredToken", "Token has expired").is_token_rejection());
        assert!(XrpcError::new(400, "InvalidToken", "Token is invalid").is_token_rejection());
        assert!(!XrpcError::new(400, "InvalidRequest", "bad").is_token_rejection());
    }

    #[test]
    fn test_configuration_kinds() {
        assert!(ErrorKind::EmptyServiceUrl.is_configuration());
        assert!(ErrorKind::InvalidRequestUrl.is_configuration());
        assert!(!ErrorKind::NotFound.is_configuration());
    }

    #[test]
    fn test_display_includes_retry_after() {
        let error = XrpcError::new(429, "RateLimitExceeded", "Too many requests")
            .with_retry_after(Some(30));
        let display = error.to_string();
        assert!(display.contains("429"));
        assert!(display.contains("RateLimited"));
        assert!(display.contains("retry after 30s"));
    }

    #[test]
    fn test_into_kind_preserves_details() {
        let error = XrpcError::new(400, "ExpiredToken", "Token has expired")
            .into_kind(ErrorKind::AuthenticationFailed);
        assert_eq!(error.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(error.status(), 400);
        assert_eq!(error.error(), "ExpiredToken");
    }

    #[test]
    fn test_error_response_without_message() {
        let parsed: XrpcErrorResponse =
            serde_json::from_str(r#"{"error":"RateLimitExceeded"}"#).unwrap();
        assert_eq!(parsed.error.as_deref(), Some("RateLimitExceeded"));
        assert!(parsed.message.is_none());
    }
}
