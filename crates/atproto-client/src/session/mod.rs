//! AT Protocol session management
//!
//! This module holds the session model and everything that keeps it valid:
//! - [`Session`]: the tokens, identity and service endpoint of one account
//! - JWT inspection for expiry metadata (no signature validation)
//! - [`CredentialStore`]: durable storage for the session
//! - [`SessionManager`]: login, resume, logout and single-flight token refresh
//!
//! # Example
//!
//! ```rust
//! use atproto_client::session::Session;
//!
//! let session = Session::new(
//!     "did:plc:abc123",
//!     "alice.bsky.social",
//!     "access-token",
//!     "refresh-token",
//!     "https://morel.us-east.host.bsky.network",
//! );
//!
//! // Opaque tokens carry no expiry, so they are only refreshed on rejection
//! assert!(session.access_expires_at.is_none());
//! assert!(!session.needs_refresh(chrono::Duration::seconds(60)));
//! ```

mod credentials;
mod manager;

pub use credentials::{CredentialError, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use manager::SessionManager;

#[cfg(test)]
pub use credentials::MockCredentialStore;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// JWT could not be decoded
    #[error("JWT parsing error: {0}")]
    JwtParseError(#[from] jsonwebtoken::errors::Error),

    /// The background refresh task did not complete
    #[error("Token refresh aborted: {0}")]
    RefreshAborted(String),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// An authenticated session
///
/// At most one session is active per client. It is replaced as a whole on
/// refresh, so readers holding an `Arc<Session>` never see a half-updated
/// token pair.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// The account DID
    pub did: String,

    /// The account handle
    pub handle: String,

    /// Access JWT for authenticated requests
    pub access_jwt: String,

    /// Refresh JWT for obtaining a new token pair
    pub refresh_jwt: String,

    /// Base URL of the PDS serving this account
    pub service_endpoint: String,

    /// The account email address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the email has been confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_confirmed: Option<bool>,

    /// Whether the account is active
    #[serde(default = "default_active")]
    pub active: bool,

    /// Account status (e.g., "takendown", "suspended", "deactivated")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Access token expiry, from its `exp` claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,

    /// Refresh token expiry, from its `exp` claim
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

// Token material is never printed
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("did", &self.did)
            .field("handle", &self.handle)
            .field("access_jwt", &"<redacted>")
            .field("refresh_jwt", &"<redacted>")
            .field("service_endpoint", &self.service_endpoint)
            .field("email", &self.email)
            .field("email_confirmed", &self.email_confirmed)
            .field("active", &self.active)
            .field("status", &self.status)
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

impl Session {
    /// Create a session, reading expiry metadata from the tokens
    pub fn new(
        did: impl Into<String>,
        handle: impl Into<String>,
        access_jwt: impl Into<String>,
        refresh_jwt: impl Into<String>,
        service_endpoint: impl Into<String>,
    ) -> Self {
        let access_jwt = access_jwt.into();
        let refresh_jwt = refresh_jwt.into();
        Self {
            did: did.into(),
            handle: handle.into(),
            access_expires_at: get_jwt_expiration(&access_jwt),
            refresh_expires_at: get_jwt_expiration(&refresh_jwt),
            access_jwt,
            refresh_jwt,
            service_endpoint: service_endpoint.into(),
            email: None,
            email_confirmed: None,
            active: true,
            status: None,
        }
    }

    /// Copy of this session carrying a new token pair
    pub fn with_tokens(
        &self,
        access_jwt: impl Into<String>,
        refresh_jwt: impl Into<String>,
    ) -> Self {
        let access_jwt = access_jwt.into();
        let refresh_jwt = refresh_jwt.into();
        Self {
            access_expires_at: get_jwt_expiration(&access_jwt),
            refresh_expires_at: get_jwt_expiration(&refresh_jwt),
            access_jwt,
            refresh_jwt,
            ..self.clone()
        }
    }

    /// Whether the access token expires within `threshold`
    ///
    /// Tokens without a readable expiry never need a proactive refresh.
    pub fn needs_refresh(&self, threshold: Duration) -> bool {
        self.access_expires_at
            .map(|exp| exp <= Utc::now() + threshold)
            .unwrap_or(false)
    }

    /// Whether the access token is past its expiry
    pub fn is_access_expired(&self) -> bool {
        self.needs_refresh(Duration::zero())
    }

    /// Whether the refresh token is past its expiry
    pub fn is_refresh_expired(&self) -> bool {
        self.refresh_expires_at
            .map(|exp| exp <= Utc::now())
            .unwrap_or(false)
    }
}

/// Session lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Session created (login or resume)
    Create,
    /// Session updated (token refresh)
    Update,
    /// Refresh token rejected; the session has been cleared
    Expired,
    /// Refresh failed for a transport reason; the session is kept
    NetworkError,
}

/// Callback function type for session events
pub type SessionCallback = Arc<dyn Fn(SessionEvent, &Session) + Send + Sync>;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (DID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Audience (service DID)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,

    /// Issued at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Scope (e.g., "com.atproto.access" for access tokens)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Parse JWT claims without verifying the signature
///
/// The client only inspects its own tokens for expiry; the server remains
/// the authority on whether they are valid.
pub fn parse_jwt_claims(token: &str) -> Result<JwtClaims> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<JwtClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(token_data.claims)
}

/// Get the expiration time of a JWT
///
/// # Example
///
/// ```rust
/// use atproto_client::session::get_jwt_expiration;
///
/// let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...";
/// if let Some(exp_time) = get_jwt_expiration(token) {
///     println!("Token expires at: {}", exp_time);
/// }
/// ```
pub fn get_jwt_expiration(token: &str) -> Option<DateTime<Utc>> {
    let claims = parse_jwt_claims(token).ok()?;
    claims.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
}

/// Find the `#atproto_pds` service endpoint in a DID document
pub fn pds_endpoint(did_doc: &serde_json::Value) -> Option<String> {
    did_doc
        .get("service")?
        .as_array()?
        .iter()
        .find(|service| {
            service
                .get("id")
                .and_then(|id| id.as_str())
                .map(|id| id.ends_with("#atproto_pds"))
                .unwrap_or(false)
        })?
        .get("serviceEndpoint")?
        .as_str()
        .map(|endpoint| endpoint.trim_end_matches('/').to_string())
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    /// Mint an HS256 token whose `exp` is `ttl` from now
    pub fn jwt_expiring_in(sub: &str, ttl: Duration) -> String {
        let claims = json!({
            "sub": sub,
            "aud": "did:web:pds.example.com",
            "iat": Utc::now().timestamp(),
            "exp": (Utc::now() + ttl).timestamp(),
            "scope": "com.atproto.access",
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_tokens::jwt_expiring_in;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_jwt_claims() {
        let token = jwt_expiring_in("did:plc:test123", Duration::hours(1));

        let parsed = parse_jwt_claims(&token).unwrap();

        assert_eq!(parsed.sub.as_deref(), Some("did:plc:test123"));
        assert_eq!(parsed.aud.as_deref(), Some("did:web:pds.example.com"));
        assert_eq!(parsed.scope.as_deref(), Some("com.atproto.access"));
        assert!(parsed.iat.is_some());
    }

    #[test]
    fn test_get_jwt_expiration() {
        let expected = Utc::now() + Duration::hours(2);
        let token = jwt_expiring_in("did:plc:test123", Duration::hours(2));

        let parsed = get_jwt_expiration(&token).unwrap();

        let diff = (parsed.timestamp() - expected.timestamp()).abs();
        assert!(diff <= 1, "Expiration time should match within 1 second");
    }

    #[test]
    fn test_opaque_token_has_no_expiration() {
        assert!(get_jwt_expiration("not-a-jwt").is_none());
        assert!(parse_jwt_claims("not-a-jwt").is_err());
    }

    #[test]
    fn test_session_expiry_from_tokens() {
        let session = Session::new(
            "did:plc:abc",
            "alice.test",
            jwt_expiring_in("did:plc:abc", Duration::seconds(30)),
            jwt_expiring_in("did:plc:abc", Duration::days(60)),
            "https://pds.example.com",
        );

        assert!(!session.is_access_expired());
        assert!(session.needs_refresh(Duration::seconds(60)));
        assert!(!session.needs_refresh(Duration::seconds(10)));
        assert!(!session.is_refresh_expired());
    }

    #[test]
    fn test_expired_access_token() {
        let session = Session::new(
            "did:plc:abc",
            "alice.test",
            jwt_expiring_in("did:plc:abc", Duration::minutes(-5)),
            "refresh",
            "https://pds.example.com",
        );

        assert!(session.is_access_expired());
        assert!(session.refresh_expires_at.is_none());
        assert!(!session.is_refresh_expired());
    }

    #[test]
    fn test_with_tokens_keeps_identity() {
        let mut session = Session::new("did:plc:abc", "alice.test", "a1", "r1", "https://pds");
        session.email = Some("alice@example.com".to_string());

        let next = session.with_tokens(jwt_expiring_in("did:plc:abc", Duration::hours(2)), "r2");

        assert_eq!(next.did, "did:plc:abc");
        assert_eq!(next.email.as_deref(), Some("alice@example.com"));
        assert_eq!(next.refresh_jwt, "r2");
        assert!(next.access_expires_at.is_some());
        assert_eq!(session.access_jwt, "a1");
    }

    #[test]
    fn test_session_serialization() {
        let session = Session::new("did:plc:abc", "alice.test", "a", "r", "https://pds");

        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["accessJwt"], "a");
        assert_eq!(value["serviceEndpoint"], "https://pds");
        assert!(value.get("email").is_none());

        let back: Session = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }

    #[test]
    fn test_debug_output_hides_tokens() {
        let access = jwt_expiring_in("did:plc:abc", Duration::hours(1));
        let session =
            Session::new("did:plc:abc", "alice.test", &access, "refresh-secret", "https://pds");

        let printed = format!("{session:?}");
        assert!(printed.contains("did:plc:abc"));
        assert!(printed.contains("alice.test"));
        assert!(!printed.contains(&access));
        assert!(!printed.contains("refresh-secret"));
    }

    #[test]
    fn test_pds_endpoint_from_did_doc() {
        let did_doc = json!({
            "id": "did:plc:abc",
            "service": [
                {
                    "id": "#bsky_notif",
                    "type": "BskyNotificationService",
                    "serviceEndpoint": "https://notif.example.com"
                },
                {
                    "id": "#atproto_pds",
                    "type": "AtprotoPersonalDataServer",
                    "serviceEndpoint": "https://morel.us-east.host.bsky.network/"
                }
            ]
        });

        assert_eq!(
            pds_endpoint(&did_doc).as_deref(),
            Some("https://morel.us-east.host.bsky.network")
        );
        assert_eq!(pds_endpoint(&json!({"id": "did:plc:abc"})), None);
    }
}
