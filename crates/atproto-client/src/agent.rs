//! BskyAgent - Main client for Bluesky/AT Protocol
//!
//! The agent ties the pieces together: it owns the XRPC dispatcher and the
//! [`SessionManager`], decides per endpoint where a call goes and which
//! credentials it carries, and applies the one-shot refresh-and-retry
//! policy when the server rejects an access token.
//!
//! # Example
//!
//! ```rust,no_run
//! use atproto_client::{AgentConfig, BskyAgent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let agent = BskyAgent::new(AgentConfig::default())?;
//!
//!     agent.login("alice.bsky.social", "app-password").await?;
//!     println!("Logged in as: {}", agent.did().unwrap_or_default());
//!
//!     let timeline = agent.get_timeline(30, None).await?;
//!     println!("{} posts", timeline.feed.len());
//!     Ok(())
//! }
//! ```

use crate::api::{Audience, AuthRequirement, Endpoint, ServiceTarget};
use crate::session::{
    CredentialStore, MemoryCredentialStore, Session, SessionEvent, SessionManager,
};
use crate::xrpc::{
    build_request, parse_service_url, xrpc_url, QueryItems, RetryConfig, XrpcClient,
    XrpcClientConfig, XrpcError, XrpcRequest,
};
use crate::Result;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Public App View, used for unauthenticated reads
pub const DEFAULT_SERVICE_URL: &str = "https://public.api.bsky.app";

/// Login host
pub const DEFAULT_ENTRYWAY_URL: &str = "https://bsky.social";

/// Video processing service
pub const DEFAULT_VIDEO_SERVICE_URL: &str = "https://video.bsky.app";

/// DID of the video processing service
pub const DEFAULT_VIDEO_SERVICE_DID: &str = "did:web:video.bsky.app";

/// Configuration for [`BskyAgent`]
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Base URL for unauthenticated requests
    pub service_url: String,
    /// Host that `login` talks to
    pub entryway_url: String,
    /// Base URL of the video service
    pub video_service_url: String,
    /// DID the video service accepts service-auth tokens for
    pub video_service_did: String,
    /// HTTP layer settings
    pub xrpc: XrpcClientConfig,
    /// Refresh access tokens this long before they expire
    pub refresh_threshold: chrono::Duration,
    /// Session to resume on [`BskyAgent::restore`]
    pub session: Option<Session>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            entryway_url: DEFAULT_ENTRYWAY_URL.to_string(),
            video_service_url: DEFAULT_VIDEO_SERVICE_URL.to_string(),
            video_service_did: DEFAULT_VIDEO_SERVICE_DID.to_string(),
            xrpc: XrpcClientConfig::default(),
            refresh_threshold: chrono::Duration::seconds(60),
            session: None,
        }
    }
}

impl AgentConfig {
    /// Set the base URL for unauthenticated requests
    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = url.into();
        self
    }

    /// Set the login host
    pub fn with_entryway_url(mut self, url: impl Into<String>) -> Self {
        self.entryway_url = url.into();
        self
    }

    /// Set the video service URL and DID
    pub fn with_video_service(mut self, url: impl Into<String>, did: impl Into<String>) -> Self {
        self.video_service_url = url.into();
        self.video_service_did = did.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.xrpc.timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.xrpc.connect_timeout = timeout;
        self
    }

    /// Set the retry policy for transient failures
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.xrpc.retry = retry;
        self
    }

    /// Set the proactive refresh window
    pub fn with_refresh_threshold(mut self, threshold: chrono::Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    /// Resume this session on [`BskyAgent::restore`]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Check every configured URL
    pub fn validate(&self) -> std::result::Result<(), XrpcError> {
        parse_service_url(&self.service_url)?;
        parse_service_url(&self.entryway_url)?;
        parse_service_url(&self.video_service_url)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ServiceAuthOutput {
    token: String,
}

/// Main AT Protocol client
///
/// Cheap to clone; clones share the dispatcher and the session.
#[derive(Debug, Clone)]
pub struct BskyAgent {
    client: XrpcClient,
    sessions: SessionManager,
    config: Arc<AgentConfig>,
}

impl BskyAgent {
    /// Create an agent that keeps credentials in memory only
    pub fn new(config: AgentConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryCredentialStore::new()))
    }

    /// Create an agent persisting credentials to `store`
    pub fn with_store(config: AgentConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        config.validate()?;
        let client = XrpcClient::new(config.xrpc.clone())?;
        let sessions = SessionManager::new(client.clone(), store, config.refresh_threshold);

        Ok(Self {
            client,
            sessions,
            config: Arc::new(config),
        })
    }

    /// Resume the configured session, or else whatever the store holds
    pub async fn restore(&self) -> Result<Option<Arc<Session>>> {
        match &self.config.session {
            Some(session) => Ok(Some(self.sessions.resume(session.clone()).await?)),
            None => self.sessions.restore_from_store().await,
        }
    }

    /// Log in with a handle or email and password
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Arc<Session>> {
        self.login_with_token(identifier, password, None).await
    }

    /// Log in, supplying an emailed sign-in code when the account requires one
    pub async fn login_with_token(
        &self,
        identifier: &str,
        password: &str,
        auth_factor_token: Option<&str>,
    ) -> Result<Arc<Session>> {
        self.sessions
            .login(&self.config.entryway_url, identifier, password, auth_factor_token)
            .await
    }

    /// Install a stored session, refreshing it if the access token expired
    pub async fn resume_session(&self, session: Session) -> Result<Arc<Session>> {
        self.sessions.resume(session).await
    }

    /// Refresh the token pair now
    pub async fn refresh_session(&self) -> Result<Arc<Session>> {
        self.sessions.force_refresh().await
    }

    /// End the session locally and, best effort, on the server
    pub async fn logout(&self) -> Result<()> {
        self.sessions.logout().await
    }

    /// Register a callback for session lifecycle events
    pub fn on_session_event<F>(&self, callback: F)
    where
        F: Fn(SessionEvent, &Session) + Send + Sync + 'static,
    {
        self.sessions.on_session_event(callback);
    }

    /// The active session
    pub fn session(&self) -> Option<Arc<Session>> {
        self.sessions.current()
    }

    /// Whether a session is active
    pub fn has_session(&self) -> bool {
        self.sessions.has_session()
    }

    /// DID of the logged-in account
    pub fn did(&self) -> Option<String> {
        self.session().map(|s| s.did.clone())
    }

    /// Handle of the logged-in account
    pub fn handle(&self) -> Option<String> {
        self.session().map(|s| s.handle.clone())
    }

    /// The session manager, for direct token access
    pub fn session_manager(&self) -> &SessionManager {
        &self.sessions
    }

    /// Agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Call an endpoint
    ///
    /// Authenticated calls go to the session's PDS with a bearer token that
    /// is refreshed first if near expiry. If the server still rejects the
    /// token, the session is refreshed once and the call repeated once.
    /// Unauthenticated calls go to the configured public service.
    pub async fn call<E: Endpoint>(&self, endpoint: &E) -> Result<E::Output> {
        let authenticated = match E::AUTH {
            AuthRequirement::Required => true,
            AuthRequirement::Optional => self.sessions.has_session(),
            AuthRequirement::None => false,
        };

        if !authenticated {
            tracing::debug!(nsid = E::NSID, "Calling without credentials");
            let request = build(endpoint, &self.config.service_url, None)?;
            return Ok(self.client.send(&request).await?);
        }

        let session = self.sessions.valid_session().await?;
        match self.send_authenticated(endpoint, &session).await {
            Err(e) if e.is_token_rejection() => {
                tracing::info!(
                    nsid = E::NSID,
                    "Access token rejected, refreshing and retrying once"
                );
                let session = self
                    .sessions
                    .refresh_after_rejection(&session.access_jwt)
                    .await?;
                self.send_authenticated(endpoint, &session).await
            }
            result => result,
        }
    }

    async fn send_authenticated<E: Endpoint>(
        &self,
        endpoint: &E,
        session: &Session,
    ) -> Result<E::Output> {
        let request = match E::SERVICE {
            ServiceTarget::Default => {
                build(endpoint, &session.service_endpoint, Some(&session.access_jwt))?
            }
            ServiceTarget::Video { lxm, audience } => {
                let token = self.service_auth(session, lxm, audience).await?;
                build(endpoint, &self.config.video_service_url, Some(&token))?
            }
        };

        Ok(self.client.send(&request).await?)
    }

    /// Mint a service-auth token bound to `lxm` via the PDS
    async fn service_auth(
        &self,
        session: &Session,
        lxm: &str,
        audience: Audience,
    ) -> Result<String> {
        let aud = match audience {
            Audience::VideoService => self.config.video_service_did.clone(),
            Audience::Pds => pds_did(&session.service_endpoint)?,
        };

        let url = xrpc_url(&session.service_endpoint, "com.atproto.server.getServiceAuth")?;
        let request = XrpcRequest::query(url)
            .with_query(&QueryItems::new().with("aud", aud).with("lxm", lxm))
            .bearer(&session.access_jwt);

        let output: ServiceAuthOutput = self.client.send(&request).await?;
        Ok(output.token)
    }
}

/// Turn an endpoint into a request against `base`
fn build<E: Endpoint>(endpoint: &E, base: &str, bearer: Option<&str>) -> Result<XrpcRequest> {
    let url = xrpc_url(base, E::NSID)?;
    let mut request = build_request(url, E::METHOD, None, None, None)
        .with_query(&endpoint.query())
        .with_body(endpoint.body()?)
        .with_idempotency(E::IDEMPOTENCY);

    if let Some(token) = bearer {
        request = request.bearer(token);
    }
    Ok(request)
}

/// `did:web` identity of a PDS, derived from its host
fn pds_did(service_endpoint: &str) -> std::result::Result<String, XrpcError> {
    let url = parse_service_url(service_endpoint)?;
    let host = url.host_str().unwrap_or_default();
    Ok(match url.port() {
        Some(port) => format!("did:web:{}%3A{}", host, port),
        None => format!("did:web:{}", host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::feed::GetPosts;
    use crate::api::video::UploadVideo;
    use crate::xrpc::{ErrorKind, HttpMethod, Idempotency};

    #[test]
    fn test_default_config() {
        let config = AgentConfig::default();
        assert_eq!(config.service_url, "https://public.api.bsky.app");
        assert_eq!(config.entryway_url, "https://bsky.social");
        assert_eq!(config.xrpc.retry.max_attempts, 3);
        assert_eq!(config.xrpc.timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_threshold, chrono::Duration::seconds(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_service_url_is_rejected() {
        let err = BskyAgent::new(AgentConfig::default().with_service_url("")).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::EmptyServiceUrl));
    }

    #[test]
    fn test_invalid_entryway_is_rejected() {
        let err = BskyAgent::new(AgentConfig::default().with_entryway_url("bsky social"))
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidRequestUrl));
    }

    #[test]
    fn test_build_get_with_repeated_params() {
        let endpoint = GetPosts {
            uris: vec!["at://a".to_string(), "at://b".to_string()],
        };

        let request = build(&endpoint, "https://pds.example.com", Some("tok")).unwrap();

        assert_eq!(request.method(), HttpMethod::Get);
        assert_eq!(request.url().path(), "/xrpc/app.bsky.feed.getPosts");
        assert_eq!(
            request.url().query(),
            Some("uris=at%3A%2F%2Fa&uris=at%3A%2F%2Fb")
        );
        assert_eq!(request.authorization(), Some("Bearer tok"));
    }

    #[test]
    fn test_build_binary_upload() {
        let endpoint = UploadVideo::mp4("did:plc:alice", "clip.mp4", vec![1, 2, 3]);

        let request = build(&endpoint, "https://video.example.com", None).unwrap();

        assert_eq!(request.method(), HttpMethod::Post);
        assert_eq!(request.content_type(), Some("video/mp4"));
        assert_eq!(request.idempotency(), Idempotency::NonIdempotent);
        assert_eq!(request.authorization(), None);
    }

    #[test]
    fn test_pds_did() {
        assert_eq!(
            pds_did("https://morel.us-east.host.bsky.network").unwrap(),
            "did:web:morel.us-east.host.bsky.network"
        );
        assert_eq!(pds_did("http://127.0.0.1:2583").unwrap(), "did:web:127.0.0.1%3A2583");
    }
}
