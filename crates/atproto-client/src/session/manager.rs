//! Session manager and token lifecycle
//!
//! [`SessionManager`] owns the single canonical [`Session`] of a client. It
//! hands out valid access tokens, refreshes them when they are near expiry
//! or rejected, and keeps the [`CredentialStore`] in step with memory.
//!
//! # Refresh discipline
//!
//! Refreshes are single-flight. A caller that wants a refresh notes the
//! flight counter, takes the refresh lock, and then:
//! - if a flight finished while it waited, it takes that flight's outcome,
//!   success or failure, without contacting the server;
//! - if the access token it saw is no longer current, it returns the
//!   current session;
//! - otherwise it starts a flight of its own.
//!
//! The exchange runs in a spawned task that owns the lock guard, so an
//! abandoned caller cannot leave a rotation half-applied.
//!
//! # Example
//!
//! ```rust,no_run
//! use atproto_client::session::{MemoryCredentialStore, SessionManager};
//! use atproto_client::xrpc::{XrpcClient, XrpcClientConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = XrpcClient::new(XrpcClientConfig::default())?;
//!     let manager = SessionManager::new(
//!         client,
//!         Arc::new(MemoryCredentialStore::new()),
//!         chrono::Duration::seconds(60),
//!     );
//!
//!     let session = manager
//!         .login("https://bsky.social", "alice.bsky.social", "app-password", None)
//!         .await?;
//!     println!("Logged in as {} on {}", session.handle, session.service_endpoint);
//!
//!     let token = manager.valid_access_token().await?;
//!     assert!(!token.is_empty());
//!     Ok(())
//! }
//! ```

use super::{pds_endpoint, CredentialStore, Session, SessionCallback, SessionError, SessionEvent};
use crate::types::AtIdentifier;
use crate::xrpc::{xrpc_url, ErrorKind, Idempotency, XrpcClient, XrpcError, XrpcRequest};
use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionInput<'a> {
    identifier: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_factor_token: Option<&'a str>,
}

/// Output shared by `createSession` and `refreshSession`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionOutput {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
    #[serde(default)]
    did_doc: Option<serde_json::Value>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_confirmed: Option<bool>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    status: Option<String>,
}

/// Outcome of the last finished refresh, shared with callers that waited on it
#[derive(Default)]
struct RefreshState {
    last: Option<std::result::Result<Arc<Session>, XrpcError>>,
}

struct Inner {
    client: XrpcClient,
    store: Arc<dyn CredentialStore>,
    session: RwLock<Option<Arc<Session>>>,
    refresh_lock: Arc<Mutex<RefreshState>>,
    /// Finished refresh flights
    flights: AtomicU64,
    refresh_threshold: Duration,
    callbacks: RwLock<Vec<SessionCallback>>,
}

/// Owner of the active session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("did", &self.current().map(|s| s.did.clone()))
            .field("refresh_threshold", &self.inner.refresh_threshold)
            .finish()
    }
}

impl SessionManager {
    /// Create a manager with no active session
    ///
    /// Access tokens expiring within `refresh_threshold` are refreshed
    /// before use.
    pub fn new(
        client: XrpcClient,
        store: Arc<dyn CredentialStore>,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                session: RwLock::new(None),
                refresh_lock: Arc::new(Mutex::new(RefreshState::default())),
                flights: AtomicU64::new(0),
                refresh_threshold,
                callbacks: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The active session, if any
    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner.current()
    }

    /// Whether a session is active
    pub fn has_session(&self) -> bool {
        self.current().is_some()
    }

    /// Register a callback for session lifecycle events
    pub fn on_session_event<F>(&self, callback: F)
    where
        F: Fn(SessionEvent, &Session) + Send + Sync + 'static,
    {
        self.inner
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(callback));
    }

    /// The active session, refreshed first if its access token is near expiry
    pub async fn valid_session(&self) -> Result<Arc<Session>> {
        let session = self.current().ok_or_else(XrpcError::missing_session)?;
        if !session.needs_refresh(self.inner.refresh_threshold) {
            return Ok(session);
        }

        tracing::debug!(did = %session.did, "Access token near expiry, refreshing");
        self.refresh_from(&session.access_jwt).await
    }

    /// A bearer token that is valid for at least the refresh threshold
    pub async fn valid_access_token(&self) -> Result<String> {
        Ok(self.valid_session().await?.access_jwt.clone())
    }

    /// Refresh now, regardless of expiry
    pub async fn force_refresh(&self) -> Result<Arc<Session>> {
        let session = self.current().ok_or_else(XrpcError::missing_session)?;
        self.refresh_from(&session.access_jwt).await
    }

    /// Refresh after the server rejected `rejected_token`
    ///
    /// If the session has rotated since that token was read, the current
    /// session is returned as is.
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> Result<Arc<Session>> {
        self.refresh_from(rejected_token).await
    }

    async fn refresh_from(&self, observed_token: &str) -> Result<Arc<Session>> {
        let seen = self.inner.flights.load(Ordering::SeqCst);
        let mut guard = self.inner.refresh_lock.clone().lock_owned().await;

        if self.inner.flights.load(Ordering::SeqCst) != seen {
            match &guard.last {
                Some(Ok(session)) if session.access_jwt != observed_token => {
                    tracing::debug!(did = %session.did, "Session refreshed by another caller");
                    return Ok(session.clone());
                }
                Some(Err(e)) => {
                    tracing::debug!("Sharing failed refresh outcome: {}", e);
                    return Err(e.clone().into());
                }
                _ => {}
            }
        }

        let current = self.current().ok_or_else(XrpcError::missing_session)?;
        if current.access_jwt != observed_token {
            tracing::debug!(did = %current.did, "Session already refreshed by another caller");
            return Ok(current);
        }

        let inner = self.inner.clone();
        let task = tokio::spawn(async move {
            let result = inner.exchange(current).await;
            guard.last = Some(match &result {
                Ok(session) => Ok(session.clone()),
                Err(Error::Xrpc(e)) => Err(e.clone()),
                Err(_) => inner.current().ok_or_else(XrpcError::missing_session),
            });
            inner.flights.fetch_add(1, Ordering::SeqCst);
            drop(guard);
            result
        });

        task.await
            .map_err(|e| SessionError::RefreshAborted(e.to_string()))?
    }

    /// Make `session` the active session and persist it
    pub async fn install(&self, session: Session, event: SessionEvent) -> Result<Arc<Session>> {
        let _guard = self.inner.refresh_lock.lock().await;
        let session = Arc::new(session);
        self.inner.swap(Some(session.clone()));
        self.inner.store.store(&session).await?;
        self.inner.emit(event, &session);
        Ok(session)
    }

    /// Resume a previously stored session
    ///
    /// An expired access token is refreshed before returning.
    pub async fn resume(&self, session: Session) -> Result<Arc<Session>> {
        let session = self.install(session, SessionEvent::Create).await?;
        tracing::info!(did = %session.did, "Resumed session");

        if session.is_access_expired() {
            return self.refresh_from(&session.access_jwt).await;
        }
        Ok(session)
    }

    /// Resume whatever session the credential store holds
    pub async fn restore_from_store(&self) -> Result<Option<Arc<Session>>> {
        match self.inner.store.retrieve_session().await? {
            Some(session) => Ok(Some(self.resume(session).await?)),
            None => Ok(None),
        }
    }

    /// Create a session with `com.atproto.server.createSession`
    ///
    /// The session's service endpoint comes from the returned DID document
    /// when it names a PDS, otherwise from `entryway`.
    pub async fn login(
        &self,
        entryway: &str,
        identifier: &str,
        password: &str,
        auth_factor_token: Option<&str>,
    ) -> Result<Arc<Session>> {
        // Emails are not identifiers and pass through as typed
        let identifier = AtIdentifier::new(identifier)
            .map(String::from)
            .unwrap_or_else(|_| identifier.trim().to_string());

        let url = xrpc_url(entryway, "com.atproto.server.createSession")?;
        let request = XrpcRequest::procedure(url).json_body(&CreateSessionInput {
            identifier: &identifier,
            password,
            auth_factor_token,
        })?;

        let output: SessionOutput = self.inner.client.send(&request).await?;
        let endpoint = output
            .did_doc
            .as_ref()
            .and_then(pds_endpoint)
            .unwrap_or_else(|| entryway.trim().trim_end_matches('/').to_string());

        let session = output.into_session(endpoint);
        let session = self.install(session, SessionEvent::Create).await?;
        tracing::info!(did = %session.did, service = %session.service_endpoint, "Logged in");
        Ok(session)
    }

    /// End the session
    ///
    /// The server-side `deleteSession` is best effort; local state and the
    /// credential store are cleared either way.
    pub async fn logout(&self) -> Result<()> {
        let Some(session) = self.current() else {
            return Ok(());
        };

        let request = xrpc_url(&session.service_endpoint, "com.atproto.server.deleteSession")
            .map(|url| XrpcRequest::procedure(url).bearer(&session.refresh_jwt));
        let result = match request {
            Ok(request) => self.inner.client.send_unit(&request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(did = %session.did, "deleteSession failed during logout: {}", e);
        }

        let _guard = self.inner.refresh_lock.lock().await;
        self.inner.swap(None);
        self.inner.store.clear().await?;
        tracing::info!(did = %session.did, "Logged out");
        Ok(())
    }
}

impl Inner {
    fn current(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn swap(&self, next: Option<Arc<Session>>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn emit(&self, event: SessionEvent, session: &Session) {
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for callback in callbacks {
            callback(event, session);
        }
    }

    /// Exchange the refresh token of `stale` and install the result
    ///
    /// Must run with the refresh lock held.
    async fn exchange(&self, stale: Arc<Session>) -> Result<Arc<Session>> {
        let url = xrpc_url(&stale.service_endpoint, "com.atproto.server.refreshSession")?;
        let request = XrpcRequest::procedure(url)
            .bearer(&stale.refresh_jwt)
            .with_idempotency(Idempotency::Idempotent);

        match self.client.send::<SessionOutput>(&request).await {
            Ok(output) => {
                let next = Arc::new(output.apply_to(&stale));
                self.swap(Some(next.clone()));
                self.store.store(&next).await?;
                self.emit(SessionEvent::Update, &next);
                tracing::info!(did = %next.did, "Refreshed session");
                Ok(next)
            }
            Err(e) if e.is_token_rejection() => {
                tracing::warn!(did = %stale.did, "Refresh token rejected, clearing session: {}", e);
                self.swap(None);
                if let Err(clear_err) = self.store.clear().await {
                    tracing::warn!("Failed to clear credential store: {}", clear_err);
                }
                self.emit(SessionEvent::Expired, &stale);
                Err(e.into_kind(ErrorKind::AuthenticationFailed).into())
            }
            Err(e) => {
                tracing::warn!(did = %stale.did, "Session refresh failed: {}", e);
                if e.is_retryable() {
                    self.emit(SessionEvent::NetworkError, &stale);
                }
                Err(e.into())
            }
        }
    }
}

impl SessionOutput {
    fn into_session(self, service_endpoint: String) -> Session {
        let mut session = Session::new(
            self.did,
            self.handle,
            self.access_jwt,
            self.refresh_jwt,
            service_endpoint,
        );
        session.email = self.email;
        session.email_confirmed = self.email_confirmed;
        session.active = self.active.unwrap_or(true);
        session.status = self.status;
        session
    }

    fn apply_to(self, previous: &Session) -> Session {
        let mut session = previous.with_tokens(self.access_jwt, self.refresh_jwt);
        session.handle = self.handle;
        if let Some(endpoint) = self.did_doc.as_ref().and_then(pds_endpoint) {
            session.service_endpoint = endpoint;
        }
        if self.email.is_some() {
            session.email = self.email;
        }
        if self.email_confirmed.is_some() {
            session.email_confirmed = self.email_confirmed;
        }
        session.active = self.active.unwrap_or(true);
        session.status = self.status;
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_tokens::jwt_expiring_in;
    use crate::session::{MemoryCredentialStore, MockCredentialStore};
    use crate::xrpc::{RetryConfig, XrpcClientConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> XrpcClient {
        XrpcClient::new(
            XrpcClientConfig::default()
                .with_retry(RetryConfig::new(3).with_delay(StdDuration::from_millis(10))),
        )
        .unwrap()
    }

    fn manager_with(store: Arc<dyn CredentialStore>) -> SessionManager {
        SessionManager::new(client(), store, Duration::seconds(60))
    }

    fn session_at(endpoint: &str, access_ttl: Duration) -> Session {
        Session::new(
            "did:plc:alice",
            "alice.test",
            jwt_expiring_in("did:plc:alice", access_ttl),
            "refresh-1",
            endpoint,
        )
    }

    #[tokio::test]
    async fn test_valid_session_without_login() {
        let manager = manager_with(Arc::new(MemoryCredentialStore::new()));

        let err = manager.valid_session().await.unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::MissingActiveSession));
    }

    #[tokio::test]
    async fn test_install_persists_and_notifies() {
        let mut store = MockCredentialStore::new();
        store.expect_store().times(1).returning(|_| Ok(()));
        let manager = manager_with(Arc::new(store));

        let events = Arc::new(AtomicUsize::new(0));
        let seen = events.clone();
        manager.on_session_event(move |event, _| {
            assert_eq!(event, SessionEvent::Create);
            seen.fetch_add(1, Ordering::SeqCst);
        });

        let session = session_at("https://pds.example.com", Duration::hours(1));
        manager.install(session.clone(), SessionEvent::Create).await.unwrap();

        assert_eq!(events.load(Ordering::SeqCst), 1);
        assert_eq!(*manager.current().unwrap(), session);
    }

    #[tokio::test]
    async fn test_fresh_token_is_not_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.refreshSession"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let manager = manager_with(Arc::new(MemoryCredentialStore::new()));
        let session = session_at(&server.uri(), Duration::hours(1));
        manager.install(session.clone(), SessionEvent::Create).await.unwrap();

        let token = manager.valid_access_token().await.unwrap();
        assert_eq!(token, session.access_jwt);
    }

    #[tokio::test]
    async fn test_near_expiry_token_is_refreshed() {
        let server = MockServer::start().await;
        let new_access = jwt_expiring_in("did:plc:alice", Duration::hours(2));

        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.refreshSession"))
            .and(header("authorization", "Bearer refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": new_access,
                "refreshJwt": "refresh-2",
                "did": "did:plc:alice",
                "handle": "alice.test"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        let manager = manager_with(store.clone());
        manager
            .install(session_at(&server.uri(), Duration::seconds(30)), SessionEvent::Create)
            .await
            .unwrap();

        let token = manager.valid_access_token().await.unwrap();

        assert_eq!(token, new_access);
        assert_eq!(
            store.retrieve_refresh_token().await.unwrap().as_deref(),
            Some("refresh-2")
        );
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.refreshSession"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "ExpiredToken",
                "message": "Token has expired"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryCredentialStore::new());
        let manager = manager_with(store.clone());
        manager
            .install(session_at(&server.uri(), Duration::minutes(-1)), SessionEvent::Create)
            .await
            .unwrap();

        let expired = Arc::new(AtomicUsize::new(0));
        let seen = expired.clone();
        manager.on_session_event(move |event, _| {
            if event == SessionEvent::Expired {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = manager.valid_access_token().await.unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::AuthenticationFailed));
        assert!(manager.current().is_none());
        assert!(store.retrieve_session().await.unwrap().is_none());
        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_transport_failure_keeps_session() {
        // Nothing listens on this port
        let endpoint = "http://127.0.0.1:9";
        let manager = manager_with(Arc::new(MemoryCredentialStore::new()));
        manager
            .install(session_at(endpoint, Duration::minutes(-1)), SessionEvent::Create)
            .await
            .unwrap();

        let network_errors = Arc::new(AtomicUsize::new(0));
        let seen = network_errors.clone();
        manager.on_session_event(move |event, _| {
            if event == SessionEvent::NetworkError {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let err = manager.force_refresh().await.unwrap_err();

        assert!(err.kind().map(|k| k.is_retryable()).unwrap_or(false));
        assert!(manager.current().is_some());
        assert_eq!(network_errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_uses_pds_from_did_doc() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": "access-1",
                "refreshJwt": "refresh-1",
                "did": "did:plc:alice",
                "handle": "alice.test",
                "email": "alice@example.com",
                "didDoc": {
                    "id": "did:plc:alice",
                    "service": [{
                        "id": "#atproto_pds",
                        "type": "AtprotoPersonalDataServer",
                        "serviceEndpoint": "https://pds.example.com"
                    }]
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let manager = manager_with(Arc::new(MemoryCredentialStore::new()));
        let session = manager
            .login(&server.uri(), "alice.test", "hunter2", None)
            .await
            .unwrap();

        assert_eq!(session.service_endpoint, "https://pds.example.com");
        assert_eq!(session.email.as_deref(), Some("alice@example.com"));
        assert!(session.access_expires_at.is_none());
    }

    #[tokio::test]
    async fn test_login_without_did_doc_uses_entryway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.createSession"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "accessJwt": "access-1",
                "refreshJwt": "refresh-1",
                "did": "did:plc:alice",
                "handle": "alice.test"
            })))
            .mount(&server)
            .await;

        let manager = manager_with(Arc::new(MemoryCredentialStore::new()));
        let entryway = format!("{}/", server.uri());
        let session = manager.login(&entryway, "alice.test", "hunter2", None).await.unwrap();

        assert_eq!(session.service_endpoint, server.uri());
    }

    #[tokio::test]
    async fn test_login_normalizes_handle_but_not_email() {
        let server = MockServer::start().await;
        let cases = [
            ("@Alice.Test", "alice.test"),
            ("alice@example.com", "alice@example.com"),
        ];
        for (sent, expected) in cases {
            Mock::given(method("POST"))
                .and(path("/xrpc/com.atproto.server.createSession"))
                .and(body_json(json!({"identifier": expected, "password": "hunter2"})))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "accessJwt": "access-1",
                    "refreshJwt": "refresh-1",
                    "did": "did:plc:alice",
                    "handle": "alice.test"
                })))
                .expect(1)
                .mount(&server)
                .await;

            let manager = manager_with(Arc::new(MemoryCredentialStore::new()));
            manager.login(&server.uri(), sent, "hunter2", None).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xrpc/com.atproto.server.deleteSession"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let mut store = MockCredentialStore::new();
        store.expect_store().returning(|_| Ok(()));
        store.expect_clear().times(1).returning(|| Ok(()));
        let manager = manager_with(Arc::new(store));

        manager
            .install(session_at(&server.uri(), Duration::hours(1)), SessionEvent::Create)
            .await
            .unwrap();
        manager.logout().await.unwrap();

        assert!(!manager.has_session());
    }

    #[tokio::test]
    async fn test_restore_from_empty_store() {
        let mut store = MockCredentialStore::new();
        store.expect_retrieve_session().times(1).returning(|| Ok(None));
        let manager = manager_with(Arc::new(store));

        assert!(manager.restore_from_store().await.unwrap().is_none());
    }
}
