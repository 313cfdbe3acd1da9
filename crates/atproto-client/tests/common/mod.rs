//! Shared fixtures for integration tests

#![allow(dead_code)]

use atproto_client::xrpc::RetryConfig;
use atproto_client::{AgentConfig, BskyAgent, Session};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use wiremock::MockServer;

pub const DID: &str = "did:plc:alice";
pub const HANDLE: &str = "alice.test";

/// HS256 token for `sub` that expires `ttl` from now
///
/// `jti` keeps tokens minted in the same second distinct.
pub fn jwt(sub: &str, ttl: Duration, jti: &str) -> String {
    let claims = json!({
        "sub": sub,
        "aud": "did:web:pds.example.com",
        "iat": Utc::now().timestamp(),
        "exp": (Utc::now() + ttl).timestamp(),
        "scope": "com.atproto.access",
        "jti": jti,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"test_secret")).unwrap()
}

/// `createSession` / `refreshSession` response body
pub fn session_body(access_jwt: &str, refresh_jwt: &str) -> Value {
    json!({
        "accessJwt": access_jwt,
        "refreshJwt": refresh_jwt,
        "did": DID,
        "handle": HANDLE,
        "active": true,
    })
}

/// Agent pointed entirely at the mock server, with fast retries
pub fn config(server: &MockServer) -> AgentConfig {
    AgentConfig::default()
        .with_service_url(server.uri())
        .with_entryway_url(server.uri())
        .with_video_service(server.uri(), "did:web:video.example.com")
        .with_retry(RetryConfig::new(3).with_delay(std::time::Duration::from_millis(10)))
}

/// Session on the mock server whose access token expires in `access_ttl`
pub fn session(server: &MockServer, access_ttl: Duration, tag: &str) -> Session {
    Session::new(
        DID,
        HANDLE,
        jwt(DID, access_ttl, &format!("access-{tag}")),
        jwt(DID, Duration::days(60), &format!("refresh-{tag}")),
        server.uri(),
    )
}

/// Agent already holding a session on the mock server
pub async fn logged_in_agent(server: &MockServer, access_ttl: Duration) -> (BskyAgent, Session) {
    let agent = BskyAgent::new(config(server)).unwrap();
    let session = session(server, access_ttl, "initial");
    agent.resume_session(session.clone()).await.unwrap();
    (agent, session)
}

pub fn empty_feed() -> Value {
    json!({ "feed": [] })
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
