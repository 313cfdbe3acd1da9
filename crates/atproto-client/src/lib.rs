//! AT Protocol Client Library
//!
//! This crate provides the client core for AT Protocol services: XRPC
//! request building and dispatch, session management with single-flight
//! token refresh, open-world `$type` union decoding, and the [`BskyAgent`]
//! facade that composes them into typed endpoint calls.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod api;
pub mod session;
pub mod types;
pub mod union;
pub mod xrpc;

pub use agent::{AgentConfig, BskyAgent};
pub use session::{Session, SessionEvent};
pub use types::{AtIdentifier, Did, Handle};
pub use union::{Union, UnknownVariant};
pub use xrpc::{ErrorKind, XrpcError};

use session::{CredentialError, SessionError};

/// Result type for AT Protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for AT Protocol operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request could not be built, sent, or was answered with an error
    #[error(transparent)]
    Xrpc(#[from] XrpcError),

    /// Session state error
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Credential store error
    #[error("Credential error: {0}")]
    Credentials(#[from] CredentialError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Taxonomy kind, when the error came from the XRPC layer
    pub fn kind(&self) -> Option<ErrorKind> {
        self.as_xrpc().map(XrpcError::kind)
    }

    /// The underlying XRPC error, if any
    pub fn as_xrpc(&self) -> Option<&XrpcError> {
        match self {
            Error::Xrpc(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the server rejected the bearer token of the call
    pub fn is_token_rejection(&self) -> bool {
        self.as_xrpc()
            .map(XrpcError::is_token_rejection)
            .unwrap_or(false)
    }

    /// Seconds the server asked to wait, for rate-limited calls
    pub fn retry_after(&self) -> Option<u64> {
        self.as_xrpc().and_then(XrpcError::retry_after)
    }
}
