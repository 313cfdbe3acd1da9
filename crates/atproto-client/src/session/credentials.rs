//! Credential storage
//!
//! The [`CredentialStore`] trait is the durable side of a session. The
//! manager treats its in-memory [`Session`] as a cache over whatever the
//! store holds, writing through on every change.

use super::Session;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storage::{PersistedState, PersistenceConfig, PersistenceError};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors raised by credential stores
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Backing storage failed
    #[error("Credential storage error: {0}")]
    Storage(#[from] PersistenceError),

    /// Store-specific failure (keychain locked, permission denied, ...)
    #[error("Credential store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for session credentials
///
/// Implementations must be safe to call concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored session, if any
    async fn retrieve_session(&self) -> Result<Option<Session>, CredentialError>;

    /// Load the stored access token
    async fn retrieve_access_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.retrieve_session().await?.map(|s| s.access_jwt))
    }

    /// Load the stored refresh token
    async fn retrieve_refresh_token(&self) -> Result<Option<String>, CredentialError> {
        Ok(self.retrieve_session().await?.map(|s| s.refresh_jwt))
    }

    /// Persist a session, replacing any previous one
    async fn store(&self, session: &Session) -> Result<(), CredentialError>;

    /// Remove the stored session
    async fn clear(&self) -> Result<(), CredentialError>;
}

/// Credential store that lives and dies with the process
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    session: RwLock<Option<Session>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn retrieve_session(&self) -> Result<Option<Session>, CredentialError> {
        Ok(self.session.read().await.clone())
    }

    async fn store(&self, session: &Session) -> Result<(), CredentialError> {
        *self.session.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        *self.session.write().await = None;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredCredentials {
    session: Option<Session>,
}

/// Credential store backed by a checksummed JSON file
///
/// Writes go through a temp file and are restricted to the owner on unix.
pub struct FileCredentialStore {
    state: PersistedState<StoredCredentials>,
}

impl FileCredentialStore {
    /// Open (or lazily create) the store at `path`
    ///
    /// A corrupt or incompatible file is reported rather than overwritten.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let state = PersistedState::new(PersistenceConfig::new(path));
        state.init().await?;
        Ok(Self { state })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        self.state.path()
    }
}

impl std::fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn retrieve_session(&self) -> Result<Option<Session>, CredentialError> {
        Ok(self.state.get().await?.session)
    }

    async fn store(&self, session: &Session) -> Result<(), CredentialError> {
        let session = session.clone();
        self.state.update(|stored| stored.session = Some(session)).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CredentialError> {
        self.state.clear().await?;
        Ok(())
    }
}
