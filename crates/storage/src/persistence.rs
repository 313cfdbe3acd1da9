//! Data persistence layer
//!
//! A [`PersistedState`] keeps one serializable value in memory and mirrors it
//! to a JSON file on every change. The file is wrapped in a versioned envelope
//! with an MD5 checksum so truncated or hand-edited files are rejected on load
//! instead of being silently accepted.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Persistence error types
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// State not initialized
    #[error("State not initialized")]
    NotInitialized,

    /// Corruption detected
    #[error("Corruption detected: {0}")]
    Corruption(String),

    /// Version mismatch
    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Expected version
        expected: u32,
        /// Found version
        found: u32,
    },
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// On-disk envelope around the persisted value
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    checksum: String,
    data: T,
}

fn checksum_of<T: Serialize>(data: &T) -> Result<String> {
    let json = serde_json::to_string(data)?;
    Ok(format!("{:x}", md5::compute(json)))
}

impl<T: Serialize> Envelope<T> {
    fn seal(version: u32, data: T) -> Result<Self> {
        let checksum = checksum_of(&data)?;
        Ok(Self { version, checksum, data })
    }

    fn verify(&self) -> Result<()> {
        let computed = checksum_of(&self.data)?;
        if computed != self.checksum {
            return Err(PersistenceError::Corruption(format!(
                "Checksum mismatch: expected {}, got {}",
                self.checksum, computed
            )));
        }
        Ok(())
    }
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Path to the persistence file
    pub path: PathBuf,
    /// Current schema version
    pub version: u32,
    /// Write through a temp file and rename it into place
    pub atomic_writes: bool,
    /// Restrict the file to owner read/write (unix only)
    pub owner_only: bool,
}

impl PersistenceConfig {
    /// Create a new configuration
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            version: 1,
            atomic_writes: true,
            owner_only: true,
        }
    }

    /// Set schema version
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Enable or disable atomic writes
    pub fn atomic_writes(mut self, enabled: bool) -> Self {
        self.atomic_writes = enabled;
        self
    }

    /// Enable or disable owner-only file permissions
    pub fn owner_only(mut self, enabled: bool) -> Self {
        self.owner_only = enabled;
        self
    }
}

/// Persisted state manager
///
/// Readers and writers are serialized through an async `RwLock`; a write
/// only updates the in-memory copy once the file has been written.
pub struct PersistedState<T> {
    config: PersistenceConfig,
    state: RwLock<Option<T>>,
}

impl<T> PersistedState<T>
where
    T: Serialize + DeserializeOwned + Clone + Default,
{
    /// Create a new persisted state manager
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Initialize by loading from disk
    ///
    /// A missing file is not an error: the state starts from `T::default()`.
    pub async fn init(&self) -> Result<()> {
        let loaded = match self.load_from_disk().await {
            Ok(data) => data,
            Err(PersistenceError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                T::default()
            }
            Err(e) => return Err(e),
        };

        *self.state.write().await = Some(loaded);
        Ok(())
    }

    /// Get the current state
    pub async fn get(&self) -> Result<T> {
        self.state
            .read()
            .await
            .clone()
            .ok_or(PersistenceError::NotInitialized)
    }

    /// Apply `f` to a copy of the state, persist it, then publish it
    pub async fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut T),
    {
        let mut state = self.state.write().await;
        let mut next = state.clone().ok_or(PersistenceError::NotInitialized)?;
        f(&mut next);
        self.write_to_disk(&next).await?;
        *state = Some(next);
        Ok(())
    }

    /// Replace the entire state and persist it
    pub async fn set(&self, new_state: T) -> Result<()> {
        let mut state = self.state.write().await;
        self.write_to_disk(&new_state).await?;
        *state = Some(new_state);
        Ok(())
    }

    /// Reset to the default value and delete the backing file
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;

        match fs::remove_file(&self.config.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        *state = Some(T::default());
        Ok(())
    }

    async fn load_from_disk(&self) -> Result<T> {
        let contents = fs::read_to_string(&self.config.path).await?;
        let envelope: Envelope<T> = serde_json::from_str(&contents)?;

        envelope.verify()?;

        if envelope.version != self.config.version {
            return Err(PersistenceError::VersionMismatch {
                expected: self.config.version,
                found: envelope.version,
            });
        }

        Ok(envelope.data)
    }

    async fn write_to_disk(&self, data: &T) -> Result<()> {
        let envelope = Envelope::seal(self.config.version, data)?;
        let json = serde_json::to_string_pretty(&envelope)?;

        let target = if self.config.atomic_writes {
            self.config.path.with_extension("tmp")
        } else {
            self.config.path.clone()
        };

        let mut file = fs::File::create(&target).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if self.config.owner_only {
            restrict_to_owner(&target).await?;
        }

        if self.config.atomic_writes {
            fs::rename(&target, &self.config.path).await?;
        }

        tracing::debug!("Persisted state to {}", self.config.path.display());
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_to_owner(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_to_owner(_path: &Path) -> Result<()> {
    Ok(())
}
