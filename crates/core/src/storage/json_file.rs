use super::UserStore;
use crate::error::{StorageError, StorageResult};
use crate::types::{NewUser, User, UserId};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// User store backed by a single pretty-printed JSON array on disk
pub struct JsonFileUserStore {
    path: PathBuf,
    // Held across read-modify-write so appends from this process never interleave
    write_lock: Mutex<()>,
}

impl JsonFileUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed the backing file with an empty collection if it does not exist yet
    pub async fn init(&self) -> StorageResult<()> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|source| StorageError::Unavailable {
                path: self.path.clone(),
                source,
            })?;
        if exists {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.write_failure(source))?;
        }

        tracing::info!("Creating empty user store at {}", self.path.display());
        self.persist(&[]).await
    }

    async fn persist(&self, users: &[User]) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(users)
            .map_err(|e| self.write_failure(e.into()))?;

        // Write beside the target and rename, so a failed write leaves the old file intact
        let temp_path = self.temp_path();
        if let Err(source) = tokio::fs::write(&temp_path, json).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(self.write_failure(source));
        }

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|source| self.write_failure(source))
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_failure(&self, source: std::io::Error) -> StorageError {
        StorageError::WriteFailure {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait::async_trait]
impl UserStore for JsonFileUserStore {
    async fn load_all(&self) -> StorageResult<Vec<User>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| StorageError::Unavailable {
                path: self.path.clone(),
                source,
            })?;

        serde_json::from_str(&content).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    async fn append_and_persist(&self, candidate: NewUser) -> StorageResult<UserId> {
        let _guard = self.write_lock.lock().await;

        let mut users = self.load_all().await?;
        let id = UserId::next_for_count(users.len());
        users.push(candidate.into_user(id));

        self.persist(&users).await?;
        tracing::debug!("Persisted user {} ({} records)", id, users.len());

        Ok(id)
    }
}
