//! Persisted state adapters.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use crate::application::repos::{CredentialsState, RepoError, StateRepo};
use crate::domain::types::SiteId;

use super::lock::mutex_lock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    site_id: Option<SiteId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials: Option<CredentialsState>,
}

/// TOML file store. Writes go to a sibling temporary file that is renamed
/// over the target, so readers never observe a half-written file.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    write_lock: AsyncMutex<()>,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: AsyncMutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoredState, RepoError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StoredState::default());
            }
            Err(err) => return Err(RepoError::from_persistence(err)),
        };
        toml::from_str(&text)
            .map_err(|err| RepoError::corrupt(format!("{}: {err}", self.path.display())))
    }

    async fn update<F>(&self, apply: F) -> Result<(), RepoError>
    where
        F: FnOnce(&mut StoredState),
    {
        let _guard = self.write_lock.lock().await;
        let mut state = self.read().await?;
        apply(&mut state);

        let text = toml::to_string_pretty(&state).map_err(RepoError::from_persistence)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(RepoError::from_persistence)?;
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, text)
            .await
            .map_err(RepoError::from_persistence)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(RepoError::from_persistence)?;

        debug!(path = %self.path.display(), "state written");
        Ok(())
    }
}

#[async_trait]
impl StateRepo for FileStateStore {
    async fn site_id(&self) -> Result<Option<SiteId>, RepoError> {
        Ok(self.read().await?.site_id)
    }

    async fn store_site_id(&self, site_id: &SiteId) -> Result<(), RepoError> {
        let site_id = site_id.clone();
        self.update(move |state| state.site_id = Some(site_id)).await
    }

    async fn credentials(&self) -> Result<Option<CredentialsState>, RepoError> {
        Ok(self.read().await?.credentials)
    }

    async fn store_credentials(
        &self,
        credentials: Option<&CredentialsState>,
    ) -> Result<(), RepoError> {
        let credentials = credentials.cloned();
        self.update(move |state| state.credentials = credentials).await
    }
}

/// In-process store for tests and embedders without a writable disk.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    inner: Mutex<StoredState>,
}

#[async_trait]
impl StateRepo for MemoryStateStore {
    async fn site_id(&self) -> Result<Option<SiteId>, RepoError> {
        Ok(mutex_lock(&self.inner, "infra::state", "site_id")
            .site_id
            .clone())
    }

    async fn store_site_id(&self, site_id: &SiteId) -> Result<(), RepoError> {
        mutex_lock(&self.inner, "infra::state", "store_site_id").site_id = Some(site_id.clone());
        Ok(())
    }

    async fn credentials(&self) -> Result<Option<CredentialsState>, RepoError> {
        Ok(mutex_lock(&self.inner, "infra::state", "credentials")
            .credentials
            .clone())
    }

    async fn store_credentials(
        &self,
        credentials: Option<&CredentialsState>,
    ) -> Result<(), RepoError> {
        mutex_lock(&self.inner, "infra::state", "store_credentials").credentials =
            credentials.cloned();
        Ok(())
    }
}
