//! Persistence traits for the small amount of state kept between runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::types::SiteId;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("stored state is corrupt: {message}")]
    Corrupt { message: String },
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}

/// Cached verdict of the last credential validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsState {
    pub valid: bool,
    /// Fingerprint of the credential pair the verdict applies to.
    pub fingerprint: String,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

impl CredentialsState {
    pub fn new(valid: bool, fingerprint: impl Into<String>) -> Self {
        Self {
            valid,
            fingerprint: fingerprint.into(),
            checked_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Key/value state that must survive restarts. Last write wins.
#[async_trait]
pub trait StateRepo: Send + Sync {
    async fn site_id(&self) -> Result<Option<SiteId>, RepoError>;

    async fn store_site_id(&self, site_id: &SiteId) -> Result<(), RepoError>;

    async fn credentials(&self) -> Result<Option<CredentialsState>, RepoError>;

    /// `None` forgets the cached verdict so the next purge re-validates.
    async fn store_credentials(&self, state: Option<&CredentialsState>) -> Result<(), RepoError>;
}
