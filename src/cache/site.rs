//! Site identity used to namespace cache tags on a shared CDN service.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::application::repos::{RepoError, StateRepo};
use crate::domain::types::SiteId;

/// Resolves the site id once per process: configured value, then the stored
/// one, then a freshly generated id that is persisted before use.
///
/// Two processes racing on first use may each generate an id; the last write
/// wins and the loser's keys only differ until its next restart.
pub struct SiteNamespace {
    configured: Option<SiteId>,
    state: Arc<dyn StateRepo>,
    resolved: OnceCell<SiteId>,
}

impl SiteNamespace {
    pub fn new(configured: Option<SiteId>, state: Arc<dyn StateRepo>) -> Self {
        Self {
            configured,
            state,
            resolved: OnceCell::new(),
        }
    }

    pub async fn site_id(&self) -> Result<SiteId, RepoError> {
        self.resolved
            .get_or_try_init(|| self.resolve())
            .await
            .cloned()
    }

    async fn resolve(&self) -> Result<SiteId, RepoError> {
        if let Some(configured) = self.configured.as_ref() {
            return Ok(configured.clone());
        }

        if let Some(stored) = self.state.site_id().await? {
            return Ok(stored);
        }

        // An id that was not persisted would silently change on restart.
        let generated = SiteId::generate();
        self.state.store_site_id(&generated).await?;
        info!(site_id = %generated, "generated and stored a new site id");
        Ok(generated)
    }
}

/// `site:tag`, the string that gets hashed into a per-tag key.
pub fn namespaced(site: &SiteId, tag: &str) -> String {
    format!("{site}:{tag}")
}
