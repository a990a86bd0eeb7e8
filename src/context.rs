#![deny(clippy::all, clippy::pedantic)]

use std::sync::Arc;

use edgepurge::{
    application::{
        credentials::CredentialGuard,
        error::AppError,
        invalidator::TagInvalidator,
        purger::{PurgeOptions, Purger},
        repos::StateRepo,
        vcl::VclWorkflow,
    },
    cache::{KeyMapper, SiteNamespace},
    config::Settings,
    infra::{
        cdn::{CdnClient, ClientOptions, Credentials},
        state::FileStateStore,
        webhook::WebhookNotifier,
    },
};

/// Resolved settings plus lazily built services for one command.
pub struct Ctx {
    pub settings: Settings,
    state: Arc<dyn StateRepo>,
}

impl Ctx {
    pub fn new(settings: Settings) -> Self {
        let state: Arc<dyn StateRepo> = Arc::new(FileStateStore::new(&settings.state.path));
        Self { settings, state }
    }

    pub fn state(&self) -> Arc<dyn StateRepo> {
        Arc::clone(&self.state)
    }

    pub fn client(&self) -> Result<Arc<CdnClient>, AppError> {
        let cdn = &self.settings.cdn;
        let api_key = cdn.api_key.as_deref().ok_or_else(|| {
            AppError::validation("an API token is required (set EDGEPURGE_API_TOKEN)")
        })?;
        let service_id = cdn.service_id.as_deref().ok_or_else(|| {
            AppError::validation("a service id is required (use --service-id)")
        })?;

        let client = CdnClient::new(
            cdn.api_host.as_str(),
            Credentials::new(api_key, service_id)?,
            ClientOptions {
                purge_method: cdn.purge_method,
                connect_timeout: cdn.connect_timeout,
                request_timeout: cdn.request_timeout,
            },
        )?;
        Ok(Arc::new(client))
    }

    pub fn notifier(&self) -> Result<WebhookNotifier, AppError> {
        Ok(WebhookNotifier::new(&self.settings.webhook)?)
    }

    pub fn guard(&self, client: Arc<CdnClient>) -> CredentialGuard {
        CredentialGuard::new(
            client,
            self.state(),
            self.settings.credentials.policy.clone(),
        )
    }

    pub fn namespace(&self) -> SiteNamespace {
        SiteNamespace::new(self.settings.keys.site_id.clone(), self.state())
    }

    pub async fn mapper(&self) -> Result<KeyMapper, AppError> {
        let site = self.namespace().site_id().await?;
        Ok(KeyMapper::new(site, self.settings.keys.hash_length))
    }

    pub async fn purger(&self) -> Result<Purger, AppError> {
        let client = self.client()?;
        let mapper = self.mapper().await?;
        Ok(Purger::new(
            Arc::clone(&client),
            self.guard(client),
            Arc::new(mapper),
            self.notifier()?,
            PurgeOptions::from(&self.settings.cdn),
        ))
    }

    pub async fn invalidator(&self) -> Result<TagInvalidator, AppError> {
        Ok(TagInvalidator::new(Arc::new(self.purger().await?)))
    }

    pub fn workflow(&self) -> Result<VclWorkflow, AppError> {
        Ok(VclWorkflow::new(self.client()?, self.notifier()?))
    }
}
