//! Cached purge-credential verdicts.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{CredentialsState, StateRepo};
use crate::domain::credentials::{CredentialVerdict, ScopePolicy, fingerprint};
use crate::infra::cdn::CdnClient;

const METRIC_CREDENTIAL_CHECKS: &str = "edgepurge_credential_checks_total";

/// Gatekeeper in front of every purge.
///
/// The verdict of the last validation is stored with a fingerprint of the
/// credential pair it was computed for. A matching stored verdict is returned
/// without network I/O, including a negative one, so invalid credentials keep
/// short-circuiting until they are edited or explicitly re-checked. A check
/// that could not reach a verdict is never stored.
#[derive(Clone)]
pub struct CredentialGuard {
    client: Arc<CdnClient>,
    state: Arc<dyn StateRepo>,
    policy: ScopePolicy,
}

impl CredentialGuard {
    pub fn new(client: Arc<CdnClient>, state: Arc<dyn StateRepo>, policy: ScopePolicy) -> Self {
        Self {
            client,
            state,
            policy,
        }
    }

    fn fingerprint(&self) -> String {
        let credentials = self.client.credentials();
        fingerprint(credentials.api_key(), credentials.service_id())
    }

    /// Stored verdict when it applies to the current credentials, otherwise a
    /// fresh validation.
    #[instrument(skip(self))]
    pub async fn ensure_valid(&self) -> bool {
        let current = self.fingerprint();
        match self.state.credentials().await {
            Ok(Some(stored)) if stored.fingerprint == current => {
                debug!(valid = stored.valid, "using cached credential verdict");
                return stored.valid;
            }
            Ok(Some(_)) => info!("credentials changed since last check, re-validating"),
            Ok(None) => debug!("no cached credential verdict"),
            Err(err) => warn!(error = %err, "failed to read credential state, re-validating"),
        }
        self.revalidate().await.is_valid()
    }

    /// Validate against the CDN API and store a definitive verdict.
    #[instrument(skip(self))]
    pub async fn revalidate(&self) -> CredentialVerdict {
        let verdict = self.client.purge_credentials_verdict(&self.policy).await;
        counter!(METRIC_CREDENTIAL_CHECKS, "outcome" => verdict.as_str()).increment(1);

        let Some(valid) = verdict.cacheable() else {
            warn!("credential check inconclusive, verdict not stored");
            return verdict;
        };
        let state = CredentialsState::new(valid, self.fingerprint());
        if let Err(err) = self.state.store_credentials(Some(&state)).await {
            warn!(error = %err, "failed to store credential verdict");
        }
        verdict
    }

    /// Drop the stored verdict so the next purge re-validates.
    pub async fn forget(&self) {
        match self.state.store_credentials(None).await {
            Ok(()) => info!("cleared cached credential verdict after an auth failure"),
            Err(err) => warn!(error = %err, "failed to clear credential verdict"),
        }
    }
}
