//! Purge orchestration: credential gate, balanced key batching and the
//! boolean success contract callers rely on.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use futures::{StreamExt, stream};
use metrics::{counter, histogram};
use tracing::{debug, error, info, instrument, warn};

use crate::application::credentials::CredentialGuard;
use crate::cache::{KeyMapper, header_value};
use crate::config::CdnSettings;
use crate::domain::types::{PurgeKey, WebhookEvent};
use crate::infra::cdn::{CdnClient, CdnError, url_purge_path};
use crate::infra::webhook::WebhookNotifier;

const METRIC_PURGE_REQUESTS: &str = "edgepurge_purge_requests_total";
const METRIC_PURGE_KEYS: &str = "edgepurge_purge_keys_total";
const METRIC_PURGE_REQUEST_MS: &str = "edgepurge_purge_request_ms";

/// Upper bound the CDN accepts in one `Surrogate-Key` purge request.
pub const DEFAULT_MAX_KEYS_PER_REQUEST: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct PurgeOptions {
    pub max_keys_per_request: NonZeroUsize,
    /// Chunks in flight at once. `1` keeps requests strictly sequential.
    pub concurrency: NonZeroUsize,
    pub log_purges: bool,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            max_keys_per_request: NonZeroUsize::new(DEFAULT_MAX_KEYS_PER_REQUEST)
                .unwrap_or(NonZeroUsize::MIN),
            concurrency: NonZeroUsize::MIN,
            log_purges: false,
        }
    }
}

impl From<&CdnSettings> for PurgeOptions {
    fn from(settings: &CdnSettings) -> Self {
        Self {
            max_keys_per_request: settings.max_keys_per_request,
            concurrency: settings.purge_concurrency,
            log_purges: settings.log_purges,
        }
    }
}

/// Split `items` into the fewest chunks of at most `max` items whose sizes
/// differ by at most one. Input order is preserved.
pub fn balanced_chunks<T>(items: &[T], max: NonZeroUsize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    let count = items.len().div_ceil(max.get());
    let base = items.len() / count;
    let larger = items.len() % count;

    let mut chunks = Vec::with_capacity(count);
    let mut rest = items;
    for index in 0..count {
        let size = base + usize::from(index < larger);
        let (chunk, tail) = rest.split_at(size);
        chunks.push(chunk);
        rest = tail;
    }
    chunks
}

pub struct Purger {
    client: Arc<CdnClient>,
    guard: CredentialGuard,
    mapper: Arc<KeyMapper>,
    notifier: WebhookNotifier,
    options: PurgeOptions,
}

impl Purger {
    pub fn new(
        client: Arc<CdnClient>,
        guard: CredentialGuard,
        mapper: Arc<KeyMapper>,
        notifier: WebhookNotifier,
        options: PurgeOptions,
    ) -> Self {
        Self {
            client,
            guard,
            mapper,
            notifier,
            options,
        }
    }

    pub fn mapper(&self) -> &KeyMapper {
        &self.mapper
    }

    /// Purge `keys` in balanced chunks. `true` only when every chunk succeeded;
    /// a failing chunk is logged and the remaining chunks are still sent.
    #[instrument(skip_all, fields(keys = keys.len()))]
    pub async fn purge_keys(&self, keys: &[PurgeKey]) -> bool {
        if keys.is_empty() {
            debug!("no surrogate keys to purge");
            return false;
        }
        if !self.guard.ensure_valid().await {
            warn!("purge skipped: credentials are not valid");
            return false;
        }

        let chunks = balanced_chunks(keys, self.options.max_keys_per_request);
        let total = chunks.len();
        let outcomes: Vec<bool> = stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| self.purge_chunk(index, total, chunk))
            .buffered(self.options.concurrency.get())
            .collect()
            .await;

        let purged = outcomes.iter().all(|ok| *ok);
        if purged {
            self.notifier
                .notify(
                    WebhookEvent::PurgeKeys,
                    &format!(
                        "Purged {} surrogate keys on service {}",
                        keys.len(),
                        self.client.service_id()
                    ),
                )
                .await;
        } else {
            let failed = outcomes.iter().filter(|ok| !**ok).count();
            warn!(failed, chunks = total, "surrogate key purge incomplete");
        }
        purged
    }

    async fn purge_chunk(&self, index: usize, total: usize, chunk: &[PurgeKey]) -> bool {
        let started = Instant::now();
        let result = self.client.purge_keys(chunk).await;
        self.record("keys", started, result.is_ok());

        match result {
            Ok(receipt) => {
                counter!(METRIC_PURGE_KEYS).increment(chunk.len() as u64);
                if self.options.log_purges {
                    info!(
                        chunk = index + 1,
                        chunks = total,
                        keys = %header_value(chunk),
                        purge_ids = receipt.len(),
                        "purged surrogate keys"
                    );
                }
                true
            }
            Err(err) => {
                self.handle_failure(&err).await;
                error!(
                    severity = "critical",
                    endpoint = "purge",
                    chunk = index + 1,
                    chunks = total,
                    keys = %header_value(chunk),
                    status = ?err.status(),
                    error = %err,
                    "surrogate key purge failed"
                );
                false
            }
        }
    }

    /// Purge the per-tag keys of `tags`, without the site-wide key.
    pub async fn purge_tags<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = self.mapper.hash_tags(tags);
        self.purge_keys(&keys).await
    }

    /// Purge everything tagged for this site, leaving other sites on the
    /// same service untouched.
    pub async fn purge_site(&self) -> bool {
        self.purge_keys(&[self.mapper.site_key()]).await
    }

    /// Purge one absolute URL. Malformed input is rejected before the
    /// credential check, so it never costs a request.
    #[instrument(skip(self))]
    pub async fn purge_url(&self, url: &str) -> bool {
        if let Err(err) = url_purge_path(url) {
            warn!(error = %err, "rejected url purge");
            return false;
        }
        if !self.guard.ensure_valid().await {
            warn!("purge skipped: credentials are not valid");
            return false;
        }

        let started = Instant::now();
        let result = self.client.purge_url(url).await;
        self.record("url", started, result.is_ok());
        match result {
            Ok(receipt) => {
                if self.options.log_purges {
                    info!(url, purge_id = ?receipt.id, "purged url");
                }
                true
            }
            Err(err) => {
                self.handle_failure(&err).await;
                error!(
                    severity = "critical",
                    endpoint = "purge/url",
                    url,
                    status = ?err.status(),
                    error = %err,
                    "url purge failed"
                );
                false
            }
        }
    }

    /// Purge the whole service, including every other site sharing it.
    #[instrument(skip(self))]
    pub async fn purge_all(&self) -> bool {
        if !self.guard.ensure_valid().await {
            warn!("purge skipped: credentials are not valid");
            return false;
        }

        let started = Instant::now();
        let result = self.client.purge_all().await;
        self.record("all", started, result.is_ok());
        match result {
            Ok(_) => {
                if self.options.log_purges {
                    info!(service_id = self.client.service_id(), "purged all content");
                }
                self.notifier
                    .notify(
                        WebhookEvent::PurgeAll,
                        &format!(
                            "Purged all content on service {}",
                            self.client.service_id()
                        ),
                    )
                    .await;
                true
            }
            Err(err) => {
                self.handle_failure(&err).await;
                error!(
                    severity = "critical",
                    endpoint = "purge_all",
                    status = ?err.status(),
                    error = %err,
                    "purge all failed"
                );
                false
            }
        }
    }

    async fn handle_failure(&self, err: &CdnError) {
        if err.is_auth() {
            self.guard.forget().await;
        }
    }

    fn record(&self, kind: &'static str, started: Instant, ok: bool) {
        let outcome = if ok { "success" } else { "failure" };
        counter!(METRIC_PURGE_REQUESTS, "kind" => kind, "outcome" => outcome).increment(1);
        histogram!(METRIC_PURGE_REQUEST_MS, "kind" => kind)
            .record(started.elapsed().as_secs_f64() * 1000.0);
    }
}
