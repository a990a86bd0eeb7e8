#![deny(clippy::all, clippy::pedantic)]

//! Purge and invalidation flows against a mocked CDN API.

use std::num::NonZeroUsize;
use std::sync::Arc;

use edgepurge::application::credentials::CredentialGuard;
use edgepurge::application::invalidator::TagInvalidator;
use edgepurge::application::purger::{PurgeOptions, Purger, balanced_chunks};
use edgepurge::application::repos::{CredentialsState, StateRepo};
use edgepurge::cache::{KeyMapper, header_value};
use edgepurge::domain::credentials::{ScopePolicy, fingerprint};
use edgepurge::domain::types::{
    EXTENSION_CHANGED_TAG, HashLength, Invalidation, InvalidationState, OWN_CONFIG_TAG, SiteId,
};
use edgepurge::infra::cdn::{CdnClient, ClientOptions, Credentials};
use edgepurge::infra::state::MemoryStateStore;
use edgepurge::infra::webhook::WebhookNotifier;
use httpmock::MockServer;
use serde_json::{Map, Value, json};

struct Harness {
    server: MockServer,
    state: Arc<dyn StateRepo>,
    purger: Arc<Purger>,
}

impl Harness {
    async fn new(verdict: Option<bool>, length: usize) -> Self {
        let state: Arc<dyn StateRepo> = Arc::new(MemoryStateStore::default());
        if let Some(valid) = verdict {
            state
                .store_credentials(Some(&CredentialsState::new(
                    valid,
                    fingerprint("token", "svc"),
                )))
                .await
                .expect("seed verdict");
        }
        Self::with_state(state, length)
    }

    /// Fresh CDN mock over an existing state store, as a restarted process sees it.
    fn with_state(state: Arc<dyn StateRepo>, length: usize) -> Self {
        let server = MockServer::start();
        let client = Arc::new(
            CdnClient::new(
                &server.base_url(),
                Credentials::new("token", "svc").expect("credentials"),
                ClientOptions::default(),
            )
            .expect("client"),
        );
        let guard = CredentialGuard::new(client.clone(), state.clone(), ScopePolicy::default());
        let mapper = KeyMapper::new(
            SiteId::new("abcd").expect("site"),
            HashLength::new(length).expect("length"),
        );
        let purger = Purger::new(
            client,
            guard,
            Arc::new(mapper),
            WebhookNotifier::disabled(),
            PurgeOptions::default(),
        );
        Self {
            server,
            state,
            purger: Arc::new(purger),
        }
    }

    fn invalidator(&self) -> TagInvalidator {
        TagInvalidator::new(self.purger.clone())
    }
}

/// Body of a successful key purge: one purge id per key in `header`.
fn key_receipt(header: &str) -> Value {
    let ids: Map<String, Value> = header
        .split_whitespace()
        .enumerate()
        .map(|(n, key)| (key.to_string(), json!(format!("108-1391560174-{n}"))))
        .collect();
    Value::Object(ids)
}

fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

#[tokio::test]
async fn large_tag_sets_are_split_into_balanced_requests() {
    let harness = Harness::new(Some(true), 22).await;
    let tags: Vec<String> = (0..300).map(|n| format!("node:{n}")).collect();
    let keys = harness.purger.mapper().hash_tags(&tags);
    assert_eq!(keys.len(), 300);

    let max = NonZeroUsize::new(256).expect("non zero");
    let chunks = balanced_chunks(&keys, max);
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().all(|chunk| chunk.len() == 150));

    let mocks: Vec<_> = chunks
        .iter()
        .map(|chunk| {
            let header = header_value(chunk);
            harness.server.mock(|when, then| {
                when.method("POST")
                    .path("/service/svc/purge")
                    .header("Surrogate-Key", header.as_str());
                then.status(200).json_body(key_receipt(&header));
            })
        })
        .collect();

    assert!(harness.purger.purge_tags(&tags).await);
    for mock in &mocks {
        mock.assert_calls(1);
    }
}

#[tokio::test]
async fn failing_chunk_does_not_stop_the_others() {
    let harness = Harness::new(Some(true), 22).await;
    let tags: Vec<String> = (0..300).map(|n| format!("node:{n}")).collect();
    let keys = harness.purger.mapper().hash_tags(&tags);
    let chunks = balanced_chunks(&keys, NonZeroUsize::new(256).expect("non zero"));

    let failing = harness.server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/purge")
            .header("Surrogate-Key", header_value(chunks[0]));
        then.status(500).body("boom");
    });
    let passing = harness.server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/purge")
            .header("Surrogate-Key", header_value(chunks[1]));
        then.status(200).json_body(key_receipt(&header_value(chunks[1])));
    });

    assert!(!harness.purger.purge_tags(&tags).await);
    failing.assert_calls(1);
    passing.assert_calls(1);
}

#[tokio::test]
async fn invalid_cached_verdict_short_circuits_every_purge() {
    let harness = Harness::new(Some(false), 4).await;
    let token = harness.server.mock(|when, then| {
        when.method("GET").path("/tokens/self");
        then.status(200).json_body(json!({"scope": "purge_select purge_all"}));
    });
    let purge = harness.server.mock(|when, then| {
        when.method("POST");
        then.status(200).json_body(json!({"status": "ok"}));
    });

    assert!(!harness.purger.purge_tags(["node:1"]).await);
    assert!(!harness.purger.purge_site().await);
    assert!(!harness.purger.purge_all().await);
    assert!(!harness.purger.purge_url("https://example.com/a").await);
    token.assert_calls(0);
    purge.assert_calls(0);
}

#[tokio::test]
async fn first_purge_validates_and_stores_the_verdict() {
    let harness = Harness::new(None, 4).await;
    let token = harness.server.mock(|when, then| {
        when.method("GET").path("/tokens/self");
        then.status(200)
            .json_body(json!({"scope": "purge_select purge_all", "services": ["svc"]}));
    });
    let purge = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge");
        then.status(200).json_body(json!({"abcd": "108-1391560174-0"}));
    });

    assert!(harness.purger.purge_site().await);
    assert!(harness.purger.purge_tags(["node:1"]).await);
    token.assert_calls(1);
    purge.assert_calls(2);

    let stored = harness.state.credentials().await.expect("state").expect("verdict");
    assert!(stored.valid);
    assert_eq!(stored.fingerprint, fingerprint("token", "svc"));
}

#[tokio::test]
async fn key_purge_succeeds_on_per_key_purge_ids() {
    let harness = Harness::new(None, 4).await;
    harness.server.mock(|when, then| {
        when.method("GET").path("/tokens/self");
        then.status(200)
            .json_body(json!({"scope": "purge_select purge_all", "services": ["svc"]}));
    });
    let header = header_value(&harness.purger.mapper().hash_tags(["node:1", "node:2"]));
    let purge = harness.server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/purge")
            .header("Surrogate-Key", header.as_str());
        then.status(200).json_body(key_receipt(&header));
    });

    assert!(harness.purger.purge_tags(["node:1", "node:2"]).await);
    purge.assert();
}

#[tokio::test]
async fn empty_key_purge_response_is_a_failure() {
    let harness = Harness::new(Some(true), 4).await;
    let purge = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge");
        then.status(200).json_body(json!({}));
    });
    assert!(!harness.purger.purge_tags(["node:1"]).await);
    purge.assert();

    let blank = Harness::new(Some(true), 4).await;
    let purge = blank.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge");
        then.status(200).body("");
    });
    assert!(!blank.purger.purge_site().await);
    purge.assert();
}

#[tokio::test]
async fn transient_validation_error_is_retried_on_the_next_purge() {
    let state: Arc<dyn StateRepo> = Arc::new(MemoryStateStore::default());

    let outage = Harness::with_state(state.clone(), 4);
    let token = outage.server.mock(|when, then| {
        when.method("GET").path("/tokens/self");
        then.status(503).body("upstream unavailable");
    });
    let purge = outage.server.mock(|when, then| {
        when.method("POST");
        then.status(200).json_body(key_receipt("node"));
    });
    assert!(!outage.purger.purge_tags(["node:1"]).await);
    token.assert();
    purge.assert_calls(0);
    assert!(state.credentials().await.expect("state").is_none());

    let recovered = Harness::with_state(state.clone(), 4);
    let token = recovered.server.mock(|when, then| {
        when.method("GET").path("/tokens/self");
        then.status(200)
            .json_body(json!({"scope": "purge_select purge_all", "services": ["svc"]}));
    });
    let purge = recovered.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge");
        then.status(200).json_body(key_receipt("node"));
    });
    assert!(recovered.purger.purge_tags(["node:1"]).await);
    token.assert();
    purge.assert();
    let stored = state.credentials().await.expect("state").expect("verdict");
    assert!(stored.valid);
}

#[tokio::test]
async fn auth_failure_clears_the_stored_verdict() {
    let harness = Harness::new(Some(true), 4).await;
    let purge = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge_all");
        then.status(401)
            .json_body(json!({"msg": "Provided credentials are missing or invalid"}));
    });

    assert!(!harness.purger.purge_all().await);
    purge.assert();
    assert!(harness.state.credentials().await.expect("state").is_none());
}

#[tokio::test]
async fn malformed_url_costs_no_request() {
    let harness = Harness::new(None, 4).await;
    let token = harness.server.mock(|when, then| {
        when.method("GET").path("/tokens/self");
        then.status(200).json_body(json!({"scope": "purge_select purge_all"}));
    });
    let purge = harness.server.mock(|when, then| {
        when.method("POST");
        then.status(200).json_body(json!({"status": "ok"}));
    });

    assert!(!harness.purger.purge_url("not a url").await);
    assert!(!harness.purger.purge_url("ftp://example.com/file").await);
    assert!(!harness.purger.purge_url("").await);
    token.assert_calls(0);
    purge.assert_calls(0);
}

#[tokio::test]
async fn url_purge_targets_host_and_path() {
    let harness = Harness::new(Some(true), 4).await;
    let purge = harness.server.mock(|when, then| {
        when.method("POST")
            .path("/purge/example.com/blog/post")
            .header("Fastly-Key", "token");
        then.status(200).json_body(json!({"status": "ok", "id": "p-1"}));
    });

    assert!(harness.purger.purge_url("https://example.com/blog/post").await);
    purge.assert();
}

#[tokio::test]
async fn extension_tag_purges_the_whole_service() {
    let harness = Harness::new(Some(true), 4).await;
    let all = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge_all");
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let keys = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge");
        then.status(200).json_body(key_receipt("node"));
    });

    let invalidated = harness
        .invalidator()
        .invalidate_tags(&tags(&["node:1", EXTENSION_CHANGED_TAG, "node:2"]))
        .await;
    assert!(invalidated);
    all.assert_calls(1);
    keys.assert_calls(0);
}

#[tokio::test]
async fn own_configuration_tag_is_never_purged() {
    let harness = Harness::new(Some(true), 4).await;
    let any = harness.server.mock(|when, then| {
        when.method("POST");
        then.status(200).json_body(json!({"status": "ok"}));
    });

    assert!(
        harness
            .invalidator()
            .invalidate_tags(&tags(&[OWN_CONFIG_TAG]))
            .await
    );
    any.assert_calls(0);
}

#[tokio::test]
async fn own_configuration_tag_is_dropped_from_mixed_sets() {
    let harness = Harness::new(Some(true), 4).await;
    let expected = harness.purger.mapper().tag_key("node:1");
    let purge = harness.server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/purge")
            .header("Surrogate-Key", expected.as_str());
        then.status(200).json_body(key_receipt(expected.as_str()));
    });

    assert!(
        harness
            .invalidator()
            .invalidate_tags(&tags(&[OWN_CONFIG_TAG, "node:1"]))
            .await
    );
    purge.assert();
}

#[tokio::test]
async fn batch_merges_tags_and_purges_urls_separately() {
    let harness = Harness::new(Some(true), 4).await;
    let mapper = harness.purger.mapper();
    let header = header_value(&mapper.hash_tags(["node:1", "node:2", "node:3"]));
    let keys = harness.server.mock(|when, then| {
        when.method("POST")
            .path("/service/svc/purge")
            .header("Surrogate-Key", header.as_str());
        then.status(200).json_body(key_receipt(&header));
    });
    let url = harness.server.mock(|when, then| {
        when.method("POST").path("/purge/example.com/a");
        then.status(200).json_body(json!({"status": "ok"}));
    });

    let states = harness
        .invalidator()
        .invalidate_batch(&[
            Invalidation::Tags(tags(&["node:1", "node:2"])),
            Invalidation::Url("https://example.com/a".into()),
            Invalidation::Tags(tags(&["node:3", OWN_CONFIG_TAG])),
            Invalidation::Tags(tags(&["  "])),
        ])
        .await;

    assert_eq!(
        states,
        [
            InvalidationState::Succeeded,
            InvalidationState::Succeeded,
            InvalidationState::Succeeded,
            InvalidationState::Failed,
        ]
    );
    keys.assert_calls(1);
    url.assert_calls(1);
}

#[tokio::test]
async fn batch_with_everything_sends_one_purge_all() {
    let harness = Harness::new(Some(true), 4).await;
    let all = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge_all");
        then.status(200).json_body(json!({"status": "ok"}));
    });
    let keys = harness.server.mock(|when, then| {
        when.method("POST").path("/service/svc/purge");
        then.status(200).json_body(key_receipt("node"));
    });
    let url = harness.server.mock(|when, then| {
        when.method("POST").path("/purge/example.com/a");
        then.status(200).json_body(json!({"status": "ok"}));
    });

    let states = harness
        .invalidator()
        .invalidate_batch(&[
            Invalidation::Tags(tags(&["node:1"])),
            Invalidation::Everything,
            Invalidation::Url("https://example.com/a".into()),
        ])
        .await;

    assert!(states.iter().all(|s| *s == InvalidationState::Succeeded));
    all.assert_calls(1);
    keys.assert_calls(0);
    url.assert_calls(0);
}
