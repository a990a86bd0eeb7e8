#![deny(clippy::all, clippy::pedantic)]

use axum::{
    Extension, Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::get,
};
use edgepurge::cache::{
    CacheTags, KeyMapper, SURROGATE_CONTROL, SURROGATE_KEY, StaleDirectives, SurrogateState,
    collector, header_value, surrogate_key_layer,
};
use edgepurge::domain::types::{HashLength, SiteId};
use tower::ServiceExt;

fn mapper() -> KeyMapper {
    KeyMapper::new(SiteId::new("site1").expect("site"), HashLength::DEFAULT)
}

async fn recorded() -> &'static str {
    collector::record("node:1");
    collector::record_all(["node:2", "node:1"]);
    "recorded"
}

async fn declared() -> impl IntoResponse {
    collector::record("node:1");
    (
        [(header::CACHE_CONTROL, "max-age=60")],
        Extension(CacheTags::new(["node:1", "taxonomy:7"])),
        "declared",
    )
}

async fn untagged() -> &'static str {
    "untagged"
}

fn app(stale: StaleDirectives) -> Router {
    let state = SurrogateState::new(mapper(), stale);
    Router::new()
        .route("/recorded", get(recorded))
        .route("/declared", get(declared))
        .route("/untagged", get(untagged))
        .layer(middleware::from_fn_with_state(state, surrogate_key_layer))
}

async fn surrogate_headers(app: Router, path: &str) -> (Option<String>, Option<String>) {
    let response = app
        .oneshot(Request::get(path).body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let value = |name| {
        response
            .headers()
            .get(name)
            .map(|value| value.to_str().expect("ascii header").to_string())
    };
    (value(&SURROGATE_KEY), value(&SURROGATE_CONTROL))
}

#[tokio::test]
async fn recorded_tags_become_surrogate_keys() {
    let (keys, control) = surrogate_headers(app(StaleDirectives::default()), "/recorded").await;

    let expected = header_value(&mapper().tags_to_keys(["node:1", "node:2"]));
    assert_eq!(keys.as_deref(), Some(expected.as_str()));
    assert_eq!(control, None);
}

#[tokio::test]
async fn declared_tags_are_merged_with_recorded_ones() {
    let (keys, _) = surrogate_headers(app(StaleDirectives::default()), "/declared").await;

    let expected = header_value(&mapper().tags_to_keys(["node:1", "taxonomy:7"]));
    assert_eq!(keys.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn untagged_responses_still_carry_the_site_key() {
    let (keys, _) = surrogate_headers(app(StaleDirectives::default()), "/untagged").await;

    assert_eq!(keys, Some(mapper().site_key().to_string()));
}

#[tokio::test]
async fn stale_directives_extend_cache_control() {
    let stale = StaleDirectives {
        while_revalidate: Some(604_800),
        if_error: Some(86_400),
    };
    let (_, control) = surrogate_headers(app(stale), "/declared").await;

    assert_eq!(
        control.as_deref(),
        Some("max-age=60, stale-while-revalidate=604800, stale-if-error=86400")
    );
}

#[tokio::test]
async fn stale_directives_apply_without_cache_control() {
    let stale = StaleDirectives {
        while_revalidate: None,
        if_error: Some(30),
    };
    let (_, control) = surrogate_headers(app(stale), "/untagged").await;

    assert_eq!(control.as_deref(), Some("stale-if-error=30"));
}
