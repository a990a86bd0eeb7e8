//! Surrogate header middleware.
//!
//! Adds `Surrogate-Key` to every response from the tags its handler declared,
//! either through a [`CacheTags`] response extension or via
//! [`collector::record`](super::collector::record). When stale directives are
//! configured it also derives `Surrogate-Control` from `Cache-Control`.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use super::{collector, keys::KeyMapper, keys::header_value};

pub const SURROGATE_KEY: HeaderName = HeaderName::from_static("surrogate-key");
pub const SURROGATE_CONTROL: HeaderName = HeaderName::from_static("surrogate-control");

/// Cache tags attached to a response by its handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheTags(pub Vec<String>);

impl CacheTags {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tags.into_iter().map(Into::into).collect())
    }
}

/// `stale-while-revalidate` / `stale-if-error` seconds, when enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaleDirectives {
    pub while_revalidate: Option<u64>,
    pub if_error: Option<u64>,
}

impl StaleDirectives {
    pub fn is_empty(&self) -> bool {
        self.while_revalidate.is_none() && self.if_error.is_none()
    }

    /// `Cache-Control` value extended with the enabled stale directives.
    pub fn surrogate_control(&self, cache_control: Option<&str>) -> String {
        let mut parts: Vec<String> = cache_control
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .into_iter()
            .collect();
        if let Some(seconds) = self.while_revalidate {
            parts.push(format!("stale-while-revalidate={seconds}"));
        }
        if let Some(seconds) = self.if_error {
            parts.push(format!("stale-if-error={seconds}"));
        }
        parts.join(", ")
    }
}

/// Shared state for [`surrogate_key_layer`].
#[derive(Clone)]
pub struct SurrogateState {
    pub mapper: Arc<KeyMapper>,
    pub stale: StaleDirectives,
}

impl SurrogateState {
    pub fn new(mapper: KeyMapper, stale: StaleDirectives) -> Self {
        Self {
            mapper: Arc::new(mapper),
            stale,
        }
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn surrogate_key_layer(
    State(state): State<SurrogateState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let (mut response, mut tags) = collector::with_collector(next.run(request)).await;

    if let Some(declared) = response.extensions_mut().remove::<CacheTags>() {
        for tag in declared.0 {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    let keys = state.mapper.tags_to_keys(&tags);
    match HeaderValue::from_str(&header_value(&keys)) {
        Ok(value) => {
            debug!(
                tags = tags.len(),
                keys = keys.len(),
                "attaching surrogate keys"
            );
            response.headers_mut().insert(SURROGATE_KEY, value);
        }
        Err(err) => warn!(error = %err, "surrogate key header rejected"),
    }

    if !state.stale.is_empty() {
        let cache_control = response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|value| value.to_str().ok());
        let surrogate_control = state.stale.surrogate_control(cache_control);
        match HeaderValue::from_str(&surrogate_control) {
            Ok(value) => {
                response.headers_mut().insert(SURROGATE_CONTROL, value);
            }
            Err(err) => warn!(error = %err, "surrogate control header rejected"),
        }
    }

    response
}
