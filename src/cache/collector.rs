//! Per-request cache tag collector.
//!
//! Handlers and services call [`record`] while building a response; the
//! surrogate-key middleware scopes a collector around each request and turns
//! whatever was recorded into `Surrogate-Key` values.

use std::cell::RefCell;

tokio::task_local! {
    static TAGS: RefCell<Vec<String>>;
}

/// Record a cache tag for the current request. Ignored outside a collector.
pub fn record(tag: impl Into<String>) {
    let tag = tag.into();
    let _ = TAGS.try_with(|tags| {
        let mut tags = tags.borrow_mut();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    });
}

pub fn record_all<I, S>(tags: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    for tag in tags {
        record(tag);
    }
}

/// Tags recorded so far, in first-seen order. Empty outside a collector.
pub fn collect() -> Vec<String> {
    TAGS.try_with(|tags| tags.borrow().clone())
        .unwrap_or_default()
}

/// Run `f` with a fresh collector and return its output with the tags it
/// recorded.
pub async fn with_collector<F, R>(f: F) -> (R, Vec<String>)
where
    F: std::future::Future<Output = R>,
{
    TAGS.scope(RefCell::new(Vec::new()), async move {
        let result = f.await;
        (result, collect())
    })
    .await
}
