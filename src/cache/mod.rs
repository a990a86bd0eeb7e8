//! Surrogate-key engine.
//!
//! - [`hash`]: truncated digests of namespaced cache tags
//! - [`site`]: lazily resolved, persisted site identity
//! - [`keys`]: tag to key mapping shared by invalidation and response headers
//! - [`collector`] and [`middleware`]: per-request tag collection and the
//!   `Surrogate-Key` / `Surrogate-Control` response headers

pub mod collector;
pub mod hash;
mod keys;
mod middleware;
mod site;

pub use hash::hash_input;
pub use keys::{KeyMapper, header_value};
pub use middleware::{
    CacheTags, SURROGATE_CONTROL, SURROGATE_KEY, StaleDirectives, SurrogateState,
    surrogate_key_layer,
};
pub use site::{SiteNamespace, namespaced};
