//! Cache tag to surrogate key mapping.

use std::collections::HashSet;

use crate::domain::types::{HashLength, PurgeKey, SiteId};

use super::hash::hash_input;
use super::site::namespaced;

/// Maps cache tags of one site to surrogate keys.
///
/// Keys are a pure function of `(site, tag, length)`, so the response header
/// path and the invalidation path agree without sharing any state.
#[derive(Debug, Clone)]
pub struct KeyMapper {
    site: SiteId,
    length: HashLength,
}

impl KeyMapper {
    pub fn new(site: SiteId, length: HashLength) -> Self {
        Self { site, length }
    }

    pub fn site(&self) -> &SiteId {
        &self.site
    }

    pub fn length(&self) -> HashLength {
        self.length
    }

    pub fn tag_key(&self, tag: &str) -> PurgeKey {
        PurgeKey::from_hash(hash_input(&namespaced(&self.site, tag), self.length))
    }

    /// Key shared by every response of this site.
    pub fn site_key(&self) -> PurgeKey {
        PurgeKey::from_hash(hash_input(self.site.as_str(), self.length))
    }

    /// One key per distinct tag, in first-seen order. Used for invalidation,
    /// where adding the site key would widen every purge to the whole site.
    pub fn hash_tags<I, S>(&self, tags: I) -> Vec<PurgeKey>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        tags.into_iter()
            .map(|tag| self.tag_key(tag.as_ref()))
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    /// Keys for a response: per-tag keys followed by the site key. The site
    /// key is always last and always present, even without tags.
    pub fn tags_to_keys<I, S>(&self, tags: I) -> Vec<PurgeKey>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let site_key = self.site_key();
        let mut keys: Vec<PurgeKey> = self
            .hash_tags(tags)
            .into_iter()
            .filter(|key| *key != site_key)
            .collect();
        keys.push(site_key);
        keys
    }
}

/// Space separated header value for `Surrogate-Key`.
pub fn header_value(keys: &[PurgeKey]) -> String {
    keys.iter()
        .map(PurgeKey::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
