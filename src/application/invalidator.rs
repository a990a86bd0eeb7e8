//! Cache tag invalidation with the two special tag literals.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::purger::Purger;
use crate::domain::types::{
    EXTENSION_CHANGED_TAG, Invalidation, InvalidationState, OWN_CONFIG_TAG,
};

/// Turns invalidated cache tags into purges.
///
/// [`EXTENSION_CHANGED_TAG`] anywhere in a batch replaces the whole batch by a
/// single purge of the service. [`OWN_CONFIG_TAG`] is dropped before hashing.
pub struct TagInvalidator {
    purger: Arc<Purger>,
}

/// Tags of one request with blanks removed, or `None` when nothing is left.
fn clean_tags(tags: &[String]) -> Option<Vec<&str>> {
    let cleaned: Vec<&str> = tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

impl TagInvalidator {
    pub fn new(purger: Arc<Purger>) -> Self {
        Self { purger }
    }

    #[instrument(skip_all, fields(tags = tags.len()))]
    pub async fn invalidate_tags(&self, tags: &[String]) -> bool {
        let Some(tags) = clean_tags(tags) else {
            warn!("invalidation requested without tags");
            return false;
        };

        if tags.contains(&EXTENSION_CHANGED_TAG) {
            info!("extension change invalidates the whole service");
            return self.purger.purge_all().await;
        }

        let purgeable: Vec<&str> = tags
            .into_iter()
            .filter(|tag| *tag != OWN_CONFIG_TAG)
            .collect();
        if purgeable.is_empty() {
            debug!("only own configuration tag invalidated, nothing to purge");
            return true;
        }
        self.purger.purge_tags(purgeable).await
    }

    /// Process a queue of invalidations and report a state per item, in input
    /// order. Tags are merged into one key purge, URLs are purged one request
    /// each, and a purge of everything subsumes both.
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn invalidate_batch(&self, items: &[Invalidation]) -> Vec<InvalidationState> {
        let mut states = vec![InvalidationState::Failed; items.len()];

        // `None` marks items rejected before any I/O.
        let cleaned: Vec<Option<Vec<&str>>> = items
            .iter()
            .map(|item| match item {
                Invalidation::Tags(tags) => clean_tags(tags),
                Invalidation::Url(url) => {
                    let url = url.trim();
                    (!url.is_empty()).then(|| vec![url])
                }
                Invalidation::Everything => Some(Vec::new()),
            })
            .collect();

        let purge_everything = items.iter().zip(&cleaned).any(|(item, clean)| {
            match (item, clean) {
                (Invalidation::Everything, _) => true,
                (Invalidation::Tags(_), Some(tags)) => tags.contains(&EXTENSION_CHANGED_TAG),
                _ => false,
            }
        });

        if purge_everything {
            info!("batch requires purging the whole service");
            let state = InvalidationState::from_outcome(self.purger.purge_all().await);
            for (slot, clean) in states.iter_mut().zip(&cleaned) {
                if clean.is_some() {
                    *slot = state;
                }
            }
            return states;
        }

        let mut merged: Vec<&str> = Vec::new();
        let mut tag_items = Vec::new();
        for (index, (item, clean)) in items.iter().zip(&cleaned).enumerate() {
            if let (Invalidation::Tags(_), Some(tags)) = (item, clean) {
                merged.extend(tags.iter().copied().filter(|tag| *tag != OWN_CONFIG_TAG));
                tag_items.push(index);
            }
        }

        if !tag_items.is_empty() {
            let ok = merged.is_empty() || self.purger.purge_tags(merged).await;
            for index in tag_items {
                states[index] = InvalidationState::from_outcome(ok);
            }
        }

        for (index, (item, clean)) in items.iter().zip(&cleaned).enumerate() {
            if let (Invalidation::Url(_), Some(url)) = (item, clean) {
                let ok = match url.first() {
                    Some(url) => self.purger.purge_url(url).await,
                    None => false,
                };
                states[index] = InvalidationState::from_outcome(ok);
            }
        }

        let failed = states
            .iter()
            .filter(|state| **state == InvalidationState::Failed)
            .count();
        if failed > 0 {
            warn!(failed, "some invalidations failed");
        }
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_tags_drops_blanks() {
        let tags = vec![" node:1 ".to_string(), String::new(), "  ".to_string()];
        assert_eq!(clean_tags(&tags), Some(vec!["node:1"]));
        assert_eq!(clean_tags(&[" ".to_string()]), None);
        assert_eq!(clean_tags(&[]), None);
    }
}
