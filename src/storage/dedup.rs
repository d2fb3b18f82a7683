//! Identity resolution for incoming items
//!
//! Every write of the sync orchestrator looks up its target here first,
//! so this is the one place that decides whether an incoming record is
//! new or an update of a stored item.
//!
//! - Push identity: `(source_url, node_id, original_item_id)`, all keys
//!   must match.
//! - Pull identity: items of the same node whose GUID or source URL
//!   matches. A URL seen under another node is a different item.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::models::ContentItem;
use crate::storage::repository::ContentStore;

/// Looks up the stored item an incoming record refers to
#[derive(Clone)]
pub struct DedupResolver {
    store: Arc<dyn ContentStore>,
}

impl DedupResolver {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Find the stored item for an identity
    ///
    /// With a non-empty `original_item_id` the three-key lookup is used;
    /// otherwise the pull identity (`guid` or `source_url` within the
    /// node).
    ///
    /// # Errors
    ///
    /// [`Error::IdentityConflict`] when a three-key lookup returns more
    /// than one item; store errors are propagated.
    pub fn find(
        &self,
        source_url: &str,
        node_id: &str,
        original_item_id: &str,
        guid: Option<&str>,
    ) -> Result<Option<ContentItem>> {
        if !original_item_id.is_empty() {
            return self.find_pushed(source_url, node_id, original_item_id);
        }
        self.find_pulled(source_url, node_id, guid)
    }

    fn find_pushed(
        &self,
        source_url: &str,
        node_id: &str,
        original_item_id: &str,
    ) -> Result<Option<ContentItem>> {
        let mut matches = self
            .store
            .find_by_identity(source_url, node_id, original_item_id)?;

        if matches.len() > 1 {
            tracing::error!(
                source_url = %source_url,
                node_id = %node_id,
                original_item_id = %original_item_id,
                matches = matches.len(),
                "Identity tuple matches several items"
            );
            return Err(Error::IdentityConflict {
                source_url: source_url.to_string(),
                node_id: node_id.to_string(),
                matches: matches.len(),
            });
        }
        Ok(matches.pop())
    }

    fn find_pulled(
        &self,
        source_url: &str,
        node_id: &str,
        guid: Option<&str>,
    ) -> Result<Option<ContentItem>> {
        let guid = guid.filter(|g| !g.trim().is_empty());
        let matches = self.store.find_pull_item(node_id, guid, source_url)?;

        if matches.len() > 1 {
            tracing::warn!(
                source_url = %source_url,
                node_id = %node_id,
                matches = matches.len(),
                "Several pull items match; using the oldest"
            );
        }

        // A GUID hit is more specific than a URL hit
        let by_guid = guid.and_then(|g| matches.iter().position(|i| i.guid.as_deref() == Some(g)));
        let index = by_guid.unwrap_or(0);
        Ok(matches.into_iter().nth(index))
    }
}
