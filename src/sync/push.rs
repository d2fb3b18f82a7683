//! Structured push ingestion, deletes and label refresh

use serde_json::Value;

use super::{PushOutcome, SyncOrchestrator};
use crate::error::{Error, Result, ValidationError};
use crate::models::{content_hash, Actor, ContentItem, SourceType, SyncAction, EXCERPT_WORDS};
use crate::parser::payload::sanitize_fields;
use crate::parser::sanitize::html_to_excerpt;
use crate::parser::SanitizedPayload;
use crate::storage::WriteContext;

impl SyncOrchestrator {
    /// Create or update one item from a connector push
    ///
    /// The request's `status` field is rewritten by policy before anything
    /// else looks at it. An identical title and body is a no-op: the
    /// stored item is returned with [`SyncAction::Unchanged`].
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a malformed payload, [`Error::IdentityConflict`]
    /// when dedup is ambiguous, and store errors from the write itself.
    pub async fn push_item(&self, actor: &Actor, payload: Value) -> Result<PushOutcome> {
        let Value::Object(mut body) = payload else {
            return Err(ValidationError::NotAnObject.into());
        };

        let status_requested = body.contains_key("status");
        let status = self.policy.intercept_request(actor, &mut body);
        let data = sanitize_fields(&body, chrono::Utc::now())?;

        self.register_node(actor, &data.node_id);

        let existing = self.dedup.find(
            &data.source_url,
            &data.node_id,
            &data.original_item_id,
            None,
        )?;

        let image_url = data.featured_image_url.clone();
        let (item, action) = match existing {
            Some(current) if current.content_hash == content_hash(&data.title, &data.content) => {
                tracing::debug!(
                    node_id = %data.node_id,
                    item_id = %current.id,
                    "Push unchanged, skipping write"
                );
                (current, SyncAction::Unchanged)
            }
            Some(mut current) => {
                let keep_status = !actor.is_automated() && !status_requested;
                if !keep_status {
                    current.status = status;
                }
                apply_payload(&mut current, data);
                let updated = self.store.update(current, &WriteContext::update(actor))?;
                (updated, SyncAction::Updated)
            }
            None => {
                let mut item = ContentItem::new(
                    SourceType::Push,
                    &data.source_url,
                    &data.node_id,
                    &data.original_item_id,
                );
                item.author_id = actor.id.clone();
                item.status = status;
                apply_payload(&mut item, data);
                let created = self.store.insert(item, &WriteContext::create(actor))?;
                (created, SyncAction::Created)
            }
        };

        let item = if action == SyncAction::Unchanged {
            item
        } else {
            self.attach_image(item, image_url.as_deref()).await
        };

        tracing::info!(
            actor_id = %actor.id,
            node_id = %item.node_id,
            item_id = %item.id,
            action = ?action,
            status = %item.status,
            "Push processed"
        );

        Ok(PushOutcome { item, action })
    }

    /// Connector handshake: bind the actor to the node it pushes for
    fn register_node(&self, actor: &Actor, node_id: &str) {
        if !actor.is_automated() || actor.node_id.as_deref() == Some(node_id) {
            return;
        }

        match self.directory.bind_node(&actor.id, node_id) {
            Ok(()) => tracing::info!(
                actor_id = %actor.id,
                previous = ?actor.node_id,
                node_id = %node_id,
                "Node registered for actor"
            ),
            Err(e) => tracing::warn!(
                actor_id = %actor.id,
                node_id = %node_id,
                error = %e,
                "Failed to register node for actor"
            ),
        }
    }

    /// Permanently delete an item
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown id, [`Error::PermissionDenied`]
    /// when the actor may not touch the item.
    pub fn delete_item(&self, actor: &Actor, item_id: &str) -> Result<()> {
        let item = self
            .store
            .get(item_id)?
            .ok_or_else(|| Error::not_found("item", item_id))?;

        if let Err(e) = self.policy.authorize_delete(actor, &item) {
            tracing::warn!(actor_id = %actor.id, item_id = %item_id, error = %e, "Delete refused");
            return Err(e);
        }

        self.store.delete(item_id)?;
        tracing::info!(actor_id = %actor.id, item_id = %item_id, node_id = %item.node_id, "Item deleted");
        Ok(())
    }

    /// Restamp every stored item with the current network label
    pub fn refresh_network_label(&self) -> Result<usize> {
        let label = self.settings.network_label();
        let count = self.store.set_network_label_all(&label)?;
        tracing::info!(label = %label, count, "Network label refreshed");
        Ok(count)
    }
}

fn apply_payload(item: &mut ContentItem, data: SanitizedPayload) {
    item.excerpt = if data.excerpt.is_empty() {
        html_to_excerpt(&data.content, EXCERPT_WORDS)
    } else {
        html_to_excerpt(&data.excerpt, EXCERPT_WORDS)
    };
    item.title = data.title;
    item.body = data.content;
    item.publish_date = data.publish_date;
    item.modified_date = data.modified_date;
    item.metadata.original_title = data.original_title;
    item.metadata.categories = data.categories;
    item.metadata.tags = data.tags;
    item.metadata.original_featured_image_url = data.featured_image_url;
    item.compute_hash();
}
