//! Schema-driven automatic wiring.
//!
//! When a component registers while auto-apply is active, every
//! publish→subscribe channel pair between it and the already-registered
//! components whose payload schemas are structurally compatible becomes
//! an enabled connection, unless a live one already exists. A registering
//! C2 observer whose subscribe schema matches the payload already flowing
//! on an existing connection is attached to that connection as a
//! notification instead of becoming a primary target. Unregistration
//! removes every connection and notification that references the
//! component.
//!
//! Auto-wiring is best-effort: a failure on one candidate pair is logged
//! and the remaining pairs still proceed.

use crate::{
    connection::{Notification, TopologyAction},
    engine::TopologyEngine,
    query::FieldPattern,
    store::ConnectionFilter,
};
use mov_core::{Component, ComponentId, ComponentKind, Error, Node, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Automatic wiring over a topology engine.
#[derive(Debug)]
pub struct AutoWirer {
    engine: Arc<TopologyEngine>,
}

impl AutoWirer {
    /// Create a wirer over the given engine.
    #[must_use]
    pub fn new(engine: Arc<TopologyEngine>) -> Self {
        Self { engine }
    }

    /// Wire a freshly registered component against every other registered
    /// component, in both directions. Returns the number of connections
    /// and notifications created.
    ///
    /// # Errors
    /// Returns a validation error if the component is not registered; per
    /// pair failures are logged and skipped.
    pub async fn component_registered(&self, id: ComponentId) -> Result<usize> {
        let registry = self.engine.registry();
        let component = registry.find(id).await.ok_or_else(|| {
            Error::validation(format!("component {id} is not registered"))
        })?;

        let mut wired = 0;
        for (other_id, other) in registry.list().await {
            if other_id == id {
                continue;
            }
            wired += self.wire_pairs(id, &component, other_id, &other).await;
            wired += self.wire_pairs(other_id, &other, id, &component).await;
        }
        info!(component_id = %id, wired, "component auto-wired");
        Ok(wired)
    }

    /// Remove every connection and notification referencing the
    /// component: owned connections are soft-deleted, notification
    /// entries on other connections are stripped. Returns the number of
    /// records touched.
    ///
    /// # Errors
    /// Returns a store error if the referencing connections cannot be
    /// listed; per record failures are logged and skipped.
    pub async fn component_unregistered(&self, id: ComponentId) -> Result<usize> {
        let records = self.engine.store().list_referencing(id).await?;
        let mut touched = 0;
        for record in records {
            if record.owned_by_component(id) {
                match self.engine.apply(record.id, TopologyAction::Remove).await {
                    Ok(_) => touched += 1,
                    Err(err) => {
                        warn!(connection_id = %record.id, error = %err, "cannot remove connection");
                    },
                }
                continue;
            }
            for notification in
                record.notifications.iter().filter(|n| n.node.component_id == id)
            {
                match self
                    .engine
                    .change_notification(record.id, &notification.node, TopologyAction::Remove)
                    .await
                {
                    Ok(_) => touched += 1,
                    Err(err) => {
                        warn!(
                            connection_id = %record.id,
                            target = %notification.node,
                            error = %err,
                            "cannot strip notification"
                        );
                    },
                }
            }
        }
        info!(component_id = %id, touched, "component unwired");
        Ok(touched)
    }

    /// Wire every compatible publish→subscribe channel pair from
    /// `publisher` to `subscriber`.
    async fn wire_pairs(
        &self,
        publisher_id: ComponentId,
        publisher: &Component,
        subscriber_id: ComponentId,
        subscriber: &Component,
    ) -> usize {
        let mut wired = 0;
        for source_channel in &publisher.channels {
            let Some(publish) = &source_channel.publish else {
                continue;
            };
            for target_channel in &subscriber.channels {
                let Some(subscribe) = &target_channel.subscribe else {
                    continue;
                };
                if !publish.matches(subscribe) {
                    continue;
                }

                let source = Node::new(publisher_id, source_channel.id.clone());
                let target = Node::new(subscriber_id, target_channel.id.clone());
                if self.wire_pair(source, target, subscriber.kind).await {
                    wired += 1;
                }
            }
        }
        wired
    }

    /// Wire one compatible pair. C2 subscribers join an existing
    /// connection on the same source as a notification when one exists.
    async fn wire_pair(&self, source: Node, target: Node, kind: ComponentKind) -> bool {
        if kind == ComponentKind::C2 {
            match self.live_connections_from(&source).await {
                Ok(existing) if !existing.is_empty() => {
                    let mut attached = false;
                    for id in existing {
                        let notification = Notification::new(target.clone(), true);
                        match self.engine.upsert_notification(id, notification).await {
                            Ok(_) => attached = true,
                            Err(err) => {
                                warn!(connection_id = %id, target = %target, error = %err,
                                    "cannot attach observer");
                            },
                        }
                    }
                    return attached;
                },
                Ok(_) => {},
                Err(err) => {
                    warn!(%source, error = %err, "cannot look up connections for observer");
                    return false;
                },
            }
        }

        match self.engine.store().find_live_pair(&source, &target).await {
            Ok(Some(_)) => false,
            Ok(None) => match self.engine.create_connection(source, target, true).await {
                Ok(_) => true,
                Err(err) => {
                    warn!(error = %err, "cannot auto-create connection");
                    false
                },
            },
            Err(err) => {
                warn!(error = %err, "cannot check for an existing connection");
                false
            },
        }
    }

    /// Ids of the live connections whose source is exactly `source`.
    async fn live_connections_from(&self, source: &Node) -> Result<Vec<mov_core::ConnectionId>> {
        let filter = ConnectionFilter {
            source_component_id: Some(FieldPattern::Exact(source.component_id.to_string())),
            source_channel_name: Some(FieldPattern::Exact(
                source.channel_name.as_str().to_string(),
            )),
            ..ConnectionFilter::default()
        };
        let page = self.engine.store().query(&filter, &[], 0, usize::MAX).await?;
        Ok(page.connections.into_iter().map(|record| record.id).collect())
    }
}
