//! Notification fan-out.
//!
//! For every message forwarded on an enabled connection, each enabled
//! notification receives a copy: converted by the observer's script when
//! one is set, unchanged otherwise. A failed conversion or publish is
//! logged and skips that one delivery; the primary forward and the other
//! notifications are unaffected.

use crate::{connection::ConnectionRecord, convert::MessageConverter, router::ChannelRouter};
use mov_core::Message;
use std::sync::Arc;
use tracing::error;

/// Delivers forwarded messages to a connection's enabled observers.
pub struct NotificationFanout {
    router: Arc<ChannelRouter>,
    converter: Arc<dyn MessageConverter>,
}

impl NotificationFanout {
    /// Create a fan-out over the given router and converter port.
    #[must_use]
    pub fn new(router: Arc<ChannelRouter>, converter: Arc<dyn MessageConverter>) -> Self {
        Self { router, converter }
    }

    /// Deliver one forwarded message to every enabled notification of the
    /// connection. Never fails: each delivery's errors are logged and
    /// isolated to that delivery.
    pub async fn deliver(&self, connection: &ConnectionRecord, message: &Message) {
        for notification in connection.notifications.iter().filter(|n| n.enabled) {
            let payload = match &notification.converter_code {
                Some(code) => match self.converter.convert(&message.payload, code).await {
                    Ok(converted) => converted,
                    Err(err) => {
                        error!(
                            connection_id = %connection.id,
                            target = %notification.node,
                            message_id = %message.id,
                            error = %err,
                            "notification conversion failed, delivery skipped"
                        );
                        continue;
                    },
                },
                None => message.payload.clone(),
            };

            if let Err(err) = self.router.publish(&notification.node.channel_name, payload).await {
                error!(
                    connection_id = %connection.id,
                    target = %notification.node,
                    message_id = %message.id,
                    error = %err,
                    "notification delivery failed"
                );
            }
        }
    }
}
