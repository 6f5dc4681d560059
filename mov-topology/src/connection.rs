//! The persisted connection document and its lifecycle vocabulary.
//!
//! A connection is a directed wiring between one component's publish
//! channel and another component's subscribe channel. It is soft-deleted:
//! `deletedTimestamp` is terminal and excludes the record from every
//! active query and from live routing.

use chrono::Utc;
use mov_core::{ComponentId, ConnectionId, Node, Timestamp};
use serde::{Deserialize, Serialize};

/// Explicit lifecycle action on a connection or a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TopologyAction {
    /// Start routing messages.
    Enable,
    /// Stop routing messages, keeping state and notifications.
    Disable,
    /// Soft-delete; terminal.
    Remove,
}

impl std::fmt::Display for TopologyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enable => write!(f, "ENABLE"),
            Self::Disable => write!(f, "DISABLE"),
            Self::Remove => write!(f, "REMOVE"),
        }
    }
}

/// A secondary observer attached to a connection.
///
/// Identified inside its connection by the `(componentId, channelName)`
/// pair of its node; notifications have no top-level identity of their
/// own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// The observer's subscribe channel.
    pub node: Node,

    /// Whether deliveries to this observer are active.
    pub enabled: bool,

    /// Optional conversion script applied before delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter_code: Option<String>,
}

impl Notification {
    /// Create a notification without a converter.
    #[must_use]
    pub const fn new(node: Node, enabled: bool) -> Self {
        Self { node, enabled, converter_code: None }
    }

    /// Create a notification with a converter script.
    #[must_use]
    pub fn with_converter(node: Node, enabled: bool, code: impl Into<String>) -> Self {
        Self { node, enabled, converter_code: Some(code.into()) }
    }
}

/// The persisted connection document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Unique identifier.
    pub id: ConnectionId,

    /// When the connection was created.
    pub create_timestamp: Timestamp,

    /// Updated on every lifecycle transition and notification change.
    pub update_timestamp: Timestamp,

    /// Set by `REMOVE`; terminal, never un-deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_timestamp: Option<Timestamp>,

    /// The publishing end.
    pub source: Node,

    /// The subscribing end.
    pub target: Node,

    /// Whether the route is live.
    pub enabled: bool,

    /// Attached observers; no duplicate `(componentId, channelName)` keys.
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl ConnectionRecord {
    /// Create a fresh record.
    #[must_use]
    pub fn new(source: Node, target: Node, enabled: bool) -> Self {
        let now = Utc::now();
        Self {
            id: ConnectionId::new(),
            create_timestamp: now,
            update_timestamp: now,
            deleted_timestamp: None,
            source,
            target,
            enabled,
            notifications: Vec::new(),
        }
    }

    /// Whether the record has been soft-deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_timestamp.is_some()
    }

    /// Look up a notification by its node key.
    #[must_use]
    pub fn notification(&self, node: &Node) -> Option<&Notification> {
        self.notifications.iter().find(|notification| &notification.node == node)
    }

    /// Whether this record references the given component, either as a
    /// primary endpoint or through a notification.
    #[must_use]
    pub fn references_component(&self, component_id: ComponentId) -> bool {
        self.source.component_id == component_id
            || self.target.component_id == component_id
            || self
                .notifications
                .iter()
                .any(|notification| notification.node.component_id == component_id)
    }

    /// Whether the primary endpoints reference the given component.
    #[must_use]
    pub fn owned_by_component(&self, component_id: ComponentId) -> bool {
        self.source.component_id == component_id || self.target.component_id == component_id
    }
}
