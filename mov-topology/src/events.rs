//! Inbound broker events and the dispatcher.
//!
//! Components talk to MOV by publishing JSON payloads on well-known
//! channels. The dispatcher decodes one payload at a time, invokes the
//! engine and maps the outcome to a broker disposition: success and
//! deterministic validation failures acknowledge the message, transient
//! store or broker failures nack it so the broker redelivers. Every
//! rejected event produces exactly one structured log entry carrying the
//! offending payload.

use crate::{
    autowire::AutoWirer,
    connection::{ConnectionRecord, Notification, TopologyAction},
    engine::TopologyEngine,
    query::{parse_order, FieldPattern},
    store::ConnectionFilter,
};
use async_trait::async_trait;
use bytes::Bytes;
use mov_core::{
    Channel, ChannelName, Component, ComponentId, ComponentKind, ConnectionId, Node, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// The well-known channels MOV listens on.
pub mod channels {
    /// Component registration requests.
    pub const REGISTER_COMPONENT: &str = "valawai/component/register";
    /// Component unregistration requests.
    pub const UNREGISTER_COMPONENT: &str = "valawai/component/unregister";
    /// Explicit connection creation.
    pub const CREATE_CONNECTION: &str = "valawai/topology/create";
    /// Connection lifecycle actions.
    pub const CHANGE_TOPOLOGY: &str = "valawai/topology/change";
    /// Notification creation on an existing connection.
    pub const CREATE_NOTIFICATION: &str = "valawai/topology/notification/create";
    /// Notification lifecycle actions.
    pub const CHANGE_NOTIFICATION: &str = "valawai/topology/notification/change";
    /// Connection queries; pages are published on the configured reply
    /// channel.
    pub const QUERY_CONNECTIONS: &str = "valawai/topology/connections/query";
}

/// Request to register a component from its AsyncAPI document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterComponentPayload {
    /// The component kind.
    #[serde(rename = "type")]
    pub kind: ComponentKind,
    /// The component name, `c[0|1|2]_\w+`.
    pub name: String,
    /// The component version, semver.
    pub version: String,
    /// The AsyncAPI document declaring the component's channels.
    pub asyncapi_yaml: String,
}

/// Request to unregister a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnregisterComponentPayload {
    /// The component to unregister.
    pub component_id: ComponentId,
}

/// Request to create a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectionPayload {
    /// The publishing end.
    pub source: Node,
    /// The subscribing end.
    pub target: Node,
    /// Whether to enable the connection immediately.
    #[serde(default)]
    pub enabled: bool,
}

/// Request to apply a lifecycle action to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeTopologyPayload {
    /// The action to apply.
    pub action: TopologyAction,
    /// The connection to act on.
    pub connection_id: ConnectionId,
}

/// Request to attach or replace a notification on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationPayload {
    /// The connection to attach to.
    pub connection_id: ConnectionId,
    /// The observer's subscribe channel.
    pub target: Node,
    /// Whether deliveries start immediately.
    #[serde(default)]
    pub enabled: bool,
    /// Optional conversion script.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter_code: Option<String>,
}

/// Request to enable, disable or remove an existing notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotificationPayload {
    /// The connection holding the notification.
    pub connection_id: ConnectionId,
    /// The observer node identifying the notification.
    pub target: Node,
    /// The action to apply.
    pub action: TopologyAction,
}

fn default_limit() -> usize {
    10
}

/// Request to query the live connections. Each filter field accepts an
/// exact value or a `/regex/[flags]` pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConnectionsPayload {
    /// Caller-chosen correlation id, echoed in the page.
    pub id: String,
    /// Filter on the source component id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_component_id: Option<String>,
    /// Filter on the source channel name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_channel_name: Option<String>,
    /// Filter on the target component id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_component_id: Option<String>,
    /// Filter on the target channel name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_channel_name: Option<String>,
    /// Comma-separated order expression, `+`/`-` prefixed field names.
    #[serde(default)]
    pub order: String,
    /// Records to skip.
    #[serde(default)]
    pub offset: usize,
    /// Page size, clamped to the configured maximum.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// One page of query results, published on the reply channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionsPagePayload {
    /// The correlation id of the triggering query.
    pub query_id: String,
    /// Total records matching the filter, before paging.
    pub total: u64,
    /// The records of this page.
    pub connections: Vec<ConnectionRecord>,
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A component registration request.
    RegisterComponent(RegisterComponentPayload),
    /// A component unregistration request.
    UnregisterComponent(UnregisterComponentPayload),
    /// A connection creation request.
    CreateConnection(CreateConnectionPayload),
    /// A connection lifecycle action.
    ChangeTopology(ChangeTopologyPayload),
    /// A notification creation request.
    CreateNotification(CreateNotificationPayload),
    /// A notification lifecycle action.
    ChangeNotification(ChangeNotificationPayload),
    /// A connection query.
    QueryConnections(QueryConnectionsPayload),
}

impl InboundEvent {
    /// Decode a payload received on one of the well-known channels.
    ///
    /// # Errors
    /// Returns a validation error for an unknown channel or a malformed
    /// payload.
    pub fn decode(channel: &ChannelName, payload: &[u8]) -> Result<Self> {
        match channel.as_str() {
            channels::REGISTER_COMPONENT => {
                Ok(Self::RegisterComponent(serde_json::from_slice(payload)?))
            },
            channels::UNREGISTER_COMPONENT => {
                Ok(Self::UnregisterComponent(serde_json::from_slice(payload)?))
            },
            channels::CREATE_CONNECTION => {
                Ok(Self::CreateConnection(serde_json::from_slice(payload)?))
            },
            channels::CHANGE_TOPOLOGY => {
                Ok(Self::ChangeTopology(serde_json::from_slice(payload)?))
            },
            channels::CREATE_NOTIFICATION => {
                Ok(Self::CreateNotification(serde_json::from_slice(payload)?))
            },
            channels::CHANGE_NOTIFICATION => {
                Ok(Self::ChangeNotification(serde_json::from_slice(payload)?))
            },
            channels::QUERY_CONNECTIONS => {
                Ok(Self::QueryConnections(serde_json::from_slice(payload)?))
            },
            other => Err(mov_core::Error::validation(format!(
                "no event is expected on channel '{other}'"
            ))),
        }
    }
}

/// Port onto the AsyncAPI document importer.
///
/// The importer is external; this port yields the normalized channel list
/// with schemas already resolved to concrete nodes.
#[async_trait]
pub trait AsyncApiImporter: Send + Sync {
    /// Extract the channel declarations from an AsyncAPI document.
    ///
    /// # Errors
    /// Returns an import error for a malformed document; the registration
    /// is rejected and no component is created.
    async fn import(&self, yaml: &str) -> Result<Vec<Channel>>;
}

/// Broker disposition of a processed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed, or rejected deterministically. Not redelivered.
    Ack,
    /// Transient failure. The broker redelivers the event.
    Nack,
}

/// Decodes inbound events and drives the engine.
pub struct EventDispatcher {
    engine: Arc<TopologyEngine>,
    wirer: AutoWirer,
    importer: Arc<dyn AsyncApiImporter>,
}

impl EventDispatcher {
    /// Create a dispatcher over the given engine and importer.
    #[must_use]
    pub fn new(engine: Arc<TopologyEngine>, importer: Arc<dyn AsyncApiImporter>) -> Self {
        let wirer = AutoWirer::new(engine.clone());
        Self { engine, wirer, importer }
    }

    /// Process one inbound payload to completion and report how the
    /// broker message should be settled.
    pub async fn dispatch(&self, channel: &ChannelName, payload: &[u8]) -> Disposition {
        match self.handle(channel, payload).await {
            Ok(()) => Disposition::Ack,
            Err(err) if err.is_transient() => {
                error!(
                    %channel,
                    payload = %String::from_utf8_lossy(payload),
                    error = %err,
                    "event failed, requesting redelivery"
                );
                Disposition::Nack
            },
            Err(err) => {
                error!(
                    %channel,
                    payload = %String::from_utf8_lossy(payload),
                    error = %err,
                    "event rejected"
                );
                Disposition::Ack
            },
        }
    }

    async fn handle(&self, channel: &ChannelName, payload: &[u8]) -> Result<()> {
        match InboundEvent::decode(channel, payload)? {
            InboundEvent::RegisterComponent(request) => self.register_component(request).await,
            InboundEvent::UnregisterComponent(request) => {
                self.engine.registry().unregister(request.component_id).await?;
                self.wirer.component_unregistered(request.component_id).await?;
                Ok(())
            },
            InboundEvent::CreateConnection(request) => {
                self.engine
                    .create_connection(request.source, request.target, request.enabled)
                    .await?;
                Ok(())
            },
            InboundEvent::ChangeTopology(request) => {
                self.engine.apply(request.connection_id, request.action).await?;
                Ok(())
            },
            InboundEvent::CreateNotification(request) => {
                let notification = Notification {
                    node: request.target,
                    enabled: request.enabled,
                    converter_code: request.converter_code,
                };
                self.engine.upsert_notification(request.connection_id, notification).await?;
                Ok(())
            },
            InboundEvent::ChangeNotification(request) => {
                self.engine
                    .change_notification(request.connection_id, &request.target, request.action)
                    .await?;
                Ok(())
            },
            InboundEvent::QueryConnections(request) => self.query_connections(request).await,
        }
    }

    /// Import the AsyncAPI document, register the component and, when
    /// auto-apply is active, wire it against the rest of the fleet. An
    /// import or validation failure rejects the registration without
    /// touching the registry.
    async fn register_component(&self, request: RegisterComponentPayload) -> Result<()> {
        let declared = self.importer.import(&request.asyncapi_yaml).await?;
        let component = Component::new(request.name, &request.version, request.kind, declared)?;
        let name = component.name.clone();
        let id = self.engine.registry().register(component).await?;
        info!(component_id = %id, name, "component registered");

        if self.engine.config().auto_apply {
            self.wirer.component_registered(id).await?;
        }
        Ok(())
    }

    /// Run the query and publish the page on the configured reply channel.
    async fn query_connections(&self, request: QueryConnectionsPayload) -> Result<()> {
        let filter = ConnectionFilter {
            source_component_id: parse_optional(request.source_component_id.as_deref())?,
            source_channel_name: parse_optional(request.source_channel_name.as_deref())?,
            target_component_id: parse_optional(request.target_component_id.as_deref())?,
            target_channel_name: parse_optional(request.target_channel_name.as_deref())?,
        };
        let order = parse_order(&request.order)?;
        let page = self
            .engine
            .query_connections(&filter, &order, request.offset, request.limit)
            .await?;

        let reply = ConnectionsPagePayload {
            query_id: request.id,
            total: page.total,
            connections: page.connections,
        };
        let reply_channel = ChannelName::new(self.engine.config().page_channel.clone())?;
        let body = serde_json::to_vec(&reply)?;
        self.engine.router().publish(&reply_channel, Bytes::from(body)).await
    }
}

fn parse_optional(raw: Option<&str>) -> Result<Option<FieldPattern>> {
    raw.map(FieldPattern::parse).transpose()
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher").finish_non_exhaustive()
    }
}
