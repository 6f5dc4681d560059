//! The topology engine.
//!
//! Orchestrates the connection lifecycle over the store, the router and
//! the fan-out. The store is the source of truth: every lifecycle action
//! transitions the persisted record first, and only then does the router
//! catch up, so a failed broker operation can never leave the persisted
//! state claiming something the broker disagrees with for long. Enabled
//! connections are realised as one forward loop per routed source
//! channel: the loop re-publishes every message unchanged to the target
//! of each enabled connection on that channel, then fans out to the
//! observers. The route stays open as long as any enabled connection
//! still uses the channel.

use crate::{
    connection::{ConnectionRecord, Notification, TopologyAction},
    fanout::NotificationFanout,
    query::OrderKey,
    router::{ChannelRouter, RouteStream},
    store::{ConnectionFilter, ConnectionPage, ConnectionStore},
};
use mov_core::{
    ChannelName, ComponentRegistry, ConnectionId, Error, Node, PayloadSchema, Result, RouterError,
    TopologyConfig,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle orchestrator for topology connections.
pub struct TopologyEngine {
    registry: Arc<dyn ComponentRegistry>,
    store: Arc<dyn ConnectionStore>,
    router: Arc<ChannelRouter>,
    fanout: Arc<NotificationFanout>,
    config: TopologyConfig,
}

impl TopologyEngine {
    /// Create an engine over the given ports.
    #[must_use]
    pub fn new(
        registry: Arc<dyn ComponentRegistry>,
        store: Arc<dyn ConnectionStore>,
        router: Arc<ChannelRouter>,
        fanout: Arc<NotificationFanout>,
        config: TopologyConfig,
    ) -> Self {
        Self { registry, store, router, fanout, config }
    }

    /// The component registry this engine validates against.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn ComponentRegistry> {
        &self.registry
    }

    /// The connection store backing this engine.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    /// The channel router realising the live wiring.
    #[must_use]
    pub fn router(&self) -> &Arc<ChannelRouter> {
        &self.router
    }

    /// The topology settings in force.
    #[must_use]
    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Create a connection between a publish channel and a subscribe
    /// channel, optionally enabling it immediately.
    ///
    /// Both endpoints must resolve against the registry, the source
    /// channel must publish, the target channel must subscribe, and the
    /// two payload schemas must be structurally compatible.
    ///
    /// # Errors
    /// Returns a validation error when an endpoint does not resolve, the
    /// schemas are incompatible, or a live connection with the same pair
    /// already exists; a broker error when the route cannot be opened.
    pub async fn create_connection(
        &self,
        source: Node,
        target: Node,
        enabled: bool,
    ) -> Result<ConnectionRecord> {
        let publish = self.resolve_publish(&source).await?;
        let subscribe = self.resolve_subscribe(&target).await?;
        if !publish.matches(&subscribe) {
            return Err(Error::validation(format!(
                "publish schema of {source} is not compatible with subscribe schema of {target}"
            )));
        }

        let record = self.store.create(source, target, enabled).await?;
        if record.enabled {
            self.activate(&record).await?;
        }
        info!(connection_id = %record.id, enabled = record.enabled, "connection created");
        Ok(record)
    }

    /// Fetch a connection by id, deleted or not.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    pub async fn connection(&self, id: ConnectionId) -> Result<Option<ConnectionRecord>> {
        self.store.get(id).await
    }

    /// Apply a lifecycle action: transition the persisted record, then
    /// bring the router in line.
    ///
    /// `ENABLE` opens the route and starts the forward loop. `DISABLE`
    /// closes the route, keeping state and notifications. `REMOVE` closes
    /// the route if open and soft-deletes the record.
    ///
    /// # Errors
    /// Returns a validation error if the persisted state does not admit
    /// the action; a broker error if enabling cannot open the route.
    pub async fn apply(
        &self,
        id: ConnectionId,
        action: TopologyAction,
    ) -> Result<ConnectionRecord> {
        let record = self.store.transition(id, action).await?;
        match action {
            TopologyAction::Enable => self.activate(&record).await?,
            TopologyAction::Disable | TopologyAction::Remove => self.deactivate(&record).await,
        }
        info!(connection_id = %record.id, %action, "topology action applied");
        Ok(record)
    }

    /// Attach or replace a notification on a connection.
    ///
    /// The observer node must resolve to a subscribing channel. When the
    /// notification carries no converter the observer's subscribe schema
    /// must also be compatible with the source's publish schema; a
    /// converter takes responsibility for the shape of what it emits.
    ///
    /// # Errors
    /// Returns a validation error when the connection is missing or
    /// deleted, the observer does not resolve, or the schemas are
    /// incompatible.
    pub async fn upsert_notification(
        &self,
        id: ConnectionId,
        notification: Notification,
    ) -> Result<ConnectionRecord> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| Error::validation(format!("connection {id} does not exist")))?;
        if record.is_deleted() {
            return Err(Error::validation(format!("connection {id} is deleted")));
        }

        let subscribe = self.resolve_subscribe(&notification.node).await?;
        if notification.converter_code.is_none() {
            let publish = self.resolve_publish(&record.source).await?;
            if !publish.matches(&subscribe) {
                return Err(Error::validation(format!(
                    "subscribe schema of {} is not compatible with the source of {id}",
                    notification.node
                )));
            }
        }

        let updated = self.store.upsert_notification(id, notification).await?;
        info!(connection_id = %id, "notification attached");
        Ok(updated)
    }

    /// Enable, disable or remove an existing notification.
    ///
    /// # Errors
    /// Returns a validation error when the connection is missing or
    /// deleted, or no notification carries the given node key.
    pub async fn change_notification(
        &self,
        id: ConnectionId,
        node: &Node,
        action: TopologyAction,
    ) -> Result<ConnectionRecord> {
        let updated = self.store.change_notification(id, node, action).await?;
        info!(connection_id = %id, target = %node, %action, "notification changed");
        Ok(updated)
    }

    /// Query live connections with filtering, ordering and paging. The
    /// requested limit is clamped to the configured maximum page size.
    ///
    /// # Errors
    /// Returns a store error on persistence failure.
    pub async fn query_connections(
        &self,
        filter: &ConnectionFilter,
        order: &[OrderKey],
        offset: usize,
        limit: usize,
    ) -> Result<ConnectionPage> {
        let limit = limit.min(self.config.max_page_limit);
        self.store.query(filter, order, offset, limit).await
    }

    /// Reopen the routes of every enabled connection, typically after a
    /// restart. Failures are logged per connection; the rest proceed.
    ///
    /// # Errors
    /// Returns a store error if the enabled connections cannot be listed.
    pub async fn resume(&self) -> Result<usize> {
        let enabled = self.store.list_enabled().await?;
        let mut reopened = 0;
        for record in enabled {
            match self.activate(&record).await {
                Ok(()) => reopened += 1,
                Err(err) => {
                    error!(connection_id = %record.id, error = %err, "cannot reopen connection");
                },
            }
        }
        info!(reopened, "topology resumed");
        Ok(reopened)
    }

    async fn resolve_publish(&self, node: &Node) -> Result<PayloadSchema> {
        let component = self.registry.find(node.component_id).await.ok_or_else(|| {
            Error::validation(format!("component {} is not registered", node.component_id))
        })?;
        let channel = component.channel(&node.channel_name).ok_or_else(|| {
            Error::validation(format!(
                "component '{}' has no channel '{}'",
                component.name, node.channel_name
            ))
        })?;
        channel.publish.clone().ok_or_else(|| {
            Error::validation(format!(
                "channel '{}' of '{}' does not publish",
                node.channel_name, component.name
            ))
        })
    }

    async fn resolve_subscribe(&self, node: &Node) -> Result<PayloadSchema> {
        let component = self.registry.find(node.component_id).await.ok_or_else(|| {
            Error::validation(format!("component {} is not registered", node.component_id))
        })?;
        let channel = component.channel(&node.channel_name).ok_or_else(|| {
            Error::validation(format!(
                "component '{}' has no channel '{}'",
                component.name, node.channel_name
            ))
        })?;
        channel.subscribe.clone().ok_or_else(|| {
            Error::validation(format!(
                "channel '{}' of '{}' does not subscribe",
                node.channel_name, component.name
            ))
        })
    }

    /// Open the source route of an enabled record and start the forward
    /// loop for its channel. A route already open means the existing
    /// loop serves this connection too.
    async fn activate(&self, record: &ConnectionRecord) -> Result<()> {
        let channel = &record.source.channel_name;
        match self.router.open(channel).await {
            Ok(stream) => {
                self.spawn_forward_loop(channel.clone(), stream);
                Ok(())
            },
            Err(Error::Router(RouterError::AlreadyOpen { .. })) => {
                debug!(
                    connection_id = %record.id,
                    %channel,
                    "source channel already routed, served by the existing loop"
                );
                Ok(())
            },
            Err(err) => Err(err),
        }
    }

    /// Close the source route unless another enabled connection still
    /// uses the channel. A missing route is fine, the connection may
    /// never have been enabled.
    async fn deactivate(&self, record: &ConnectionRecord) {
        let channel = &record.source.channel_name;
        match self.store.list_enabled_by_source(channel).await {
            Ok(remaining) if !remaining.is_empty() => {
                debug!(
                    connection_id = %record.id,
                    %channel,
                    remaining = remaining.len(),
                    "route kept open for other enabled connections"
                );
                return;
            },
            Ok(_) => {},
            Err(err) => {
                // Leave the route open: the loop forwards only to
                // enabled records, so an idle route is harmless.
                warn!(connection_id = %record.id, error = %err, "cannot count channel users");
                return;
            },
        }
        match self.router.close(channel) {
            Ok(()) => {},
            Err(Error::Router(RouterError::NotOpen { .. })) => {
                debug!(connection_id = %record.id, %channel, "source channel was not routed");
            },
            Err(err) => {
                warn!(connection_id = %record.id, error = %err, "cannot close source channel");
            },
        }
    }

    fn spawn_forward_loop(&self, channel: ChannelName, mut stream: RouteStream) {
        let router = Arc::clone(&self.router);
        let store = Arc::clone(&self.store);
        let fanout = Arc::clone(&self.fanout);

        tokio::spawn(async move {
            debug!(%channel, "forward loop started");
            while let Some(message) = stream.recv().await {
                // The enabled connections are re-read per message, so
                // lifecycle and notification changes take effect without
                // reopening the route, and every connection sharing the
                // source gets its delivery.
                let records = match store.list_enabled_by_source(&channel).await {
                    Ok(records) => records,
                    Err(err) => {
                        warn!(%channel, error = %err, "cannot load connections for forwarding");
                        continue;
                    },
                };
                for record in records {
                    // The primary delivery is always the unchanged
                    // payload; converters only ever apply to
                    // notifications.
                    if let Err(err) =
                        router.publish(&record.target.channel_name, message.payload.clone()).await
                    {
                        warn!(connection_id = %record.id, error = %err, "primary forward failed");
                    }
                    fanout.deliver(&record, &message).await;
                }
            }
            debug!(%channel, "forward loop ended");
        });
    }
}

impl std::fmt::Debug for TopologyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyEngine").field("config", &self.config).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::{InMemoryBroker, MessageBroker},
        convert::UnsupportedConverter,
        store::MemoryConnectionStore,
    };
    use bytes::Bytes;
    use mov_core::{
        BasicFormat, Channel, ChannelName, Component, ComponentId, ComponentKind, Message,
        MemoryComponentRegistry,
    };
    use std::time::Duration;
    use tokio::time::timeout;

    struct Fixture {
        broker: Arc<InMemoryBroker>,
        registry: Arc<MemoryComponentRegistry>,
        engine: TopologyEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let broker = Arc::new(InMemoryBroker::default());
            let registry = Arc::new(MemoryComponentRegistry::new());
            let store = Arc::new(MemoryConnectionStore::new());
            let router = Arc::new(ChannelRouter::new(broker.clone()));
            let fanout =
                Arc::new(NotificationFanout::new(router.clone(), Arc::new(UnsupportedConverter)));
            let engine = TopologyEngine::new(
                registry.clone(),
                store,
                router,
                fanout,
                TopologyConfig::default(),
            );
            Self { broker, registry, engine }
        }

        async fn register_publisher(&self, name: &str, channel: &str) -> Node {
            let schema = PayloadSchema::basic(BasicFormat::String);
            let channel_name = ChannelName::new(channel).unwrap();
            let component = Component::new(
                name,
                "1.0.0",
                ComponentKind::C0,
                vec![Channel::new(channel_name.clone(), "", None, Some(schema)).unwrap()],
            )
            .unwrap();
            let id = self.registry.register(component).await.unwrap();
            Node::new(id, channel_name)
        }

        async fn register_subscriber(&self, name: &str, channel: &str) -> Node {
            let schema = PayloadSchema::basic(BasicFormat::String);
            let channel_name = ChannelName::new(channel).unwrap();
            let component = Component::new(
                name,
                "1.0.0",
                ComponentKind::C1,
                vec![Channel::new(channel_name.clone(), "", Some(schema), None).unwrap()],
            )
            .unwrap();
            let id = self.registry.register(component).await.unwrap();
            Node::new(id, channel_name)
        }

        async fn send(&self, channel: &str, payload: &str) {
            let message = Message::new(
                ChannelName::new(channel).unwrap(),
                Bytes::from(payload.to_string()),
            );
            self.broker.publish(message).await.unwrap();
        }
    }

    #[tokio::test]
    async fn enabled_connection_forwards_messages_unchanged() {
        let fixture = Fixture::new();
        let source =
            fixture.register_publisher("c0_camera", "valawai/c0/camera/data/frame").await;
        let target =
            fixture.register_subscriber("c1_planner", "valawai/c1/planner/data/frame").await;

        let mut sink = fixture
            .broker
            .subscribe(&ChannelName::new("valawai/c1/planner/data/frame").unwrap())
            .await
            .unwrap();

        fixture.engine.create_connection(source, target, true).await.unwrap();
        fixture.send("valawai/c0/camera/data/frame", r#"{"pattern":"p1"}"#).await;

        let forwarded = timeout(Duration::from_secs(1), sink.recv()).await.unwrap().unwrap();
        assert_eq!(forwarded.payload, Bytes::from(r#"{"pattern":"p1"}"#));
    }

    #[tokio::test]
    async fn disabled_connection_opens_no_route() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;

        fixture.engine.create_connection(source.clone(), target, false).await.unwrap();
        assert!(!fixture.engine.router().is_open(&source.channel_name));
    }

    #[tokio::test]
    async fn unknown_source_component_is_rejected() {
        let fixture = Fixture::new();
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;
        let ghost = Node::new(ComponentId::new(), ChannelName::new("ghost/out").unwrap());

        assert!(fixture.engine.create_connection(ghost, target, false).await.is_err());
    }

    #[tokio::test]
    async fn incompatible_schemas_are_rejected() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;

        let channel_name = ChannelName::new("planner/in").unwrap();
        let component = Component::new(
            "c1_planner",
            "1.0.0",
            ComponentKind::C1,
            vec![Channel::new(
                channel_name.clone(),
                "",
                Some(PayloadSchema::basic(BasicFormat::Integer)),
                None,
            )
            .unwrap()],
        )
        .unwrap();
        let id = fixture.registry.register(component).await.unwrap();
        let target = Node::new(id, channel_name);

        assert!(fixture.engine.create_connection(source, target, false).await.is_err());
    }

    #[tokio::test]
    async fn source_channel_must_publish() {
        let fixture = Fixture::new();
        // Subscribe-only channel used as a source.
        let source = fixture.register_subscriber("c1_planner", "planner/in").await;
        let target = fixture.register_subscriber("c1_executor", "executor/in").await;

        assert!(fixture.engine.create_connection(source, target, false).await.is_err());
    }

    #[tokio::test]
    async fn lifecycle_walk_keeps_router_in_line() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;
        let channel = source.channel_name.clone();

        let record =
            fixture.engine.create_connection(source, target, false).await.unwrap();
        assert!(!fixture.engine.router().is_open(&channel));

        fixture.engine.apply(record.id, TopologyAction::Enable).await.unwrap();
        assert!(fixture.engine.router().is_open(&channel));

        // A second enable fails on the persisted state and leaves the
        // route open.
        assert!(fixture.engine.apply(record.id, TopologyAction::Enable).await.is_err());
        assert!(fixture.engine.router().is_open(&channel));

        fixture.engine.apply(record.id, TopologyAction::Disable).await.unwrap();
        assert!(!fixture.engine.router().is_open(&channel));

        let removed = fixture.engine.apply(record.id, TopologyAction::Remove).await.unwrap();
        assert!(removed.is_deleted());
        assert!(fixture.engine.apply(record.id, TopologyAction::Enable).await.is_err());
    }

    #[tokio::test]
    async fn disable_stops_forwarding() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;

        let mut sink = fixture
            .broker
            .subscribe(&ChannelName::new("planner/in").unwrap())
            .await
            .unwrap();

        let record = fixture.engine.create_connection(source, target, true).await.unwrap();
        fixture.send("cam/out", "first").await;
        let first = timeout(Duration::from_secs(1), sink.recv()).await.unwrap().unwrap();
        assert_eq!(first.payload, Bytes::from("first"));

        fixture.engine.apply(record.id, TopologyAction::Disable).await.unwrap();
        fixture.send("cam/out", "second").await;
        assert!(timeout(Duration::from_millis(100), sink.recv()).await.is_err());
    }

    #[tokio::test]
    async fn connections_sharing_a_source_channel_all_forward() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let first_target = fixture.register_subscriber("c1_planner", "planner/in").await;
        let second_target = fixture.register_subscriber("c1_recorder", "recorder/in").await;

        let mut planner = fixture
            .broker
            .subscribe(&ChannelName::new("planner/in").unwrap())
            .await
            .unwrap();
        let mut recorder = fixture
            .broker
            .subscribe(&ChannelName::new("recorder/in").unwrap())
            .await
            .unwrap();

        let first = fixture
            .engine
            .create_connection(source.clone(), first_target, true)
            .await
            .unwrap();
        let second = fixture
            .engine
            .create_connection(source.clone(), second_target, true)
            .await
            .unwrap();

        fixture.send("cam/out", "to-both").await;
        let got = timeout(Duration::from_secs(1), planner.recv()).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from("to-both"));
        let got = timeout(Duration::from_secs(1), recorder.recv()).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from("to-both"));

        // Disabling one connection keeps the shared route serving the
        // other.
        fixture.engine.apply(first.id, TopologyAction::Disable).await.unwrap();
        assert!(fixture.engine.router().is_open(&source.channel_name));

        fixture.send("cam/out", "to-recorder").await;
        let got = timeout(Duration::from_secs(1), recorder.recv()).await.unwrap().unwrap();
        assert_eq!(got.payload, Bytes::from("to-recorder"));
        assert!(timeout(Duration::from_millis(100), planner.recv()).await.is_err());

        // Disabling the last user closes the route.
        fixture.engine.apply(second.id, TopologyAction::Disable).await.unwrap();
        assert!(!fixture.engine.router().is_open(&source.channel_name));
    }

    #[tokio::test]
    async fn notification_requires_resolvable_observer() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;
        let record =
            fixture.engine.create_connection(source, target, false).await.unwrap();

        let ghost = Node::new(ComponentId::new(), ChannelName::new("ghost/in").unwrap());
        let result =
            fixture.engine.upsert_notification(record.id, Notification::new(ghost, true)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn converter_bypasses_notification_schema_gate() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;
        let record =
            fixture.engine.create_connection(source, target, false).await.unwrap();

        // Integer subscriber, string publisher: only valid with a converter.
        let channel_name = ChannelName::new("observer/in").unwrap();
        let component = Component::new(
            "c2_observer",
            "1.0.0",
            ComponentKind::C2,
            vec![Channel::new(
                channel_name.clone(),
                "",
                Some(PayloadSchema::basic(BasicFormat::Integer)),
                None,
            )
            .unwrap()],
        )
        .unwrap();
        let id = fixture.registry.register(component).await.unwrap();
        let observer = Node::new(id, channel_name);

        let without = fixture
            .engine
            .upsert_notification(record.id, Notification::new(observer.clone(), true))
            .await;
        assert!(without.is_err());

        let with = fixture
            .engine
            .upsert_notification(
                record.id,
                Notification::with_converter(observer, true, "return msg.length;"),
            )
            .await;
        assert!(with.is_ok());
    }

    #[tokio::test]
    async fn resume_reopens_enabled_connections() {
        let fixture = Fixture::new();
        let source = fixture.register_publisher("c0_camera", "cam/out").await;
        let target = fixture.register_subscriber("c1_planner", "planner/in").await;
        let channel = source.channel_name.clone();

        let record = fixture.engine.create_connection(source, target, true).await.unwrap();
        // Simulate a restart: the route is gone but the record says enabled.
        fixture.engine.router().close(&channel).unwrap();
        assert!(!fixture.engine.router().is_open(&channel));

        let reopened = fixture.engine.resume().await.unwrap();
        assert_eq!(reopened, 1);
        assert!(fixture.engine.router().is_open(&channel));
        assert!(fixture.engine.connection(record.id).await.unwrap().unwrap().enabled);
    }

    #[tokio::test]
    async fn query_clamps_limit_to_configured_maximum() {
        let fixture = Fixture::new();
        let config = TopologyConfig { max_page_limit: 2, ..TopologyConfig::default() };
        let engine = TopologyEngine::new(
            fixture.engine.registry().clone(),
            fixture.engine.store().clone(),
            fixture.engine.router().clone(),
            Arc::new(NotificationFanout::new(
                fixture.engine.router().clone(),
                Arc::new(UnsupportedConverter),
            )),
            config,
        );

        for i in 0..4 {
            let source = fixture
                .register_publisher(&format!("c0_camera{i}"), &format!("cam{i}/out"))
                .await;
            let target = fixture
                .register_subscriber(&format!("c1_planner{i}"), &format!("planner{i}/in"))
                .await;
            engine.create_connection(source, target, false).await.unwrap();
        }

        let page = engine
            .query_connections(&ConnectionFilter::default(), &[], 0, 100)
            .await
            .unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.connections.len(), 2);
    }
}
