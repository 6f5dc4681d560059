#![allow(dead_code)]

use bytes::Bytes;
use mov_core::{
    BasicFormat, Channel, ChannelName, Component, ComponentId, ComponentKind, ComponentRegistry,
    MemoryComponentRegistry, Message, Node, PayloadSchema, TopologyConfig,
};
use mov_topology::{
    AutoWirer, ChannelRouter, EventDispatcher, InMemoryBroker, MemoryConnectionStore,
    MessageBroker, MessageConverter, NotificationFanout, Subscription, TopologyEngine,
    UnsupportedConverter,
};
use std::sync::Arc;

/// A full in-process MOV: in-memory broker, registry and store wired
/// into one engine.
pub struct Harness {
    pub broker: Arc<InMemoryBroker>,
    pub registry: Arc<MemoryComponentRegistry>,
    pub store: Arc<MemoryConnectionStore>,
    pub engine: Arc<TopologyEngine>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_converter(Arc::new(UnsupportedConverter))
    }

    pub fn with_converter(converter: Arc<dyn MessageConverter>) -> Self {
        Self::build(converter, TopologyConfig::default())
    }

    pub fn with_config(config: TopologyConfig) -> Self {
        Self::build(Arc::new(UnsupportedConverter), config)
    }

    fn build(converter: Arc<dyn MessageConverter>, config: TopologyConfig) -> Self {
        let broker = Arc::new(InMemoryBroker::default());
        let registry = Arc::new(MemoryComponentRegistry::new());
        let store = Arc::new(MemoryConnectionStore::new());
        let router = Arc::new(ChannelRouter::new(broker.clone()));
        let fanout = Arc::new(NotificationFanout::new(router.clone(), converter));
        let engine = Arc::new(TopologyEngine::new(
            registry.clone(),
            store.clone(),
            router,
            fanout,
            config,
        ));
        Self { broker, registry, store, engine }
    }

    pub fn wirer(&self) -> AutoWirer {
        AutoWirer::new(self.engine.clone())
    }

    pub fn dispatcher(&self, importer: Arc<dyn mov_topology::AsyncApiImporter>) -> EventDispatcher {
        EventDispatcher::new(self.engine.clone(), importer)
    }

    /// Register a component with a single string-typed publish channel.
    pub async fn register_publisher(&self, name: &str, channel: &str) -> Node {
        let channel_name = ChannelName::new(channel).unwrap();
        let component = Component::new(
            name,
            "1.0.0",
            ComponentKind::C0,
            vec![publish_channel(channel, string_schema())],
        )
        .unwrap();
        let id = self.registry.register(component).await.unwrap();
        Node::new(id, channel_name)
    }

    /// Register a component with a single string-typed subscribe channel.
    pub async fn register_subscriber(&self, name: &str, channel: &str) -> Node {
        let channel_name = ChannelName::new(channel).unwrap();
        let kind = if name.starts_with("c2_") { ComponentKind::C2 } else { ComponentKind::C1 };
        let component = Component::new(
            name,
            "1.0.0",
            kind,
            vec![subscribe_channel(channel, string_schema())],
        )
        .unwrap();
        let id = self.registry.register(component).await.unwrap();
        Node::new(id, channel_name)
    }

    /// Publish a raw payload on a channel, as a component would.
    pub async fn send(&self, channel: &str, payload: &str) {
        let message = Message::new(
            ChannelName::new(channel).unwrap(),
            Bytes::from(payload.to_string()),
        );
        self.broker.publish(message).await.unwrap();
    }

    /// Observe a channel directly at the broker.
    pub async fn tap(&self, channel: &str) -> Subscription {
        self.broker.subscribe(&ChannelName::new(channel).unwrap()).await.unwrap()
    }
}

pub fn string_schema() -> PayloadSchema {
    PayloadSchema::basic(BasicFormat::String)
}

pub fn publish_channel(name: &str, schema: PayloadSchema) -> Channel {
    Channel::new(ChannelName::new(name).unwrap(), "", None, Some(schema)).unwrap()
}

pub fn subscribe_channel(name: &str, schema: PayloadSchema) -> Channel {
    Channel::new(ChannelName::new(name).unwrap(), "", Some(schema), None).unwrap()
}

pub fn component(name: &str, kind: ComponentKind, channels: Vec<Channel>) -> Component {
    Component::new(name, "1.0.0", kind, channels).unwrap()
}

pub fn node(component_id: ComponentId, channel: &str) -> Node {
    Node::new(component_id, ChannelName::new(channel).unwrap())
}
