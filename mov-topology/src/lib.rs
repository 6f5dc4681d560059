//! # MOV Topology
//!
//! The topology connection engine of the MOV coordinator.
//!
//! MOV does not process domain messages itself: it owns the logical
//! wiring between channels, realises that wiring as live broker
//! subscriptions, fans forwarded messages out to observers, and can infer
//! new wiring from the structural compatibility of declared payload
//! schemas. This crate implements that engine on top of the vocabulary
//! defined in `mov-core`:
//!
//! - [`broker`]: the message broker port and an in-memory implementation
//! - [`router`]: at most one live subscription per channel, plus raw publish
//! - [`connection`]: the persisted connection document and its lifecycle
//! - [`store`]: the connection store port and an in-memory backend
//! - [`convert`]: the script-based message converter port
//! - [`fanout`]: per-message delivery to enabled observer notifications
//! - [`engine`]: the lifecycle orchestrator tying store and router together
//! - [`autowire`]: schema-driven automatic wiring on registration
//! - [`events`]: inbound broker event payloads and the dispatcher
//! - [`query`]: exact-or-regex field patterns, ordering and paging

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod autowire;
pub mod broker;
pub mod connection;
pub mod convert;
pub mod engine;
pub mod events;
pub mod fanout;
pub mod query;
pub mod router;
pub mod store;

pub use crate::{
    autowire::AutoWirer,
    broker::{InMemoryBroker, MessageBroker, Subscription},
    connection::{ConnectionRecord, Notification, TopologyAction},
    convert::{FnConverter, MessageConverter, UnsupportedConverter},
    engine::TopologyEngine,
    events::{
        AsyncApiImporter, ChangeNotificationPayload, ChangeTopologyPayload,
        ConnectionsPagePayload, CreateConnectionPayload, CreateNotificationPayload, Disposition,
        EventDispatcher, InboundEvent, QueryConnectionsPayload, RegisterComponentPayload,
        UnregisterComponentPayload,
    },
    fanout::NotificationFanout,
    query::{parse_order, FieldPattern, OrderField, OrderKey},
    router::{ChannelRouter, RouteStream, RouterStats},
    store::{ConnectionFilter, ConnectionPage, ConnectionStore, MemoryConnectionStore},
};
