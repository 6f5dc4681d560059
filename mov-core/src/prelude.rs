//! Convenient re-exports for MOV consumers.

pub use crate::{
    component::{Channel, Component, ComponentRegistry, MemoryComponentRegistry, Node},
    config::{BrokerConfig, MovConfig, TelemetryConfig, TopologyConfig},
    error::{Error, Result, RouterError},
    message::{ChannelName, Message, MessageId},
    schema::{BasicFormat, PayloadSchema},
    types::{ComponentId, ComponentKind, ConnectionId, Timestamp},
};
