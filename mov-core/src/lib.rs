//! # MOV Core
//!
//! Foundation library for the MOV topology coordinator.
//!
//! MOV coordinates a fleet of registered VALAWAI components — sensors and
//! actuators (C0), decision components (C1) and value-awareness observers
//! (C2) — that exchange JSON messages over named channels on a message
//! broker. This crate provides the shared vocabulary of that system:
//!
//! - [`message`]: validated channel names and the message envelope
//! - [`schema`]: the payload schema model and the structural compatibility
//!   matcher that decides whether a publisher and a subscriber can be wired
//! - [`component`]: components, channels and the component registry port
//! - [`config`]: configuration loading and validation
//! - [`error`]: error taxonomy shared by every MOV crate
//! - [`telemetry`]: structured logging initialization
//!
//! The topology engine itself (connection lifecycle, channel router,
//! notification fan-out, automatic wiring) lives in the `mov-topology`
//! crate and is built entirely on the types defined here.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod component;
pub mod config;
pub mod error;
pub mod message;
pub mod prelude;
pub mod schema;
pub mod telemetry;
pub mod types;

pub use crate::{
    component::{Channel, Component, ComponentRegistry, MemoryComponentRegistry, Node},
    config::{BrokerConfig, MovConfig, TelemetryConfig, TopologyConfig},
    error::{Error, Result, RouterError},
    message::{ChannelName, Message, MessageId},
    schema::{BasicFormat, PayloadSchema},
    types::{ComponentId, ComponentKind, ConnectionId, Timestamp},
};
