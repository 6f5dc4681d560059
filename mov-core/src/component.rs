//! Components, channels and the component registry port.
//!
//! Components are owned by an external registry; MOV holds only weak
//! references (`ComponentId`) and resolves them at validation time. The
//! registry itself is a port so deployments can back it with any document
//! store; an in-memory implementation is provided for tests and embedded
//! use.

use crate::{
    error::{Error, Result},
    message::ChannelName,
    schema::PayloadSchema,
    types::{ComponentId, ComponentKind},
};
use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Pattern every component name must follow.
const NAME_PATTERN: &str = r"^c[012]_\w+$";

fn name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(NAME_PATTERN).expect("valid component name pattern"))
}

/// A named, typed publish and/or subscribe endpoint on a component.
///
/// At least one direction must be populated; a channel with neither is
/// meaningless and rejected at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// The channel name, doubling as the broker routing key.
    pub id: ChannelName,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// Schema of payloads the component receives on this channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<PayloadSchema>,

    /// Schema of payloads the component emits on this channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<PayloadSchema>,
}

impl Channel {
    /// Create a new channel.
    ///
    /// # Errors
    /// Returns a validation error if both directions are absent.
    pub fn new(
        id: ChannelName,
        description: impl Into<String>,
        subscribe: Option<PayloadSchema>,
        publish: Option<PayloadSchema>,
    ) -> Result<Self> {
        if subscribe.is_none() && publish.is_none() {
            return Err(Error::validation(format!(
                "channel '{id}' declares neither subscribe nor publish"
            )));
        }
        Ok(Self { id, description: description.into(), subscribe, publish })
    }
}

/// A registered VALAWAI component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component name, matching `c[0|1|2]_\w+`.
    pub name: String,

    /// Component version.
    pub version: Version,

    /// The component kind (C0, C1 or C2).
    #[serde(rename = "type")]
    pub kind: ComponentKind,

    /// The channels the component exposes.
    pub channels: Vec<Channel>,
}

impl Component {
    /// Create a new component.
    ///
    /// # Errors
    /// Returns a validation error if the name does not follow the
    /// `c[0|1|2]_\w+` pattern, the name prefix disagrees with the kind,
    /// or the version is not valid semver.
    pub fn new(
        name: impl Into<String>,
        version: &str,
        kind: ComponentKind,
        channels: Vec<Channel>,
    ) -> Result<Self> {
        let name = name.into();
        if !name_regex().is_match(&name) {
            return Err(Error::validation(format!(
                "component name '{name}' does not match pattern {NAME_PATTERN}"
            )));
        }
        if !name.starts_with(kind.name_prefix()) {
            return Err(Error::validation(format!(
                "component name '{name}' does not start with '{}' required for {kind}",
                kind.name_prefix()
            )));
        }
        let version = Version::parse(version).map_err(|err| {
            Error::validation(format!("component version '{version}' is not semver: {err}"))
        })?;
        Ok(Self { name, version, kind, channels })
    }

    /// Look up a channel by name.
    #[must_use]
    pub fn channel(&self, name: &ChannelName) -> Option<&Channel> {
        self.channels.iter().find(|channel| &channel.id == name)
    }
}

/// Weak reference to one channel of one component.
///
/// Resolved against the component registry at validation time; not
/// re-validated continuously afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// The referenced component.
    pub component_id: ComponentId,

    /// The referenced channel on that component.
    pub channel_name: ChannelName,
}

impl Node {
    /// Create a new node reference.
    #[must_use]
    pub const fn new(component_id: ComponentId, channel_name: ChannelName) -> Self {
        Self { component_id, channel_name }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.component_id, self.channel_name)
    }
}

/// Port onto the external component registry.
#[async_trait]
pub trait ComponentRegistry: Send + Sync {
    /// Resolve a component by id. `None` if unknown or unregistered.
    async fn find(&self, id: ComponentId) -> Option<Component>;

    /// Register a component, returning its new id.
    ///
    /// # Errors
    /// Returns an error if the registry rejects the component.
    async fn register(&self, component: Component) -> Result<ComponentId>;

    /// Unregister a component.
    ///
    /// # Errors
    /// Returns a validation error if the component is unknown.
    async fn unregister(&self, id: ComponentId) -> Result<Component>;

    /// List all currently-registered components.
    async fn list(&self) -> Vec<(ComponentId, Component)>;
}

/// In-memory component registry for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryComponentRegistry {
    components: DashMap<ComponentId, Component>,
}

impl MemoryComponentRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ComponentRegistry for MemoryComponentRegistry {
    async fn find(&self, id: ComponentId) -> Option<Component> {
        self.components.get(&id).map(|entry| entry.clone())
    }

    async fn register(&self, component: Component) -> Result<ComponentId> {
        let id = ComponentId::new();
        self.components.insert(id, component);
        Ok(id)
    }

    async fn unregister(&self, id: ComponentId) -> Result<Component> {
        self.components
            .remove(&id)
            .map(|(_, component)| component)
            .ok_or_else(|| Error::validation(format!("component {id} is not registered")))
    }

    async fn list(&self) -> Vec<(ComponentId, Component)> {
        self.components
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}
