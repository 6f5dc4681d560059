//! Channel names and the message envelope.
//!
//! Channel names double as both logical addresses in the topology and
//! routing keys on the broker, so they are validated once at construction
//! and treated as opaque afterwards. Component channels follow the
//! convention `valawai/<cN>/<component>/<control|data>/<action>`.

use crate::types::Timestamp;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a message, used for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new unique message ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Create a new channel name.
    ///
    /// # Errors
    /// Returns an error if the name is empty, longer than 255 characters,
    /// contains characters outside `[A-Za-z0-9/_.-]`, or starts or ends
    /// with a path separator.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::Error::validation("channel name cannot be empty"));
        }
        if name.len() > 255 {
            return Err(crate::Error::validation("channel name cannot exceed 255 characters"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '-' | '.'))
        {
            return Err(crate::Error::validation(format!(
                "channel name '{name}' contains invalid characters"
            )));
        }
        if name.starts_with('/') || name.ends_with('/') {
            return Err(crate::Error::validation(format!(
                "channel name '{name}' cannot start or end with '/'"
            )));
        }
        Ok(Self(name))
    }

    /// Get the channel name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to an owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A message travelling over a channel.
///
/// The payload is an opaque JSON document; MOV never interprets it on the
/// primary forwarding path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,

    /// Channel the message travels on.
    pub channel: ChannelName,

    /// Raw JSON payload (zero-copy).
    pub payload: Bytes,

    /// When the envelope was created.
    pub timestamp: Timestamp,
}

impl Message {
    /// Create a new message on the given channel.
    #[must_use]
    pub fn new(channel: ChannelName, payload: Bytes) -> Self {
        Self { id: MessageId::new(), channel, payload, timestamp: Utc::now() }
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
