//! Error types shared across the MOV crates.
//!
//! The taxonomy follows the operational split used by the event dispatcher:
//! deterministic validation failures are acknowledged (never retried),
//! transient store/broker failures are nacked so the broker redelivers.

use thiserror::Error;

/// Main error type for MOV operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed payload, unresolved component or channel reference,
    /// duplicate connection, or an action invalid for the current state.
    /// Deterministic — never retried.
    #[error("validation error: {message}")]
    Validation {
        /// What was rejected and why.
        message: String,
    },

    /// Connection store unavailable or an update failed for operational
    /// reasons. Transient — the triggering event is redelivered.
    #[error("store error: {message}")]
    Store {
        /// Underlying store failure.
        message: String,
    },

    /// Broker publish or subscribe failure. Transient.
    #[error("broker error: {message}")]
    Broker {
        /// Underlying broker failure.
        message: String,
    },

    /// A notification converter script failed. Scoped to a single
    /// notification delivery; never fails the enclosing forward.
    #[error("conversion error: {message}")]
    Conversion {
        /// What the converter reported.
        message: String,
    },

    /// A component registration carried an AsyncAPI document that could
    /// not be imported. The component is not created.
    #[error("import error: {message}")]
    Import {
        /// Why the document was rejected.
        message: String,
    },

    /// Channel router bookkeeping errors, reported to the caller.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Invalid configuration value.
    #[error("configuration error: {message}")]
    Configuration {
        /// Offending parameter and reason.
        message: String,
    },

    /// Internal invariant violation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the broken invariant.
        message: String,
    },
}

/// Errors raised by the channel router's open/close bookkeeping.
///
/// These are caller-visible conditions, never a process crash: a duplicate
/// `open` or a `close` of an unopened channel means the caller's view of
/// the routing table is stale.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A subscription for the channel already exists.
    #[error("channel {channel} is already open")]
    AlreadyOpen {
        /// The channel that was opened twice.
        channel: String,
    },

    /// No subscription exists for the channel.
    #[error("channel {channel} is not open")]
    NotOpen {
        /// The channel that was not open.
        channel: String,
    },
}

impl Error {
    /// Build a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Build a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store { message: message.into() }
    }

    /// Build a broker error.
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker { message: message.into() }
    }

    /// Build a conversion error.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion { message: message.into() }
    }

    /// Build an import error.
    pub fn import(message: impl Into<String>) -> Self {
        Self::Import { message: message.into() }
    }

    /// Build a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether the failure may succeed on redelivery.
    ///
    /// Only store and broker failures are transient; everything else is
    /// deterministic and acknowledging the triggering event is correct.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store { .. } | Self::Broker { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation { message: format!("malformed JSON payload: {err}") }
    }
}

/// Result type alias for MOV operations.
pub type Result<T> = std::result::Result<T, Error>;
