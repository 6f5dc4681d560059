//! Configuration management for MOV.
//!
//! Configuration is loaded from a TOML file, then selected values may be
//! overridden from the environment (`MOV_*` variables). Every loaded
//! configuration is validated before use; invalid values produce a
//! descriptive configuration error rather than a late runtime failure.

use crate::{
    error::{Error, Result},
    message::ChannelName,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level MOV configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovConfig {
    /// Broker connectivity settings.
    pub broker: BrokerConfig,

    /// Topology engine settings.
    pub topology: TopologyConfig,

    /// Logging settings.
    pub telemetry: TelemetryConfig,
}

impl Default for MovConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            topology: TopologyConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Broker connectivity settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker connection URL.
    pub url: String,

    /// Per-channel buffer capacity for in-process subscriptions.
    pub channel_capacity: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { url: "amqp://localhost:5672".to_string(), channel_capacity: 1024 }
    }
}

/// Topology engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Automatically wire compatible channels when components register.
    pub auto_apply: bool,

    /// Channel where connection query pages are published.
    pub page_channel: String,

    /// Largest page size a connection query may request.
    pub max_page_limit: usize,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            auto_apply: false,
            page_channel: "valawai/topology/connections/page".to_string(),
            max_page_limit: 1000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log filter directive, e.g. `info` or `mov_topology=debug`.
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string() }
    }
}

impl MovConfig {
    /// Load configuration from a TOML file, apply environment overrides
    /// and validate the result.
    ///
    /// # Errors
    /// Returns a configuration error if the file cannot be read or parsed
    /// or the resulting configuration is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            Error::configuration(format!(
                "cannot read config file {}: {err}",
                path.as_ref().display()
            ))
        })?;
        let mut config: Self = toml::from_str(&raw)
            .map_err(|err| Error::configuration(format!("invalid config file: {err}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build the default configuration with environment overrides applied.
    ///
    /// # Errors
    /// Returns a configuration error if an override makes the
    /// configuration invalid.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("MOV_BROKER_URL") {
            self.broker.url = url;
        }
        if let Ok(auto) = std::env::var("MOV_TOPOLOGY_AUTO_APPLY") {
            self.topology.auto_apply = matches!(auto.as_str(), "1" | "true" | "yes");
        }
        if let Ok(level) = std::env::var("MOV_LOG_LEVEL") {
            self.telemetry.log_level = level;
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns a configuration error naming the offending parameter.
    pub fn validate(&self) -> Result<()> {
        if self.broker.url.is_empty() {
            return Err(Error::configuration("broker.url must not be empty"));
        }
        if self.broker.channel_capacity == 0 {
            return Err(Error::configuration("broker.channel_capacity must be greater than 0"));
        }
        if self.topology.max_page_limit == 0 {
            return Err(Error::configuration("topology.max_page_limit must be greater than 0"));
        }
        ChannelName::new(self.topology.page_channel.clone()).map_err(|err| {
            Error::configuration(format!("topology.page_channel is invalid: {err}"))
        })?;
        if self.telemetry.log_level.is_empty() {
            return Err(Error::configuration("telemetry.log_level must not be empty"));
        }
        Ok(())
    }
}
