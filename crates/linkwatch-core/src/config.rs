//! Configuration types for the stability supervisor
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};

/// Main supervisor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkwatchConfig {
    /// Stability engine settings
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Watchdog pinger settings
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Link record store backend
    #[serde(default)]
    pub store: LinkStoreConfig,
}

impl LinkwatchConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.stability.validate()?;
        self.watchdog.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

/// Stability engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    /// Period of the stability timer (in seconds)
    #[serde(default = "default_stability_interval_secs")]
    pub interval_secs: u64,

    /// Router failures tolerated before managers are restarted
    ///
    /// The restart fires once `stored_router_counter + 1` exceeds this value.
    #[serde(default = "default_router_threshold")]
    pub router_threshold: u32,

    /// Every time the Internet counter reaches a multiple of this value
    /// the WAN DHCP lease is refreshed
    #[serde(default = "default_internet_threshold")]
    pub internet_threshold: u32,

    /// Port whose presence marks an Ethernet uplink as bridged
    #[serde(default = "default_bridge_port_name")]
    pub bridge_port_name: String,

    /// Interface whose DHCP lease is refreshed on Internet loss
    #[serde(default = "default_wan_bridge")]
    pub wan_bridge: String,

    /// Capacity of the stability event channel
    ///
    /// When full, new events are dropped (with a warning log) rather than
    /// blocking a tick.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl StabilityConfig {
    /// Validate the stability configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Stability interval must be > 0"));
        }
        if self.internet_threshold == 0 {
            return Err(crate::Error::config("Internet threshold must be > 0"));
        }
        if self.bridge_port_name.is_empty() {
            return Err(crate::Error::config("Bridge port name cannot be empty"));
        }
        if self.wan_bridge.is_empty() {
            return Err(crate::Error::config("WAN bridge name cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stability_interval_secs(),
            router_threshold: default_router_threshold(),
            internet_threshold: default_internet_threshold(),
            bridge_port_name: default_bridge_port_name(),
            wan_bridge: default_wan_bridge(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Watchdog pinger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    /// Period of the watchdog timer (in seconds)
    #[serde(default = "default_watchdog_interval_secs")]
    pub interval_secs: u64,
}

impl WatchdogConfig {
    /// Validate the watchdog configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.interval_secs == 0 {
            return Err(crate::Error::config("Watchdog interval must be > 0"));
        }
        Ok(())
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watchdog_interval_secs(),
        }
    }
}

/// Link record store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LinkStoreConfig {
    /// JSON file backed store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl LinkStoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            LinkStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Link store file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            LinkStoreConfig::File { .. } => "file",
            LinkStoreConfig::Memory => "memory",
        }
    }
}

/// Device operating role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Uplink stability monitoring is active
    #[default]
    Extender,
    /// The device is the gateway itself; nothing to monitor
    Gateway,
}

impl DeviceRole {
    pub fn is_extender(&self) -> bool {
        matches!(self, DeviceRole::Extender)
    }
}

impl std::str::FromStr for DeviceRole {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "extender" => Ok(DeviceRole::Extender),
            "gateway" => Ok(DeviceRole::Gateway),
            other => Err(crate::Error::config(format!(
                "Unknown device role '{}'. Valid roles: extender, gateway",
                other
            ))),
        }
    }
}

fn default_stability_interval_secs() -> u64 {
    10
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

fn default_router_threshold() -> u32 {
    5
}

fn default_internet_threshold() -> u32 {
    6
}

fn default_bridge_port_name() -> String {
    "patch-w2h".to_string()
}

fn default_wan_bridge() -> String {
    "br-wan".to_string()
}

fn default_event_channel_capacity() -> usize {
    100
}
