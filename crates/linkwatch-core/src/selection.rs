//! Active uplink selection
//!
//! [`LinkSelection`] is the context the stability engine evaluates against.
//! It is owned by the [`Supervisor`](crate::Supervisor); the rest of the
//! system changes it only through [`LinkCommand`]s, which the supervisor
//! applies between ticks.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Category of the uplink interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceType {
    /// Wired Ethernet, bridged or routed
    Ethernet,
    /// GRE tunnel (wireless backhaul)
    GreTunnel,
    /// Anything else
    #[default]
    Other,
}

impl InterfaceType {
    /// Parse the short type tag used by the device database ("eth", "gre", ...)
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "eth" => InterfaceType::Ethernet,
            "gre" => InterfaceType::GreTunnel,
            _ => InterfaceType::Other,
        }
    }

    /// Short type tag
    pub fn tag(&self) -> &'static str {
        match self {
            InterfaceType::Ethernet => "eth",
            InterfaceType::GreTunnel => "gre",
            InterfaceType::Other => "other",
        }
    }
}

/// Process-wide state of the uplink being supervised
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSelection {
    /// Name of the selected uplink interface
    pub if_name: Option<String>,
    /// Category of the selected uplink
    pub if_type: InterfaceType,
    /// Whether an active link is currently assigned
    pub is_used: bool,
    /// Set while the device is confirmed to operate as a router
    pub is_limp_state: bool,
    /// Whether Internet reachability has been confirmed
    pub is_connected: bool,
    /// Enable flag for the stability evaluation
    pub run_stability: bool,
}

impl LinkSelection {
    /// A selection with no active link and stability evaluation enabled
    pub fn new() -> Self {
        Self {
            if_name: None,
            if_type: InterfaceType::Other,
            is_used: false,
            is_limp_state: false,
            is_connected: false,
            run_stability: true,
        }
    }

    /// A selection with `if_name` already active
    pub fn with_link(if_name: impl Into<String>, if_type: InterfaceType) -> Self {
        let mut selection = Self::new();
        selection.apply(LinkCommand::Select {
            if_name: if_name.into(),
            if_type,
        });
        selection
    }

    /// Apply an external change to the selection
    pub fn apply(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::Select { if_name, if_type } => {
                info!("Active link selected: {} ({})", if_name, if_type.tag());
                self.if_name = Some(if_name);
                self.if_type = if_type;
                self.is_used = true;
                self.is_limp_state = false;
            }
            LinkCommand::Release => {
                if let Some(if_name) = self.if_name.take() {
                    info!("Active link released: {}", if_name);
                }
                self.if_type = InterfaceType::Other;
                self.is_used = false;
                self.is_limp_state = false;
            }
            LinkCommand::SetConnected(connected) => {
                debug!("Internet connectivity confirmed: {}", connected);
                self.is_connected = connected;
            }
            LinkCommand::SetStabilityEnabled(enabled) => {
                info!(
                    "Stability check {}",
                    if enabled { "enabled" } else { "disabled" }
                );
                self.run_stability = enabled;
            }
        }
    }
}

impl Default for LinkSelection {
    fn default() -> Self {
        Self::new()
    }
}

/// A change to the link selection requested from outside the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    /// Make `if_name` the active uplink
    Select {
        if_name: String,
        if_type: InterfaceType,
    },
    /// Drop the active uplink
    Release,
    /// Record whether Internet reachability has been confirmed
    SetConnected(bool),
    /// Enable or disable stability evaluation
    SetStabilityEnabled(bool),
}
