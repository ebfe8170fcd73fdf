//! Link mode classification
//!
//! Works out how the active uplink is being used right now. The answer is a
//! pure function of the current selection and topology; nothing about
//! previous ticks is taken into account.

use crate::selection::{InterfaceType, LinkSelection};
use crate::traits::Topology;
use tracing::warn;

/// How the device is using its uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkMode {
    /// No active link, unknown interface type, or the topology lookup failed
    Undefined,
    /// Ethernet uplink bridged into the home network
    EthernetBridge,
    /// Ethernet uplink with the device routing (limp state)
    EthernetRouter,
    /// GRE tunnel backhaul
    Tunnel,
}

impl LinkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkMode::Undefined => "undefined",
            LinkMode::EthernetBridge => "eth-bridge",
            LinkMode::EthernetRouter => "eth-router",
            LinkMode::Tunnel => "gre",
        }
    }
}

impl std::fmt::Display for LinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify the active link
///
/// An Ethernet uplink is bridged when `bridge_port` exists in the topology
/// and routed otherwise. A lookup error yields [`LinkMode::Undefined`],
/// which leaves the limp state as it was.
pub async fn classify_link_mode(
    selection: &LinkSelection,
    topology: &dyn Topology,
    bridge_port: &str,
) -> LinkMode {
    if !selection.is_used {
        return LinkMode::Undefined;
    }

    match selection.if_type {
        InterfaceType::Ethernet => match topology.port_exists(bridge_port).await {
            Ok(true) => LinkMode::EthernetBridge,
            Ok(false) => LinkMode::EthernetRouter,
            Err(e) => {
                warn!("Port lookup for {} failed: {}", bridge_port, e);
                LinkMode::Undefined
            }
        },
        InterfaceType::GreTunnel => LinkMode::Tunnel,
        InterfaceType::Other => LinkMode::Undefined,
    }
}
