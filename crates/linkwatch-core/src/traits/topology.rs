// # Topology Trait
//
// Port lookup used by the link mode classifier.
//
// On an extender the WAN side is bridged into the home network through a
// dedicated patch port. Its presence tells a bridged Ethernet uplink apart
// from a routed one.

use async_trait::async_trait;

/// Trait for switch/bridge topology lookups
#[async_trait]
pub trait Topology: Send + Sync {
    /// Whether a port with this name exists on any bridge
    ///
    /// # Returns
    ///
    /// - `Ok(true)` / `Ok(false)`: Lookup succeeded
    /// - `Err(Error)`: The lookup itself failed; callers must not read this as "absent"
    async fn port_exists(&self, port_name: &str) -> Result<bool, crate::Error>;
}
