// # Device Target Trait
//
// Role query and the opaque device actions the supervisor invokes.
//
// ## Implementations
//
// - External commands and a watchdog device: `linkwatch-target-cmd` crate
//
// All actions are fire-and-forget. The supervisor cannot observe whether a
// restart happened or the watchdog was fed; the next tick (or the external
// watchdog itself) is the only feedback loop. Implementations log their own
// failures.

use async_trait::async_trait;

/// Trait for the device the supervisor runs on
#[async_trait]
pub trait DeviceTarget: Send + Sync {
    /// Whether the device is configured to monitor an uplink at all
    fn is_extender(&self) -> bool;

    /// Restart the managed connectivity services
    async fn restart_managers(&self);

    /// Refresh the DHCP lease held on `if_name`
    async fn refresh_dhcp(&self, if_name: &str);

    /// Signal liveness to the external watchdog
    async fn ping_watchdog(&self);

    /// Clear the externally visible link status (e.g. the BLE advertised state)
    async fn clear_liveness_indicator(&self);
}
