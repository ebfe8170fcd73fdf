//! Watchdog pinger
//!
//! Feeds the external watchdog once per watchdog period, whatever the state
//! of the uplink.

use crate::traits::DeviceTarget;
use std::sync::Arc;
use tracing::trace;

/// Signals liveness to the external watchdog
#[derive(Clone)]
pub struct WatchdogPinger {
    target: Arc<dyn DeviceTarget>,
}

impl WatchdogPinger {
    pub fn new(target: Arc<dyn DeviceTarget>) -> Self {
        Self { target }
    }

    /// Ping the watchdog once
    ///
    /// There is no failure path. A lost ping cannot be detected here and is
    /// not retried; the next period pings again.
    pub async fn ping(&self) {
        trace!("Pinging watchdog");
        self.target.ping_watchdog().await;
    }
}
