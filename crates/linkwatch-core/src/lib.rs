// # linkwatch-core
//
// Core library for the uplink stability supervisor.
//
// ## Architecture Overview
//
// A gateway device has exactly one uplink at a time. Every stability tick
// the core probes that uplink, keeps per-check consecutive-failure counters
// in the link record store, works out whether the device is bridging or
// routing, and fires recovery actions once the counters cross their
// thresholds. A second, independent timer feeds the device watchdog.
//
// - **ConnectivityProbe**: Trait for link/router/Internet/NTP reachability checks
// - **LinkStore**: Trait for the per-interface record store
// - **Topology**: Trait for the bridge-side port lookup
// - **DeviceTarget**: Trait for role, recovery actions, watchdog and liveness indicator
// - **StabilityEngine**: One evaluation tick over a `LinkSelection`
// - **Supervisor**: Owns the selection and drives both timers
//
// ## Design Principles
//
// 1. **Single control task**: ticks never interleave, so no locks guard the selection
// 2. **Fail soft**: a failing collaborator is logged and the next tick retries
// 3. **Library-first**: everything the daemon does can be embedded

pub mod config;
pub mod engine;
pub mod error;
pub mod selection;
pub mod state;
pub mod supervisor;
pub mod traits;

// Re-export core types for convenience
pub use config::{DeviceRole, LinkStoreConfig, LinkwatchConfig, StabilityConfig, WatchdogConfig};
pub use engine::{LinkMode, StabilityEngine, StabilityEvent, TickOutcome, TickSummary};
pub use error::{Error, Result};
pub use selection::{InterfaceType, LinkCommand, LinkSelection};
pub use state::{FileLinkStore, MemoryLinkStore};
pub use supervisor::{LinkController, Supervisor, WatchdogPinger};
pub use traits::{ConnectivityProbe, DeviceTarget, LinkStore, Topology};
