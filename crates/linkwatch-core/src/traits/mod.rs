//! Core traits for the stability supervisor
//!
//! This module defines the abstract interfaces every embedding must provide.
//!
//! - [`ConnectivityProbe`]: Reachability checks for the active uplink
//! - [`LinkStore`]: Per-interface failure counters and NTP state
//! - [`Topology`]: Port lookup used for bridge detection
//! - [`DeviceTarget`]: Role, recovery actions, watchdog and liveness indicator

pub mod device;
pub mod link_store;
pub mod probe;
pub mod topology;

pub use device::DeviceTarget;
pub use link_store::{Counter, LinkRecord, LinkStore};
pub use probe::{Check, CheckMask, ConnectivityProbe, ProbeReport};
pub use topology::Topology;
