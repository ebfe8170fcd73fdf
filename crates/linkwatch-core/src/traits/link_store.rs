// # Link Store Trait
//
// Defines the interface for the per-interface link record store.
//
// ## Purpose
//
// The store keeps, for every uplink interface the device has observed:
// - Consecutive-failure counters for the link, router and Internet checks
// - The last observed NTP synchronization state
//
// Other components (cloud agents, BLE status reporting) read these records,
// so every tick writes its counters back even when they did not change.
//
// ## Implementations
//
// - In-memory: `MemoryLinkStore`
// - JSON file: `FileLinkStore`
//
// ## Usage
//
// ```rust
// use linkwatch_core::LinkStore;
// use linkwatch_core::state::MemoryLinkStore;
// use linkwatch_core::traits::{Counter, LinkRecord};
//
// #[tokio::main]
// async fn main() -> linkwatch_core::Result<()> {
//     let store = MemoryLinkStore::new();
//     store.insert_record("eth0", &LinkRecord::new()).await?;
//
//     store.update_counter("eth0", Counter::Router, 3).await?;
//     let record = store.get_record("eth0").await?.expect("record exists");
//     assert_eq!(record.counter(Counter::Router), 3);
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the consecutive-failure counters kept per interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    /// `unreachable_link_counter`
    Link,
    /// `unreachable_router_counter`
    Router,
    /// `unreachable_internet_counter`
    Internet,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Counter::Link => "unreachable_link_counter",
            Counter::Router => "unreachable_router_counter",
            Counter::Internet => "unreachable_internet_counter",
        };
        f.write_str(name)
    }
}

/// Stored state for one uplink interface
///
/// Each counter is the number of consecutive ticks its check failed. It is
/// reset to exactly 0 by the first passing check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Consecutive link-check failures
    #[serde(default)]
    pub unreachable_link_counter: u32,
    /// Consecutive router-check failures
    #[serde(default)]
    pub unreachable_router_counter: u32,
    /// Consecutive Internet-check failures
    #[serde(default)]
    pub unreachable_internet_counter: u32,
    /// Last observed NTP synchronization state
    #[serde(default)]
    pub ntp_state: bool,
    /// Timestamp of the last write to this record
    #[serde(default = "chrono::Utc::now")]
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl LinkRecord {
    /// Create a fresh record with all counters at zero
    ///
    /// Records are created by whoever first observes an interface (the
    /// daemon at startup, or an uplink selection controller). The stability
    /// engine itself never creates one.
    pub fn new() -> Self {
        Self {
            unreachable_link_counter: 0,
            unreachable_router_counter: 0,
            unreachable_internet_counter: 0,
            ntp_state: false,
            last_updated: chrono::Utc::now(),
        }
    }

    /// Read a counter
    pub fn counter(&self, counter: Counter) -> u32 {
        match counter {
            Counter::Link => self.unreachable_link_counter,
            Counter::Router => self.unreachable_router_counter,
            Counter::Internet => self.unreachable_internet_counter,
        }
    }

    /// Overwrite a counter and refresh the timestamp
    pub fn set_counter(&mut self, counter: Counter, value: u32) {
        let slot = match counter {
            Counter::Link => &mut self.unreachable_link_counter,
            Counter::Router => &mut self.unreachable_router_counter,
            Counter::Internet => &mut self.unreachable_internet_counter,
        };
        *slot = value;
        self.last_updated = chrono::Utc::now();
    }

    /// Overwrite the NTP state and refresh the timestamp
    pub fn set_ntp_state(&mut self, synced: bool) {
        self.ntp_state = synced;
        self.last_updated = chrono::Utc::now();
    }
}

impl Default for LinkRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for link record store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// ## Responsibilities
///
/// - ✅ Persist and return per-interface records
/// - ✅ Apply field-level updates to existing records
/// - ❌ Create records implicitly on update (updates on unknown interfaces fail)
/// - ❌ Decide counter values or trigger recovery (owned by `StabilityEngine`)
///
/// Every update returns its own `Result` so that the engine can log a
/// failed write and carry on with the remaining checks.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Get the record for an interface
    ///
    /// # Returns
    ///
    /// - `Ok(Some(LinkRecord))`: The stored record
    /// - `Ok(None)`: The interface is unknown to the store
    /// - `Err(Error)`: Storage error
    async fn get_record(&self, if_name: &str) -> Result<Option<LinkRecord>, crate::Error>;

    /// Create or replace the record for an interface
    async fn insert_record(&self, if_name: &str, record: &LinkRecord) -> Result<(), crate::Error>;

    /// Overwrite one counter of an existing record
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Successfully updated
    /// - `Err(Error::NotFound)`: The interface has no record
    /// - `Err(Error)`: Storage error
    async fn update_counter(
        &self,
        if_name: &str,
        counter: Counter,
        value: u32,
    ) -> Result<(), crate::Error>;

    /// Overwrite the NTP state of an existing record
    async fn update_ntp_state(&self, if_name: &str, synced: bool) -> Result<(), crate::Error>;

    /// Delete the record for an interface (no error if absent)
    async fn remove_record(&self, if_name: &str) -> Result<(), crate::Error>;

    /// List all interface names in the store
    async fn list_interfaces(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
