// # Memory Link Store
//
// In-memory implementation of LinkStore.
//
// ## Purpose
//
// Keeps link records for the lifetime of the process only. After a restart
// every counter starts from zero again.
//
// ## When to Use
//
// - Devices where another component owns the durable database
// - Testing environments

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::link_store::{Counter, LinkRecord, LinkStore};

/// In-memory link store
///
/// Clones share the same records, so a caller can keep a handle while the
/// engine owns another.
///
/// # Example
///
/// ```rust,no_run
/// use linkwatch_core::state::MemoryLinkStore;
/// use linkwatch_core::traits::{Counter, LinkRecord, LinkStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryLinkStore::new();
///     store.insert_record("eth0", &LinkRecord::new()).await?;
///     store.update_counter("eth0", Counter::Link, 2).await?;
///
///     let record = store.get_record("eth0").await?.unwrap();
///     assert_eq!(record.unreachable_link_counter, 2);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryLinkStore {
    inner: Arc<RwLock<HashMap<String, LinkRecord>>>,
}

impl MemoryLinkStore {
    /// Create a new empty memory link store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of records in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn get_record(&self, if_name: &str) -> Result<Option<LinkRecord>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.get(if_name).cloned())
    }

    async fn insert_record(&self, if_name: &str, record: &LinkRecord) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.insert(if_name.to_string(), record.clone());
        Ok(())
    }

    async fn update_counter(&self, if_name: &str, counter: Counter, value: u32) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(if_name)
            .ok_or_else(|| Error::not_found(format!("link record for {}", if_name)))?;
        record.set_counter(counter, value);
        Ok(())
    }

    async fn update_ntp_state(&self, if_name: &str, synced: bool) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        let record = guard
            .get_mut(if_name)
            .ok_or_else(|| Error::not_found(format!("link record for {}", if_name)))?;
        record.set_ntp_state(synced);
        Ok(())
    }

    async fn remove_record(&self, if_name: &str) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.remove(if_name);
        Ok(())
    }

    async fn list_interfaces(&self) -> Result<Vec<String>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Nothing buffered
        Ok(())
    }
}
