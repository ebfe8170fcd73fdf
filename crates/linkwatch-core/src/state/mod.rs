// # Link Store Implementations
//
// This module provides implementations of the LinkStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileLinkStore;
pub use memory::MemoryLinkStore;

use crate::config::LinkStoreConfig;
use crate::error::Result;
use crate::traits::LinkStore;

/// Build the store selected by configuration
pub async fn create_link_store(config: &LinkStoreConfig) -> Result<Box<dyn LinkStore>> {
    config.validate()?;
    match config {
        LinkStoreConfig::File { path } => Ok(Box::new(FileLinkStore::new(path).await?)),
        LinkStoreConfig::Memory => Ok(Box::new(MemoryLinkStore::new())),
    }
}
