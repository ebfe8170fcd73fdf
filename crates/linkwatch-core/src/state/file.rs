// # File Link Store
//
// JSON file implementation of LinkStore with crash recovery.
//
// ## Write Strategy
//
// A tick updates up to four fields of one record. Field updates only touch
// memory and mark the store dirty; `flush()` (called by the engine at the end
// of each evaluated tick, and on shutdown) writes the whole file once.
// Creating or removing a record is written through immediately.
//
// ## Crash Recovery
//
// - Atomic writes: temp file, then rename over the store file
// - Backup: the previous file is copied to `.backup` before each rename
// - Recovery: a file that fails to parse is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "links": {
//     "eth0": {
//       "unreachable_link_counter": 0,
//       "unreachable_router_counter": 2,
//       "unreachable_internet_counter": 0,
//       "ntp_state": true,
//       "last_updated": "2026-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::link_store::{Counter, LinkRecord, LinkStore};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// JSON file backed link store
#[derive(Debug, Clone)]
pub struct FileLinkStore {
    path: PathBuf,
    state: Arc<RwLock<FileState>>,
}

#[derive(Debug)]
struct FileState {
    links: HashMap<String, LinkRecord>,
    dirty: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    links: HashMap<String, LinkRecord>,
}

impl FileLinkStore {
    /// Open (or create) a file link store
    ///
    /// Parent directories are created if needed. A corrupt file is recovered
    /// from its backup; if that fails too the store starts empty.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create link store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let links = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(FileState {
                links,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<String, LinkRecord>, Error> {
        match Self::load(path).await {
            Ok(links) => {
                tracing::debug!("Loaded link store: {} records", links.len());
                Ok(links)
            }
            Err(Error::Json(e)) => {
                tracing::warn!("Link store file is corrupted ({}), trying backup", e);

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No link store backup found, starting empty");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(links) => {
                        tracing::info!("Recovered link store from backup: {} records", links.len());
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore link store from backup: {}", e);
                        }
                        Ok(links)
                    }
                    Err(e) => {
                        tracing::error!("Link store backup unusable ({}), starting empty", e);
                        Ok(HashMap::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<HashMap<String, LinkRecord>, Error> {
        if !path.exists() {
            tracing::debug!("Link store file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await?;
        let file: StoreFileFormat = serde_json::from_str(&content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Link store version mismatch: expected {}, got {}",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.links)
    }

    /// Write the whole store atomically and clear the dirty flag
    async fn write(&self) -> Result<(), Error> {
        let mut guard = self.state.write().await;

        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            links: guard.links.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let temp_path = self.temp_path();
        {
            let mut temp = fs::File::create(&temp_path).await.map_err(|e| {
                Error::link_store(format!("Failed to create {}: {}", temp_path.display(), e))
            })?;
            temp.write_all(json.as_bytes()).await?;
            temp.sync_all().await?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to back up link store: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::link_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        guard.dirty = false;
        tracing::trace!("Link store written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Apply a field update to an existing record
    async fn modify<F>(&self, if_name: &str, update: F) -> Result<(), Error>
    where
        F: FnOnce(&mut LinkRecord) + Send,
    {
        let mut guard = self.state.write().await;
        let record = guard
            .links
            .get_mut(if_name)
            .ok_or_else(|| Error::not_found(format!("link record for {}", if_name)))?;
        update(record);
        guard.dirty = true;
        Ok(())
    }
}

#[async_trait]
impl LinkStore for FileLinkStore {
    async fn get_record(&self, if_name: &str) -> Result<Option<LinkRecord>, Error> {
        let guard = self.state.read().await;
        Ok(guard.links.get(if_name).cloned())
    }

    async fn insert_record(&self, if_name: &str, record: &LinkRecord) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            guard.links.insert(if_name.to_string(), record.clone());
            guard.dirty = true;
        }
        self.write().await
    }

    async fn update_counter(&self, if_name: &str, counter: Counter, value: u32) -> Result<(), Error> {
        self.modify(if_name, |record| record.set_counter(counter, value))
            .await
    }

    async fn update_ntp_state(&self, if_name: &str, synced: bool) -> Result<(), Error> {
        self.modify(if_name, |record| record.set_ntp_state(synced)).await
    }

    async fn remove_record(&self, if_name: &str) -> Result<(), Error> {
        {
            let mut guard = self.state.write().await;
            if guard.links.remove(if_name).is_none() {
                return Ok(());
            }
            guard.dirty = true;
        }
        self.write().await
    }

    async fn list_interfaces(&self) -> Result<Vec<String>, Error> {
        let guard = self.state.read().await;
        Ok(guard.links.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        let dirty = self.state.read().await.dirty;
        if dirty { self.write().await } else { Ok(()) }
    }
}
