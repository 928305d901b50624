//! Durable set of device addresses excluded as incompatible.
//!
//! Stored as `{ "discarded_ips": [...], "last_updated": "<rfc3339>" }` and
//! rewritten after every mutation. Each mutation holds the lock across the
//! membership check, the insert and the write, so two workers discovering
//! the same address cannot both add it.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use indexmap::IndexSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
struct DiscardFile {
    #[serde(default)]
    discarded_ips: Vec<String>,
    #[serde(default)]
    last_updated: Option<String>,
}

/// Persisted Discard Set.
#[derive(Debug)]
pub struct DiscardSet {
    /// Backing file; `None` keeps the set in memory only.
    path: Option<PathBuf>,
    addresses: Mutex<IndexSet<String>>,
}

impl DiscardSet {
    /// Load from `path`. A missing file is an empty set; an unreadable or
    /// corrupt file is logged and treated as empty.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let addresses = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<DiscardFile>(&text) {
                Ok(file) => file.discarded_ips.into_iter().collect(),
                Err(e) => {
                    warn!("Ignoring corrupt discard set {}: {}", path.display(), e);
                    IndexSet::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => IndexSet::new(),
            Err(e) => {
                warn!("Cannot read discard set {}: {}", path.display(), e);
                IndexSet::new()
            }
        };
        Self {
            path: Some(path),
            addresses: Mutex::new(addresses),
        }
    }

    /// A set that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            addresses: Mutex::new(IndexSet::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexSet<String>>> {
        Ok(self
            .addresses
            .lock()
            .map_err(|_| StoreError::Poisoned("discard set"))?)
    }

    /// Whether `address` is discarded.
    pub fn contains(&self, address: &str) -> bool {
        self.lock().map(|set| set.contains(address)).unwrap_or(false)
    }

    /// Add `address` and persist. Returns `false` if it was already present.
    pub fn add(&self, address: &str) -> Result<bool> {
        let mut set = self.lock()?;
        if set.contains(address) {
            return Ok(false);
        }
        let mut next = set.clone();
        next.insert(address.to_string());
        self.commit(&mut set, next)?;
        info!("Address {} added to discard set", address);
        Ok(true)
    }

    /// Remove `address` and persist. Returns `false` if it was not present.
    pub fn remove(&self, address: &str) -> Result<bool> {
        let mut set = self.lock()?;
        if !set.contains(address) {
            return Ok(false);
        }
        let mut next = set.clone();
        next.shift_remove(address);
        self.commit(&mut set, next)?;
        info!("Address {} removed from discard set", address);
        Ok(true)
    }

    /// Remove every address and persist.
    pub fn clear(&self) -> Result<()> {
        let mut set = self.lock()?;
        self.commit(&mut set, IndexSet::new())?;
        info!("Discard set cleared");
        Ok(())
    }

    /// Write `next` and only then make it the in-memory set.
    fn commit(&self, set: &mut IndexSet<String>, next: IndexSet<String>) -> Result<()> {
        self.persist(&next)?;
        *set = next;
        Ok(())
    }

    /// Snapshot of the addresses, in insertion order.
    pub fn addresses(&self) -> Vec<String> {
        self.lock()
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of discarded addresses.
    pub fn len(&self) -> usize {
        self.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the set through a temporary file and rename it into place.
    fn persist(&self, set: &IndexSet<String>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let file = DiscardFile {
            discarded_ips: set.iter().cloned().collect(),
            last_updated: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_error)?;
        std::fs::rename(&tmp, path).map_err(io_error)?;
        Ok(())
    }
}
