//! Device inventory grouped by network tier.
//!
//! The file is a JSON object mapping tier name to a list of entries:
//!
//! ```json
//! { "LOW RAN": [ { "ip": "192.168.1.10", "name": "NOK-LOW-001", "location": "Site A" } ] }
//! ```
//!
//! Fields other than `ip` and `name` are ignored. Tier names are upper-cased
//! on load and file order is preserved.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, StoreError};

/// Selection keyword meaning every tier.
pub const ALL_TIERS: &str = "TODOS";

/// One managed controller. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    /// Management address reachable from the jump host.
    pub address: String,

    /// Display name.
    pub name: String,

    /// Network tier label.
    pub tier: String,
}

impl Device {
    pub fn new(address: impl Into<String>, name: impl Into<String>, tier: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: name.into(),
            tier: tier.into(),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(alias = "address")]
    ip: String,
    #[serde(default)]
    name: Option<String>,
}

/// Which tiers to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TierSelection {
    /// Every tier, in file order.
    All,
    /// One tier by (case-insensitive) name.
    Named(String),
}

impl TierSelection {
    /// Label used in reports.
    pub fn label(&self) -> &str {
        match self {
            TierSelection::All => ALL_TIERS,
            TierSelection::Named(name) => name,
        }
    }
}

impl FromStr for TierSelection {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();
        if name == ALL_TIERS || name == "ALL" {
            Ok(TierSelection::All)
        } else {
            Ok(TierSelection::Named(name))
        }
    }
}

impl fmt::Display for TierSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Devices grouped by tier.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    tiers: IndexMap<String, Vec<Device>>,
}

impl Inventory {
    /// Read and parse an inventory file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Store(StoreError::Json { source, .. }) => StoreError::Json {
                path: path.to_path_buf(),
                source,
            }
            .into(),
            other => other,
        })
    }

    /// Parse inventory JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: IndexMap<String, Vec<Entry>> =
            serde_json::from_str(text).map_err(|source| StoreError::Json {
                path: Default::default(),
                source,
            })?;

        let mut tiers: IndexMap<String, Vec<Device>> = IndexMap::new();
        for (tier, entries) in raw {
            let tier = tier.trim().to_uppercase();
            let devices = tiers.entry(tier.clone()).or_default();
            devices.extend(entries.into_iter().map(|e| {
                let name = e.name.unwrap_or_else(|| e.ip.clone());
                Device::new(e.ip, name, tier.clone())
            }));
        }
        Ok(Self { tiers })
    }

    /// Tier names in file order.
    pub fn tiers(&self) -> impl Iterator<Item = &str> {
        self.tiers.keys().map(String::as_str)
    }

    /// Total number of devices.
    pub fn len(&self) -> usize {
        self.tiers.values().map(Vec::len).sum()
    }

    /// Whether the inventory has no devices.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Devices for a selection. Unknown tiers and empty results are errors.
    pub fn select(&self, selection: &TierSelection) -> Result<Vec<Device>> {
        let devices: Vec<Device> = match selection {
            TierSelection::All => self.tiers.values().flatten().cloned().collect(),
            TierSelection::Named(name) => self
                .tiers
                .get(&name.to_uppercase())
                .ok_or_else(|| StoreError::UnknownTier { name: name.clone() })?
                .clone(),
        };

        if devices.is_empty() {
            return Err(StoreError::EmptySelection {
                selection: selection.to_string(),
            }
            .into());
        }
        Ok(devices)
    }
}
