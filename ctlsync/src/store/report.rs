//! Failure report output.

use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// One non-successful device, as handed to the report collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub address: String,
    pub name: String,
    pub status: String,
    pub error: String,
    pub tier: String,
    /// Local time the record was produced, `YYYY-mm-dd HH:MM:SS`.
    pub timestamp: String,
}

/// Receives the failure subset of a run.
pub trait ReportSink: Send + Sync {
    /// Persist `records` for the run over `tier`. Returns where they went,
    /// if anywhere.
    fn write(&self, tier: &str, records: &[FailureRecord]) -> Result<Option<PathBuf>>;
}

/// Writes `sync_report_<TIER>_<YYYYmmdd_HHMMSS>.json` into a directory.
#[derive(Debug, Clone)]
pub struct JsonReportWriter {
    dir: PathBuf,
}

impl JsonReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Report directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_name(tier: &str) -> String {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        format!("sync_report_{}_{}.json", tier.replace(' ', "_"), stamp)
    }
}

impl ReportSink for JsonReportWriter {
    fn write(&self, tier: &str, records: &[FailureRecord]) -> Result<Option<PathBuf>> {
        if records.is_empty() {
            return Ok(None);
        }

        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.dir.join(Self::file_name(tier));
        let json = serde_json::to_string_pretty(records).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        info!("Report written: {}", path.display());
        Ok(Some(path))
    }
}

/// Local timestamp in report format.
pub fn report_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
