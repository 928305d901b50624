//! Per-device outcomes and run aggregates.

use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;

use crate::store::{Device, FailureRecord, report_timestamp};

/// Final status of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Success,
    CardFault,
    IncompatibleVendor,
    ConnectionError,
    SequenceAborted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::CardFault => "card-fault",
            Status::IncompatibleVendor => "incompatible-vendor",
            Status::ConnectionError => "connection-error",
            Status::SequenceAborted => "sequence-aborted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one device in one run.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceResult {
    pub device: Device,
    pub status: Status,
    /// Maintenance commands that completed.
    pub executed: Vec<String>,
    pub errors: Vec<String>,
    pub sync_verified: bool,
}

impl MaintenanceResult {
    pub fn new(device: Device, status: Status) -> Self {
        Self {
            device,
            status,
            executed: Vec::new(),
            errors: Vec::new(),
            sync_verified: false,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    /// Maintenance ran through and synchronization was confirmed.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success && self.sync_verified
    }

    /// Record for the failure report.
    pub fn failure_record(&self) -> FailureRecord {
        FailureRecord {
            address: self.device.address.clone(),
            name: self.device.name.clone(),
            status: self.status.to_string(),
            error: self.errors.join("; "),
            tier: self.device.tier.clone(),
            timestamp: report_timestamp(),
        }
    }
}

/// Aggregate counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Devices selected for the run (after discard filtering).
    pub total: usize,
    /// Devices skipped because they were already discarded.
    pub discarded: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub by_status: IndexMap<Status, usize>,
}

impl Summary {
    pub(crate) fn new(total: usize, discarded: usize) -> Self {
        Self {
            total,
            discarded,
            ..Default::default()
        }
    }

    pub(crate) fn record(&mut self, result: &MaintenanceResult) {
        self.processed += 1;
        if result.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        *self.by_status.entry(result.status).or_default() += 1;
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total {}, processed {}, succeeded {}, failed {}",
            self.total, self.processed, self.succeeded, self.failed
        )?;
        for (status, count) in &self.by_status {
            write!(f, ", {status} {count}")?;
        }
        if self.discarded > 0 {
            write!(f, " ({} previously discarded)", self.discarded)?;
        }
        Ok(())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub summary: Summary,
    pub results: Vec<MaintenanceResult>,
    pub failures: Vec<FailureRecord>,
    /// Set when a stop request kept some devices from starting.
    pub stopped: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device::new("10.0.0.1", "NOK-LOW-001", "LOW RAN")
    }

    #[test]
    fn test_unverified_sync_counts_as_failure() {
        let mut summary = Summary::new(2, 0);
        let mut ok = MaintenanceResult::new(device(), Status::Success);
        ok.sync_verified = true;
        summary.record(&ok);

        let unverified = MaintenanceResult::new(device(), Status::Success)
            .with_error("synchronization not verified");
        summary.record(&unverified);

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.by_status[&Status::Success], 2);
    }

    #[test]
    fn test_failure_record() {
        let result = MaintenanceResult::new(device(), Status::CardFault)
            .with_error("slot A: not equipped")
            .with_error("slot B: operational down/standby");
        let record = result.failure_record();
        assert_eq!(record.status, "card-fault");
        assert_eq!(record.error, "slot A: not equipped; slot B: operational down/standby");
        assert_eq!(record.tier, "LOW RAN");
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&Status::IncompatibleVendor).unwrap();
        assert_eq!(json, "\"incompatible-vendor\"");
    }
}
