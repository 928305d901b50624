//! Fan-out of the per-device workflow across a device list.
//!
//! Each device goes through: admission gate, login, `show card`, vendor
//! check, slot check, and then either a skip or the maintenance sequence.
//! Workers hand their [`MaintenanceResult`] back as the value of their
//! future; the run loop is the only place results are aggregated.

mod result;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use log::{debug, error, info, warn};
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::{Semaphore, watch};

use crate::classify::{VendorMatcher, VendorVerdict, slot_health, sync_verified};
use crate::driver::{Profile, Sequencer, Session, connect_with_retry};
use crate::error::Result;
use crate::store::{Device, DiscardSet, MemoryTranscript, ReportSink, TranscriptSink, report_timestamp};
use crate::transport::{Connector, Transport};

pub use result::{MaintenanceResult, RunReport, Status, Summary};

/// What to do with inspection output that matches neither the vendor
/// signatures nor the denials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownVendorPolicy {
    /// Treat as incompatible and add to the Discard Set.
    #[default]
    Discard,
    /// Treat as incompatible for this run only, flagged for manual review.
    Review,
}

/// Tunables for a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Sessions open at once.
    pub max_concurrent: usize,
    pub bootstrap_timeout: Duration,
    /// Login attempts per device, each on a fresh transport.
    pub bootstrap_attempts: usize,
    /// Pause between maintenance commands.
    pub command_delay: Duration,
    /// Devices released per launch step.
    pub launch_batch: usize,
    /// Delay between launch steps.
    pub launch_pause: Duration,
    pub unknown_vendor_policy: UnknownVendorPolicy,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            bootstrap_timeout: Duration::from_secs(60),
            bootstrap_attempts: 2,
            command_delay: Duration::from_secs(1),
            launch_batch: 4,
            launch_pause: Duration::from_secs(3),
            unknown_vendor_policy: UnknownVendorPolicy::Discard,
        }
    }
}

/// Stops a running orchestrator from admitting further devices.
/// Devices already past the gate finish normally.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Close admission. Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

/// Drives the per-device workflow over many devices.
pub struct Orchestrator<C: Connector> {
    connector: Arc<C>,
    profile: Arc<Profile>,
    vendor: VendorMatcher,
    password: Arc<SecretString>,
    discard: Arc<DiscardSet>,
    inspection_log: Arc<dyn TranscriptSink>,
    maintenance_log: Arc<dyn TranscriptSink>,
    reports: Option<Arc<dyn ReportSink>>,
    settings: RunSettings,
    stop: Arc<watch::Sender<bool>>,
}

impl<C: Connector> Orchestrator<C> {
    /// Create an orchestrator with default settings and in-memory transcripts.
    ///
    /// Fails if the platform's vendor patterns do not compile.
    pub fn new(
        connector: Arc<C>,
        profile: Arc<Profile>,
        password: Arc<SecretString>,
        discard: Arc<DiscardSet>,
    ) -> Result<Self> {
        let vendor = VendorMatcher::for_platform(profile.platform())?;
        let (stop, _) = watch::channel(false);
        Ok(Self {
            connector,
            profile,
            vendor,
            password,
            discard,
            inspection_log: Arc::new(MemoryTranscript::new()),
            maintenance_log: Arc::new(MemoryTranscript::new()),
            reports: None,
            settings: RunSettings::default(),
            stop: Arc::new(stop),
        })
    }

    /// Replace the run tunables.
    pub fn with_settings(mut self, settings: RunSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sink for `show card` captures.
    pub fn with_inspection_transcript(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.inspection_log = sink;
        self
    }

    /// Sink for maintenance command captures.
    pub fn with_maintenance_transcript(mut self, sink: Arc<dyn TranscriptSink>) -> Self {
        self.maintenance_log = sink;
        self
    }

    /// Receiver of the failure subset.
    pub fn with_report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.reports = Some(sink);
        self
    }

    /// Handle that stops admission from another task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: Arc::clone(&self.stop),
        }
    }

    /// Current run tunables.
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Process `devices`. `label` names the selection in the failure report.
    ///
    /// Fails only when the jump host cannot be reached; every per-device
    /// problem ends up in the returned report.
    pub async fn run(&self, devices: Vec<Device>, label: &str) -> Result<RunReport> {
        let selected = devices.len();
        let devices: Vec<Device> = devices
            .into_iter()
            .filter(|d| {
                let discarded = self.discard.contains(&d.address);
                if discarded {
                    debug!("{}: skipped, in discard set", d);
                }
                !discarded
            })
            .collect();
        let total = devices.len();
        let mut summary = Summary::new(total, selected - total);

        if devices.is_empty() {
            info!("Nothing to do for {}", label);
            return Ok(RunReport {
                summary,
                ..Default::default()
            });
        }

        self.connector.check_jump_host().await?;
        info!(
            "Processing {} devices for {} ({} at a time)",
            total, label, self.settings.max_concurrent
        );

        let gate = Semaphore::new(self.settings.max_concurrent.max(1));
        let sequencer =
            Sequencer::new(Arc::clone(&self.maintenance_log)).with_delay(self.settings.command_delay);

        let mut workers: FuturesUnordered<_> = devices
            .iter()
            .enumerate()
            .map(|(index, device)| self.admit(index, device, &gate, &sequencer))
            .collect();

        let mut results = Vec::with_capacity(total);
        let mut stopped = false;
        while let Some(outcome) = workers.next().await {
            let Some(result) = outcome else {
                stopped = true;
                continue;
            };
            summary.record(&result);
            info!(
                "[{}/{}] {}: {}",
                summary.processed, total, result.device, result.status
            );
            results.push(result);
        }
        drop(workers);

        if stopped {
            warn!("Stopped: {} of {} devices were not started", total - summary.processed, total);
        }

        let failures: Vec<_> = results
            .iter()
            .filter(|r| !r.is_success())
            .map(MaintenanceResult::failure_record)
            .collect();
        if let Some(reports) = &self.reports {
            match reports.write(label, &failures) {
                Ok(_) => {}
                Err(e) => error!("Cannot write failure report: {}", e),
            }
        }
        let sinks = [Arc::clone(&self.inspection_log), Arc::clone(&self.maintenance_log)];
        let flushed = tokio::task::spawn_blocking(move || {
            for sink in &sinks {
                if let Err(e) = sink.flush() {
                    warn!("Transcript flush failed: {}", e);
                }
            }
        })
        .await;
        if let Err(e) = flushed {
            warn!("Transcript flush task failed: {}", e);
        }

        info!("Run finished for {}: {}", label, summary);
        Ok(RunReport {
            summary,
            results,
            failures,
            stopped,
        })
    }

    /// Wait for the launch slot and a gate permit, then run the workflow.
    /// `None` when a stop request arrived first.
    async fn admit(
        &self,
        index: usize,
        device: &Device,
        gate: &Semaphore,
        sequencer: &Sequencer,
    ) -> Option<MaintenanceResult> {
        let mut stop = self.stop.subscribe();

        let step = index / self.settings.launch_batch.max(1);
        let wait = self.settings.launch_pause * u32::try_from(step).unwrap_or(u32::MAX);
        if !wait.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_requested(&mut stop) => return None,
            }
        }

        let permit = tokio::select! {
            permit = gate.acquire() => permit.ok()?,
            _ = stop_requested(&mut stop) => return None,
        };
        if *stop.borrow() {
            return None;
        }

        let result = self.process(device, sequencer).await;
        drop(permit);
        Some(result)
    }

    /// Full workflow for one device. The session is closed on every path.
    async fn process(&self, device: &Device, sequencer: &Sequencer) -> MaintenanceResult {
        debug!("{}: connecting", device);
        let session = connect_with_retry(
            self.connector.as_ref(),
            &self.profile,
            &device.address,
            &self.password,
            self.settings.bootstrap_timeout,
            self.settings.bootstrap_attempts,
        )
        .await;
        let mut session = match session {
            Ok(session) => session,
            Err(e) => {
                error!("{}: {}", device, e);
                return MaintenanceResult::new(device.clone(), Status::ConnectionError)
                    .with_error(e.to_string());
            }
        };

        let result = self.inspect_and_maintain(&mut session, device, sequencer).await;

        if let Err(e) = session.close().await {
            warn!("{}: close failed: {}", device, e);
        }
        result
    }

    async fn inspect_and_maintain<T: Transport>(
        &self,
        session: &mut Session<T>,
        device: &Device,
        sequencer: &Sequencer,
    ) -> MaintenanceResult {
        let platform = self.profile.platform();

        let inspection = match session.exchange(&platform.inspection).await {
            Ok(response) => response,
            Err(e) => {
                error!("{}: '{}' failed: {}", device, platform.inspection.text, e);
                return MaintenanceResult::new(device.clone(), Status::ConnectionError)
                    .with_error(format!("{}: {}", platform.inspection.text, e));
            }
        };
        let entry = format!("==== {} ({}) ====\n{}\n", device.name, device.address, inspection.raw_result);
        if let Err(e) = self.inspection_log.write(&entry) {
            warn!("{}: transcript write failed: {}", device, e);
        }

        match self.vendor.verdict(&inspection.result) {
            VendorVerdict::NonTarget(found) => {
                return self.reject_vendor(device, format!("non-target vendor ({found})"), true);
            }
            _ if inspection.interrupted => {
                return MaintenanceResult::new(device.clone(), Status::ConnectionError).with_error(
                    format!(
                        "'{}' interrupted: {}",
                        platform.inspection.text,
                        inspection.failure_message.as_deref().unwrap_or("channel closed")
                    ),
                );
            }
            _ if inspection.timed_out => {
                return MaintenanceResult::new(device.clone(), Status::ConnectionError).with_error(
                    format!(
                        "'{}' did not complete within {:?}",
                        platform.inspection.text, platform.inspection.timeout
                    ),
                );
            }
            VendorVerdict::Ambiguous => {
                return match self.settings.unknown_vendor_policy {
                    UnknownVendorPolicy::Discard => {
                        self.reject_vendor(device, "unrecognised vendor output".into(), true)
                    }
                    UnknownVendorPolicy::Review => self.reject_vendor(
                        device,
                        "unrecognised vendor output, flagged for manual review".into(),
                        false,
                    ),
                };
            }
            VendorVerdict::Target => {}
        }

        let faults = slot_health(&inspection.result);
        if !faults.is_empty() {
            warn!("{}: {} slot fault(s), skipping maintenance", device, faults.len());
            let mut result = MaintenanceResult::new(device.clone(), Status::CardFault);
            result.errors = faults.iter().map(ToString::to_string).collect();
            return result;
        }

        info!("{}: controllers healthy, running maintenance", device);
        let banner = format!(
            "\n==== {} ({}) {} ====\n",
            device.name,
            device.address,
            report_timestamp()
        );
        if let Err(e) = self.maintenance_log.write(&banner) {
            warn!("{}: transcript write failed: {}", device, e);
        }

        let label = device.to_string();
        let report = sequencer.run(session, &platform.maintenance, &label).await;

        let mut result = MaintenanceResult::new(device.clone(), Status::Success);
        result.executed = report.executed.clone();
        if let Some(failure) = &report.failure {
            result.status = Status::SequenceAborted;
            result.errors.push(failure.to_string());
            return result;
        }

        result.sync_verified = platform
            .sync_check_command
            .as_deref()
            .and_then(|command| report.response_for(command))
            .is_some_and(|response| sync_verified(&response.result));
        if result.sync_verified {
            info!("{}: synchronization verified", device);
        } else {
            warn!("{}: synchronization not verified", device);
            result.errors.push("synchronization not verified".into());
        }
        result
    }

    fn reject_vendor(&self, device: &Device, reason: String, persist: bool) -> MaintenanceResult {
        warn!("{}: {}", device, reason);
        let mut result =
            MaintenanceResult::new(device.clone(), Status::IncompatibleVendor).with_error(reason);
        if persist {
            if let Err(e) = self.discard.add(&device.address) {
                error!("{}: cannot persist discard: {}", device, e);
                result.errors.push(format!("discard set not updated: {e}"));
            }
        }
        result
    }
}
