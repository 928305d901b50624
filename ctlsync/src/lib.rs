//! # ctlsync
//!
//! Card inspection and redundancy synchronization for Nokia SR OS
//! controllers that are only reachable through an SSH jump host.
//!
//! For every selected device ctlsync logs in through the jump host, runs
//! `show card`, and decides whether the device is an SR OS controller with
//! healthy control slots. Healthy devices get a fixed maintenance sequence
//! (`admin save`, then configuration and boot environment synchronization to
//! the standby CPM), executed strictly in order and stopped at the first
//! failure. Devices that turn out not to be SR OS go into a persisted
//! Discard Set and are skipped on later runs.
//!
//! ## Layers
//!
//! - [`transport`]: byte streams to a device, either by typing `ssh` into a
//!   jump host shell or through a `direct-tcpip` tunnel
//! - [`channel`]: text accumulation and prompt/state detection
//! - [`driver`]: the login state machine, single command exchange and the
//!   command sequencer
//! - [`classify`]: vendor, slot health and synchronization verdicts
//! - [`orchestrator`]: bounded-concurrency fan-out over a device list
//! - [`store`]: inventory, Discard Set, transcripts and failure reports
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ctlsync::config::AppConfig;
//! use ctlsync::driver::Profile;
//! use ctlsync::orchestrator::Orchestrator;
//! use ctlsync::platform::sros;
//! use ctlsync::store::{DiscardSet, Inventory, TierSelection};
//! use ctlsync::transport::Credentials;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ctlsync::Error> {
//!     let config = AppConfig::load("ctlsync.json")?;
//!     let credentials = Credentials::new("ops", "secret");
//!     let password = Arc::clone(&credentials.password);
//!
//!     let selection = TierSelection::Named("LOW RAN".into());
//!     let devices = Inventory::load(&config.inventory)?.select(&selection)?;
//!
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(config.connector(credentials)),
//!         Arc::new(Profile::new(sros::platform())?),
//!         password,
//!         Arc::new(DiscardSet::load(&config.discard_set)),
//!     )?
//!     .with_settings(config.run_settings());
//!
//!     let report = orchestrator.run(devices, selection.label()).await?;
//!     println!("{}", report.summary);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod classify;
pub mod config;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use config::AppConfig;
pub use driver::{CommandDescriptor, Profile, Response, Session};
pub use error::{Error, Result};
pub use orchestrator::{MaintenanceResult, Orchestrator, RunReport, Status, StopHandle};
pub use platform::PlatformDefinition;
