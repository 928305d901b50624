//! Run configuration loaded from a JSON file.
//!
//! Every field has a default, so `{ "jump_host": { "host": "..." } }` is a
//! complete file. Credentials never appear here.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::orchestrator::{RunSettings, UnknownVendorPolicy};
use crate::transport::{Credentials, HostKeyVerification, SshConfig, SshConnector, Topology};

/// Jump host connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JumpHostConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for JumpHostConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            timeout_secs: 30,
            host_key_verification: HostKeyVerification::AcceptNew,
            known_hosts_path: None,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub jump_host: JumpHostConfig,
    pub topology: Topology,
    /// SSH port on the devices (tunnel topology).
    pub device_port: u16,

    pub max_concurrent: usize,
    pub bootstrap_timeout_secs: u64,
    pub bootstrap_attempts: usize,
    pub command_delay_ms: u64,
    pub launch_batch: usize,
    pub launch_pause_ms: u64,
    pub unknown_vendor_policy: UnknownVendorPolicy,

    pub inventory: PathBuf,
    pub discard_set: PathBuf,
    pub inspection_transcript: PathBuf,
    pub maintenance_transcript: PathBuf,
    pub report_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jump_host: JumpHostConfig::default(),
            topology: Topology::ShellHop,
            device_port: 22,
            max_concurrent: 20,
            bootstrap_timeout_secs: 60,
            bootstrap_attempts: 2,
            command_delay_ms: 1000,
            launch_batch: 4,
            launch_pause_ms: 3000,
            unknown_vendor_policy: UnknownVendorPolicy::Discard,
            inventory: PathBuf::from("inventory.json"),
            discard_set: PathBuf::from("discarded_ips.json"),
            inspection_transcript: PathBuf::from("show_card.log"),
            maintenance_transcript: PathBuf::from("maintenance.log"),
            report_dir: PathBuf::from("reports"),
        }
    }
}

impl AppConfig {
    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Parse and validate config text.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::parse(text, Path::new("<inline>"))
    }

    fn parse(text: &str, path: &Path) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the run cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(ConfigError::Invalid {
                message: message.to_string(),
            }
            .into())
        };
        if self.jump_host.host.trim().is_empty() {
            return invalid("jump_host.host is required");
        }
        if self.jump_host.timeout_secs == 0 {
            return invalid("jump_host.timeout_secs must be positive");
        }
        if self.max_concurrent == 0 {
            return invalid("max_concurrent must be at least 1");
        }
        if self.bootstrap_attempts == 0 {
            return invalid("bootstrap_attempts must be at least 1");
        }
        if self.bootstrap_timeout_secs == 0 {
            return invalid("bootstrap_timeout_secs must be positive");
        }
        if self.launch_batch == 0 {
            return invalid("launch_batch must be at least 1");
        }
        Ok(())
    }

    /// SSH settings for the jump host.
    pub fn jump_ssh_config(&self, credentials: Credentials) -> SshConfig {
        let mut config = SshConfig::new(&self.jump_host.host, self.jump_host.port, credentials);
        config.timeout = Duration::from_secs(self.jump_host.timeout_secs);
        config.host_key_verification = self.jump_host.host_key_verification;
        config.known_hosts_path = self.jump_host.known_hosts_path.clone();
        config
    }

    /// Connector for the configured topology.
    pub fn connector(&self, credentials: Credentials) -> SshConnector {
        SshConnector::new(self.jump_ssh_config(credentials), self.topology)
            .with_device_port(self.device_port)
    }

    /// Orchestrator tunables.
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            max_concurrent: self.max_concurrent,
            bootstrap_timeout: Duration::from_secs(self.bootstrap_timeout_secs),
            bootstrap_attempts: self.bootstrap_attempts,
            command_delay: Duration::from_millis(self.command_delay_ms),
            launch_batch: self.launch_batch,
            launch_pause: Duration::from_millis(self.launch_pause_ms),
            unknown_vendor_policy: self.unknown_vendor_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::io::Write;
    use tokio_test::assert_err;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_json(r#"{ "jump_host": { "host": "jump.example.net" } }"#).unwrap();
        assert_eq!(config.jump_host.port, 22);
        assert_eq!(config.topology, Topology::ShellHop);
        assert_eq!(config.max_concurrent, 20);
        assert_eq!(config.unknown_vendor_policy, UnknownVendorPolicy::Discard);
        assert_eq!(config.discard_set, PathBuf::from("discarded_ips.json"));

        let settings = config.run_settings();
        assert_eq!(settings.command_delay, Duration::from_secs(1));
        assert_eq!(settings.launch_pause, Duration::from_secs(3));
        assert_eq!(settings.launch_batch, 4);
    }

    #[test]
    fn test_full_config() {
        let text = r#"{
            "jump_host": {
                "host": "10.20.0.5",
                "port": 2222,
                "timeout_secs": 10,
                "host_key_verification": "strict",
                "known_hosts_path": "/etc/ctlsync/known_hosts"
            },
            "topology": "tunnel",
            "device_port": 830,
            "max_concurrent": 50,
            "unknown_vendor_policy": "review",
            "report_dir": "/var/lib/ctlsync/reports"
        }"#;
        let config = AppConfig::from_json(text).unwrap();
        assert_eq!(config.topology, Topology::Tunnel);
        assert_eq!(config.device_port, 830);
        assert_eq!(config.run_settings().max_concurrent, 50);
        assert_eq!(config.run_settings().unknown_vendor_policy, UnknownVendorPolicy::Review);

        let ssh = config.jump_ssh_config(Credentials::new("ops", "secret"));
        assert_eq!(ssh.socket_addr(), "10.20.0.5:2222");
        assert_eq!(ssh.timeout, Duration::from_secs(10));
        assert_eq!(ssh.host_key_verification, HostKeyVerification::Strict);
        assert_eq!(ssh.known_hosts_path, Some(PathBuf::from("/etc/ctlsync/known_hosts")));
    }

    #[test]
    fn test_missing_jump_host_rejected() {
        let err = assert_err!(AppConfig::from_json("{}"));
        assert!(matches!(err, Error::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let text = r#"{ "jump_host": { "host": "jump" }, "max_concurrent": 0 }"#;
        assert_err!(AppConfig::from_json(text));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = r#"{ "jump_host": { "host": "jump" }, "password": "x" }"#;
        let err = assert_err!(AppConfig::from_json(text));
        assert!(matches!(err, Error::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "jump_host": {{ "host": "jump" }}, "launch_batch": 2 }}"#).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.launch_batch, 2);

        let err = assert_err!(AppConfig::load("/nonexistent/ctlsync.json"));
        assert!(matches!(err, Error::Config(ConfigError::Read { .. })));
    }
}
