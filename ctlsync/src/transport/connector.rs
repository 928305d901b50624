//! Opening device transports through the jump host.

use std::future::Future;

use log::{debug, info};

use super::Transport;
use super::config::{SshConfig, Topology};
use super::ssh::SshTransport;
use super::stream::StreamTransport;
use crate::error::{Result, TransportError};

/// Produces fresh transports to devices.
pub trait Connector: Send + Sync {
    /// Transport type handed to sessions.
    type Transport: Transport + 'static;

    /// Check the jump host is reachable at all.
    fn check_jump_host(&self) -> impl Future<Output = Result<()>> + Send;

    /// Open a new transport to the device at `address`.
    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Connects to devices through an SSH jump host.
#[derive(Debug, Clone)]
pub struct SshConnector {
    jump: SshConfig,
    topology: Topology,
    device_port: u16,
}

impl SshConnector {
    /// Create a connector for the given jump host.
    pub fn new(jump: SshConfig, topology: Topology) -> Self {
        Self {
            jump,
            topology,
            device_port: 22,
        }
    }

    /// SSH port on the devices.
    pub fn with_device_port(mut self, port: u16) -> Self {
        self.device_port = port;
        self
    }

    /// The jump host configuration.
    pub fn jump(&self) -> &SshConfig {
        &self.jump
    }

    /// The `ssh` line typed into the jump host shell.
    fn login_command(&self, address: &str) -> String {
        if self.device_port == 22 {
            format!("ssh {address}")
        } else {
            format!("ssh -p {} {address}", self.device_port)
        }
    }

    async fn connect_shell_hop(&self, address: &str) -> Result<StreamTransport> {
        let jump = SshTransport::connect(self.jump.clone()).await?;
        let shell = jump.open_shell().await?;
        debug!("jump host shell open for {}", address);
        Ok(StreamTransport::new(shell)
            .with_login_command(self.login_command(address))
            .with_session(jump))
    }

    async fn connect_tunnel(&self, address: &str) -> Result<StreamTransport> {
        let jump = SshTransport::connect(self.jump.clone()).await?;
        let channel = jump.open_tunnel(address, self.device_port).await?;
        debug!("tunnel open to {}:{}", address, self.device_port);

        let target = self.jump.for_target(address, self.device_port);
        let device = SshTransport::connect_stream(channel.into_stream(), target).await?;
        let shell = device.open_shell().await?;
        Ok(StreamTransport::new(shell)
            .with_session(jump)
            .with_session(device))
    }
}

impl Connector for SshConnector {
    type Transport = StreamTransport;

    async fn check_jump_host(&self) -> Result<()> {
        let unreachable = |reason: String| TransportError::JumpHostUnreachable {
            host: self.jump.host.clone(),
            port: self.jump.port,
            reason,
        };

        let session = SshTransport::connect(self.jump.clone())
            .await
            .map_err(|e| unreachable(e.to_string()))?;
        info!("Jump host {} reachable", self.jump.socket_addr());
        session.close().await.map_err(|e| unreachable(e.to_string()))?;
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<StreamTransport> {
        match self.topology {
            Topology::ShellHop => self.connect_shell_hop(address).await,
            Topology::Tunnel => self.connect_tunnel(address).await,
        }
    }
}
