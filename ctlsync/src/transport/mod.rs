//! Byte-stream transports to a device behind the jump host.
//!
//! Both topologies end up as an interactive shell byte stream wrapped in a
//! [`StreamTransport`]; what differs is how that stream is obtained and what
//! [`Transport::initiate`] sends into it. See [`SshConnector`].

pub mod config;
mod connector;
mod ssh;
mod stream;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

pub use config::{Credentials, HostKeyVerification, SshConfig, Topology};
pub use connector::{Connector, SshConnector};
pub use ssh::SshTransport;
pub use stream::StreamTransport;

/// Read/write contract shared by every topology.
pub trait Transport: Send {
    /// Start the login towards the device (types `ssh <target>` for the
    /// shell-hop topology; nudges the device shell for the tunnel topology).
    fn initiate(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the device already authenticated this transport at the
    /// protocol level, so no credential prompt is expected.
    fn is_authenticated(&self) -> bool;

    /// Send raw bytes. Fails with `ChannelError::Closed` after close.
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Everything received so far without waiting; may be empty.
    fn read_available(&mut self) -> Bytes;

    /// Wait up to `wait` for the next chunk. `Ok(None)` when nothing arrived,
    /// `ChannelError::Closed` once the remote end has hung up.
    fn read_chunk(&mut self, wait: Duration) -> impl Future<Output = Result<Option<Bytes>>> + Send;

    /// Close the transport. Safe to call more than once.
    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether `close` has been called or the remote end hung up.
    fn is_closed(&self) -> bool;
}
