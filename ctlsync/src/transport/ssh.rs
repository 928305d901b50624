//! SSH transport implementation using russh.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use russh::client::{self, Handle, Msg};
use russh::keys::PublicKey;
use russh::{Channel, ChannelStream};
use secrecy::ExposeSecret;
use tokio::io::{AsyncRead, AsyncWrite};

use super::config::{HostKeyVerification, SshConfig};
use crate::error::{Result, TransportError};

/// One authenticated SSH session (jump host, or device through a tunnel).
pub struct SshTransport {
    /// The russh session handle.
    session: Handle<SshHandler>,

    /// Configuration used for this connection.
    config: SshConfig,
}

impl SshTransport {
    /// Connect over TCP and authenticate.
    pub async fn connect(config: SshConfig) -> Result<Self> {
        let handler = SshHandler::new(&config);
        let host_key_error = handler.host_key_error.clone();

        let session = tokio::time::timeout(
            config.timeout,
            client::connect(
                Self::client_config(&config),
                (config.host.as_str(), config.port),
                handler,
            ),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| Self::connect_error(&host_key_error, e))?;

        Self::authenticated(session, config).await
    }

    /// Connect through an already-open byte stream (a `direct-tcpip`
    /// channel on the jump host) and authenticate.
    pub async fn connect_stream<S>(stream: S, config: SshConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let handler = SshHandler::new(&config);
        let host_key_error = handler.host_key_error.clone();

        let session = tokio::time::timeout(
            config.timeout,
            client::connect_stream(Self::client_config(&config), stream, handler),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(|e| Self::connect_error(&host_key_error, e))?;

        Self::authenticated(session, config).await
    }

    fn client_config(config: &SshConfig) -> Arc<client::Config> {
        Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(config.timeout),
            ..Default::default()
        })
    }

    /// Prefer the detailed host-key error stored by the handler over the
    /// generic russh error it causes.
    fn connect_error(
        host_key_error: &Arc<Mutex<Option<TransportError>>>,
        e: russh::Error,
    ) -> TransportError {
        host_key_error
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .unwrap_or(TransportError::Ssh(e))
    }

    async fn authenticated(mut session: Handle<SshHandler>, config: SshConfig) -> Result<Self> {
        let creds = &config.credentials;
        let success = tokio::time::timeout(
            config.timeout,
            session.authenticate_password(&creds.username, creds.password.expose_secret()),
        )
        .await
        .map_err(|_| TransportError::Timeout(config.timeout))?
        .map_err(TransportError::Ssh)?
        .success();

        if !success {
            return Err(TransportError::AuthenticationFailed {
                user: creds.username.clone(),
            }
            .into());
        }

        debug!("authenticated to {} as {}", config.socket_addr(), creds.username);
        Ok(Self { session, config })
    }

    /// Open a PTY shell channel on this connection, as a byte stream.
    pub async fn open_shell(&self) -> Result<ChannelStream<Msg>> {
        let channel = self
            .session
            .channel_open_session()
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_pty(
                true,
                "xterm",
                self.config.terminal_width,
                self.config.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(TransportError::Ssh)?;

        channel
            .request_shell(true)
            .await
            .map_err(TransportError::Ssh)?;

        Ok(channel.into_stream())
    }

    /// Open a `direct-tcpip` channel to `host:port` through this connection.
    pub async fn open_tunnel(&self, host: &str, port: u16) -> Result<Channel<Msg>> {
        let channel = self
            .session
            .channel_open_direct_tcpip(host, u32::from(port), "127.0.0.1", 0)
            .await
            .map_err(TransportError::Ssh)?;
        Ok(channel)
    }

    /// The host this session is connected to.
    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Close the connection.
    pub async fn close(self) -> Result<()> {
        self.session
            .disconnect(russh::Disconnect::ByApplication, "", "en")
            .await
            .map_err(TransportError::Ssh)?;
        Ok(())
    }
}

/// SSH client handler for russh.
struct SshHandler {
    host: String,
    port: u16,
    host_key_verification: HostKeyVerification,
    known_hosts_path: Option<PathBuf>,
    /// Stores a detailed host-key error so connect() can surface it
    /// instead of the generic russh::Error::UnknownKey.
    host_key_error: Arc<Mutex<Option<TransportError>>>,
}

impl SshHandler {
    fn new(config: &SshConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            host_key_verification: config.host_key_verification,
            known_hosts_path: config.known_hosts_path.clone(),
            host_key_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Check the host key against known_hosts.
    ///
    /// Returns `Ok(true)` if matched, `Ok(false)` if host not found,
    /// `Err(TransportError::HostKeyChanged)` if key changed.
    fn check_known_hosts(&self, pubkey: &PublicKey) -> std::result::Result<bool, TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::check_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::check_known_hosts(&self.host, self.port, pubkey)
        };

        match result {
            Ok(matched) => Ok(matched),
            Err(russh::keys::Error::KeyChanged { line }) => Err(TransportError::HostKeyChanged {
                host: self.host.clone(),
                port: self.port,
                line,
            }),
            Err(e) => Err(TransportError::KnownHosts(e.to_string())),
        }
    }

    /// Save a new host key to known_hosts.
    fn learn_host_key(&self, pubkey: &PublicKey) -> std::result::Result<(), TransportError> {
        let result = if let Some(ref path) = self.known_hosts_path {
            russh::keys::known_hosts::learn_known_hosts_path(&self.host, self.port, pubkey, path)
        } else {
            russh::keys::known_hosts::learn_known_hosts(&self.host, self.port, pubkey)
        };

        result.map_err(|e| TransportError::KnownHosts(e.to_string()))
    }

    fn reject(&self, error: TransportError) -> bool {
        if let Ok(mut slot) = self.host_key_error.lock() {
            *slot = Some(error);
        }
        false
    }
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match self.host_key_verification {
            HostKeyVerification::Disabled => Ok(true),

            HostKeyVerification::AcceptNew => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => {
                    if let Err(e) = self.learn_host_key(server_public_key) {
                        warn!("Failed to save host key for {}: {}", self.host, e);
                    }
                    Ok(true)
                }
                Err(e) => Ok(self.reject(e)),
            },

            HostKeyVerification::Strict => match self.check_known_hosts(server_public_key) {
                Ok(true) => Ok(true),
                Ok(false) => Ok(self.reject(TransportError::HostKeyUnknown {
                    host: self.host.clone(),
                    port: self.port,
                })),
                Err(e) => Ok(self.reject(e)),
            },
        }
    }
}
