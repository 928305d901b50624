//! Error types for ctlsync.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for ctlsync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Session driver errors (bootstrap, command execution)
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Platform/vendor errors
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Inventory, discard set, transcript and report storage errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether this error means the device could not be reached or logged into.
    pub fn is_connection(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Channel(ChannelError::Closed) => true,
            Error::Driver(DriverError::Bootstrap { .. }) => true,
            _ => false,
        }
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// The jump host could not be reached; no device work is possible
    #[error("Jump host {host}:{port} unreachable: {reason}")]
    JumpHostUnreachable {
        host: String,
        port: u16,
        reason: String,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key not present in known_hosts (strict mode)
    #[error("Unknown host key for {host}:{port}")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key does not match the known_hosts entry
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Write attempted on a closed channel, or the remote end hung up
    #[error("Channel closed")]
    Closed,

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Why a login attempt ended in the `Failed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapFailure {
    /// No device prompt within the bootstrap timeout.
    Timeout,
    /// The device refused the credentials.
    AuthRejected,
    /// The jump host could not route to the device.
    Unreachable,
    /// The channel closed during login.
    Closed,
}

impl fmt::Display for BootstrapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BootstrapFailure::Timeout => "timed out waiting for device prompt",
            BootstrapFailure::AuthRejected => "authentication rejected",
            BootstrapFailure::Unreachable => "device unreachable from jump host",
            BootstrapFailure::Closed => "channel closed during login",
        };
        f.write_str(s)
    }
}

/// Driver layer errors (login handshake, command execution).
#[derive(Error, Debug)]
pub enum DriverError {
    /// Login to the device did not reach a prompt
    #[error("Login to {target} failed: {reason}")]
    Bootstrap {
        target: String,
        reason: BootstrapFailure,
    },

    /// Session used before reaching the `Ready` state
    #[error("Session not ready - bootstrap first")]
    NotReady,

    /// No completion signal within the command's budget
    #[error("Command '{command}' did not complete within {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    /// Explicit error marker or missing completion marker
    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// A multi-step sequence stopped at its first failing step
    #[error("Sequence aborted at '{command}': {message}")]
    SequenceAborted { command: String, message: String },
}

/// Platform/vendor definition errors.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// Invalid platform definition
    #[error("Invalid platform definition: {message}")]
    InvalidDefinition { message: String },
}

/// Storage errors for the external collaborators (inventory, discard set,
/// transcripts, reports).
#[derive(Error, Debug)]
pub enum StoreError {
    /// File could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File contents were not valid JSON for the expected shape
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Requested tier is not in the inventory
    #[error("Unknown tier '{name}'")]
    UnknownTier { name: String },

    /// Selection yielded no devices
    #[error("No devices found for selection '{selection}'")]
    EmptySelection { selection: String },

    /// A shared lock was poisoned by a panicking writer
    #[error("Lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file could not be parsed
    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value is out of range
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// Password was not supplied
    #[error("No password supplied")]
    MissingPassword,
}

/// Result type alias using ctlsync's Error.
pub type Result<T> = std::result::Result<T, Error>;
