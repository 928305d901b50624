//! Login handshake and single-command exchange over a [`Transport`].
//!
//! A [`Session`] starts `Idle`, walks the bootstrap state machine until the
//! device prompt shows up, and from then on runs one command at a time.
//! `Failed` is terminal: a retry needs a fresh transport and a fresh session
//! (see [`connect_with_retry`]).

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use secrecy::{ExposeSecret, SecretString};
use tokio::time::Instant;

use super::command::CommandDescriptor;
use super::profile::Profile;
use super::response::Response;
use crate::channel::{CommandScan, CommandState, PatternBuffer, Signal};
use crate::error::{BootstrapFailure, ChannelError, DriverError, Error, Result};
use crate::transport::{Connector, Transport};

/// Password prompts answered per login attempt before giving up.
const MAX_CREDENTIAL_PROMPTS: usize = 2;

/// Budget for each terminal preparation command.
const ON_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Login progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Idle,
    AwaitingHostKeyOrPassword,
    AwaitingDevicePrompt,
    Ready,
    Failed(BootstrapFailure),
}

/// One interactive session with one device.
pub struct Session<T: Transport> {
    transport: T,
    buffer: PatternBuffer,
    profile: Arc<Profile>,
    state: BootstrapState,
    target: String,
    /// Prompt of the jump host shell, seen before the login started.
    jump_prompt: Option<String>,
}

impl<T: Transport> Session<T> {
    /// Wrap a freshly opened transport.
    pub fn new(transport: T, profile: Arc<Profile>, target: impl Into<String>) -> Self {
        Self {
            transport,
            buffer: PatternBuffer::default(),
            profile,
            state: BootstrapState::Idle,
            target: target.into(),
            jump_prompt: None,
        }
    }

    /// Current bootstrap state.
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Whether commands can be sent.
    pub fn is_ready(&self) -> bool {
        self.state == BootstrapState::Ready
    }

    /// Device address this session logs into.
    pub fn target(&self) -> &str {
        &self.target
    }

    fn fail(&mut self, reason: BootstrapFailure) -> Error {
        self.state = BootstrapState::Failed(reason);
        warn!("{}: login failed: {}", self.target, reason);
        DriverError::Bootstrap {
            target: self.target.clone(),
            reason,
        }
        .into()
    }

    async fn login_write(&mut self, data: &[u8]) -> Result<()> {
        match self.transport.write(data).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!("{}: write during login failed: {}", self.target, e);
                Err(self.fail(BootstrapFailure::Closed))
            }
        }
    }

    /// Drive the login handshake until the device prompt appears.
    ///
    /// Stale bytes (the jump host's banner and prompt) are discarded before
    /// the login starts. Host-key questions are answered `yes`; password
    /// prompts are answered at most [`MAX_CREDENTIAL_PROMPTS`] times.
    pub async fn bootstrap(&mut self, password: &SecretString, timeout: Duration) -> Result<()> {
        match self.state {
            BootstrapState::Ready => return Ok(()),
            BootstrapState::Idle => {}
            _ => return Err(DriverError::NotReady.into()),
        }

        let stale = self.transport.read_available();
        if !stale.is_empty() {
            debug!("{}: discarded {} stale bytes", self.target, stale.len());
            self.remember_jump_prompt(&stale);
        }
        self.buffer.clear();

        if let Err(e) = self.transport.initiate().await {
            debug!("{}: initiate failed: {}", self.target, e);
            return Err(self.fail(BootstrapFailure::Closed));
        }
        self.state = if self.transport.is_authenticated() {
            BootstrapState::AwaitingDevicePrompt
        } else {
            BootstrapState::AwaitingHostKeyOrPassword
        };

        let deadline = Instant::now() + timeout;
        let mut credential_prompts = 0;

        loop {
            let signal = self.profile.detector().login_signal(self.buffer.tail());
            match signal {
                Signal::PermissionDenied => return Err(self.fail(BootstrapFailure::AuthRejected)),
                Signal::Unreachable => return Err(self.fail(BootstrapFailure::Unreachable)),
                Signal::HostKeyConfirmation => {
                    debug!("{}: accepting host key", self.target);
                    self.buffer.clear();
                    self.login_write(b"yes\n").await?;
                }
                Signal::CredentialRequest => {
                    credential_prompts += 1;
                    if credential_prompts > MAX_CREDENTIAL_PROMPTS {
                        return Err(self.fail(BootstrapFailure::AuthRejected));
                    }
                    debug!("{}: sending password", self.target);
                    self.buffer.clear();
                    let line = format!("{}\n", password.expose_secret());
                    self.login_write(line.as_bytes()).await?;
                    self.state = BootstrapState::AwaitingDevicePrompt;
                }
                Signal::Prompt => {
                    let last = self.buffer.last_line();
                    // Back at the jump host shell: the inner ssh has exited.
                    if self.jump_prompt.as_deref() == Some(last) {
                        return Err(self.fail(BootstrapFailure::Unreachable));
                    }
                    // Before the password only the device's own prompt counts;
                    // anything else may still be the jump host.
                    let device = self.profile.detector().is_device_prompt(last);
                    if device || self.state == BootstrapState::AwaitingDevicePrompt {
                        break;
                    }
                }
                Signal::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.fail(BootstrapFailure::Timeout));
            }
            match self.transport.read_chunk(deadline - now).await {
                Ok(Some(chunk)) => self.buffer.extend(&chunk),
                Ok(None) => {}
                Err(Error::Channel(ChannelError::Closed)) => {
                    return Err(self.fail(BootstrapFailure::Closed));
                }
                Err(e) => {
                    self.state = BootstrapState::Failed(BootstrapFailure::Closed);
                    return Err(e);
                }
            }
        }

        self.state = BootstrapState::Ready;
        self.buffer.clear();
        info!("{}: session ready", self.target);
        self.prepare_terminal().await;
        Ok(())
    }

    /// Keep the jump host's prompt from the output that preceded the login.
    fn remember_jump_prompt(&mut self, stale: &[u8]) {
        let mut banner = PatternBuffer::default();
        banner.extend(stale);
        let last = banner.last_line();
        let detector = self.profile.detector();
        if detector.is_shell_prompt(last) && !detector.is_device_prompt(last) {
            debug!("{}: jump host prompt is '{}'", self.target, last);
            self.jump_prompt = Some(last.to_string());
        }
    }

    /// Send the platform's on-open commands. Failures only get logged.
    async fn prepare_terminal(&mut self) {
        let commands = self.profile.platform().on_open_commands.clone();
        for text in commands {
            let command = CommandDescriptor::any_prompt(text, ON_OPEN_TIMEOUT);
            match self.exchange(&command).await {
                Ok(response) if response.is_success() => {}
                Ok(_) => debug!("{}: '{}' not accepted", self.target, command.text),
                Err(e) => debug!("{}: '{}' failed: {}", self.target, command.text, e),
            }
        }
    }

    /// Send one command and wait until it completes, fails or times out.
    ///
    /// Completion, failure markers, timeout and a channel lost mid-command
    /// all produce a [`Response`] carrying whatever output arrived; only a
    /// failure to send the command is returned as an error.
    pub async fn exchange(&mut self, command: &CommandDescriptor) -> Result<Response> {
        if !self.is_ready() {
            return Err(DriverError::NotReady.into());
        }

        let stale = self.transport.read_available();
        if !stale.is_empty() {
            debug!("{}: flushed {} stale bytes", self.target, stale.len());
        }
        self.buffer.clear();

        debug!("{}: sending '{}'", self.target, command.text);
        let line = format!("{}\n", command.text);
        self.transport.write(line.as_bytes()).await?;

        let start = Instant::now();
        let deadline = start + command.timeout;
        let mut scan = CommandScan::default();
        loop {
            let state = self.profile.detector().advance(
                &mut scan,
                self.buffer.as_str(),
                &command.completion,
            );
            match state {
                CommandState::Complete => return Ok(self.response(command, start)),
                CommandState::Failed(marker) => {
                    let response = self.response(command, start);
                    let message = failure_line(&response.raw_result, &marker);
                    return Ok(response.with_failure(message));
                }
                CommandState::Pending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("{}: '{}' timed out", self.target, command.text);
                return Ok(self.response(command, start).with_timeout());
            }
            match self.transport.read_chunk(deadline - now).await {
                Ok(Some(chunk)) => self.buffer.extend(&chunk),
                Ok(None) => {}
                Err(e) => {
                    warn!("{}: '{}' interrupted: {}", self.target, command.text, e);
                    self.state = BootstrapState::Failed(BootstrapFailure::Closed);
                    return Ok(self.response(command, start).with_interruption(e.to_string()));
                }
            }
        }
    }

    fn response(&mut self, command: &CommandDescriptor, start: Instant) -> Response {
        let raw = self.buffer.take();
        let result = self.profile.platform().normalize_output(&raw, &command.text);
        Response::new(&command.text, result, raw, start.elapsed())
    }

    /// Close the underlying transport. Safe to call more than once.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("buffer", &self.buffer)
            .finish()
    }
}

/// The output line carrying `marker`, or the marker itself.
fn failure_line(raw: &str, marker: &str) -> String {
    raw.lines()
        .find(|line| line.contains(marker))
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| marker.to_string())
}

/// Open a transport and bootstrap a session, retrying with a fresh
/// transport up to `attempts` times. Rejected credentials are not retried.
pub async fn connect_with_retry<C: Connector>(
    connector: &C,
    profile: &Arc<Profile>,
    address: &str,
    password: &SecretString,
    timeout: Duration,
    attempts: usize,
) -> Result<Session<C::Transport>> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let transport = match connector.connect(address).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!("{}: connect attempt {}/{} failed: {}", address, attempt, attempts, e);
                last_error = Some(e);
                continue;
            }
        };

        let mut session = Session::new(transport, Arc::clone(profile), address);
        match session.bootstrap(password, timeout).await {
            Ok(()) => return Ok(session),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!("{}: close after failed login: {}", address, close_err);
                }
                let rejected = matches!(
                    session.state(),
                    BootstrapState::Failed(BootstrapFailure::AuthRejected)
                );
                last_error = Some(e);
                if rejected {
                    break;
                }
                if attempt < attempts {
                    info!("{}: retrying login ({}/{})", address, attempt + 1, attempts);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        DriverError::Bootstrap {
            target: address.to_string(),
            reason: BootstrapFailure::Closed,
        }
        .into()
    }))
}
