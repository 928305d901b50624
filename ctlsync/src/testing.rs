//! Scripted fakes for driver and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::time::Instant;

use crate::error::{ChannelError, Result, TransportError};
use crate::transport::{Connector, Transport};

/// What a fake device prints in answer to each line it receives.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    prompt: String,
    replies: HashMap<String, String>,
    latency: Duration,
    hang_up_after: Option<String>,
}

impl Script {
    /// Unscripted lines are echoed and answered with `prompt`.
    pub(crate) fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            replies: HashMap::new(),
            latency: Duration::from_millis(10),
            hang_up_after: None,
        }
    }

    /// Answer `line` with exactly `reply`.
    pub(crate) fn on(mut self, line: impl Into<String>, reply: impl Into<String>) -> Self {
        self.replies.insert(line.into(), reply.into());
        self
    }

    /// Answer `command` with its echo, `output` and the prompt.
    pub(crate) fn on_command(self, command: &str, output: &str) -> Self {
        let reply = format!("{command}\n{output}\n{}", self.prompt);
        self.on(command, reply)
    }

    /// Close the stream after answering `line`.
    pub(crate) fn hang_up_after(mut self, line: impl Into<String>) -> Self {
        self.hang_up_after = Some(line.into());
        self
    }

    fn reply(&self, line: &str) -> String {
        match self.replies.get(line) {
            Some(reply) => reply.clone(),
            None => format!("{line}\n{}", self.prompt),
        }
    }
}

/// In-memory [`Transport`] replaying a [`Script`] on tokio's clock.
pub(crate) struct FakeTransport {
    script: Script,
    login_command: Option<String>,
    queue: VecDeque<(Instant, Bytes)>,
    hang_up_at: Option<Instant>,
    sent: Arc<Mutex<Vec<String>>>,
    open: Option<Arc<AtomicUsize>>,
    closed: bool,
}

impl FakeTransport {
    pub(crate) fn new(script: Script) -> Self {
        Self {
            script,
            login_command: None,
            queue: VecDeque::new(),
            hang_up_at: None,
            sent: Arc::new(Mutex::new(Vec::new())),
            open: None,
            closed: false,
        }
    }

    /// Behave like the shell-hop topology.
    pub(crate) fn with_login_command(mut self, command: impl Into<String>) -> Self {
        self.login_command = Some(command.into());
        self
    }

    /// Bytes already waiting before the session starts.
    pub(crate) fn with_pending_output(mut self, text: &str) -> Self {
        self.queue
            .push_back((Instant::now(), Bytes::copy_from_slice(text.as_bytes())));
        self
    }

    /// Lines written so far (password lines included).
    pub(crate) fn sent(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.sent)
    }

    fn with_open_counter(mut self, open: Arc<AtomicUsize>) -> Self {
        self.open = Some(open);
        self
    }

    fn hung_up(&self) -> bool {
        self.queue.is_empty() && self.hang_up_at.is_some_and(|at| at <= Instant::now())
    }

    fn release(&mut self) {
        if let Some(open) = self.open.take() {
            open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Transport for FakeTransport {
    async fn initiate(&mut self) -> Result<()> {
        let line = format!("{}\n", self.login_command.clone().unwrap_or_default());
        self.write(line.as_bytes()).await
    }

    fn is_authenticated(&self) -> bool {
        self.login_command.is_none()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed || self.hung_up() {
            return Err(ChannelError::Closed.into());
        }
        let text = String::from_utf8_lossy(data).into_owned();
        for line in text.split_terminator('\n') {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(line.to_string());
            }
            let ready = self.queue.back().map(|(at, _)| *at);
            let due = (Instant::now() + self.script.latency).max(ready.unwrap_or_else(Instant::now));
            let reply = self.script.reply(line);
            self.queue.push_back((due, Bytes::from(reply)));
            if self.script.hang_up_after.as_deref() == Some(line) {
                self.hang_up_at = Some(due);
            }
        }
        Ok(())
    }

    fn read_available(&mut self) -> Bytes {
        let now = Instant::now();
        let mut out = BytesMut::new();
        while self.queue.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, chunk)) = self.queue.pop_front() {
                out.extend_from_slice(&chunk);
            }
        }
        out.freeze()
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<Option<Bytes>> {
        if self.closed {
            return Err(ChannelError::Closed.into());
        }
        let limit = Instant::now() + wait;
        if let Some(at) = self.queue.front().map(|(at, _)| *at) {
            if at <= limit {
                tokio::time::sleep_until(at).await;
                return Ok(self.queue.pop_front().map(|(_, chunk)| chunk));
            }
        } else if let Some(at) = self.hang_up_at {
            if at <= limit {
                tokio::time::sleep_until(at).await;
                return Err(ChannelError::Closed.into());
            }
        }
        tokio::time::sleep_until(limit).await;
        Ok(None)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.release();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || self.hung_up()
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.release();
    }
}

/// [`Connector`] handing out [`FakeTransport`]s and counting open ones.
#[derive(Default)]
pub(crate) struct FakeConnector {
    devices: Mutex<HashMap<String, VecDeque<Script>>>,
    sent: Mutex<HashMap<String, Vec<Arc<Mutex<Vec<String>>>>>>,
    open: Arc<AtomicUsize>,
    max_open: AtomicUsize,
    connects: AtomicUsize,
    jump_host_down: bool,
}

impl FakeConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a script for `address`; each connect takes the next one, the
    /// last one is reused.
    pub(crate) fn with_device(self, address: &str, script: Script) -> Self {
        if let Ok(mut devices) = self.devices.lock() {
            devices.entry(address.to_string()).or_default().push_back(script);
        }
        self
    }

    /// Make `check_jump_host` fail.
    pub(crate) fn with_jump_host_down(mut self) -> Self {
        self.jump_host_down = true;
        self
    }

    pub(crate) fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn open_sessions(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub(crate) fn max_open_sessions(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    /// Every line sent to `address`, across all connections.
    pub(crate) fn sent_to(&self, address: &str) -> Vec<String> {
        let sent = self.sent.lock().unwrap();
        sent.get(address)
            .map(|logs| {
                logs.iter()
                    .flat_map(|log| log.lock().unwrap().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn next_script(&self, address: &str) -> Option<Script> {
        let mut devices = self.devices.lock().ok()?;
        let queue = devices.get_mut(address)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

impl Connector for FakeConnector {
    type Transport = FakeTransport;

    async fn check_jump_host(&self) -> Result<()> {
        if self.jump_host_down {
            return Err(TransportError::JumpHostUnreachable {
                host: "jump.test".into(),
                port: 22,
                reason: "connection refused".into(),
            }
            .into());
        }
        Ok(())
    }

    async fn connect(&self, address: &str) -> Result<FakeTransport> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self
            .next_script(address)
            .ok_or(TransportError::Disconnected)?;

        let now_open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_open.fetch_max(now_open, Ordering::SeqCst);

        let transport = FakeTransport::new(script)
            .with_login_command(format!("ssh {address}"))
            .with_open_counter(Arc::clone(&self.open));
        if let Ok(mut sent) = self.sent.lock() {
            sent.entry(address.to_string()).or_default().push(transport.sent());
        }
        Ok(transport)
    }
}
