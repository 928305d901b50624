//! Shell stream transport fed by a background reader task.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use super::Transport;
use super::ssh::SshTransport;
use crate::error::{ChannelError, Result, TransportError};

/// Chunks buffered between the reader task and the session.
const CHUNK_QUEUE: usize = 256;

/// Read size for the reader task.
const READ_SIZE: usize = 8192;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An interactive shell stream plus the SSH sessions it depends on.
///
/// A reader task drains the stream into a bounded queue so the session
/// can wait on it with a deadline instead of polling.
pub struct StreamTransport {
    writer: BoxedWriter,
    chunks: mpsc::Receiver<Bytes>,
    reader: JoinHandle<()>,

    /// Line typed by [`Transport::initiate`].
    login_command: Option<String>,

    /// Sessions kept alive for the stream's lifetime, closed in reverse order.
    sessions: Vec<SshTransport>,

    closed: bool,
    eof: bool,
}

impl StreamTransport {
    /// Wrap a bidirectional byte stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half): (_, WriteHalf<S>) = tokio::io::split(stream);
        let (tx, chunks) = mpsc::channel(CHUNK_QUEUE);

        let reader = tokio::spawn(async move {
            let mut read_half = read_half;
            let mut buf = BytesMut::with_capacity(READ_SIZE);
            loop {
                buf.reserve(READ_SIZE);
                match read_half.read_buf(&mut buf).await {
                    Ok(0) => {
                        debug!("stream reached EOF");
                        break;
                    }
                    Ok(_) => {
                        if tx.send(buf.split().freeze()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("stream read failed: {}", e);
                        break;
                    }
                }
            }
        });

        Self {
            writer: Box::new(write_half),
            chunks,
            reader,
            login_command: None,
            sessions: Vec::new(),
            closed: false,
            eof: false,
        }
    }

    /// Line to type into the stream when the login starts.
    pub fn with_login_command(mut self, command: impl Into<String>) -> Self {
        self.login_command = Some(command.into());
        self
    }

    /// Keep an SSH session alive until this transport is closed.
    pub fn with_session(mut self, session: SshTransport) -> Self {
        self.sessions.push(session);
        self
    }

    fn write_error(e: io::Error) -> crate::error::Error {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::UnexpectedEof => ChannelError::Closed.into(),
            _ => TransportError::Io(e).into(),
        }
    }
}

impl Transport for StreamTransport {
    async fn initiate(&mut self) -> Result<()> {
        let line = match &self.login_command {
            Some(command) => format!("{command}\n"),
            None => "\n".to_string(),
        };
        self.write(line.as_bytes()).await
    }

    fn is_authenticated(&self) -> bool {
        self.login_command.is_none()
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(ChannelError::Closed.into());
        }
        self.writer.write_all(data).await.map_err(Self::write_error)?;
        self.writer.flush().await.map_err(Self::write_error)?;
        Ok(())
    }

    fn read_available(&mut self) -> Bytes {
        let mut out = BytesMut::new();
        loop {
            match self.chunks.try_recv() {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.eof = true;
                    break;
                }
            }
        }
        out.freeze()
    }

    async fn read_chunk(&mut self, wait: Duration) -> Result<Option<Bytes>> {
        if self.closed || self.eof {
            return Err(ChannelError::Closed.into());
        }
        match tokio::time::timeout(wait, self.chunks.recv()).await {
            Ok(Some(chunk)) => Ok(Some(chunk)),
            Ok(None) => {
                self.eof = true;
                Err(ChannelError::Closed.into())
            }
            Err(_) => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.writer.shutdown().await {
            debug!("stream shutdown: {}", e);
        }
        self.reader.abort();

        while let Some(session) = self.sessions.pop() {
            let host = session.host().to_string();
            if let Err(e) = session.close().await {
                warn!("Failed to close SSH session to {}: {}", host, e);
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed || self.eof
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
