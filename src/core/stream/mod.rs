//! Stream layer for line-oriented command channels
//!
//! Supports:
//! - In-process pipes
//! - Files
//! - Standard input/output
//! - TCP sockets
//! - Serial ports
//!
//! Every transport ends up as a [`Stream`] behind a [`SharedStream`] so that a
//! duplex channel can be mounted under an input name and an output name at
//! the same time.

mod registry;

pub use registry::{Direction, RegistryError, StreamRegistry, Unmounted};

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Handle shared between the registries and the sessions that own it
pub type SharedStream = Arc<tokio::sync::Mutex<Box<dyn Stream>>>;

/// Wrap a stream into a shareable handle
pub fn shared(stream: impl Stream + 'static) -> SharedStream {
    Arc::new(tokio::sync::Mutex::new(Box::new(stream)))
}

/// Kind of transport behind a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// In-process pipe
    Pipe,
    /// Regular file
    File,
    /// Process standard input/output
    Stdio,
    /// TCP socket
    Tcp,
    /// Serial port
    Serial,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe => write!(f, "Pipe"),
            Self::File => write!(f, "File"),
            Self::Stdio => write!(f, "Stdio"),
            Self::Tcp => write!(f, "TCP"),
            Self::Serial => write!(f, "Serial"),
        }
    }
}

/// Stream error types
#[derive(Error, Debug)]
pub enum StreamError {
    /// Stream was already closed
    #[error("Stream closed")]
    Closed,

    /// Stream has no read side
    #[error("Stream is not readable: {0}")]
    NotReadable(String),

    /// Stream has no write side
    #[error("Stream is not writable: {0}")]
    NotWritable(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StreamError {
    /// Whether the error means the peer went away rather than the stream being broken
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
            ),
            Self::NotReadable(_) | Self::NotWritable(_) => false,
        }
    }
}

/// Line-oriented byte channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Stream: Send {
    /// Wait until a line can be read or the peer has hung up
    ///
    /// Must be cancel safe: dropping the future may not lose buffered data.
    async fn readable(&mut self) -> Result<(), StreamError>;

    /// Read one line including its terminator, `None` at end of stream
    async fn read_line(&mut self) -> Result<Option<String>, StreamError>;

    /// Write and flush formatted output
    async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError>;

    /// Release the underlying transport; closing twice is a no-op
    async fn close(&mut self) -> Result<(), StreamError>;

    /// Check if closed
    fn is_closed(&self) -> bool;

    /// Get transport kind
    fn kind(&self) -> StreamKind;

    /// Get a human readable description of the endpoint
    fn describe(&self) -> String;
}

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Stream over arbitrary async read and write halves
///
/// Bytes are collected in `pending` until a full line is there, so a peer
/// that stops mid-line never makes [`Stream::read_line`] wait on the wire.
pub struct IoStream {
    kind: StreamKind,
    info: String,
    reader: Option<BoxedReader>,
    writer: Option<BoxedWriter>,
    pending: BytesMut,
    eof: bool,
    closed: bool,
}

impl std::fmt::Debug for IoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoStream")
            .field("kind", &self.kind)
            .field("info", &self.info)
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("pending", &self.pending)
            .field("eof", &self.eof)
            .field("closed", &self.closed)
            .finish()
    }
}

impl IoStream {
    /// Build a stream from optional read and write halves
    pub fn new(
        kind: StreamKind,
        info: impl Into<String>,
        reader: Option<BoxedReader>,
        writer: Option<BoxedWriter>,
    ) -> Self {
        Self {
            kind,
            info: info.into(),
            reader,
            writer,
            pending: BytesMut::new(),
            eof: false,
            closed: false,
        }
    }

    /// Build a read/write stream
    pub fn duplex<R, W>(kind: StreamKind, info: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::new(kind, info, Some(Box::new(reader)), Some(Box::new(writer)))
    }

    /// Build a read-only stream
    pub fn reader<R>(kind: StreamKind, info: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::new(kind, info, Some(Box::new(reader)), None)
    }

    /// Build a write-only stream
    pub fn writer<W>(kind: StreamKind, info: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::new(kind, info, None, Some(Box::new(writer)))
    }

    fn line_buffered(&self) -> bool {
        self.eof || self.pending.contains(&b'\n')
    }

    fn take_line(&mut self) -> Option<String> {
        let end = match self.pending.iter().position(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None if self.eof && !self.pending.is_empty() => self.pending.len(),
            None => return None,
        };
        let line = self.pending.split_to(end);
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[async_trait]
impl Stream for IoStream {
    async fn readable(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| StreamError::NotReadable(self.info.clone()))?;
        // read_buf only appends what it returned, so dropping this future keeps every byte
        while !(self.eof || self.pending.contains(&b'\n')) {
            if reader.read_buf(&mut self.pending).await? == 0 {
                self.eof = true;
            }
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>, StreamError> {
        if !self.line_buffered() {
            self.readable().await?;
        } else if self.closed {
            return Err(StreamError::Closed);
        } else if self.reader.is_none() {
            return Err(StreamError::NotReadable(self.info.clone()));
        }
        Ok(self.take_line())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| StreamError::NotWritable(self.info.clone()))?;
        writer.write_all(data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader = None;
        self.pending.clear();
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn describe(&self) -> String {
        format!("{} {}", self.kind, self.info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_lines_until_eof() {
        let mock = tokio_test::io::Builder::new()
            .read(b"led 1\r\nwel")
            .read(b"come -q\n")
            .build();
        let mut stream = IoStream::reader(StreamKind::Pipe, "mock", mock);

        stream.readable().await.unwrap();
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("led 1\r\n"));
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("welcome -q\n"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_partial_line_is_not_readable() {
        let (mut peer, local) = tokio::io::duplex(64);
        let mut stream = IoStream::reader(StreamKind::Pipe, "pipe", local);

        peer.write_all(b"gre").await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), stream.readable()).await;
        assert!(waited.is_err(), "half a line must not count as readable");

        peer.write_all(b"et -q\nled").await.unwrap();
        stream.readable().await.unwrap();
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("greet -q\n"));

        drop(peer);
        stream.readable().await.unwrap();
        assert_eq!(stream.read_line().await.unwrap().as_deref(), Some("led"));
        assert_eq!(stream.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_decoded_lossily() {
        let mock = tokio_test::io::Builder::new().read(b"caf\xff\n").build();
        let mut stream = IoStream::reader(StreamKind::Pipe, "mock", mock);

        let line = stream.read_line().await.unwrap().unwrap();
        assert_eq!(line, "caf\u{fffd}\n");
    }

    #[tokio::test]
    async fn test_write_only_stream_rejects_reads() {
        let (_peer, local) = tokio::io::duplex(64);
        let mut stream = IoStream::writer(StreamKind::Pipe, "sink", local);

        assert!(matches!(stream.read_line().await, Err(StreamError::NotReadable(_))));
        stream.write_all(b"ok\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (_peer, local) = tokio::io::duplex(64);
        let (r, w) = tokio::io::split(local);
        let mut stream = IoStream::duplex(StreamKind::Pipe, "pipe", r, w);

        stream.close().await.unwrap();
        stream.close().await.unwrap();
        assert!(stream.is_closed());
        assert!(matches!(stream.write_all(b"x").await, Err(StreamError::Closed)));
    }

    #[test]
    fn test_disconnect_classification() {
        assert!(StreamError::Closed.is_disconnect());
        assert!(StreamError::Io(io::ErrorKind::ConnectionReset.into()).is_disconnect());
        assert!(!StreamError::Io(io::ErrorKind::InvalidInput.into()).is_disconnect());
        assert!(!StreamError::NotReadable("x".into()).is_disconnect());
    }
}
