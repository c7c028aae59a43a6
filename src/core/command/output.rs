//! Output writer handed to command handlers

use bytes::BytesMut;
use std::fmt;

/// Buffered writer bound to the resolved destination stream
///
/// Lives for one command invocation. The engine flushes it to the destination
/// after the handler and the session's result handler have run.
#[derive(Debug)]
pub struct Output {
    source: String,
    destination: String,
    buffer: BytesMut,
}

impl Output {
    /// Create a writer for a command issued by `source`, targeting `destination`
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Input name of the session the command runs for
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Output stream name the text goes to
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Append text as is
    pub fn write(&mut self, text: impl AsRef<str>) {
        self.buffer.extend_from_slice(text.as_ref().as_bytes());
    }

    /// Append text followed by a newline
    pub fn println(&mut self, text: impl AsRef<str>) {
        self.write(text);
        self.buffer.extend_from_slice(b"\n");
    }

    /// Buffered text so far
    pub fn contents(&self) -> &[u8] {
        &self.buffer
    }

    /// Check if nothing was written
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the buffered bytes, leaving the writer empty
    pub fn take(&mut self) -> BytesMut {
        self.buffer.split()
    }
}

impl fmt::Write for Output {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s);
        Ok(())
    }
}
