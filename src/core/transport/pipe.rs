//! In-process pipe transport

use crate::core::stream::{IoStream, StreamKind};
use tokio::io::DuplexStream;

/// Create a connected pipe
///
/// The first half is mounted into the engine, the second is the peer that
/// writes commands and reads results.
pub fn pair(name: &str, capacity: usize) -> (IoStream, DuplexStream) {
    let (local, peer) = tokio::io::duplex(capacity);
    let (reader, writer) = tokio::io::split(local);
    (IoStream::duplex(StreamKind::Pipe, name, reader, writer), peer)
}
