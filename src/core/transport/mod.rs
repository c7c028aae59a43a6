//! Transport adapters producing sessions for the engine
//!
//! Supports:
//! - In-process pipes
//! - Command files
//! - Standard input/output
//! - TCP clients and listening servers
//! - Serial ports

pub mod file;
pub mod pipe;
pub mod serial;
pub mod stdio;
pub mod tcp;

pub use serial::{SerialConfig, SerialFlowControl, SerialParity};
pub use tcp::{TcpConfig, TcpServer, TcpServerConfig};

use super::dispatch::Engine;
use super::session::SessionError;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Listening socket could not be bound
    #[error("Cannot bind {addr}: {source}")]
    Bind {
        /// Requested address
        addr: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Accepted session could not be registered
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Source of new sessions, polled between dispatch iterations
pub trait Acceptor: Send {
    /// Register at most one new session without blocking
    ///
    /// Returns the new session's input name, or `None` if nothing was pending.
    fn accept_pending(&mut self, engine: &mut Engine) -> Result<Option<String>, TransportError>;

    /// Get a human readable description of the endpoint
    fn describe(&self) -> String;
}
