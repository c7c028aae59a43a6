//! TCP transports: outbound client sessions and a listening server

use super::{Acceptor, TransportError};
use crate::core::dispatch::Engine;
use crate::core::session::Session;
use crate::core::stream::{shared, IoStream, StreamKind};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// TCP connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Connection timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl TcpConfig {
    /// Create a new TCP configuration
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Set timeout
    #[must_use]
    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self::new("localhost", 5555)
    }
}

/// Wrap a connected socket into a duplex stream
pub fn stream(socket: TcpStream, peer: SocketAddr) -> io::Result<IoStream> {
    socket.set_nodelay(true)?;
    let (reader, writer) = socket.into_split();
    Ok(IoStream::duplex(StreamKind::Tcp, peer.to_string(), reader, writer))
}

/// Connect to a remote host and build an owned session named after it
pub async fn connect(config: &TcpConfig, permission: u32) -> Result<Session, TransportError> {
    let addr = format!("{}:{}", config.host, config.port);

    let socket = tokio::time::timeout(Duration::from_secs(config.timeout_secs), TcpStream::connect(&addr))
        .await
        .map_err(|_| TransportError::Timeout(config.timeout_secs))?
        .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
    let peer = socket.peer_addr()?;

    let handle = shared(stream(socket, peer)?);
    Ok(Session::duplex(format!("tcp:{addr}"), handle, permission).owns_streams(true, true))
}

/// Listening server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpServerConfig {
    /// Address to bind, e.g. `0.0.0.0:5555`
    pub bind: String,
    /// Permission level of accepted sessions
    #[serde(default)]
    pub permission: u32,
    /// Echo template of accepted sessions, empty disables echo
    #[serde(default = "default_echo")]
    pub echo: Option<String>,
}

#[allow(clippy::unnecessary_wraps)]
fn default_echo() -> Option<String> {
    Some("#{}".to_string())
}

impl TcpServerConfig {
    /// Create a server configuration with echo enabled
    pub fn new(bind: &str) -> Self {
        Self {
            bind: bind.to_string(),
            permission: 0,
            echo: default_echo(),
        }
    }

    /// Set permission level
    #[must_use]
    pub fn permission(mut self, level: u32) -> Self {
        self.permission = level;
        self
    }

    /// Set echo template (`None` disables echo)
    #[must_use]
    pub fn echo(mut self, format: Option<String>) -> Self {
        self.echo = format;
        self
    }
}

/// Listening server turning each accepted connection into a session
#[derive(Debug)]
pub struct TcpServer {
    config: TcpServerConfig,
    listener: std::net::TcpListener,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Bind the listening socket in non-blocking mode
    pub fn bind(config: TcpServerConfig) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            addr: config.bind.clone(),
            source,
        };
        let listener = std::net::TcpListener::bind(&config.bind).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        tracing::info!(addr = %local_addr, "listening for sessions");

        Ok(Self {
            config,
            listener,
            local_addr,
        })
    }

    /// Get bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one pending connection, if any, and register it as a session
    ///
    /// Never blocks. The session owns both directions of the socket.
    pub fn accept_pending(&mut self, engine: &mut Engine) -> Result<Option<String>, TransportError> {
        let (socket, peer) = match self.listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(TransportError::IoError(e)),
        };
        socket.set_nonblocking(true)?;
        let socket = TcpStream::from_std(socket)?;

        let name = engine.unique_name("tcp");
        let handle = shared(stream(socket, peer)?);
        let mut session = Session::duplex(name.clone(), handle, self.config.permission).owns_streams(true, true);
        if let Some(format) = self.config.echo.as_ref().filter(|f| !f.is_empty()) {
            session = session.echo(format.clone());
        }
        engine.register_session(session)?;

        tracing::info!(session = %name, peer = %peer, "client connected");
        Ok(Some(name))
    }
}

impl Acceptor for TcpServer {
    fn accept_pending(&mut self, engine: &mut Engine) -> Result<Option<String>, TransportError> {
        TcpServer::accept_pending(self, engine)
    }

    fn describe(&self) -> String {
        format!("TCP server {}", self.local_addr)
    }
}
