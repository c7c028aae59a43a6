//! # Termplex Core Library
//!
//! A transport-agnostic command line session engine. Line-oriented commands
//! arrive on any number of mounted input streams:
//! - Serial ports
//! - TCP connections (outbound, or accepted by a listening server)
//! - Command files
//! - Standard input/output
//! - In-process pipes
//!
//! ## Features
//!
//! - Typed per-command argument grammars (`clap` derive)
//! - Integer permission levels per session
//! - Shell-like quoting, `<< name` and `>> name` redirection
//! - Per-session echo and result handlers
//! - Explicit stream ownership, closed exactly once
//!
//! ## Example
//!
//! ```rust,no_run
//! use clap::Parser;
//! use termplex_core::{shared, CommandTable, Engine, EngineConfig, Output, Session};
//! use termplex_core::core::transport::pipe;
//!
//! /// Prints welcome message
//! #[derive(Parser)]
//! struct Welcome {
//!     #[arg(short, long)]
//!     quiet: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut commands = CommandTable::new();
//!     commands.register("welcome", 0, |args: Welcome, out: &mut Output| {
//!         out.println(if args.quiet { "Welcome." } else { "Welcome to Termplex!" });
//!         Ok(())
//!     })?;
//!
//!     let mut engine = Engine::with_commands(EngineConfig::default(), commands);
//!     let (stream, _peer) = pipe::pair("console", 4096);
//!     engine.register_session(Session::duplex("console", shared(stream), 0))?;
//!
//!     engine.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{AppConfig, EngineConfig};
pub use crate::core::command::{CommandError, CommandTable, Invocation, Output};
pub use crate::core::dispatch::{Engine, Outcome, Processed};
pub use crate::core::error::{DispatchError, EngineError};
pub use crate::core::line::CommandLine;
pub use crate::core::session::{Echo, Session, SessionError, SessionRegistry, SessionState};
pub use crate::core::stream::{
    shared, Direction, IoStream, RegistryError, SharedStream, Stream, StreamError, StreamKind, StreamRegistry,
};
pub use crate::core::transport::{Acceptor, SerialConfig, TcpConfig, TcpServer, TcpServerConfig, TransportError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
