//! Core module containing the session engine of Termplex
//!
//! This module provides:
//! - Stream layer and the named stream registry (input/output namespaces)
//! - Sessions with permission levels, echo and stream ownership
//! - Command table with typed argument grammars
//! - Line tokenization and redirection operators
//! - Dispatch loop driving every registered session
//! - Transport adapters (pipe, file, stdio, TCP client/server, serial)

pub mod command;
pub mod dispatch;
pub mod error;
pub mod line;
pub mod session;
pub mod stream;
pub mod transport;
