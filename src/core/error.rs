//! Error types of the dispatch engine
//!
//! [`DispatchError`] is scoped to one line: it is reported and the loop goes
//! on. [`EngineError`] is what `poll_once` and the registration helpers
//! return; only [`EngineError::Poll`] ends a running loop.

use super::session::SessionError;
use super::stream::{Direction, RegistryError, StreamError};
use thiserror::Error;

/// Failure while processing a single command line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Both redirection operators, or an operator without a trailing name
    #[error("Malformed redirection: {0}")]
    MalformedRedirection(String),

    /// Redirection target is not mounted
    #[error("Unknown {direction} stream: {name}")]
    UnknownStream {
        /// Requested name
        name: String,
        /// Namespace that was searched
        direction: Direction,
    },

    /// Command name not in the table
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Session level below the command's requirement
    #[error("Permission denied: '{command}' requires level {required}, session has {level}")]
    PermissionDenied {
        /// Command name
        command: String,
        /// Level the command requires
        required: u32,
        /// Level of the source session
        level: u32,
    },

    /// Tokens rejected by the argument grammar
    #[error("Invalid arguments for '{command}': {message}")]
    ArgumentParse {
        /// Command name
        command: String,
        /// Rendered parser message
        message: String,
    },

    /// Handler returned an error or panicked
    #[error("Command '{command}' failed: {message}")]
    HandlerExecution {
        /// Command name
        command: String,
        /// Error description
        message: String,
    },

    /// Nothing left to run after stripping redirection
    #[error("Empty command")]
    EmptyCommand,

    /// Line could not be split into tokens
    #[error("Cannot tokenize line: {0}")]
    Tokenize(String),

    /// Line arrived on an input no session reads from
    #[error("No session reads from '{0}'")]
    NoSession(String),

    /// Session's result handler failed after the command ran
    #[error("Result handler failed after '{command}': {message}")]
    ResultHandler {
        /// Command name
        command: String,
        /// Error description
        message: String,
    },
}

/// Engine-level error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// Readiness polling failed; the loop cannot go on
    #[error("Polling stream '{stream}' failed: {source}")]
    Poll {
        /// Input name being polled
        stream: String,
        /// Underlying failure
        #[source]
        source: StreamError,
    },

    /// Session registration failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Stream mount failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
