//! CLI Exit Codes
//!
//! Exit codes of the `termplex` binary, derived from the error that ended it.

use crate::config::ConfigError;
use crate::core::error::EngineError;
use crate::core::session::SessionError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Connection failed
    pub const CONNECTION_FAILED: u8 = 3;

    /// Connection timeout
    pub const TIMEOUT: u8 = 4;

    /// File not found
    pub const FILE_NOT_FOUND: u8 = 6;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 7;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 8;

    /// Port not found
    pub const PORT_NOT_FOUND: u8 = 14;

    /// Listening address could not be bound
    pub const BIND_FAILED: u8 = 18;

    /// Two sessions claim the same stream name
    pub const SESSION_CONFLICT: u8 = 19;

    /// Readiness polling failed
    pub const POLL_FAILED: u8 = 20;

    /// Internal error
    pub const INTERNAL_ERROR: u8 = 127;
}

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Error with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Classify an error chain by the first termplex error found in it
    pub fn from_error(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let code = err
            .chain()
            .find_map(|cause| {
                if let Some(e) = cause.downcast_ref::<TransportError>() {
                    Some(transport_code(e))
                } else if cause.is::<ConfigError>() {
                    Some(ExitCodes::CONFIG_ERROR)
                } else if cause.is::<SessionError>() {
                    Some(ExitCodes::SESSION_CONFLICT)
                } else if let Some(e) = cause.downcast_ref::<EngineError>() {
                    Some(match e {
                        EngineError::Poll { .. } => ExitCodes::POLL_FAILED,
                        EngineError::Session(_) | EngineError::Registry(_) => ExitCodes::SESSION_CONFLICT,
                    })
                } else {
                    None
                }
            })
            .unwrap_or(ExitCodes::ERROR);
        Self::Error(code, message)
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::ConnectionFailed(_) => ExitCodes::CONNECTION_FAILED,
        TransportError::Timeout(_) => ExitCodes::TIMEOUT,
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::FileNotFound(_) => ExitCodes::FILE_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::Bind { .. } => ExitCodes::BIND_FAILED,
        TransportError::Session(_) => ExitCodes::SESSION_CONFLICT,
        TransportError::IoError(_) => ExitCodes::ERROR,
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        0 => "Success",
        1 => "General error",
        2 => "Invalid arguments",
        3 => "Connection failed",
        4 => "Connection timeout",
        6 => "File not found",
        7 => "Permission denied",
        8 => "Configuration error",
        14 => "Port not found",
        18 => "Bind failed",
        19 => "Session conflict",
        20 => "Polling failed",
        127 => "Internal error",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in [0, 1, 2, 3, 4, 6, 7, 8, 14, 18, 19, 20, 127] {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
