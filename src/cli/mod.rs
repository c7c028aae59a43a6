//! CLI Module
//!
//! Provides command-line interface functionality including:
//! - Exit codes for automation
//! - Sample command set of the `termplex` binary

pub mod commands;
pub mod exit_codes;

pub use exit_codes::{exit_code_description, print_exit_codes, CliResult, ExitCodes};
