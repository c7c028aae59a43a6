//! Command table and argument binding
//!
//! Each command pairs a handler with a permission level and an argument
//! grammar. The grammar is any `clap::Parser` type: tokens are parsed into that
//! fixed record and handed to the handler together with an [`Output`] bound to
//! the resolved destination stream.

mod output;

pub use output::Output;

use super::error::DispatchError;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Reserved command that closes the issuing session
pub const EXIT_COMMAND: &str = "exit";

/// Built-in command listing the permitted commands
pub const HELP_COMMAND: &str = "help";

/// Command registration error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Name registered twice
    #[error("Command '{0}' is already registered")]
    Duplicate(String),

    /// Name cannot be typed as a single token
    #[error("Invalid command name: {0:?}")]
    InvalidName(String),
}

/// What an invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    /// Handler ran and returned a value (`Null` for nothing)
    Completed(Value),
    /// Usage or version text was written instead of running the handler
    Help,
}

type Invoker = Box<dyn FnMut(&[String], &mut Output) -> Result<Invocation, DispatchError> + Send>;

/// Registered command
pub struct CommandEntry {
    name: String,
    permission: u32,
    about: Option<String>,
    invoker: Invoker,
}

impl CommandEntry {
    /// Get command name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get required permission level
    pub fn permission(&self) -> u32 {
        self.permission
    }

    /// Get one-line description from the grammar
    pub fn about(&self) -> Option<&str> {
        self.about.as_deref()
    }

    /// Parse `tokens` and run the handler
    pub fn invoke(&mut self, tokens: &[String], output: &mut Output) -> Result<Invocation, DispatchError> {
        (self.invoker)(tokens, output)
    }
}

/// Mapping from command name to handler, permission and grammar
#[derive(Default)]
pub struct CommandTable {
    entries: BTreeMap<String, CommandEntry>,
}

impl CommandTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command
    ///
    /// `A` is the argument grammar; the handler's return value is converted to
    /// JSON and passed on to the session's result handler.
    pub fn register<A, F, R>(&mut self, name: &str, permission: u32, mut handler: F) -> Result<(), CommandError>
    where
        A: Parser + 'static,
        F: FnMut(A, &mut Output) -> anyhow::Result<R> + Send + 'static,
        R: Serialize,
    {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(CommandError::InvalidName(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(CommandError::Duplicate(name.to_string()));
        }
        if name == EXIT_COMMAND {
            tracing::warn!(command = name, "'exit' is reserved, the registered handler is never reached");
        }

        let about = A::command().get_about().map(ToString::to_string);
        let command = name.to_string();
        let invoker: Invoker = Box::new(move |tokens: &[String], output: &mut Output| {
            let argv = std::iter::once(command.as_str()).chain(tokens.iter().map(String::as_str));
            let args = match A::try_parse_from(argv) {
                Ok(args) => args,
                Err(e) => {
                    return match e.kind() {
                        ErrorKind::DisplayHelp
                        | ErrorKind::DisplayVersion
                        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                            output.write(e.render().to_string());
                            Ok(Invocation::Help)
                        }
                        _ => Err(DispatchError::ArgumentParse {
                            command: command.clone(),
                            message: e.render().to_string().trim_end().to_string(),
                        }),
                    };
                }
            };

            match panic::catch_unwind(AssertUnwindSafe(|| handler(args, output))) {
                Ok(Ok(value)) => serde_json::to_value(value)
                    .map(Invocation::Completed)
                    .map_err(|e| DispatchError::HandlerExecution {
                        command: command.clone(),
                        message: format!("return value is not serializable: {e}"),
                    }),
                Ok(Err(e)) => Err(DispatchError::HandlerExecution {
                    command: command.clone(),
                    message: format!("{e:#}"),
                }),
                Err(payload) => Err(DispatchError::HandlerExecution {
                    command: command.clone(),
                    message: format!("handler panicked: {}", panic_message(payload.as_ref())),
                }),
            }
        });

        self.entries.insert(
            name.to_string(),
            CommandEntry {
                name: name.to_string(),
                permission,
                about,
                invoker,
            },
        );
        tracing::debug!(command = name, permission, "command registered");
        Ok(())
    }

    /// Look up a command, exact and case-sensitive
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    /// Look up a command for invocation
    pub fn get_mut(&mut self, name: &str) -> Option<&mut CommandEntry> {
        self.entries.get_mut(name)
    }

    /// Check if a command is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered commands, ordered by name
    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.values()
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
