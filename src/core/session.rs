//! Session management for command-issuing parties
//!
//! A Session binds one input stream name and one output stream name with a
//! permission level. It decides who closes the underlying streams and what
//! happens with the value a command returns.

mod registry;

pub use registry::{SessionError, SessionRegistry};

use super::command::{panic_message, Output};
use super::stream::SharedStream;
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Callback run after every successful command of a session
///
/// Receives the raw input line, the handler's return value and the writer the
/// handler used.
pub type ResultHandler = Box<dyn FnMut(&str, &Value, &mut Output) -> anyhow::Result<()> + Send>;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Built but not registered yet
    Created,
    /// Registered and polled
    Active,
    /// Streams released, removed from the registries
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Active => write!(f, "active"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Local echo of received lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Echo {
    /// Echo enabled
    pub enabled: bool,
    /// Template, `{}` is replaced with the line
    pub format: String,
}

impl Default for Echo {
    fn default() -> Self {
        Self {
            enabled: false,
            format: "{}".to_string(),
        }
    }
}

impl Echo {
    /// Render the echo text for a line, if enabled
    pub fn render(&self, line: &str) -> Option<String> {
        self.enabled.then(|| {
            let mut text = render_template(&self.format, line);
            text.push('\n');
            text
        })
    }
}

/// Replace the `{}` placeholders of a template
pub fn render_template(template: &str, value: &str) -> String {
    if template.contains("{}") {
        template.replace("{}", value)
    } else {
        format!("{template}{value}")
    }
}

/// One logical command-issuing party
pub struct Session {
    input_name: String,
    output_name: String,
    input: SharedStream,
    output: SharedStream,
    permission: u32,
    echo: Echo,
    owns_input: bool,
    owns_output: bool,
    result_handler: Option<ResultHandler>,
    state: SessionState,
}

impl Session {
    /// Create a session that borrows both streams
    pub fn new(
        input_name: impl Into<String>,
        input: SharedStream,
        output_name: impl Into<String>,
        output: SharedStream,
        permission: u32,
    ) -> Self {
        Self {
            input_name: input_name.into(),
            output_name: output_name.into(),
            input,
            output,
            permission,
            echo: Echo::default(),
            owns_input: false,
            owns_output: false,
            result_handler: None,
            state: SessionState::Created,
        }
    }

    /// Create a session reading and writing the same duplex handle under one name
    pub fn duplex(name: impl Into<String>, stream: SharedStream, permission: u32) -> Self {
        let name = name.into();
        Self::new(name.clone(), stream.clone(), name, stream, permission)
    }

    /// Enable echo with the given template
    #[must_use]
    pub fn echo(mut self, format: impl Into<String>) -> Self {
        self.echo = Echo {
            enabled: true,
            format: format.into(),
        };
        self
    }

    /// Set echo configuration
    #[must_use]
    pub fn echo_config(mut self, echo: Echo) -> Self {
        self.echo = echo;
        self
    }

    /// Set which streams are closed together with the session
    #[must_use]
    pub fn owns_streams(mut self, input: bool, output: bool) -> Self {
        self.owns_input = input;
        self.owns_output = output;
        self
    }

    /// Set the result handler
    #[must_use]
    pub fn on_result<F>(mut self, handler: F) -> Self
    where
        F: FnMut(&str, &Value, &mut Output) -> anyhow::Result<()> + Send + 'static,
    {
        self.result_handler = Some(Box::new(handler));
        self
    }

    /// Get input stream name (the registry key)
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Get default output stream name
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Get permission level
    pub fn permission(&self) -> u32 {
        self.permission
    }

    /// Get echo configuration
    pub fn echo_settings(&self) -> &Echo {
        &self.echo
    }

    /// Get ownership flags as (input, output)
    pub fn ownership(&self) -> (bool, bool) {
        (self.owns_input, self.owns_output)
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if closed
    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    pub(crate) fn input_handle(&self) -> &SharedStream {
        &self.input
    }

    pub(crate) fn output_handle(&self) -> &SharedStream {
        &self.output
    }

    pub(crate) fn activate(&mut self) {
        self.state = SessionState::Active;
    }

    /// Run the result handler; without one this is a no-op
    pub fn handle_result(&mut self, line: &str, value: &Value, output: &mut Output) -> anyhow::Result<()> {
        let Some(handler) = self.result_handler.as_mut() else {
            return Ok(());
        };
        match panic::catch_unwind(AssertUnwindSafe(|| handler(line, value, output))) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "result handler panicked: {}",
                panic_message(payload.as_ref())
            )),
        }
    }

    /// Close owned streams; borrowed ones stay open
    ///
    /// Calling this on a closed session does nothing.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Closed;

        if self.owns_input {
            if let Err(e) = self.input.lock().await.close().await {
                tracing::warn!(session = %self.input_name, error = %e, "failed to close input stream");
            }
        }
        let shared_handle = Arc::ptr_eq(&self.input, &self.output);
        if self.owns_output && !(shared_handle && self.owns_input) {
            if let Err(e) = self.output.lock().await.close().await {
                tracing::warn!(session = %self.input_name, error = %e, "failed to close output stream");
            }
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("permission", &self.permission)
            .field("echo", &self.echo)
            .field("owns_input", &self.owns_input)
            .field("owns_output", &self.owns_output)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
