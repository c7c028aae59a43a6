//! Dispatch loop
//!
//! The [`Engine`] owns the stream registry, the session registry and the
//! command table. One iteration waits for readiness on every mounted input,
//! reads a single line from each ready input and runs it:
//!
//! 1. tokenize and strip the trailing redirection pair
//! 2. resolve the source session (`<< name` runs the line on behalf of `name`)
//! 3. echo the line on the source session's own output
//! 4. resolve the destination (`>> name`)
//! 5. handle `exit`, look up the command and check the permission level
//! 6. parse arguments, invoke the handler, run the session's result handler
//!
//! Errors are scoped to the line: they are written to the source session's
//! output and the loop goes on with the next ready input.

use super::command::{CommandTable, Invocation, Output, EXIT_COMMAND, HELP_COMMAND};
use super::error::{DispatchError, EngineError};
use super::line::CommandLine;
use super::session::{render_template, Session, SessionError, SessionRegistry};
use super::stream::{Direction, SharedStream, StreamError, StreamRegistry, Unmounted};
use super::transport::Acceptor;
use crate::config::EngineConfig;
use futures::future::{select_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Wait used by a poll without inputs when no timeout is configured
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// What happened to one line (or one ready input)
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Handler ran and the result handler accepted its value
    Executed {
        /// Command name
        command: String,
        /// Input name of the session the command ran for
        source: String,
        /// Output name the text went to
        destination: String,
        /// Handler return value
        value: Value,
    },
    /// Usage text was written instead of running a handler
    Help {
        /// Command name
        command: String,
    },
    /// `exit` closed a session
    Exited {
        /// Input name of the closed session
        session: String,
    },
    /// Blank line, nothing to do
    Empty,
    /// Peer hung up; the session (or bare input) was removed
    Disconnected {
        /// Input name that went away
        stream: String,
    },
    /// Line failed and the error was reported
    Failed(DispatchError),
}

/// Outcome of one ready input in a poll iteration
#[derive(Debug, Clone, PartialEq)]
pub struct Processed {
    /// Input name that was read
    pub stream: String,
    /// What happened
    pub outcome: Outcome,
}

enum Readiness {
    Ready,
    Hangup,
    Failed(StreamError),
}

/// Command session engine
pub struct Engine {
    config: EngineConfig,
    streams: StreamRegistry,
    sessions: SessionRegistry,
    commands: CommandTable,
    acceptors: Vec<Box<dyn Acceptor>>,
    next_id: u64,
}

impl Engine {
    /// Create an engine with an empty command table
    pub fn new(config: EngineConfig) -> Self {
        Self::with_commands(config, CommandTable::new())
    }

    /// Create an engine with a prepared command table
    pub fn with_commands(config: EngineConfig, commands: CommandTable) -> Self {
        Self {
            config,
            streams: StreamRegistry::new(),
            sessions: SessionRegistry::new(),
            commands,
            acceptors: Vec::new(),
            next_id: 0,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get command table
    pub fn commands(&self) -> &CommandTable {
        &self.commands
    }

    /// Get command table for registration
    pub fn commands_mut(&mut self) -> &mut CommandTable {
        &mut self.commands
    }

    /// Get stream registry
    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    /// Get session registry
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Mount a stream that is not bound to a session
    ///
    /// A bare output can be a `>>` target; a bare input can only run lines
    /// carrying `<<`.
    pub fn mount(&mut self, name: &str, handle: SharedStream, direction: Direction) -> Result<(), EngineError> {
        self.streams.mount(name, handle, direction)?;
        Ok(())
    }

    /// Remove a name from both namespaces without closing the handle
    ///
    /// Sessions are left alone; use [`Engine::close_session`] for those.
    pub fn unmount(&mut self, name: &str) -> Option<Unmounted> {
        self.streams.unmount(name)
    }

    /// Register a session; it is polled from the next iteration on
    pub fn register_session(&mut self, session: Session) -> Result<(), SessionError> {
        self.sessions.register(session, &mut self.streams)
    }

    /// Close a session by input name
    pub async fn close_session(&mut self, name: &str) -> bool {
        self.sessions.close(name, &mut self.streams).await.is_some()
    }

    /// Allocate a `prefix/<n>` name not used by any stream or session
    pub fn unique_name(&mut self, prefix: &str) -> String {
        loop {
            let name = format!("{prefix}/{}", self.next_id);
            self.next_id += 1;
            if !self.streams.has_input(&name) && !self.streams.has_output(&name) && !self.sessions.contains(&name) {
                return name;
            }
        }
    }

    /// Add a session source run by [`Engine::tick`]
    pub fn add_acceptor(&mut self, acceptor: impl Acceptor + 'static) {
        tracing::info!(acceptor = %acceptor.describe(), "acceptor added");
        self.acceptors.push(Box::new(acceptor));
    }

    /// Number of acceptors
    pub fn acceptor_count(&self) -> usize {
        self.acceptors.len()
    }

    /// Give every acceptor one chance to register a session
    ///
    /// Returns the names of the new sessions. Accept failures are logged and
    /// do not stop the other acceptors.
    pub fn accept_pending(&mut self) -> Vec<String> {
        let mut acceptors = std::mem::take(&mut self.acceptors);
        let mut accepted = Vec::new();
        for acceptor in &mut acceptors {
            match acceptor.accept_pending(self) {
                Ok(Some(name)) => accepted.push(name),
                Ok(None) => {}
                Err(e) => tracing::warn!(acceptor = %acceptor.describe(), error = %e, "accept failed"),
            }
        }
        acceptors.append(&mut self.acceptors);
        self.acceptors = acceptors;
        accepted
    }

    /// One dispatch iteration: wait for readiness, then one line per ready input
    pub async fn poll_once(&mut self) -> Result<Vec<Processed>, EngineError> {
        let ready = self.wait_ready().await?;
        Ok(self.process_ready(ready).await)
    }

    /// Accept pending sessions, then run one iteration
    pub async fn tick(&mut self) -> Result<Vec<Processed>, EngineError> {
        self.accept_pending();
        self.poll_once().await
    }

    /// Run until `shutdown` completes or a poll fails, then close every session
    ///
    /// `shutdown` is only observed while waiting for readiness: lines already
    /// read in an iteration are run and answered before the loop stops.
    /// With `stop_when_idle` set the loop also ends once no session and no
    /// acceptor is left.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<(), EngineError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let result = loop {
            if self.config.stop_when_idle && self.sessions.is_empty() && self.acceptors.is_empty() {
                tracing::info!("no sessions left, stopping");
                break Ok(());
            }
            self.accept_pending();
            let ready = tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break Ok(());
                }
                ready = self.wait_ready() => ready,
            };
            match ready {
                Ok(ready) => {
                    self.process_ready(ready).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "dispatch loop failed");
                    break Err(e);
                }
            }
        };
        self.shutdown().await;
        result
    }

    /// Close every session
    pub async fn shutdown(&mut self) -> usize {
        let closed = self.sessions.close_all(&mut self.streams).await;
        if closed > 0 {
            tracing::info!(closed, "sessions closed");
        }
        closed
    }

    async fn process_ready(&mut self, ready: Vec<(String, Readiness)>) -> Vec<Processed> {
        let mut processed = Vec::with_capacity(ready.len());
        for (stream, readiness) in ready {
            if let Some(outcome) = self.process_stream(&stream, readiness).await {
                processed.push(Processed { stream, outcome });
            }
        }
        processed
    }

    /// Dropping the returned future loses no input: every wait is cancel safe
    async fn wait_ready(&self) -> Result<Vec<(String, Readiness)>, EngineError> {
        let inputs: Vec<(String, SharedStream)> = self
            .streams
            .inputs()
            .map(|(name, handle)| (name.clone(), handle.clone()))
            .collect();
        if inputs.is_empty() {
            tokio::time::sleep(self.config.timeout().unwrap_or(IDLE_WAIT)).await;
            return Ok(Vec::new());
        }

        let waits: Vec<BoxFuture<'static, (usize, Result<(), StreamError>)>> = inputs
            .iter()
            .enumerate()
            .map(|(index, (_, handle))| {
                let handle = handle.clone();
                async move {
                    let mut stream = handle.lock_owned().await;
                    (index, stream.readable().await)
                }
                .boxed()
            })
            .collect();

        let (first, _, rest) = match self.config.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, select_all(waits)).await {
                Ok(first) => first,
                Err(_) => return Ok(Vec::new()),
            },
            None => select_all(waits).await,
        };

        let mut ready = vec![first];
        ready.extend(rest.into_iter().filter_map(FutureExt::now_or_never));
        ready.sort_by_key(|(index, _)| *index);

        let mut names = Vec::with_capacity(ready.len());
        for (index, result) in ready {
            let name = inputs[index].0.clone();
            match result {
                Ok(()) => names.push((name, Readiness::Ready)),
                Err(e) if e.is_disconnect() => names.push((name, Readiness::Hangup)),
                // An input handle that cannot be waited on at all breaks the registry
                Err(source @ StreamError::NotReadable(_)) => return Err(EngineError::Poll { stream: name, source }),
                Err(e) => names.push((name, Readiness::Failed(e))),
            }
        }
        Ok(names)
    }

    async fn process_stream(&mut self, name: &str, readiness: Readiness) -> Option<Outcome> {
        // A line processed earlier in this iteration may have closed it
        let handle = self.streams.input(name)?.clone();
        match readiness {
            Readiness::Ready => {}
            Readiness::Hangup => return Some(self.disconnect(name).await),
            Readiness::Failed(e) => {
                tracing::warn!(stream = name, error = %e, "input failed");
                return Some(self.disconnect(name).await);
            }
        }

        let read = handle.lock().await.read_line().await;
        let line = match read {
            Ok(Some(line)) => line,
            Ok(None) => return Some(self.disconnect(name).await),
            Err(e) => {
                if !e.is_disconnect() {
                    tracing::warn!(stream = name, error = %e, "read failed");
                }
                return Some(self.disconnect(name).await);
            }
        };

        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Some(Outcome::Empty);
        }
        Some(self.dispatch_line(name, line).await)
    }

    async fn disconnect(&mut self, name: &str) -> Outcome {
        if self.sessions.contains(name) {
            self.sessions.close(name, &mut self.streams).await;
        } else {
            self.streams.unmount_direction(name, Direction::In);
        }
        tracing::info!(stream = name, "input disconnected");
        Outcome::Disconnected {
            stream: name.to_string(),
        }
    }

    async fn dispatch_line(&mut self, stream: &str, line: &str) -> Outcome {
        tracing::debug!(stream, line, "line received");
        let mut report_to = stream.to_string();
        match self.execute(stream, line, &mut report_to).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report(&report_to, &error).await;
                Outcome::Failed(error)
            }
        }
    }

    async fn execute(&mut self, stream: &str, line: &str, report_to: &mut String) -> Result<Outcome, DispatchError> {
        let parsed = CommandLine::parse(line)?;

        let source = match &parsed.source {
            Some(name) if !self.streams.has_input(name) => {
                return Err(DispatchError::UnknownStream {
                    name: name.clone(),
                    direction: Direction::In,
                })
            }
            Some(name) => name.clone(),
            None => stream.to_string(),
        };
        let session = self
            .sessions
            .get(&source)
            .ok_or_else(|| DispatchError::NoSession(source.clone()))?;
        *report_to = source.clone();
        let permission = session.permission();
        let default_output = session.output_name().to_string();
        let echo = session.echo_settings().render(line);

        if let Some(text) = echo {
            self.write_to(&default_output, text.as_bytes()).await;
        }

        let destination = match parsed.destination.clone() {
            Some(name) if !self.streams.has_output(&name) => {
                return Err(DispatchError::UnknownStream {
                    name,
                    direction: Direction::Out,
                })
            }
            Some(name) => name,
            None => default_output,
        };

        let (command, args) = parsed.split_command().ok_or(DispatchError::EmptyCommand)?;
        if command == EXIT_COMMAND {
            self.sessions.close(&source, &mut self.streams).await;
            return Ok(Outcome::Exited { session: source });
        }

        let mut output = Output::new(source.as_str(), destination.as_str());
        if command == HELP_COMMAND && self.config.builtin_help && !self.commands.contains(HELP_COMMAND) {
            self.write_help(permission, &mut output);
            self.flush(&mut output).await;
            return Ok(Outcome::Help {
                command: command.to_string(),
            });
        }

        let entry = self
            .commands
            .get_mut(command)
            .ok_or_else(|| DispatchError::UnknownCommand(command.to_string()))?;
        if entry.permission() > permission {
            return Err(DispatchError::PermissionDenied {
                command: command.to_string(),
                required: entry.permission(),
                level: permission,
            });
        }

        tracing::debug!(session = %source, command, destination = %destination, "invoking command");
        let value = match entry.invoke(args, &mut output) {
            Ok(Invocation::Completed(value)) => value,
            Ok(Invocation::Help) => {
                self.flush(&mut output).await;
                return Ok(Outcome::Help {
                    command: command.to_string(),
                });
            }
            Err(e) => {
                self.flush(&mut output).await;
                return Err(e);
            }
        };

        let handled = match self.sessions.get_mut(&source) {
            Some(session) => session.handle_result(line, &value, &mut output),
            None => Ok(()),
        };
        self.flush(&mut output).await;
        if let Err(e) = handled {
            return Err(DispatchError::ResultHandler {
                command: command.to_string(),
                message: format!("{e:#}"),
            });
        }

        Ok(Outcome::Executed {
            command: command.to_string(),
            source,
            destination,
            value,
        })
    }

    fn write_help(&self, permission: u32, output: &mut Output) {
        output.println("Commands:");
        for entry in self.commands.iter().filter(|entry| entry.permission() <= permission) {
            match entry.about() {
                Some(about) => output.println(format!("  {:<12} {about}", entry.name())),
                None => output.println(format!("  {}", entry.name())),
            }
        }
        output.println(format!("  {EXIT_COMMAND:<12} Close this session"));
    }

    async fn report(&mut self, session: &str, error: &DispatchError) {
        tracing::warn!(session, error = %error, "command failed");
        let Some(output) = self.sessions.get(session).map(|s| s.output_name().to_string()) else {
            return;
        };
        let mut text = render_template(&self.config.error_format, &error.to_string());
        text.push('\n');
        self.write_to(&output, text.as_bytes()).await;
    }

    async fn flush(&mut self, output: &mut Output) {
        if output.is_empty() {
            return;
        }
        let data = output.take();
        let destination = output.destination().to_string();
        self.write_to(&destination, &data).await;
    }

    async fn write_to(&self, name: &str, data: &[u8]) {
        let Some(handle) = self.streams.output(name) else {
            tracing::warn!(stream = name, "output is not mounted, dropping text");
            return;
        };
        if let Err(e) = handle.lock().await.write_all(data).await {
            tracing::warn!(stream = name, error = %e, "write failed");
        }
    }
}
