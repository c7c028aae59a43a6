//! Session registry keyed by input stream name

use super::{Session, SessionState};
use crate::core::stream::{Direction, RegistryError, StreamRegistry};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Session registration error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A session already reads from this input
    #[error("Session '{0}' is already registered")]
    Duplicate(String),

    /// Session was registered before and has been closed
    #[error("Session '{0}' is closed")]
    Closed(String),

    /// Stream name taken by a different handle
    #[error(transparent)]
    Stream(#[from] RegistryError),
}

/// Single source of truth for which session owns which input
#[derive(Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, Session>,
    // Output names mounted by a registration rather than by the caller
    mounted_outputs: BTreeSet<String>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount the session's streams and index it by its input name
    pub fn register(&mut self, mut session: Session, streams: &mut StreamRegistry) -> Result<(), SessionError> {
        let name = session.input_name().to_string();
        if session.state() == SessionState::Closed {
            return Err(SessionError::Closed(name));
        }
        if self.sessions.contains_key(&name) {
            return Err(SessionError::Duplicate(name));
        }

        let mounted_input = streams.ensure_mounted(&name, session.input_handle(), Direction::In)?;
        match streams.ensure_mounted(session.output_name(), session.output_handle(), Direction::Out) {
            Ok(true) => {
                self.mounted_outputs.insert(session.output_name().to_string());
            }
            Ok(false) => {}
            Err(e) => {
                if mounted_input {
                    streams.unmount_direction(&name, Direction::In);
                }
                return Err(e.into());
            }
        }

        session.activate();
        tracing::info!(
            session = %name,
            output = %session.output_name(),
            permission = session.permission(),
            "session registered"
        );
        self.sessions.insert(name, session);
        Ok(())
    }

    /// Remove a session, release its stream names and close what it owns
    ///
    /// The output name is unmounted once no session writes to it, unless it
    /// was mounted before any session used it.
    ///
    /// Returns the closed session, or `None` if no session reads from `name`.
    pub async fn close(&mut self, name: &str, streams: &mut StreamRegistry) -> Option<Session> {
        let mut session = self.sessions.remove(name)?;

        streams.unmount_direction(session.input_name(), Direction::In);
        let output_in_use = self
            .sessions
            .values()
            .any(|other| other.output_name() == session.output_name());
        if !output_in_use && self.mounted_outputs.remove(session.output_name()) {
            streams.unmount_direction(session.output_name(), Direction::Out);
        }

        session.close().await;
        tracing::info!(session = %name, "session closed");
        Some(session)
    }

    /// Close every session
    pub async fn close_all(&mut self, streams: &mut StreamRegistry) -> usize {
        let names: Vec<String> = self.sessions.keys().cloned().collect();
        let mut closed = 0;
        for name in names {
            if self.close(&name, streams).await.is_some() {
                closed += 1;
            }
        }
        closed
    }

    /// Get a session by input name
    pub fn get(&self, name: &str) -> Option<&Session> {
        self.sessions.get(name)
    }

    /// Get a session by input name for mutation
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Session> {
        self.sessions.get_mut(name)
    }

    /// Check if a session reads from `name`
    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Registered sessions, ordered by input name
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
