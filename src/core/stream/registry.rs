//! Named input and output stream namespaces

use super::SharedStream;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Namespace(s) a stream name is mounted in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Input namespace only
    In,
    /// Output namespace only
    Out,
    /// Both namespaces
    Both,
}

impl Direction {
    /// Includes the input namespace
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::Both)
    }

    /// Includes the output namespace
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::In => write!(f, "input"),
            Self::Out => write!(f, "output"),
            Self::Both => write!(f, "input/output"),
        }
    }
}

/// Registry error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Name already taken in the requested namespace
    #[error("Stream '{name}' is already mounted as {direction}")]
    AlreadyMounted {
        /// Stream name
        name: String,
        /// Namespace that is occupied
        direction: Direction,
    },
}

/// Handles removed by [`StreamRegistry::unmount`]
#[derive(Default)]
pub struct Unmounted {
    /// Handle removed from the input namespace
    pub input: Option<SharedStream>,
    /// Handle removed from the output namespace
    pub output: Option<SharedStream>,
}

impl Unmounted {
    /// Namespaces the name was removed from
    pub fn direction(&self) -> Option<Direction> {
        match (&self.input, &self.output) {
            (Some(_), Some(_)) => Some(Direction::Both),
            (Some(_), None) => Some(Direction::In),
            (None, Some(_)) => Some(Direction::Out),
            (None, None) => None,
        }
    }
}

/// Mapping from stream name to handle, one namespace per direction
#[derive(Default)]
pub struct StreamRegistry {
    inputs: BTreeMap<String, SharedStream>,
    outputs: BTreeMap<String, SharedStream>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handle under `name`
    ///
    /// Nothing is mounted if any requested namespace already holds the name.
    pub fn mount(
        &mut self,
        name: &str,
        handle: SharedStream,
        direction: Direction,
    ) -> Result<(), RegistryError> {
        let taken_in = direction.is_input() && self.inputs.contains_key(name);
        let taken_out = direction.is_output() && self.outputs.contains_key(name);
        let taken = match (taken_in, taken_out) {
            (true, true) => Some(Direction::Both),
            (true, false) => Some(Direction::In),
            (false, true) => Some(Direction::Out),
            (false, false) => None,
        };
        if let Some(direction) = taken {
            return Err(RegistryError::AlreadyMounted {
                name: name.to_string(),
                direction,
            });
        }

        if direction.is_input() {
            self.inputs.insert(name.to_string(), handle.clone());
        }
        if direction.is_output() {
            self.outputs.insert(name.to_string(), handle);
        }
        tracing::debug!(stream = name, %direction, "stream mounted");
        Ok(())
    }

    /// Mount `handle` unless the very same handle is already mounted there
    ///
    /// Returns whether a new mount happened.
    pub(crate) fn ensure_mounted(
        &mut self,
        name: &str,
        handle: &SharedStream,
        direction: Direction,
    ) -> Result<bool, RegistryError> {
        let existing = match direction {
            Direction::In => self.inputs.get(name),
            Direction::Out => self.outputs.get(name),
            Direction::Both => return self.mount(name, handle.clone(), direction).map(|()| true),
        };
        match existing {
            Some(existing) if Arc::ptr_eq(existing, handle) => Ok(false),
            Some(_) => Err(RegistryError::AlreadyMounted {
                name: name.to_string(),
                direction,
            }),
            None => self.mount(name, handle.clone(), direction).map(|()| true),
        }
    }

    /// Look up a name in both namespaces
    ///
    /// When the name is mounted in both, the input handle is returned.
    pub fn resolve(&self, name: &str) -> Option<(SharedStream, Direction)> {
        match (self.inputs.get(name), self.outputs.get(name)) {
            (Some(input), Some(_)) => Some((input.clone(), Direction::Both)),
            (Some(input), None) => Some((input.clone(), Direction::In)),
            (None, Some(output)) => Some((output.clone(), Direction::Out)),
            (None, None) => None,
        }
    }

    /// Remove a name from both namespaces without closing anything
    pub fn unmount(&mut self, name: &str) -> Option<Unmounted> {
        let removed = Unmounted {
            input: self.inputs.remove(name),
            output: self.outputs.remove(name),
        };
        let direction = removed.direction()?;
        tracing::debug!(stream = name, %direction, "stream unmounted");
        Some(removed)
    }

    /// Remove a name from the given namespace(s) only
    pub fn unmount_direction(&mut self, name: &str, direction: Direction) -> Unmounted {
        Unmounted {
            input: direction
                .is_input()
                .then(|| self.inputs.remove(name))
                .flatten(),
            output: direction
                .is_output()
                .then(|| self.outputs.remove(name))
                .flatten(),
        }
    }

    /// Get an input handle
    pub fn input(&self, name: &str) -> Option<&SharedStream> {
        self.inputs.get(name)
    }

    /// Get an output handle
    pub fn output(&self, name: &str) -> Option<&SharedStream> {
        self.outputs.get(name)
    }

    /// Check if an input name is mounted
    pub fn has_input(&self, name: &str) -> bool {
        self.inputs.contains_key(name)
    }

    /// Check if an output name is mounted
    pub fn has_output(&self, name: &str) -> bool {
        self.outputs.contains_key(name)
    }

    /// Input names with their handles, ordered by name
    pub fn inputs(&self) -> impl Iterator<Item = (&String, &SharedStream)> {
        self.inputs.iter()
    }

    /// Output names, ordered
    pub fn output_names(&self) -> impl Iterator<Item = &String> {
        self.outputs.keys()
    }

    /// Number of mounted inputs
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stream::{shared, IoStream, StreamKind};

    fn handle() -> SharedStream {
        let (_peer, local) = tokio::io::duplex(16);
        let (r, w) = tokio::io::split(local);
        shared(IoStream::duplex(StreamKind::Pipe, "test", r, w))
    }

    #[test]
    fn test_mount_and_resolve_directions() {
        let mut registry = StreamRegistry::new();
        registry.mount("a", handle(), Direction::In).unwrap();
        registry.mount("b", handle(), Direction::Out).unwrap();
        registry.mount("c", handle(), Direction::Both).unwrap();

        assert_eq!(registry.resolve("a").map(|(_, d)| d), Some(Direction::In));
        assert_eq!(registry.resolve("b").map(|(_, d)| d), Some(Direction::Out));
        assert_eq!(registry.resolve("c").map(|(_, d)| d), Some(Direction::Both));
        assert!(registry.resolve("d").is_none());
    }

    #[test]
    fn test_namespaces_are_separate() {
        let mut registry = StreamRegistry::new();
        registry.mount("uart", handle(), Direction::In).unwrap();
        registry.mount("uart", handle(), Direction::Out).unwrap();

        assert_eq!(registry.resolve("uart").map(|(_, d)| d), Some(Direction::Both));
    }

    #[test]
    fn test_second_mount_is_rejected_without_partial_mount() {
        let mut registry = StreamRegistry::new();
        let first = handle();
        registry.mount("a", first.clone(), Direction::In).unwrap();

        let err = registry.mount("a", handle(), Direction::Both).unwrap_err();
        assert_eq!(
            err,
            RegistryError::AlreadyMounted {
                name: "a".into(),
                direction: Direction::In
            }
        );
        assert!(!registry.has_output("a"));
        assert!(Arc::ptr_eq(registry.input("a").unwrap(), &first));
    }

    #[tokio::test]
    async fn test_unmount_returns_handle_without_closing() {
        let mut registry = StreamRegistry::new();
        let stream = handle();
        registry.mount("a", stream.clone(), Direction::Both).unwrap();

        let removed = registry.unmount("a").unwrap();
        assert_eq!(removed.direction(), Some(Direction::Both));
        assert!(registry.resolve("a").is_none());
        assert!(!stream.lock().await.is_closed());
        assert!(registry.unmount("a").is_none());
    }

    #[test]
    fn test_ensure_mounted_accepts_same_handle_only() {
        let mut registry = StreamRegistry::new();
        let stdout = handle();
        assert!(registry.ensure_mounted("out", &stdout, Direction::Out).unwrap());
        assert!(!registry.ensure_mounted("out", &stdout, Direction::Out).unwrap());
        assert!(registry.ensure_mounted("out", &handle(), Direction::Out).is_err());
    }
}
