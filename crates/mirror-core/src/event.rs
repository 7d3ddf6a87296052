//! The change event model.
//!
//! A `ChangeEvent` is built once by the watcher, serialized for transport,
//! and discarded after dispatch. It has no mutators.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl ChangeKind {
    /// All kinds, in wire order.
    pub const ALL: [ChangeKind; 4] = [
        ChangeKind::Created,
        ChangeKind::Modified,
        ChangeKind::Deleted,
        ChangeKind::Moved,
    ];

    /// Wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "created",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
            ChangeKind::Moved => "moved",
        }
    }

    /// Parse a wire name.
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("destPath is required for moved events")]
    MissingDestination,

    #[error("destPath is only allowed for moved events, got {0}")]
    UnexpectedDestination(ChangeKind),
}

/// One logical filesystem change, relative to the sync root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EventWire")]
pub struct ChangeEvent {
    kind: ChangeKind,
    source_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest_path: Option<String>,
    is_directory: bool,
    timestamp: u64,
}

/// Unchecked wire shape; converted through `ChangeEvent::new`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventWire {
    kind: ChangeKind,
    source_path: String,
    #[serde(default)]
    dest_path: Option<String>,
    is_directory: bool,
    timestamp: u64,
}

impl TryFrom<EventWire> for ChangeEvent {
    type Error = EventError;

    fn try_from(wire: EventWire) -> Result<Self, Self::Error> {
        ChangeEvent::new(
            wire.kind,
            wire.source_path,
            wire.dest_path,
            wire.is_directory,
            wire.timestamp,
        )
    }
}

impl ChangeEvent {
    /// Build an event, enforcing that `dest_path` is present iff `kind` is `Moved`.
    ///
    /// An empty destination string counts as absent.
    pub fn new(
        kind: ChangeKind,
        source_path: impl Into<String>,
        dest_path: Option<String>,
        is_directory: bool,
        timestamp: u64,
    ) -> Result<Self, EventError> {
        let dest_path = dest_path.filter(|d| !d.is_empty());
        match (kind, &dest_path) {
            (ChangeKind::Moved, None) => return Err(EventError::MissingDestination),
            (other, Some(_)) if other != ChangeKind::Moved => {
                return Err(EventError::UnexpectedDestination(other));
            }
            _ => {}
        }

        Ok(Self {
            kind,
            source_path: source_path.into(),
            dest_path,
            is_directory,
            timestamp,
        })
    }

    pub fn created(path: impl Into<String>, is_directory: bool, timestamp: u64) -> Self {
        Self::simple(ChangeKind::Created, path.into(), is_directory, timestamp)
    }

    pub fn modified(path: impl Into<String>, is_directory: bool, timestamp: u64) -> Self {
        Self::simple(ChangeKind::Modified, path.into(), is_directory, timestamp)
    }

    pub fn deleted(path: impl Into<String>, is_directory: bool, timestamp: u64) -> Self {
        Self::simple(ChangeKind::Deleted, path.into(), is_directory, timestamp)
    }

    pub fn moved(
        source_path: impl Into<String>,
        dest_path: impl Into<String>,
        is_directory: bool,
        timestamp: u64,
    ) -> Self {
        Self {
            kind: ChangeKind::Moved,
            source_path: source_path.into(),
            dest_path: Some(dest_path.into()),
            is_directory,
            timestamp,
        }
    }

    fn simple(kind: ChangeKind, source_path: String, is_directory: bool, timestamp: u64) -> Self {
        Self {
            kind,
            source_path,
            dest_path: None,
            is_directory,
            timestamp,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn source_path(&self) -> &str {
        &self.source_path
    }

    pub fn dest_path(&self) -> Option<&str> {
        self.dest_path.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The path this event is keyed by: the destination for moves, the source otherwise.
    pub fn key_path(&self) -> &str {
        match (&self.kind, &self.dest_path) {
            (ChangeKind::Moved, Some(dest)) => dest,
            _ => &self.source_path,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = if self.is_directory { "dir" } else { "file" };
        match &self.dest_path {
            Some(dest) => write!(f, "{} {} {} -> {}", self.kind, what, self.source_path, dest),
            None => write!(f, "{} {} {}", self.kind, what, self.source_path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moved_requires_destination() {
        let err = ChangeEvent::new(ChangeKind::Moved, "/old", None, true, 2000).unwrap_err();
        assert_eq!(err, EventError::MissingDestination);

        let err = ChangeEvent::new(ChangeKind::Moved, "/old", Some(String::new()), true, 2000)
            .unwrap_err();
        assert_eq!(err, EventError::MissingDestination);
    }

    #[test]
    fn test_destination_only_for_moved() {
        let err = ChangeEvent::new(ChangeKind::Created, "/a", Some("/b".into()), false, 1)
            .unwrap_err();
        assert_eq!(err, EventError::UnexpectedDestination(ChangeKind::Created));
    }

    #[test]
    fn test_key_path_uses_destination_for_moves() {
        let moved = ChangeEvent::moved("/old", "/new", true, 2000);
        assert_eq!(moved.key_path(), "/new");

        let created = ChangeEvent::created("/a.txt", false, 1000);
        assert_eq!(created.key_path(), "/a.txt");
    }

    #[test]
    fn test_wire_shape() {
        let event = ChangeEvent::created("/a.txt", false, 1000);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "kind": "created",
                "sourcePath": "/a.txt",
                "isDirectory": false,
                "timestamp": 1000
            })
        );
    }

    #[test]
    fn test_deserialize_enforces_invariant() {
        let bad = r#"{"kind":"moved","sourcePath":"/old","isDirectory":true,"timestamp":1}"#;
        assert!(serde_json::from_str::<ChangeEvent>(bad).is_err());

        let good =
            r#"{"kind":"moved","sourcePath":"/old","destPath":"/new","isDirectory":true,"timestamp":1}"#;
        let event: ChangeEvent = serde_json::from_str(good).unwrap();
        assert_eq!(event.dest_path(), Some("/new"));
    }

    #[test]
    fn test_kind_from_wire() {
        assert_eq!(ChangeKind::from_wire("deleted"), Some(ChangeKind::Deleted));
        assert_eq!(ChangeKind::from_wire("Deleted"), None);
        assert_eq!(ChangeKind::from_wire("renamed"), None);
    }
}
