//! Echo suppression.
//!
//! When this node writes a file because the peer told it to, the local
//! watcher will see that write as a fresh change. Without suppression the
//! change would be pushed straight back to the peer, which would apply it
//! and push it back again, forever.
//!
//! The listener records "just applied" paths as [`EchoRegistration`]s and
//! sends them to the watcher, which folds them into its [`EchoGuard`] and
//! consults the guard before forwarding anything.

use crate::path::path_key;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Suppression window of a guard built without explicit configuration.
pub const DEFAULT_ECHO_WINDOW_SECS: u64 = 5;

/// Suppression window the listener uses when registering applied changes.
pub const LISTENER_ECHO_WINDOW_SECS: u64 = 10;

/// One "just applied" record carried from listener to watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EchoRegistration {
    /// Path relative to the sync root.
    pub path: String,
    /// Seconds since epoch after which the record is inert.
    pub expires_at: u64,
}

impl EchoRegistration {
    pub fn new(path: impl Into<String>, now: u64, window_secs: u64) -> Self {
        Self {
            path: path.into(),
            expires_at: now.saturating_add(window_secs),
        }
    }
}

/// Path -> expiry map owned by the watcher.
#[derive(Debug, Clone)]
pub struct EchoGuard {
    window_secs: u64,
    expiries: HashMap<String, u64>,
}

impl Default for EchoGuard {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_WINDOW_SECS)
    }
}

impl EchoGuard {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            expiries: HashMap::new(),
        }
    }

    /// Record that `path` was just applied locally at `now`.
    pub fn mark_applied(&mut self, path: &str, now: u64) {
        self.absorb(EchoRegistration::new(path, now, self.window_secs));
    }

    /// Fold in a registration received from the listener.
    ///
    /// A later expiry wins; an older registration never shortens an active one.
    pub fn absorb(&mut self, registration: EchoRegistration) {
        let key = path_key(&registration.path);
        let entry = self.expiries.entry(key).or_insert(0);
        *entry = (*entry).max(registration.expires_at);
    }

    /// True iff `path` has a record whose expiry is still after `now`.
    pub fn is_suppressed(&self, path: &str, now: u64) -> bool {
        self.expiries
            .get(&path_key(path))
            .is_some_and(|&expires_at| now < expires_at)
    }

    /// Drop inert records.
    pub fn prune(&mut self, now: u64) {
        self.expiries.retain(|_, expires_at| now < *expires_at);
    }

    pub fn len(&self) -> usize {
        self.expiries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expiries.is_empty()
    }
}
