//! Per-path debouncing of raw watcher notifications.
//!
//! Editors and the OS routinely fire several notifications for one save.
//! The filter keeps the last forwarded capture time per path and drops
//! anything that lands inside the window after it.

use crate::event::{ChangeEvent, ChangeKind};
use crate::path::path_key;
use std::collections::HashMap;
use tracing::debug;

/// Default debounce window in seconds.
pub const DEFAULT_DEBOUNCE_WINDOW_SECS: u64 = 5;

/// Watcher-owned debounce state: path -> last recorded capture time.
#[derive(Debug, Clone)]
pub struct DebounceFilter {
    window_secs: u64,
    last_seen: HashMap<String, u64>,
}

impl Default for DebounceFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW_SECS)
    }
}

impl DebounceFilter {
    pub fn new(window_secs: u64) -> Self {
        Self {
            window_secs,
            last_seen: HashMap::new(),
        }
    }

    /// Decide whether a raw event should be dropped.
    ///
    /// Drops the event if its key path was recorded at most `window_secs`
    /// ago, then drops directory modifications unconditionally. An event
    /// that survives both checks is recorded at `now`.
    pub fn should_drop(&mut self, event: &ChangeEvent, now: u64) -> bool {
        let key = path_key(event.key_path());

        if let Some(&last) = self.last_seen.get(&key) {
            if now.saturating_sub(last) <= self.window_secs {
                debug!("Debounced {} ({}s since last)", key, now.saturating_sub(last));
                return true;
            }
        }

        if event.is_directory() && event.kind() == ChangeKind::Modified {
            return true;
        }

        self.last_seen.insert(key, now);
        false
    }

    /// Last recorded capture time for a path.
    pub fn last_seen(&self, path: &str) -> Option<u64> {
        self.last_seen.get(&path_key(path)).copied()
    }

    /// Number of tracked paths.
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sighting_passes_and_is_recorded() {
        let mut filter = DebounceFilter::default();
        let event = ChangeEvent::created("/a.txt", false, 1000);

        assert!(!filter.should_drop(&event, 1000));
        assert_eq!(filter.last_seen("/a.txt"), Some(1000));
    }

    #[test]
    fn test_burst_within_window_is_dropped() {
        let mut filter = DebounceFilter::default();
        let event = ChangeEvent::modified("/a.txt", false, 1000);

        assert!(!filter.should_drop(&event, 1000));
        assert!(filter.should_drop(&event, 1001));
        assert!(filter.should_drop(&event, 1004));
    }

    #[test]
    fn test_window_boundary() {
        let mut filter = DebounceFilter::default();
        let event = ChangeEvent::modified("/a.txt", false, 1000);

        assert!(!filter.should_drop(&event, 1000));
        // Exactly five seconds later is still inside the window.
        assert!(filter.should_drop(&event, 1005));
        assert!(!filter.should_drop(&event, 1006));
    }

    #[test]
    fn test_dropped_events_do_not_extend_window() {
        let mut filter = DebounceFilter::default();
        let event = ChangeEvent::modified("/a.txt", false, 0);

        assert!(!filter.should_drop(&event, 100));
        assert!(filter.should_drop(&event, 104));
        assert!(!filter.should_drop(&event, 106));
        assert_eq!(filter.last_seen("a.txt"), Some(106));
    }

    #[test]
    fn test_paths_are_independent() {
        let mut filter = DebounceFilter::default();

        assert!(!filter.should_drop(&ChangeEvent::created("/a.txt", false, 0), 10));
        assert!(!filter.should_drop(&ChangeEvent::created("/b.txt", false, 0), 10));
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn test_directory_modified_always_dropped() {
        let mut filter = DebounceFilter::default();
        let event = ChangeEvent::modified("/dir", true, 0);

        assert!(filter.should_drop(&event, 10));
        assert!(filter.should_drop(&event, 1000));
        assert!(filter.is_empty());
    }

    #[test]
    fn test_directory_created_passes() {
        let mut filter = DebounceFilter::default();
        assert!(!filter.should_drop(&ChangeEvent::created("/dir", true, 0), 10));
    }

    #[test]
    fn test_moves_are_keyed_by_destination() {
        let mut filter = DebounceFilter::default();
        let moved = ChangeEvent::moved("/old", "/new", false, 0);

        assert!(!filter.should_drop(&moved, 10));
        assert_eq!(filter.last_seen("/new"), Some(10));
        assert_eq!(filter.last_seen("/old"), None);

        // A follow-up write to the new name is a burst of the same change.
        assert!(filter.should_drop(&ChangeEvent::modified("/new", false, 0), 12));
    }

    #[test]
    fn test_one_entry_per_path() {
        let mut filter = DebounceFilter::new(1);
        let event = ChangeEvent::modified("/a.txt", false, 0);
        for t in (0..100).step_by(10) {
            assert!(!filter.should_drop(&event, t));
        }
        assert_eq!(filter.len(), 1);
    }
}
