//! mirror-core: Runtime-free logic for two-peer directory mirroring.
//!
//! This crate provides:
//! - The `ChangeEvent` model and its wire envelope validation
//! - The per-path debounce filter used by the watcher
//! - The echo guard that keeps applied peer changes from bouncing back
//! - Dispatch classification and the typed local-apply outcome

pub mod apply;
pub mod debounce;
pub mod echo;
pub mod envelope;
pub mod event;
pub mod path;

pub use apply::{Action, ApplyOutcome};
pub use debounce::{DebounceFilter, DEFAULT_DEBOUNCE_WINDOW_SECS};
pub use echo::{
    EchoGuard, EchoRegistration, DEFAULT_ECHO_WINDOW_SECS, LISTENER_ECHO_WINDOW_SECS,
};
pub use envelope::{parse, validate, SyncResponse};
pub use event::{ChangeEvent, ChangeKind, EventError};
pub use path::{ancestor_paths, normalize_path, wire_path, PathError};

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current wall-clock time in fractional seconds, used for acknowledgements.
pub fn now_secs_f64() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
