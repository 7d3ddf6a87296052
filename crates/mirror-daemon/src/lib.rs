//! mirror-daemon library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod config;
pub mod dispatcher;
pub mod echo;
pub mod fetch;
pub mod local_apply;
pub mod notifier;
pub mod outbound;
pub mod server;
pub mod watcher;

// Re-export key types for convenience
pub use config::Config;
pub use dispatcher::{DispatchReport, SyncDispatcher};
pub use echo::{EchoReceiver, EchoSender, echo_channel};
pub use fetch::{ContentFetcher, FetchEngine, FetchError, Fetched};
pub use local_apply::LocalFs;
pub use notifier::{HttpPeer, MAX_PUSH_ATTEMPTS, PeerTransport, PushNotifier, SYNC_METHOD, TransportError};
pub use outbound::{Decision, Outbound};
pub use server::{ListenerState, MAX_ENVELOPE_SIZE};
pub use watcher::FileWatcher;
