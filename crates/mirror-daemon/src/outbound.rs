//! Watcher-side pipeline: debounce, echo check, push.

use crate::echo::EchoReceiver;
use crate::notifier::{PeerTransport, PushNotifier};
use mirror_core::{ChangeEvent, DebounceFilter};
use tracing::{debug, warn};

/// What happened to one raw watcher event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Dropped by the debounce filter
    Debounced,
    /// Dropped because the listener just applied this path
    Echo,
    /// Sent to the peer; false when every attempt failed
    Pushed(bool),
}

/// Owns all watcher-side state. Events are handled one at a time, in
/// arrival order.
pub struct Outbound<T> {
    debounce: DebounceFilter,
    echo: EchoReceiver,
    notifier: PushNotifier<T>,
}

impl<T: PeerTransport> Outbound<T> {
    pub fn new(debounce: DebounceFilter, echo: EchoReceiver, notifier: PushNotifier<T>) -> Self {
        Self {
            debounce,
            echo,
            notifier,
        }
    }

    pub async fn handle(&mut self, event: &ChangeEvent, now: u64) -> Decision {
        if self.debounce.should_drop(event, now) {
            return Decision::Debounced;
        }

        if self.echo.is_suppressed(event.key_path(), now) {
            debug!("Suppressed echo of {}", event);
            return Decision::Echo;
        }

        let delivered = self.notifier.push(event).await;
        if !delivered {
            warn!("Change not delivered to peer: {}", event);
        }
        Decision::Pushed(delivered)
    }

    pub fn notifier(&self) -> &PushNotifier<T> {
        &self.notifier
    }
}
