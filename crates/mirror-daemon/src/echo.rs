//! Listener -> watcher channel for echo suppression.
//!
//! The listener and the watcher run as separate units that share no state.
//! The listener registers every path it applies on a bounded channel; the
//! watcher drains the channel without blocking right before each check, so
//! an empty channel never stalls the watch loop.

use mirror_core::{EchoGuard, EchoRegistration};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

/// Create the echo channel pair.
pub fn echo_channel(capacity: usize, window_secs: u64) -> (EchoSender, EchoReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EchoSender { tx, window_secs },
        EchoReceiver {
            rx,
            guard: EchoGuard::new(window_secs),
        },
    )
}

/// Listener-side handle. Cheap to clone into each request task.
#[derive(Debug, Clone)]
pub struct EchoSender {
    tx: mpsc::Sender<EchoRegistration>,
    window_secs: u64,
}

impl EchoSender {
    /// Register `path` as just applied at `now`. Never blocks.
    ///
    /// Returns false if the registration could not be queued; the resulting
    /// echo then reaches the peer once, where it is an idempotent re-apply.
    pub fn register(&self, path: &str, now: u64) -> bool {
        let registration = EchoRegistration::new(path, now, self.window_secs);
        match self.tx.try_send(registration) {
            Ok(()) => true,
            Err(TrySendError::Full(reg)) => {
                warn!("Echo channel full, {} may be re-announced", reg.path);
                false
            }
            Err(TrySendError::Closed(reg)) => {
                debug!("Echo channel closed, dropping registration for {}", reg.path);
                false
            }
        }
    }
}

/// Watcher-side end: owns the guard map fed by the channel.
#[derive(Debug)]
pub struct EchoReceiver {
    rx: mpsc::Receiver<EchoRegistration>,
    guard: EchoGuard,
}

impl EchoReceiver {
    /// Move every queued registration into the guard. Returns how many arrived.
    pub fn drain(&mut self, now: u64) -> usize {
        let mut received = 0;
        loop {
            match self.rx.try_recv() {
                Ok(registration) => {
                    self.guard.absorb(registration);
                    received += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        if received > 0 {
            self.guard.prune(now);
        }
        received
    }

    /// Drain pending registrations, then check `path`.
    pub fn is_suppressed(&mut self, path: &str, now: u64) -> bool {
        self.drain(now);
        self.guard.is_suppressed(path, now)
    }
}
