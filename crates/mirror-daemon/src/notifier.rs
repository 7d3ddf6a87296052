//! Pushing change notifications to the peer.
//!
//! Notifications travel as a JSON body on the custom `REQSYNC` verb, which
//! lets the peer's listener tell them apart from plain file downloads.
//! Delivery is retried a fixed number of times with linear backoff; after
//! that the event is dropped (logged only, never queued for replay).

use async_trait::async_trait;
use mirror_core::{ChangeEvent, SyncResponse};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// HTTP verb used for sync notifications.
pub const SYNC_METHOD: &str = "REQSYNC";

/// Delivery attempts per event.
pub const MAX_PUSH_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid request: {0}")]
    Invalid(String),
}

/// One delivery attempt of a notification to the peer.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn send(&self, event: &ChangeEvent) -> Result<SyncResponse, TransportError>;
}

/// `REQSYNC` over HTTP.
pub struct HttpPeer {
    client: Client,
    url: String,
    headers: HeaderMap,
}

impl HttpPeer {
    /// `peer_url` is the base URL of the peer's listener, e.g. `http://10.0.0.2:8000`.
    pub fn new(client: Client, peer_url: &str, headers: HeaderMap) -> Self {
        Self {
            client,
            url: format!("{}/", peer_url.trim_end_matches('/')),
            headers,
        }
    }
}

#[async_trait]
impl PeerTransport for HttpPeer {
    async fn send(&self, event: &ChangeEvent) -> Result<SyncResponse, TransportError> {
        let method = Method::from_bytes(SYNC_METHOD.as_bytes())
            .map_err(|e| TransportError::Invalid(e.to_string()))?;

        let response = self
            .client
            .request(method, &self.url)
            .headers(self.headers.clone())
            .json(event)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        match serde_json::from_str::<SyncResponse>(&body) {
            Ok(reply) => Ok(reply),
            Err(e) => {
                debug!("Unparseable sync reply ({}), treating as delivered", e);
                Ok(SyncResponse {
                    errors: Vec::new(),
                    ack: None,
                    data: None,
                })
            }
        }
    }
}

/// Delivers events with bounded retries.
pub struct PushNotifier<T> {
    transport: T,
    max_attempts: u32,
    backoff_unit: Duration,
}

impl<T: PeerTransport> PushNotifier<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            max_attempts: MAX_PUSH_ATTEMPTS,
            backoff_unit: Duration::from_secs(1),
        }
    }

    /// Send `event` to the peer. Returns whether any attempt succeeded.
    ///
    /// After failed attempt `n` the notifier waits `n` backoff units before
    /// going on, so three failures cost 1s + 2s + 3s.
    pub async fn push(&self, event: &ChangeEvent) -> bool {
        for attempt in 1..=self.max_attempts {
            match self.transport.send(event).await {
                Ok(reply) => {
                    if !reply.errors.is_empty() {
                        warn!("Peer reported errors for {}: {:?}", event, reply.errors);
                    }
                    info!("Pushed {} (attempt {})", event, attempt);
                    return true;
                }
                Err(e) => {
                    warn!(
                        "Push attempt {}/{} for {} failed: {}",
                        attempt, self.max_attempts, event, e
                    );
                    tokio::time::sleep(self.backoff_unit * attempt).await;
                }
            }
        }

        error!(
            "Giving up on {} after {} attempts",
            event, self.max_attempts
        );
        false
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    /// Fails the first `failures` attempts, then succeeds.
    struct FlakyTransport {
        failures: u32,
        attempts: AtomicU32,
        seen: Mutex<Vec<ChangeEvent>>,
    }

    impl FlakyTransport {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for FlakyTransport {
        async fn send(&self, event: &ChangeEvent) -> Result<SyncResponse, TransportError> {
            self.seen.lock().unwrap().push(event.clone());
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(TransportError::Status {
                    status: 503,
                    body: String::new(),
                })
            } else {
                Ok(SyncResponse::ack(Vec::new(), 1.0))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_succeeds_first_try() {
        let notifier = PushNotifier::new(FlakyTransport::new(0));
        let start = Instant::now();

        assert!(notifier.push(&ChangeEvent::created("/a.txt", false, 1)).await);
        assert_eq!(notifier.transport().attempts.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_retries_with_linear_backoff() {
        let notifier = PushNotifier::new(FlakyTransport::new(2));
        let start = Instant::now();

        assert!(notifier.push(&ChangeEvent::deleted("/a.txt", false, 1)).await);
        assert_eq!(notifier.transport().attempts.load(Ordering::SeqCst), 3);
        // 1s after the first failure, 2s after the second.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_gives_up_after_three_attempts() {
        let notifier = PushNotifier::new(FlakyTransport::new(u32::MAX));
        let event = ChangeEvent::modified("/a.txt", false, 1);
        let start = Instant::now();

        assert!(!notifier.push(&event).await);
        assert_eq!(notifier.transport().attempts.load(Ordering::SeqCst), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));

        let seen = notifier.transport().seen.lock().unwrap();
        assert!(seen.iter().all(|e| e == &event));
    }

    #[test]
    fn test_sync_method_is_valid_http_method() {
        let method = Method::from_bytes(SYNC_METHOD.as_bytes()).unwrap();
        assert_eq!(method.as_str(), "REQSYNC");
    }

    #[test]
    fn test_http_peer_url() {
        let peer = HttpPeer::new(Client::new(), "http://10.0.0.2:8000/", HeaderMap::new());
        assert_eq!(peer.url, "http://10.0.0.2:8000/");
    }
}
