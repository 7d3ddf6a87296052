//! Receive side of synchronization.
//!
//! Every inbound notification goes through the same steps: validate,
//! register echo suppression, classify, then either fetch content from the
//! peer or mutate the local tree directly. Nothing is retried here; failures
//! are logged and reported back in the response's error list.

use crate::echo::EchoSender;
use crate::fetch::ContentFetcher;
use crate::local_apply::LocalFs;
use mirror_core::{Action, ApplyOutcome, ChangeEvent, ChangeKind, ancestor_paths, now_secs, parse};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of handling one notification.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// The parsed event (None when rejected)
    pub event: Option<ChangeEvent>,
    /// Route taken (None when rejected)
    pub action: Option<Action>,
    /// Validation errors, or downstream fetch/apply failures
    pub errors: Vec<String>,
}

impl DispatchReport {
    fn rejected(errors: Vec<String>) -> Self {
        Self {
            event: None,
            action: None,
            errors,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.event.is_none()
    }
}

pub struct SyncDispatcher {
    local: LocalFs,
    fetcher: Arc<dyn ContentFetcher>,
    echo: EchoSender,
}

impl SyncDispatcher {
    pub fn new(local: LocalFs, fetcher: Arc<dyn ContentFetcher>, echo: EchoSender) -> Self {
        Self {
            local,
            fetcher,
            echo,
        }
    }

    /// Handle a notification envelope using the current clock.
    pub async fn handle(&self, envelope: &Value) -> DispatchReport {
        self.handle_at(envelope, now_secs()).await
    }

    /// Handle a notification envelope as of `now` (seconds since epoch).
    pub async fn handle_at(&self, envelope: &Value, now: u64) -> DispatchReport {
        let event = match parse(envelope) {
            Ok(event) => event,
            Err(errors) => {
                warn!("Rejected sync notification: {:?}", errors);
                return DispatchReport::rejected(errors);
            }
        };

        // Register before touching the filesystem so the watcher's view of
        // our own write is already covered. Parent directories created on
        // the way count as our writes too.
        self.echo.register(event.key_path(), now);
        if event.kind() == ChangeKind::Moved {
            self.echo.register(event.source_path(), now);
        }
        if event.kind() != ChangeKind::Deleted {
            for ancestor in ancestor_paths(event.key_path()) {
                self.echo.register(&ancestor, now);
            }
        }

        let action = Action::classify(event.kind());
        debug!("Dispatching {} via {:?}", event, action);

        let mut errors = Vec::new();
        match action {
            Action::Fetch => self.fetch(&event, &mut errors).await,
            Action::LocalApply => self.apply_local(&event, &mut errors).await,
        }

        DispatchReport {
            event: Some(event),
            action: Some(action),
            errors,
        }
    }

    async fn fetch(&self, event: &ChangeEvent, errors: &mut Vec<String>) {
        if event.is_directory() {
            record(self.local.ensure_dir(event.source_path()).await, event, errors);
            return;
        }

        match self.fetcher.fetch(event.source_path()).await {
            Ok(fetched) => info!(
                "Synced {} -> {:?} in {:?}",
                event.source_path(),
                fetched.saved_to,
                fetched.elapsed
            ),
            Err(e) => {
                error!("Sync failed for {}: {}", event, e);
                errors.push(format!("fetch {} failed: {}", event.source_path(), e));
            }
        }
    }

    async fn apply_local(&self, event: &ChangeEvent, errors: &mut Vec<String>) {
        let outcome = match (event.kind(), event.dest_path()) {
            (ChangeKind::Moved, Some(dest)) => {
                self.local
                    .apply_move(event.source_path(), dest, event.is_directory())
                    .await
            }
            _ => {
                self.local
                    .apply_delete(event.source_path(), event.is_directory())
                    .await
            }
        };
        record(outcome, event, errors);
    }
}

fn record(outcome: ApplyOutcome, event: &ChangeEvent, errors: &mut Vec<String>) {
    match outcome {
        ApplyOutcome::Failed(reason) => {
            errors.push(format!("{} failed: {}", event, reason));
        }
        other => info!("Applied {}: {}", event, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::echo::{EchoReceiver, echo_channel};
    use crate::fetch::{FetchError, Fetched};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Records requested paths and writes fixed content, or fails.
    struct FakeFetcher {
        local: LocalFs,
        requested: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ContentFetcher for FakeFetcher {
        async fn fetch(&self, relative_path: &str) -> Result<Fetched, FetchError> {
            self.requested.lock().unwrap().push(relative_path.to_string());
            if self.fail {
                return Err(FetchError::Status {
                    status: 404,
                    reason: "Not Found".into(),
                });
            }
            let dest = self.local.full_path(relative_path)?;
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, b"remote")?;
            Ok(Fetched {
                saved_to: dest,
                elapsed: Duration::ZERO,
                bytes: 6,
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        fetcher: Arc<FakeFetcher>,
        dispatcher: SyncDispatcher,
        echo_rx: EchoReceiver,
    }

    fn fixture(fail: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let local = LocalFs::new(dir.path().to_path_buf());
        let fetcher = Arc::new(FakeFetcher {
            local: local.clone(),
            requested: Mutex::new(Vec::new()),
            fail,
        });
        let (echo_tx, echo_rx) = echo_channel(16, 10);
        let dispatcher = SyncDispatcher::new(local, fetcher.clone(), echo_tx);
        Fixture {
            dir,
            fetcher,
            dispatcher,
            echo_rx,
        }
    }

    #[tokio::test]
    async fn test_created_routes_to_fetch_and_registers_echo() {
        let mut fx = fixture(false);
        let env = json!({
            "kind": "created",
            "sourcePath": "/a.txt",
            "isDirectory": false,
            "timestamp": 1000
        });

        let report = fx.dispatcher.handle_at(&env, 1000).await;
        assert_eq!(report.action, Some(Action::Fetch));
        assert!(report.errors.is_empty());
        assert_eq!(*fx.fetcher.requested.lock().unwrap(), vec!["/a.txt"]);
        assert_eq!(std::fs::read(fx.dir.path().join("a.txt")).unwrap(), b"remote");

        // Registered until 1010.
        assert!(fx.echo_rx.is_suppressed("/a.txt", 1002));
        assert!(!fx.echo_rx.is_suppressed("/a.txt", 1010));
    }

    #[tokio::test]
    async fn test_created_parents_are_registered() {
        let mut fx = fixture(false);
        let env = json!({
            "kind": "created",
            "sourcePath": "/photos/2024/a.jpg",
            "isDirectory": false,
            "timestamp": 1000
        });

        let report = fx.dispatcher.handle_at(&env, 1000).await;
        assert!(report.errors.is_empty());
        assert!(fx.echo_rx.is_suppressed("/photos/2024/a.jpg", 1001));
        assert!(fx.echo_rx.is_suppressed("/photos/2024", 1001));
        assert!(fx.echo_rx.is_suppressed("/photos", 1001));
        assert!(!fx.echo_rx.is_suppressed("/other", 1001));
    }

    #[tokio::test]
    async fn test_modified_routes_to_fetch() {
        let fx = fixture(false);
        let env = json!({
            "kind": "modified",
            "sourcePath": "/a.txt",
            "isDirectory": false,
            "timestamp": 1
        });
        let report = fx.dispatcher.handle_at(&env, 1).await;
        assert_eq!(report.action, Some(Action::Fetch));
    }

    #[tokio::test]
    async fn test_created_directory_is_made_locally() {
        let fx = fixture(false);
        let env = json!({
            "kind": "created",
            "sourcePath": "/photos/2024",
            "isDirectory": true,
            "timestamp": 1
        });

        let report = fx.dispatcher.handle_at(&env, 1).await;
        assert_eq!(report.action, Some(Action::Fetch));
        assert!(fx.dir.path().join("photos/2024").is_dir());
        assert!(fx.fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_routes_to_local_apply() {
        let fx = fixture(false);
        std::fs::write(fx.dir.path().join("a.txt"), "x").unwrap();
        let env = json!({
            "kind": "deleted",
            "sourcePath": "/a.txt",
            "isDirectory": false,
            "timestamp": 1
        });

        let report = fx.dispatcher.handle_at(&env, 1).await;
        assert_eq!(report.action, Some(Action::LocalApply));
        assert!(report.errors.is_empty());
        assert!(!fx.dir.path().join("a.txt").exists());
        assert!(fx.fetcher.requested.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_moved_missing_source_succeeds_silently() {
        let mut fx = fixture(false);
        let env = json!({
            "kind": "moved",
            "sourcePath": "/old",
            "destPath": "/new",
            "isDirectory": true,
            "timestamp": 2000
        });

        let report = fx.dispatcher.handle_at(&env, 2000).await;
        assert_eq!(report.action, Some(Action::LocalApply));
        assert!(report.errors.is_empty());
        assert!(fx.fetcher.requested.lock().unwrap().is_empty());
        assert!(fx.echo_rx.is_suppressed("/new", 2001));
        assert!(fx.echo_rx.is_suppressed("/old", 2001));
    }

    #[tokio::test]
    async fn test_unknown_kind_rejected_before_dispatch() {
        let mut fx = fixture(false);
        let env = json!({
            "kind": "renamed",
            "sourcePath": "/a.txt",
            "isDirectory": false,
            "timestamp": 1
        });

        let report = fx.dispatcher.handle_at(&env, 1).await;
        assert!(report.is_rejected());
        assert!(report.action.is_none());
        assert!(!report.errors.is_empty());
        assert!(fx.fetcher.requested.lock().unwrap().is_empty());
        assert_eq!(fx.echo_rx.drain(1), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_not_fatal() {
        let fx = fixture(true);
        let env = json!({
            "kind": "modified",
            "sourcePath": "/a.txt",
            "isDirectory": false,
            "timestamp": 1
        });

        let report = fx.dispatcher.handle_at(&env, 1).await;
        assert!(!report.is_rejected());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("404"));
    }

    #[tokio::test]
    async fn test_apply_failure_is_reported() {
        let fx = fixture(false);
        std::fs::create_dir_all(fx.dir.path().join("full")).unwrap();
        std::fs::write(fx.dir.path().join("full/f"), "x").unwrap();
        let env = json!({
            "kind": "deleted",
            "sourcePath": "/full",
            "isDirectory": true,
            "timestamp": 1
        });

        let report = fx.dispatcher.handle_at(&env, 1).await;
        assert_eq!(report.errors.len(), 1);
        assert!(fx.dir.path().join("full/f").exists());
    }
}
