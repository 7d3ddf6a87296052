//! File watcher producing raw change events for the sync root.
//!
//! Uses notify's recommended backend directly: the debounce filter
//! downstream needs the real event kinds (create/modify/delete/move), which
//! a coalescing debouncer would erase.

use anyhow::Result;
use mirror_core::{ChangeEvent, now_secs, wire_path};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error};

/// How long a rename's `From` half waits for its `To` half.
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(500);

/// File watcher that monitors the sync root.
pub struct FileWatcher {
    /// Sync root (canonical)
    root: PathBuf,
    /// Watcher handle (must keep alive)
    _watcher: RecommendedWatcher,
    /// Raw backend events
    raw_rx: mpsc::UnboundedReceiver<Event>,
    mapper: EventMapper,
    /// Mapped events not yet handed out
    ready: VecDeque<ChangeEvent>,
}

impl FileWatcher {
    /// Start watching `root`.
    pub fn new(root: PathBuf, recursive: bool) -> Result<Self> {
        // Canonicalize the path to resolve symlinks. On macOS, /var/folders/...
        // is actually /private/var/folders/..., and FSEvents needs the real path.
        let root = root.canonicalize().unwrap_or(root);

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    // Receiver dropped means the watcher is shutting down
                    let _ = raw_tx.send(event);
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&root, mode)?;

        Ok(Self {
            mapper: EventMapper::new(root.clone()),
            root,
            _watcher: watcher,
            raw_rx,
            ready: VecDeque::new(),
        })
    }

    /// Next change event, or None once the backend has stopped.
    ///
    /// A rename whose other half never shows up (moved out of the tree) is
    /// released as `Deleted` after [`RENAME_PAIR_WINDOW`].
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Some(event);
            }

            let raw = match self.mapper.pending_deadline() {
                Some(deadline) => match timeout_at(deadline, self.raw_rx.recv()).await {
                    Ok(raw) => raw,
                    Err(_) => {
                        self.ready.extend(self.mapper.take_pending());
                        continue;
                    }
                },
                None => self.raw_rx.recv().await,
            };

            match raw {
                Some(event) => self.ready.extend(self.mapper.map(event, now_secs())),
                None => {
                    self.ready.extend(self.mapper.take_pending());
                    return self.ready.pop_front();
                }
            }
        }
    }

    /// Get the watched root.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A rename `From` waiting for its partner.
struct PendingFrom {
    path: PathBuf,
    tracker: Option<usize>,
    captured: u64,
    deadline: Instant,
}

/// Turns notify events into `ChangeEvent`s relative to the root.
///
/// inotify reports a rename as `From`, `To`, then a paired `Both`. The
/// mapper holds a `From` until it sees how the rename resolves: a `Both`
/// becomes one `Moved`; anything else, or the pair window running out,
/// releases the held path as `Deleted` (it was moved out of the tree).
pub(crate) struct EventMapper {
    root: PathBuf,
    pending_from: Option<PendingFrom>,
}

impl EventMapper {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self {
            root,
            pending_from: None,
        }
    }

    pub(crate) fn map(&mut self, event: Event, now: u64) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        let first = event.paths.first().cloned();
        let tracker = event.tracker();

        match event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                self.flush_pending(&mut out);
                self.pending_from = first.map(|path| PendingFrom {
                    path,
                    tracker,
                    captured: now,
                    deadline: Instant::now() + RENAME_PAIR_WINDOW,
                });
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                // A held From with the same tracker means the paired Both is next.
                let paired = self
                    .pending_from
                    .as_ref()
                    .is_some_and(|pending| pending.tracker == tracker);
                if !paired {
                    self.flush_pending(&mut out);
                    if let Some(path) = first {
                        self.push(&mut out, &path, Kind::Created, now);
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                self.pending_from = None;
                if let [from, to] = event.paths.as_slice() {
                    match (self.relative(from), self.relative(to)) {
                        (Some(src), Some(dest)) => {
                            out.push(ChangeEvent::moved(src, dest, to.is_dir(), now));
                        }
                        (None, Some(_)) => self.push(&mut out, to, Kind::Created, now),
                        (Some(_), None) => self.push(&mut out, from, Kind::Deleted(false), now),
                        (None, None) => {}
                    }
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Backends that cannot pair renames report each side alone.
                self.flush_pending(&mut out);
                for path in &event.paths {
                    let kind = if path.exists() {
                        Kind::Created
                    } else {
                        Kind::Deleted(false)
                    };
                    self.push(&mut out, path, kind, now);
                }
            }
            EventKind::Create(kind) => {
                self.flush_pending(&mut out);
                for path in &event.paths {
                    let is_dir = kind == CreateKind::Folder || path.is_dir();
                    self.push(&mut out, path, Kind::CreatedAs(is_dir), now);
                }
            }
            EventKind::Modify(_) => {
                self.flush_pending(&mut out);
                for path in &event.paths {
                    self.push(&mut out, path, Kind::Modified, now);
                }
            }
            EventKind::Remove(kind) => {
                self.flush_pending(&mut out);
                for path in &event.paths {
                    self.push(&mut out, path, Kind::Deleted(kind == RemoveKind::Folder), now);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }

        out
    }

    /// When the held rename half must be released, if one is held.
    pub(crate) fn pending_deadline(&self) -> Option<Instant> {
        self.pending_from.as_ref().map(|pending| pending.deadline)
    }

    /// Release the held rename half as `Deleted`.
    pub(crate) fn take_pending(&mut self) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        self.flush_pending(&mut out);
        out
    }

    fn flush_pending(&mut self, out: &mut Vec<ChangeEvent>) {
        if let Some(pending) = self.pending_from.take() {
            self.push(out, &pending.path, Kind::Deleted(false), pending.captured);
        }
    }

    fn push(&self, out: &mut Vec<ChangeEvent>, path: &Path, kind: Kind, now: u64) {
        let Some(relative) = self.relative(path) else {
            return;
        };
        let event = match kind {
            Kind::Created => ChangeEvent::created(relative, path.is_dir(), now),
            Kind::CreatedAs(is_dir) => ChangeEvent::created(relative, is_dir, now),
            Kind::Modified => ChangeEvent::modified(relative, path.is_dir(), now),
            Kind::Deleted(is_dir) => ChangeEvent::deleted(relative, is_dir, now),
        };
        debug!("File event: {}", event);
        out.push(event);
    }

    /// Wire-form path relative to the root, or None for the root itself,
    /// paths outside it, and non-UTF-8 names.
    fn relative(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut names = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => names.push(name.to_str()?),
                _ => return None,
            }
        }
        if names.is_empty() {
            return None;
        }
        Some(wire_path(&names.join("/")))
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Created,
    CreatedAs(bool),
    Modified,
    Deleted(bool),
}
