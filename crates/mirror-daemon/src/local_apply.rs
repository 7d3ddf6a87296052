//! Direct local filesystem mutation for deletes and moves, using tokio::fs.
//!
//! "Not found" is success: the desired end state already holds. Every other
//! failure is logged and returned as `ApplyOutcome::Failed`; nothing here
//! retries.

use mirror_core::{ApplyOutcome, PathError, normalize_path};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// The sync root as seen by the receive side.
#[derive(Debug, Clone)]
pub struct LocalFs {
    base_path: PathBuf,
}

impl LocalFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Absolute path for a sync-root relative path.
    pub fn full_path(&self, path: &str) -> Result<PathBuf, PathError> {
        let relative = normalize_path(path)?;
        Ok(self.base_path.join(relative))
    }

    /// Remove a file, or an empty directory when `is_directory` is set.
    pub async fn apply_delete(&self, path: &str, is_directory: bool) -> ApplyOutcome {
        let full_path = match self.full_path(path) {
            Ok(p) => p,
            Err(e) => return ApplyOutcome::Failed(e.to_string()),
        };

        let result = if is_directory {
            fs::remove_dir(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };

        let outcome = classify(result);
        match &outcome {
            ApplyOutcome::Applied => debug!("Deleted {:?}", full_path),
            ApplyOutcome::NotFound => debug!("Delete target already absent: {:?}", full_path),
            ApplyOutcome::Failed(reason) => warn!("Error deleting {:?}: {}", full_path, reason),
        }
        outcome
    }

    /// Rename `src` to `dest`, across filesystems if needed.
    pub async fn apply_move(&self, src: &str, dest: &str, is_directory: bool) -> ApplyOutcome {
        let (from, to) = match (self.full_path(src), self.full_path(dest)) {
            (Ok(from), Ok(to)) => (from, to),
            (Err(e), _) | (_, Err(e)) => return ApplyOutcome::Failed(e.to_string()),
        };

        if let Some(parent) = to.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                warn!("Error preparing destination {:?}: {}", parent, e);
                return ApplyOutcome::Failed(e.to_string());
            }
        }

        let result = match fs::rename(&from, &to).await {
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!("Cross-device move {:?} -> {:?}, copying", from, to);
                move_by_copy(&from, &to, is_directory).await
            }
            other => other,
        };

        let outcome = classify(result);
        match &outcome {
            ApplyOutcome::Applied => debug!("Moved {:?} -> {:?}", from, to),
            ApplyOutcome::NotFound => debug!("Move source already absent: {:?}", from),
            ApplyOutcome::Failed(reason) => {
                warn!("Error moving {:?} -> {:?}: {}", from, to, reason)
            }
        }
        outcome
    }

    /// Create a directory (and parents) announced by the peer.
    pub async fn ensure_dir(&self, path: &str) -> ApplyOutcome {
        let full_path = match self.full_path(path) {
            Ok(p) => p,
            Err(e) => return ApplyOutcome::Failed(e.to_string()),
        };
        match fs::create_dir_all(&full_path).await {
            Ok(()) => ApplyOutcome::Applied,
            Err(e) => {
                warn!("Error creating directory {:?}: {}", full_path, e);
                ApplyOutcome::Failed(e.to_string())
            }
        }
    }
}

fn classify(result: io::Result<()>) -> ApplyOutcome {
    match result {
        Ok(()) => ApplyOutcome::Applied,
        Err(e) if e.kind() == io::ErrorKind::NotFound => ApplyOutcome::NotFound,
        Err(e) => ApplyOutcome::Failed(e.to_string()),
    }
}

async fn move_by_copy(from: &Path, to: &Path, is_directory: bool) -> io::Result<()> {
    if is_directory {
        copy_tree(from, to).await?;
        fs::remove_dir_all(from).await
    } else {
        fs::copy(from, to).await?;
        fs::remove_file(from).await
    }
}

async fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to).await?;
    let mut dir = fs::read_dir(from).await?;
    while let Some(entry) = dir.next_entry().await? {
        let target = to.join(entry.file_name());
        if entry.file_type().await?.is_dir() {
            Box::pin(copy_tree(&entry.path(), &target)).await?;
        } else {
            fs::copy(entry.path(), &target).await?;
        }
    }
    Ok(())
}
