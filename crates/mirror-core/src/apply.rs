//! Dispatch classification and local-apply outcomes.

use crate::event::ChangeKind;
use std::fmt;

/// What the receiving node must do to reproduce a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Content changed on the peer; pull it over HTTP.
    Fetch,
    /// Structural change only; mutate the local tree directly.
    LocalApply,
}

impl Action {
    pub fn classify(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Created | ChangeKind::Modified => Action::Fetch,
            ChangeKind::Deleted | ChangeKind::Moved => Action::LocalApply,
        }
    }
}

/// Result of a delete or move against the local filesystem.
///
/// `NotFound` means the desired end state already holds and is not an error.
/// `Failed` is kept distinct from success so callers can log and report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    NotFound,
    Failed(String),
}

impl ApplyOutcome {
    /// Applied or already absent.
    pub fn is_ok(&self) -> bool {
        !matches!(self, ApplyOutcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&str> {
        match self {
            ApplyOutcome::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for ApplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyOutcome::Applied => f.write_str("applied"),
            ApplyOutcome::NotFound => f.write_str("not found (nothing to do)"),
            ApplyOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(Action::classify(ChangeKind::Created), Action::Fetch);
        assert_eq!(Action::classify(ChangeKind::Modified), Action::Fetch);
        assert_eq!(Action::classify(ChangeKind::Deleted), Action::LocalApply);
        assert_eq!(Action::classify(ChangeKind::Moved), Action::LocalApply);
    }

    #[test]
    fn test_outcome_ok() {
        assert!(ApplyOutcome::Applied.is_ok());
        assert!(ApplyOutcome::NotFound.is_ok());

        let failed = ApplyOutcome::Failed("permission denied".into());
        assert!(!failed.is_ok());
        assert_eq!(failed.failure(), Some("permission denied"));
    }
}
