use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use quill_core::Author;

/// A proposed whole-buffer change awaiting the author's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDiff {
    pub original: String,
    pub modified: String,
    pub description: String,
    pub author: Author,
    pub proposed_at: DateTime<Utc>,
}

impl PendingDiff {
    pub fn new(
        original: impl Into<String>,
        modified: impl Into<String>,
        description: impl Into<String>,
        author: Author,
    ) -> Self {
        Self {
            original: original.into(),
            modified: modified.into(),
            description: description.into(),
            author,
            proposed_at: Utc::now(),
        }
    }
}

/// Holds at most one [`PendingDiff`].  The last proposal wins.
#[derive(Debug, Default)]
pub struct DiffReviewGate {
    pending: Option<PendingDiff>,
}

impl DiffReviewGate {
    /// Store `diff`, returning the unreviewed proposal it displaced, if any.
    pub fn propose(&mut self, diff: PendingDiff) -> Option<PendingDiff> {
        debug!(description = %diff.description, "change proposed for review");
        let displaced = self.pending.replace(diff);
        if let Some(old) = &displaced {
            warn!(
                description = %old.description,
                proposed_at = %old.proposed_at,
                "unreviewed proposal replaced by a newer one"
            );
        }
        displaced
    }

    /// Take the pending diff for committing.
    pub fn accept(&mut self) -> Option<PendingDiff> {
        self.pending.take()
    }

    /// Discard the pending diff.
    pub fn reject(&mut self) -> Option<PendingDiff> {
        let rejected = self.pending.take();
        if let Some(diff) = &rejected {
            debug!(description = %diff.description, "proposal rejected");
        }
        rejected
    }

    pub fn pending(&self) -> Option<&PendingDiff> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(modified: &str) -> PendingDiff {
        PendingDiff::new("The cat sat.", modified, "Agent edit", Author::Agent)
    }

    #[test]
    fn accept_empties_the_gate() {
        let mut gate = DiffReviewGate::default();
        assert!(gate.propose(diff("The dog sat.")).is_none());
        assert!(gate.is_pending());

        let accepted = gate.accept().unwrap();
        assert_eq!(accepted.modified, "The dog sat.");
        assert!(!gate.is_pending());
        assert!(gate.accept().is_none());
    }

    #[test]
    fn newer_proposal_displaces_older() {
        let mut gate = DiffReviewGate::default();
        gate.propose(diff("first"));
        let displaced = gate.propose(diff("second")).unwrap();
        assert_eq!(displaced.modified, "first");
        assert_eq!(gate.pending().unwrap().modified, "second");
    }

    #[test]
    fn reject_discards() {
        let mut gate = DiffReviewGate::default();
        gate.propose(diff("The dog sat."));
        assert!(gate.reject().is_some());
        assert!(gate.pending().is_none());
        assert!(gate.reject().is_none());
    }
}
