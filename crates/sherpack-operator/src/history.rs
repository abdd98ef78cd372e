//! Release history as seen by the reconciler: a narrow view over prior
//! `StoredRelease`s sufficient for the Selector's decisions, without
//! dragging the full manifest/values payload into the declared object's
//! status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One entry of a declared object's history, most recent last.
///
/// Captures just enough of a `sherpack_kube::release::StoredRelease` for the
/// Selector's rollback-target verification (spec §4.4): whether it ever
/// observed as deployed, whether its digest still matches, and whether its
/// tests passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSnapshot {
    pub revision: u32,
    pub chart_version: String,
    /// sha256 digest of the rendered manifest at the time this snapshot was recorded.
    pub manifest_digest: String,
    /// `None` when tests were not run for this revision, `Some(false)` on failure.
    pub tested: Option<bool>,
    pub state: SnapshotState,
}

/// Coarse terminal state a snapshot can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotState {
    Deployed,
    Failed,
    Superseded,
}

impl ReleaseSnapshot {
    pub fn test_failed(&self) -> bool {
        matches!(self.tested, Some(false))
    }
}

/// A declared object's release history.
///
/// Exhausts the history operations the Selector performs, per spec §9's
/// design note: `latest`, `previous(ignore_test_failures)`,
/// `truncate(ignore_test_failures)`, `clear`. Any broader mutation belongs
/// to Action Reconcilers, not the Selector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct History(Vec<ReleaseSnapshot>);

impl History {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_snapshots(snapshots: Vec<ReleaseSnapshot>) -> Self {
        Self(snapshots)
    }

    pub fn as_slice(&self) -> &[ReleaseSnapshot] {
        &self.0
    }

    pub fn push(&mut self, snapshot: ReleaseSnapshot) {
        self.0.push(snapshot);
    }

    /// The most recent snapshot, if any.
    pub fn latest(&self) -> Option<&ReleaseSnapshot> {
        self.0.last()
    }

    /// The snapshot a rollback would target: the most recent deployed
    /// snapshot before the latest one, optionally skipping snapshots whose
    /// tests failed.
    pub fn previous(&self, ignore_test_failures: bool) -> Option<&ReleaseSnapshot> {
        self.0
            .iter()
            .rev()
            .skip(1)
            .find(|s| s.state == SnapshotState::Deployed && (ignore_test_failures || !s.test_failed()))
    }

    /// Drop all entries except the latest snapshot plus enough prior
    /// snapshots to support a future rollback target (spec §4.4's
    /// tie-break: truncation must preserve at least one valid rollback
    /// candidate alongside the latest snapshot).
    pub fn truncate(&mut self, ignore_test_failures: bool) {
        if self.0.is_empty() {
            return;
        }
        let latest_idx = self.0.len() - 1;
        let rollback_idx = self.0[..latest_idx]
            .iter()
            .rposition(|s| s.state == SnapshotState::Deployed && (ignore_test_failures || !s.test_failed()));

        let mut kept = Vec::new();
        if let Some(idx) = rollback_idx {
            kept.push(self.0[idx].clone());
        }
        kept.push(self.0[latest_idx].clone());
        self.0 = kept;
    }

    /// Drop all history (used when a release is found `Unmanaged` — its
    /// recorded history cannot be trusted).
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Records the test outcome for the latest snapshot, if any exists.
    pub fn mark_latest_tested(&mut self, passed: bool) {
        if let Some(snapshot) = self.0.last_mut() {
            snapshot.tested = Some(passed);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(revision: u32, state: SnapshotState, tested: Option<bool>) -> ReleaseSnapshot {
        ReleaseSnapshot {
            revision,
            chart_version: "1.0.0".to_string(),
            manifest_digest: format!("digest-{revision}"),
            tested,
            state,
        }
    }

    #[test]
    fn previous_skips_failed_tests_by_default() {
        let history = History::from_snapshots(vec![
            snapshot(1, SnapshotState::Deployed, Some(true)),
            snapshot(2, SnapshotState::Deployed, Some(false)),
            snapshot(3, SnapshotState::Deployed, Some(true)),
        ]);
        let previous = history.previous(false).expect("previous exists");
        assert_eq!(previous.revision, 1);
    }

    #[test]
    fn previous_includes_failed_tests_when_ignored() {
        let history = History::from_snapshots(vec![
            snapshot(1, SnapshotState::Deployed, Some(true)),
            snapshot(2, SnapshotState::Deployed, Some(false)),
            snapshot(3, SnapshotState::Deployed, Some(true)),
        ]);
        let previous = history.previous(true).expect("previous exists");
        assert_eq!(previous.revision, 2);
    }

    #[test]
    fn truncate_preserves_latest_and_rollback_target() {
        let mut history = History::from_snapshots(vec![
            snapshot(1, SnapshotState::Deployed, Some(true)),
            snapshot(2, SnapshotState::Failed, None),
            snapshot(3, SnapshotState::Deployed, Some(true)),
        ]);
        history.truncate(false);
        assert_eq!(history.len(), 2);
        assert_eq!(history.as_slice()[0].revision, 1);
        assert_eq!(history.as_slice()[1].revision, 3);
    }

    #[test]
    fn clear_empties_history() {
        let mut history = History::from_snapshots(vec![snapshot(1, SnapshotState::Deployed, None)]);
        history.clear();
        assert!(history.is_empty());
    }
}
