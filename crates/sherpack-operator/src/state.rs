//! The observed classification of a release, and the action-kind bookkeeping
//! the Strategy and Driver use to decide what runs next.

use serde::{Deserialize, Serialize};
use sherpack_kube::diff::{ChangeType, DiffSource, ResourceChange};

/// Classification of the current world, as computed by a `ReleaseStateObserver`.
///
/// Must be distinguishable by the Observer and used verbatim by the Selector
/// (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleaseState {
    /// A current release exists, its recorded inputs match the declared spec,
    /// and (if tests are required) it has succeeded; no drift.
    InSync,
    /// A release exists but is in a pending/stuck transactional state.
    Locked,
    /// No release exists under the declared name/namespace.
    Absent,
    /// A release exists but lacks the controller's ownership markers.
    Unmanaged,
    /// A current release exists but its recorded inputs diverge from the
    /// declared spec.
    OutOfSync,
    /// Recorded inputs match but live cluster state has diverged from the
    /// manifests the release rendered.
    Drifted,
    /// The release matches spec but tests are enabled and have not yet run
    /// for the current revision.
    Untested,
    /// The most recent attempted release operation failed.
    Failed,
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::InSync => "in-sync",
            Self::Locked => "locked",
            Self::Absent => "absent",
            Self::Unmanaged => "unmanaged",
            Self::OutOfSync => "out-of-sync",
            Self::Drifted => "drifted",
            Self::Untested => "untested",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// One entry of a drift diff: a single resource's divergence from the
/// manifests the release rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    /// create | update | delete
    pub change: DiffChangeType,
    /// A human path identifying the resource, e.g. `apps/v1/Deployment/default/web`.
    pub path: String,
}

/// The three change kinds the spec's `Diff` entries carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffChangeType {
    Create,
    Update,
    Delete,
}

impl DiffEntry {
    /// Build a diff entry from a `sherpack-kube` resource change.
    ///
    /// `Extra` (exists in cluster, not in manifest) and `Missing` (should
    /// exist, doesn't) both fold onto `update`: they're still reconciled by
    /// re-applying the manifest, they just don't cleanly map to Kubernetes
    /// verb semantics the way Added/Modified/Removed do. See DESIGN.md.
    pub fn from_resource_change(change: &ResourceChange) -> Self {
        let change_type = match change.change_type {
            ChangeType::Added => DiffChangeType::Create,
            ChangeType::Removed => DiffChangeType::Delete,
            ChangeType::Modified | ChangeType::Extra | ChangeType::Missing => {
                DiffChangeType::Update
            }
            ChangeType::Unchanged | ChangeType::Unknown => DiffChangeType::Update,
        };
        let path = match &change.namespace {
            Some(ns) => format!("{}/{}/{}/{}", change.api_version, change.kind, ns, change.name),
            None => format!("{}/{}/{}", change.api_version, change.kind, change.name),
        };
        Self {
            change: change_type,
            path,
        }
    }
}

/// The full result of an Observer call: status, a human reason, and (only
/// for `Drifted`) the populated diff.
#[derive(Debug, Clone)]
pub struct ObservedState {
    pub status: ReleaseState,
    pub reason: String,
    pub diff: Option<Vec<DiffEntry>>,
}

impl ObservedState {
    pub fn new(status: ReleaseState, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            diff: None,
        }
    }

    pub fn with_diff(mut self, diff: Vec<DiffEntry>) -> Self {
        self.diff = Some(diff);
        self
    }
}

/// The family of actions the Driver can dispatch, grouped by `ReconcilerType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Install,
    Upgrade,
    Test,
    RollbackRemediation,
    UninstallRemediation,
    Unlock,
}

impl ActionKind {
    /// The short identifier used for logging/condition messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Upgrade => "upgrade",
            Self::Test => "test",
            Self::RollbackRemediation => "rollback",
            Self::UninstallRemediation => "uninstall",
            Self::Unlock => "unlock",
        }
    }

    /// The `ReconcilerType` this action kind belongs to.
    pub fn reconciler_type(&self) -> ReconcilerType {
        match self {
            Self::Install | Self::Upgrade => ReconcilerType::Release,
            Self::Test => ReconcilerType::Test,
            Self::RollbackRemediation | Self::UninstallRemediation => ReconcilerType::Remediate,
            Self::Unlock => ReconcilerType::Unlock,
        }
    }
}

/// The enumeration of reconciler kinds the Strategy reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilerType {
    Release,
    Test,
    Remediate,
    Unlock,
}

/// Ordered multiset of `ReconcilerType` capturing actions already executed
/// in the current Driver invocation (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilerTypeSet {
    entries: Vec<ReconcilerType>,
}

impl ReconcilerTypeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a kind to the set. Never deduplicates: the set is an ordered
    /// log of what ran, not a membership set — `contains` is the only
    /// membership query the Strategy needs.
    pub fn push(&mut self, kind: ReconcilerType) {
        self.entries.push(kind);
    }

    /// Whether `kind` has already run this pass.
    pub fn contains(&self, kind: ReconcilerType) -> bool {
        self.entries.contains(&kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReconcilerType> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciler_type_set_tracks_membership() {
        let mut set = ReconcilerTypeSet::new();
        assert!(!set.contains(ReconcilerType::Release));
        set.push(ReconcilerType::Release);
        assert!(set.contains(ReconcilerType::Release));
        assert!(!set.contains(ReconcilerType::Remediate));
    }

    #[test]
    fn diff_entry_maps_change_types() {
        let change = ResourceChange {
            kind: "Deployment".to_string(),
            api_version: "apps/v1".to_string(),
            name: "web".to_string(),
            namespace: Some("default".to_string()),
            change_type: ChangeType::Added,
            diff: None,
            is_drift: true,
            source: DiffSource::ClusterDrift,
        };
        let entry = DiffEntry::from_resource_change(&change);
        assert_eq!(entry.change, DiffChangeType::Create);
        assert_eq!(entry.path, "apps/v1/Deployment/default/web");
    }
}
