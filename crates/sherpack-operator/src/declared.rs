//! The `DeclaredRelease` trait: the narrow surface the core needs from a
//! user-authored object (spec §3's "Declared Object"), independent of the
//! concrete Kubernetes CRD type that implements it.

use std::time::Duration;

use crate::condition::ConditionRegistry;
use crate::history::History;
use crate::remediation::RemediationPolicy;
use crate::state::ActionKind;

/// Drift-detection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum DriftDetectionMode {
    /// Drift is reported but never corrected.
    #[default]
    Disabled,
    /// Drift is corrected by re-running Upgrade.
    Enabled,
}

/// Test policy: whether tests are required and how test failures affect
/// rollback-target selection.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TestPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub ignore_failures: bool,
}

/// Everything the core needs to read from, and write back to, a declared
/// release object.
///
/// `SherpackRelease` (see `crd.rs`) is the only production implementation;
/// the trait exists so the Selector/Driver/Strategy never depend on
/// `k8s_openapi`/`kube` types directly, only on this accessor surface
/// (spec §3).
pub trait DeclaredRelease: Send + Sync {
    fn name(&self) -> &str;
    fn namespace(&self) -> &str;

    /// Per-kind timeout override, falling back to the object's default timeout.
    fn timeout_for(&self, kind: ActionKind) -> Duration;

    fn test_policy(&self) -> &TestPolicy;
    fn drift_detection_mode(&self) -> DriftDetectionMode;

    fn history(&self) -> &History;
    fn history_mut(&mut self) -> &mut History;

    /// A stable digest of the desired inputs (chart reference + values),
    /// used by the Observer to tell `InSync`/`OutOfSync` apart without
    /// needing to re-render the chart itself (rendering stays owned by
    /// `sherpack-engine`).
    fn desired_digest(&self) -> String;

    fn last_attempted_release_action(&self) -> Option<ActionKind>;
    fn set_last_attempted_release_action(&mut self, kind: ActionKind);

    /// Resolves to install-remediation when no release exists, and to
    /// upgrade-remediation otherwise. `None` means no remediation policy is
    /// configured at all (spec §4.4's Failed-state step 1).
    ///
    /// Returns an owned value rather than a borrow: a production
    /// implementation resolves the policy's `failure_count()` from tracked
    /// status counters at call time, so there's no single field left to
    /// hand out a reference to.
    fn active_remediation(&self) -> Option<Box<dyn RemediationPolicy + '_>>;

    /// Bumps the active remediation's failure count. Called by the Driver
    /// after a Release or Remediate action fails. No-op by default, since
    /// test doubles drive `failure_count` directly through fixtures.
    fn record_release_failure(&mut self) {}

    /// Resets the active remediation's failure count, ending the current
    /// failure streak. Called by the Driver after a Release or Remediate
    /// action succeeds.
    fn record_release_success(&mut self) {}

    fn conditions(&self) -> &dyn ConditionRegistry;
    fn conditions_mut(&mut self) -> &mut dyn ConditionRegistry;

    /// Legacy compatibility projection (spec §9): the latest chart version,
    /// mirrored onto the status whenever the Selector reports `InSync`.
    /// Scheduled for removal; kept only because the decision table names it.
    fn set_last_applied_revision(&mut self, revision: &str);
}
