//! The `SherpackRelease` custom resource: the production `DeclaredRelease`
//! (spec §3's "Declared Object"), backed by `kube::CustomResource`.

use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{ConditionRegistry, Conditions};
use crate::declared::{DeclaredRelease, DriftDetectionMode, TestPolicy};
use crate::history::History;
use crate::observer::digest_of;
use crate::remediation::RemediationConfig;
use crate::remediation::RemediationPolicy;
use crate::state::ActionKind;

pub const API_VERSION: &str = "sherpack.io/v1alpha1";
pub const KIND: &str = "SherpackRelease";

/// The declared inputs: what chart, what values, and how the reconciler
/// should behave around tests, drift, timeouts, and remediation.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sherpack.io",
    version = "v1alpha1",
    kind = "SherpackRelease",
    namespaced,
    status = "SherpackReleaseStatus",
    shortname = "shrel",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"ChartVersion", "type":"string", "jsonPath":".spec.chart.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SherpackReleaseSpec {
    pub chart: ChartRef,

    #[serde(default)]
    pub values: serde_json::Value,

    #[serde(default)]
    pub test_policy: TestPolicy,

    #[serde(default)]
    pub drift_detection: DriftDetectionMode,

    /// Remediation policy in effect while no release has ever been
    /// recorded yet (the `Absent` row of spec §4.4's table).
    #[serde(default)]
    pub install_remediation: Option<RemediationConfig>,

    /// Remediation policy in effect once a release exists (the
    /// `OutOfSync`/`Failed` rows). `DeclaredRelease::active_remediation`
    /// picks between the two based on whether history is empty.
    #[serde(default)]
    pub upgrade_remediation: Option<RemediationConfig>,

    /// Per-action timeout overrides; any kind left unset falls back to
    /// `timeout_seconds`.
    #[serde(default)]
    pub timeouts: ActionTimeouts,

    /// Default per-action timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,
}

fn default_timeout_secs() -> u64 {
    300
}

/// Per-action timeout overrides (spec §4.2: "Install/Upgrade/Test/Rollback/
/// Uninstall each carry their own timeout overriding a default").
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActionTimeouts {
    #[serde(default)]
    pub install: Option<u64>,
    #[serde(default)]
    pub upgrade: Option<u64>,
    #[serde(default)]
    pub test: Option<u64>,
    #[serde(default)]
    pub rollback: Option<u64>,
    #[serde(default)]
    pub uninstall: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub repository: Option<String>,
}

/// Everything the reconciler writes back: conditions, the observed history,
/// bookkeeping for the Selector, and the legacy `lastAppliedRevision`
/// compatibility field (spec §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SherpackReleaseStatus {
    #[serde(default)]
    pub conditions: Conditions,

    #[serde(default)]
    pub history: History,

    #[serde(default)]
    pub last_attempted_release_action: Option<ActionKind>,

    #[serde(default)]
    pub last_applied_revision: Option<String>,

    #[serde(default)]
    pub observed_generation: i64,

    /// Consecutive failures since the last successful Install, reset on
    /// success. Backs `ActiveRemediation().GetFailureCount()` while
    /// `install_remediation` is the active policy.
    #[serde(default)]
    pub install_failures: u32,

    /// Consecutive failures since the last successful Upgrade/Remediate,
    /// reset on success. Backs `ActiveRemediation().GetFailureCount()` while
    /// `upgrade_remediation` is the active policy.
    #[serde(default)]
    pub upgrade_failures: u32,
}

impl DeclaredRelease for SherpackRelease {
    fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("default")
    }

    fn timeout_for(&self, kind: ActionKind) -> Duration {
        let override_secs = match kind {
            ActionKind::Install => self.spec.timeouts.install,
            ActionKind::Upgrade => self.spec.timeouts.upgrade,
            ActionKind::Test => self.spec.timeouts.test,
            ActionKind::RollbackRemediation => self.spec.timeouts.rollback,
            ActionKind::UninstallRemediation => self.spec.timeouts.uninstall,
            ActionKind::Unlock => None,
        };
        Duration::from_secs(override_secs.unwrap_or(self.spec.timeout_seconds))
    }

    fn test_policy(&self) -> &TestPolicy {
        &self.spec.test_policy
    }

    fn drift_detection_mode(&self) -> DriftDetectionMode {
        self.spec.drift_detection
    }

    fn history(&self) -> &History {
        self.status.as_ref().map(|s| &s.history).unwrap_or(&EMPTY_HISTORY)
    }

    fn history_mut(&mut self) -> &mut History {
        &mut self.status.get_or_insert_with(Default::default).history
    }

    fn desired_digest(&self) -> String {
        let values_json = serde_json::to_string(&self.spec.values).unwrap_or_default();
        digest_of(&self.spec.chart.name, &self.spec.chart.version, &values_json)
    }

    fn last_attempted_release_action(&self) -> Option<ActionKind> {
        self.status.as_ref().and_then(|s| s.last_attempted_release_action)
    }

    fn set_last_attempted_release_action(&mut self, kind: ActionKind) {
        self.status.get_or_insert_with(Default::default).last_attempted_release_action = Some(kind);
    }

    fn active_remediation(&self) -> Option<Box<dyn RemediationPolicy + '_>> {
        // "No release exists" (spec §3's ActiveRemediation) is proxied by an
        // empty history: a release that has never been installed, or whose
        // history was cleared after being found Unmanaged, has none.
        let no_release_yet = self.status.as_ref().map(|s| s.history.is_empty()).unwrap_or(true);
        if no_release_yet {
            let failure_count = self.status.as_ref().map(|s| s.install_failures).unwrap_or(0);
            self.spec.install_remediation.as_ref().map(|cfg| {
                Box::new(RemediationConfig { failure_count, ..cfg.clone() }) as Box<dyn RemediationPolicy>
            })
        } else {
            let failure_count = self.status.as_ref().map(|s| s.upgrade_failures).unwrap_or(0);
            self.spec.upgrade_remediation.as_ref().map(|cfg| {
                Box::new(RemediationConfig { failure_count, ..cfg.clone() }) as Box<dyn RemediationPolicy>
            })
        }
    }

    fn record_release_failure(&mut self) {
        let no_release_yet = self.status.as_ref().map(|s| s.history.is_empty()).unwrap_or(true);
        let status = self.status.get_or_insert_with(Default::default);
        if no_release_yet {
            status.install_failures = status.install_failures.saturating_add(1);
        } else {
            status.upgrade_failures = status.upgrade_failures.saturating_add(1);
        }
    }

    fn record_release_success(&mut self) {
        let status = self.status.get_or_insert_with(Default::default);
        status.install_failures = 0;
        status.upgrade_failures = 0;
    }

    fn conditions(&self) -> &dyn ConditionRegistry {
        static EMPTY: Conditions = Conditions(Vec::new());
        self.status.as_ref().map(|s| &s.conditions as &dyn ConditionRegistry).unwrap_or(&EMPTY)
    }

    fn conditions_mut(&mut self) -> &mut dyn ConditionRegistry {
        &mut self.status.get_or_insert_with(Default::default).conditions
    }

    fn set_last_applied_revision(&mut self, revision: &str) {
        self.status.get_or_insert_with(Default::default).last_applied_revision = Some(revision.to_string());
    }
}

// `Conditions`/`History` default to empty collections; a `'static` borrow of
// an empty value lets the read-only accessors above avoid allocating when
// `status` hasn't been initialized yet (a brand-new object, pre-first-patch).
static EMPTY_HISTORY: History = History::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{ReleaseSnapshot, SnapshotState};
    use crate::remediation::RemediationStrategy;

    fn bare_release() -> SherpackRelease {
        SherpackRelease::new(
            "myapp",
            SherpackReleaseSpec {
                chart: ChartRef {
                    name: "nginx".to_string(),
                    version: "1.0.0".to_string(),
                    repository: None,
                },
                values: serde_json::json!({}),
                test_policy: TestPolicy::default(),
                drift_detection: DriftDetectionMode::Disabled,
                install_remediation: Some(RemediationConfig {
                    strategy: RemediationStrategy::Uninstall,
                    ..Default::default()
                }),
                upgrade_remediation: Some(RemediationConfig {
                    strategy: RemediationStrategy::Rollback,
                    ..Default::default()
                }),
                timeouts: ActionTimeouts::default(),
                timeout_seconds: default_timeout_secs(),
            },
        )
    }

    #[test]
    fn active_remediation_resolves_to_install_when_history_is_empty() {
        let release = bare_release();
        let rem = release.active_remediation().expect("install remediation configured");
        assert_eq!(rem.strategy(), RemediationStrategy::Uninstall);
    }

    #[test]
    fn active_remediation_resolves_to_upgrade_once_a_release_exists() {
        let mut release = bare_release();
        release.history_mut().push(ReleaseSnapshot {
            revision: 1,
            chart_version: "1.0.0".to_string(),
            manifest_digest: "digest-1".to_string(),
            tested: None,
            state: SnapshotState::Deployed,
        });
        let rem = release.active_remediation().expect("upgrade remediation configured");
        assert_eq!(rem.strategy(), RemediationStrategy::Rollback);
    }

    #[test]
    fn timeout_for_falls_back_to_default_when_unset() {
        let release = bare_release();
        assert_eq!(release.timeout_for(ActionKind::Install), Duration::from_secs(default_timeout_secs()));
    }

    #[test]
    fn timeout_for_honors_per_kind_override() {
        let mut release = bare_release();
        release.spec.timeouts.rollback = Some(45);
        assert_eq!(release.timeout_for(ActionKind::RollbackRemediation), Duration::from_secs(45));
        assert_eq!(release.timeout_for(ActionKind::Upgrade), Duration::from_secs(default_timeout_secs()));
    }

    #[test]
    fn record_release_failure_bumps_install_failures_before_any_release_exists() {
        let mut release = bare_release();
        release.record_release_failure();
        release.record_release_failure();
        let rem = release.active_remediation().expect("install remediation configured");
        assert_eq!(rem.failure_count(), 2);
        assert_eq!(release.status.as_ref().unwrap().upgrade_failures, 0);
    }

    #[test]
    fn record_release_failure_bumps_upgrade_failures_once_a_release_exists() {
        let mut release = bare_release();
        release.history_mut().push(ReleaseSnapshot {
            revision: 1,
            chart_version: "1.0.0".to_string(),
            manifest_digest: "digest-1".to_string(),
            tested: None,
            state: SnapshotState::Deployed,
        });
        release.record_release_failure();
        let rem = release.active_remediation().expect("upgrade remediation configured");
        assert_eq!(rem.failure_count(), 1);
        assert_eq!(release.status.as_ref().unwrap().install_failures, 0);
    }

    #[test]
    fn record_release_success_resets_both_counters() {
        let mut release = bare_release();
        release.record_release_failure();
        release.record_release_success();
        let rem = release.active_remediation().expect("install remediation configured");
        assert_eq!(rem.failure_count(), 0);
    }
}
