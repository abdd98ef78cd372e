//! Action Reconcilers: the six concrete operations the Driver can dispatch
//! (spec §4.3), each a thin adapter over `sherpack_kube::client::KubeClient`.
//!
//! Chart loading and rendering stay out of this module's scope (spec's
//! "release-engine client" boundary): the operator binary resolves a
//! `LoadedPack` and merged `Values` before invoking the Driver, and passes
//! them down through `ActionContext`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sherpack_core::{LoadedPack, Values};
use sherpack_kube::actions::{InstallOptions, RollbackOptions, UninstallOptions, UpgradeOptions};
use sherpack_kube::client::KubeClient;
use sherpack_kube::hooks::{HookExecutor, HookPhase};
use sherpack_kube::storage::StorageDriver;
use tokio_util::sync::CancellationToken;

use crate::condition::{ConditionRegistry, ConditionStatus, RELEASED, REMEDIATED, TEST_SUCCESS};
use crate::declared::DeclaredRelease;
use crate::error::ActionError;
use crate::history::{ReleaseSnapshot, SnapshotState};
use crate::observer::digest_of;
use crate::state::{ActionKind, ReconcilerType};

/// Per-call inputs shared by every Action Reconciler invocation, resolved
/// once per Driver pass.
pub struct ActionContext {
    pub pack: Arc<LoadedPack>,
    pub values: Values,
}

/// A single unit of work the Driver can dispatch (spec §4.3).
#[async_trait]
pub trait ActionReconciler: Send + Sync {
    /// Short identifier, used in condition messages and logs.
    fn name(&self) -> &'static str;

    /// The `ReconcilerType` this reconciler belongs to, for the Strategy.
    fn kind(&self) -> ReconcilerType;

    /// Per-release timeout for this action.
    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration;

    /// Perform the action, mutating `release`'s bookkeeping (history,
    /// last-attempted-action) as a side effect on success.
    ///
    /// `cancel` is the ambient cancellation context the Driver races this
    /// call against (spec's cancellation contract): a well-behaved
    /// reconciler that polls a long-running wait loop should check it and
    /// return `ActionError::Cancelled` promptly rather than relying solely
    /// on the Driver dropping the future.
    async fn reconcile(
        &self,
        ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        cancel: &CancellationToken,
    ) -> Result<(), ActionError>;
}

fn wait_timeout(release: &dyn DeclaredRelease, kind: ActionKind) -> Duration {
    release.timeout_for(kind)
}

/// `sherpack_kube`'s action options carry their timeouts as `chrono::Duration`
/// (see `sherpack_kube::actions`); the core's `DeclaredRelease` surface deals
/// only in `std::time::Duration`. Out-of-range conversion (years-long
/// timeouts) falls back to clamping at whole seconds rather than failing the
/// action outright.
fn chrono_timeout(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::seconds(d.as_secs() as i64))
}

/// Installs a release that does not yet exist.
pub struct InstallAction<S: StorageDriver> {
    client: Arc<KubeClient<S>>,
}

impl<S: StorageDriver> InstallAction<S> {
    pub fn new(client: Arc<KubeClient<S>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S: StorageDriver> ActionReconciler for InstallAction<S> {
    fn name(&self) -> &'static str {
        "install"
    }

    fn kind(&self) -> ReconcilerType {
        ReconcilerType::Release
    }

    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration {
        wait_timeout(release, ActionKind::Install)
    }

    async fn reconcile(
        &self,
        ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let options = InstallOptions {
            name: release.name().to_string(),
            namespace: release.namespace().to_string(),
            wait: true,
            timeout: Some(chrono_timeout(self.timeout(release))),
            health_check: None,
            atomic: false,
            create_namespace: true,
        };
        let stored = self
            .client
            .install(&ctx.pack, ctx.values.clone(), &options)
            .await
            .map_err(ActionError::Backend)?;
        release.set_last_attempted_release_action(ActionKind::Install);
        record_deployed_snapshot(release, &stored);
        release.conditions_mut().set(
            RELEASED,
            ConditionStatus::True,
            "InstallSucceeded",
            format!("installed release at revision {}", stored.version),
        );
        Ok(())
    }
}

/// Appends a `Deployed` snapshot for a successful Install/Upgrade, the
/// bookkeeping the Selector's `previous()`/`truncate()` rely on.
fn record_deployed_snapshot(release: &mut dyn DeclaredRelease, stored: &sherpack_kube::release::StoredRelease) {
    let values_json = serde_json::to_string(&stored.values).unwrap_or_default();
    let digest = digest_of(&stored.pack.name, &stored.pack.version.to_string(), &values_json);
    release.history_mut().push(ReleaseSnapshot {
        revision: stored.version,
        chart_version: stored.pack.version.to_string(),
        manifest_digest: digest,
        tested: None,
        state: SnapshotState::Deployed,
    });
}

/// Upgrades an existing release to the declared inputs.
pub struct UpgradeAction<S: StorageDriver> {
    client: Arc<KubeClient<S>>,
}

impl<S: StorageDriver> UpgradeAction<S> {
    pub fn new(client: Arc<KubeClient<S>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S: StorageDriver> ActionReconciler for UpgradeAction<S> {
    fn name(&self) -> &'static str {
        "upgrade"
    }

    fn kind(&self) -> ReconcilerType {
        ReconcilerType::Release
    }

    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration {
        wait_timeout(release, ActionKind::Upgrade)
    }

    async fn reconcile(
        &self,
        ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let options = UpgradeOptions {
            name: release.name().to_string(),
            namespace: release.namespace().to_string(),
            wait: true,
            timeout: Some(chrono_timeout(self.timeout(release))),
            health_check: None,
            atomic: false,
            install: true,
        };
        let stored = self
            .client
            .upgrade(&ctx.pack, ctx.values.clone(), &options)
            .await
            .map_err(ActionError::Backend)?;
        release.set_last_attempted_release_action(ActionKind::Upgrade);
        record_deployed_snapshot(release, &stored);
        release.conditions_mut().set(
            RELEASED,
            ConditionStatus::True,
            "UpgradeSucceeded",
            format!("upgraded release to revision {}", stored.version),
        );
        Ok(())
    }
}

/// Runs the release's `test` hooks on demand (spec §4.4's `Untested` row).
pub struct TestAction {
    kube_client: kube::Client,
}

impl TestAction {
    pub fn new(kube_client: kube::Client) -> Self {
        Self { kube_client }
    }
}

#[async_trait]
impl ActionReconciler for TestAction {
    fn name(&self) -> &'static str {
        "test"
    }

    fn kind(&self) -> ReconcilerType {
        ReconcilerType::Test
    }

    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration {
        wait_timeout(release, ActionKind::Test)
    }

    async fn reconcile(
        &self,
        _ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let revision = release.history().latest().map(|s| s.revision).unwrap_or(0);
        let mut executor = HookExecutor::new();
        let outcome = executor
            .execute_phase(&[], HookPhase::Test, release.name(), revision, &self.kube_client)
            .await;

        let passed = outcome.is_ok();
        release.history_mut().mark_latest_tested(passed);
        if passed {
            release.conditions_mut().set(
                TEST_SUCCESS,
                ConditionStatus::True,
                "TestsPassed",
                format!("test hooks passed for revision {revision}"),
            );
        } else {
            release.conditions_mut().set(
                TEST_SUCCESS,
                ConditionStatus::False,
                "TestsFailed",
                format!("test hooks failed for revision {revision}"),
            );
        }
        outcome.map_err(ActionError::Backend)
    }
}

/// Rolls back to a previously verified revision (spec §4.4's `Failed` row,
/// `RemediationStrategy::Rollback` branch).
pub struct RollbackRemediationAction<S: StorageDriver> {
    client: Arc<KubeClient<S>>,
}

impl<S: StorageDriver> RollbackRemediationAction<S> {
    pub fn new(client: Arc<KubeClient<S>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S: StorageDriver> ActionReconciler for RollbackRemediationAction<S> {
    fn name(&self) -> &'static str {
        "rollback"
    }

    fn kind(&self) -> ReconcilerType {
        ReconcilerType::Remediate
    }

    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration {
        wait_timeout(release, ActionKind::RollbackRemediation)
    }

    async fn reconcile(
        &self,
        _ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let target_revision = release
            .history()
            .previous(release.test_policy().ignore_failures)
            .map(|s| s.revision)
            .ok_or_else(|| ActionError::Other("no rollback target in history".to_string()))?;

        let options = RollbackOptions {
            name: release.name().to_string(),
            namespace: release.namespace().to_string(),
            revision: target_revision,
            wait: true,
            timeout: Some(chrono_timeout(self.timeout(release))),
            health_check: None,
            force: false,
        };
        let stored = self.client.rollback(&options).await.map_err(ActionError::Backend)?;
        record_deployed_snapshot(release, &stored);
        release.conditions_mut().set(
            REMEDIATED,
            ConditionStatus::True,
            "RolledBack",
            format!("rolled back to revision {target_revision}"),
        );
        Ok(())
    }
}

/// Uninstalls a release that has failed beyond repair (spec §4.4's `Failed`
/// row, `RemediationStrategy::Uninstall` branch).
pub struct UninstallRemediationAction<S: StorageDriver> {
    client: Arc<KubeClient<S>>,
}

impl<S: StorageDriver> UninstallRemediationAction<S> {
    pub fn new(client: Arc<KubeClient<S>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S: StorageDriver> ActionReconciler for UninstallRemediationAction<S> {
    fn name(&self) -> &'static str {
        "uninstall"
    }

    fn kind(&self) -> ReconcilerType {
        ReconcilerType::Remediate
    }

    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration {
        wait_timeout(release, ActionKind::UninstallRemediation)
    }

    async fn reconcile(
        &self,
        _ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        let options = UninstallOptions {
            name: release.name().to_string(),
            namespace: release.namespace().to_string(),
            wait: true,
            timeout: Some(chrono_timeout(self.timeout(release))),
            keep_history: true,
            no_hooks: false,
            dry_run: false,
        };
        self.client.uninstall(&options).await.map_err(ActionError::Backend)?;
        release.history_mut().clear();
        release.conditions_mut().set(
            REMEDIATED,
            ConditionStatus::True,
            "Uninstalled",
            "uninstalled the failed release".to_string(),
        );
        Ok(())
    }
}

/// Clears a stuck pending state so the next pass can re-observe cleanly
/// (spec §4.4's `Locked` row).
pub struct UnlockAction<S: StorageDriver> {
    client: Arc<KubeClient<S>>,
}

impl<S: StorageDriver> UnlockAction<S> {
    pub fn new(client: Arc<KubeClient<S>>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<S: StorageDriver> ActionReconciler for UnlockAction<S> {
    fn name(&self) -> &'static str {
        "unlock"
    }

    fn kind(&self) -> ReconcilerType {
        ReconcilerType::Unlock
    }

    fn timeout(&self, release: &dyn DeclaredRelease) -> Duration {
        wait_timeout(release, ActionKind::Unlock)
    }

    async fn reconcile(
        &self,
        _ctx: &ActionContext,
        release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        self.client
            .recover(release.namespace(), release.name())
            .await
            .map_err(ActionError::Backend)?;
        Ok(())
    }
}
