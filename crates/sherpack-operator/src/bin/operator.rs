//! The operator binary: ambient glue wiring `sherpack-operator`'s
//! reconciliation core to a real `kube::runtime::Controller` watch loop.
//!
//! Everything here — chart resolution, the controller watch/requeue
//! plumbing, logging init — is outside the reconciliation core's scope;
//! the core is the `AtomicReleaseDriver` this binary constructs and calls
//! once per watch event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Client, ResourceExt};
use sherpack_core::{LoadedPack, Values};
use sherpack_kube::client::KubeClient;
use sherpack_kube::storage::{SecretsDriver, StorageConfig};
use tokio_util::sync::CancellationToken;

use sherpack_operator::action::{ActionContext, ActionReconciler};
use sherpack_operator::crd::SherpackRelease;
use sherpack_operator::diff_summary::BulletDiffSummarizer;
use sherpack_operator::driver::AtomicReleaseDriver;
use sherpack_operator::error::{DriverError, DriverOutcome};
use sherpack_operator::events::KubeEventRecorder;
use sherpack_operator::observer::KubeReleaseStateObserver;
use sherpack_operator::patch::KubeApiPatcher;
use sherpack_operator::strategy::CleanReleaseStrategy;

mod actions {
    pub use sherpack_operator::action::{
        InstallAction, RollbackRemediationAction, TestAction, UninstallRemediationAction,
        UnlockAction, UpgradeAction,
    };
}

const REQUEUE_INTERVAL: Duration = Duration::from_secs(30);
const CANCELLATION_GRACE: Duration = Duration::from_secs(25);

/// Where locally-resolved chart contents live. Chart fetch/pull from an OCI
/// registry is out of scope for this core (spec's "release-engine client"
/// boundary); a real deployment would resolve `spec.chart` through whatever
/// registry client it runs alongside this operator.
const CHARTS_ROOT: &str = "/etc/sherpack-operator/charts";

struct ReconcileContext {
    client: Client,
    kube_client: Arc<KubeClient<SecretsDriver>>,
    patcher: KubeApiPatcher,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    use miette::IntoDiagnostic;

    miette::set_panic_hook();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let client = Client::try_default().await.into_diagnostic()?;
    let storage = SecretsDriver::with_client(client.clone(), StorageConfig::default());
    let kube_client = Arc::new(KubeClient::with_client(client.clone(), storage));
    let patcher = KubeApiPatcher::new(client.clone());

    let ctx = Arc::new(ReconcileContext {
        client: client.clone(),
        kube_client,
        patcher,
    });

    tracing::info!("sherpack-operator starting, watching SherpackRelease");

    let releases = kube::Api::<SherpackRelease>::all(client);
    Controller::new(releases, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj_ref, action)) => tracing::debug!(release = %obj_ref, ?action, "reconciled"),
                Err(err) => tracing::warn!(error = %err, "reconcile failed"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(
    release: Arc<SherpackRelease>,
    ctx: Arc<ReconcileContext>,
) -> Result<Action, DriverError> {
    let mut release = (*release).clone();

    let (pack, values) = resolve_chart(&release).map_err(|e| DriverError::Action(e.into()))?;
    let action_ctx = ActionContext {
        pack: Arc::new(pack),
        values,
    };

    let storage = SecretsDriver::with_client(ctx.client.clone(), StorageConfig::default());
    let observer = KubeReleaseStateObserver::new(storage, ctx.client.clone());
    let events = KubeEventRecorder::new(ctx.client.clone(), release.object_ref(&()));
    let diff_summarizer = BulletDiffSummarizer;
    let verifier = RevisionVerifier {
        kube_client: ctx.kube_client.clone(),
        namespace: release.metadata.namespace.clone().unwrap_or_default(),
        name: release.metadata.name.clone().unwrap_or_default(),
    };
    let strategy = CleanReleaseStrategy;

    let install = actions::InstallAction::new(ctx.kube_client.clone());
    let upgrade = actions::UpgradeAction::new(ctx.kube_client.clone());
    let test = actions::TestAction::new(ctx.client.clone());
    let rollback = actions::RollbackRemediationAction::new(ctx.kube_client.clone());
    let uninstall = actions::UninstallRemediationAction::new(ctx.kube_client.clone());
    let unlock = actions::UnlockAction::new(ctx.kube_client.clone());
    let reconcilers: Vec<&dyn ActionReconciler> =
        vec![&install, &upgrade, &test, &rollback, &uninstall, &unlock];

    let driver = AtomicReleaseDriver::new(
        &observer,
        &ctx.patcher,
        &events,
        &diff_summarizer,
        &verifier,
        &strategy,
        reconcilers,
        sherpack_operator::patch::FIELD_MANAGER,
    );

    let cancel = CancellationToken::new();
    let watchdog = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(CANCELLATION_GRACE).await;
        watchdog.cancel();
    });

    match driver.reconcile(cancel, &mut release, &action_ctx).await {
        Ok(DriverOutcome::Done) => Ok(Action::requeue(REQUEUE_INTERVAL)),
        Ok(DriverOutcome::MustRequeue) => Ok(Action::requeue(Duration::from_secs(5))),
        Err(err) => Err(err),
    }
}

fn error_policy(_release: Arc<SherpackRelease>, err: &DriverError, _ctx: Arc<ReconcileContext>) -> Action {
    tracing::warn!(error = %err, "reconciliation error, requeuing");
    Action::requeue(Duration::from_secs(60))
}

fn resolve_chart(release: &SherpackRelease) -> Result<(LoadedPack, Values), sherpack_kube::KubeError> {
    let chart_dir: PathBuf = [CHARTS_ROOT, &release.spec.chart.name, &release.spec.chart.version]
        .iter()
        .collect();
    let pack = LoadedPack::load(&chart_dir)
        .map_err(|e| sherpack_kube::KubeError::Storage(format!("failed to load chart {chart_dir:?}: {e}")))?;
    let values: Values = serde_json::from_value(release.spec.values.clone())
        .map_err(|e| sherpack_kube::KubeError::Storage(format!("invalid values: {e}")))?;
    Ok((pack, values))
}

/// Verifies a rollback-target snapshot by checking the storage driver still
/// has the revision and its recorded digest still matches what was
/// rendered, per spec §4.4's "digest mismatch" corrupt-target case.
///
/// Built fresh per reconcile call, scoped to that one release's
/// namespace/name — a rollback target is only ever meaningful relative to
/// the release that recorded it.
struct RevisionVerifier {
    kube_client: Arc<KubeClient<SecretsDriver>>,
    namespace: String,
    name: String,
}

#[async_trait::async_trait]
impl sherpack_operator::selector::SnapshotVerifier for RevisionVerifier {
    async fn verify(
        &self,
        snapshot: &sherpack_operator::history::ReleaseSnapshot,
    ) -> Result<(), sherpack_operator::error::VerifyError> {
        use sherpack_operator::error::VerifyError;

        let stored = self
            .kube_client
            .storage()
            .get(&self.namespace, &self.name, snapshot.revision)
            .await
            .map_err(|_| VerifyError::Disappeared(snapshot.revision))?;

        let digest = sherpack_operator::observer::digest_of(
            &stored.pack.name,
            &stored.pack.version.to_string(),
            &serde_json::to_string(&stored.values).unwrap_or_default(),
        );
        if digest != snapshot.manifest_digest {
            return Err(VerifyError::DigestMismatch(snapshot.revision));
        }
        Ok(())
    }
}
