//! The Atomic Release Driver: the outer loop tying the Observer, Selector,
//! Strategy, and Action Reconcilers together (spec §4.5).

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionContext, ActionReconciler};
use crate::condition::{ConditionRegistry, ConditionStatus, RECONCILING, READY, STALLED};
use crate::declared::DeclaredRelease;
use crate::error::{ActionError, DriverError, DriverOutcome};
use crate::events::EventRecorder;
use crate::observer::ReleaseStateObserver;
use crate::patch::Patcher;
use crate::remediation::RemediationPolicy;
use crate::selector::{select, SelectorContext};
use crate::state::{ReconcilerType, ReconcilerTypeSet};

/// The final-patch deadline used once the ambient cancellation has already
/// fired (spec §4.5 step 1): bounded, and deliberately detached from the
/// token that just cancelled everything else.
const CANCELLED_PATCH_DEADLINE: Duration = Duration::from_secs(5);

/// Ties the Observer/Selector/Strategy/Action Reconcilers together into the
/// 9-step loop of spec §4.5.
pub struct AtomicReleaseDriver<'a> {
    observer: &'a dyn ReleaseStateObserver,
    patcher: &'a dyn Patcher,
    events: &'a dyn EventRecorder,
    diff_summarizer: &'a dyn crate::diff_summary::DiffSummarizer,
    verifier: &'a dyn crate::selector::SnapshotVerifier,
    strategy: &'a dyn crate::strategy::ReleaseStrategy,
    actions: HashMap<&'static str, &'a dyn ActionReconciler>,
    field_manager: &'static str,
}

impl<'a> AtomicReleaseDriver<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        observer: &'a dyn ReleaseStateObserver,
        patcher: &'a dyn Patcher,
        events: &'a dyn EventRecorder,
        diff_summarizer: &'a dyn crate::diff_summary::DiffSummarizer,
        verifier: &'a dyn crate::selector::SnapshotVerifier,
        strategy: &'a dyn crate::strategy::ReleaseStrategy,
        actions: Vec<&'a dyn ActionReconciler>,
        field_manager: &'static str,
    ) -> Self {
        let actions = actions.into_iter().map(|a| (a.name(), a)).collect();
        Self {
            observer,
            patcher,
            events,
            diff_summarizer,
            verifier,
            strategy,
            actions,
            field_manager,
        }
    }

    pub async fn reconcile(
        &self,
        cancel: CancellationToken,
        release: &mut dyn DeclaredRelease,
        ctx: &ActionContext,
    ) -> Result<DriverOutcome, DriverError> {
        let mut previous = ReconcilerTypeSet::new();
        let full_name = format!("{}/{}", release.namespace(), release.name());

        loop {
            // Step 1: cancellation check.
            if cancel.is_cancelled() {
                match timeout(CANCELLED_PATCH_DEADLINE, self.patch_best_effort(release)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::warn!(release = %full_name, error = %err, "final patch on cancellation failed"),
                    Err(_) => tracing::warn!(release = %full_name, "final patch on cancellation timed out"),
                }
                return Err(DriverError::Cancelled(format!("reconciliation of {full_name} was cancelled")));
            }

            // Step 2: Observe.
            let observed = match self.observer.observe(release).await {
                Ok(observed) => observed,
                Err(err) => {
                    release.conditions_mut().set(
                        READY,
                        ConditionStatus::False,
                        "StateError",
                        err.to_string(),
                    );
                    self.patch(release).await?;
                    return Err(DriverError::Observe(err));
                }
            };

            // Step 3: Select.
            let selector_cx = SelectorContext {
                verifier: self.verifier,
                events: self.events,
                diff_summarizer: self.diff_summarizer,
                full_release_name: full_name.clone(),
            };
            let selected = match select(&observed, release, &selector_cx).await {
                Ok(selected) => selected,
                Err(crate::error::SelectorError::ExceededMaxRetries(msg)) => {
                    let last_action = release
                        .last_attempted_release_action()
                        .map(|kind| kind.name().to_string())
                        .unwrap_or_else(|| "none".to_string());
                    let failure_count = release.active_remediation().map(|r| r.failure_count()).unwrap_or(0);
                    release.conditions_mut().set(
                        STALLED,
                        ConditionStatus::True,
                        "RetriesExceeded",
                        format!("last attempted action: {last_action}, failure count: {failure_count}"),
                    );
                    self.patch(release).await?;
                    return Err(DriverError::ExceededMaxRetries(msg));
                }
                Err(other) => return Err(other.into()),
            };

            // Step 4: Done.
            let Some(kind) = selected else {
                release.conditions_mut().delete(RECONCILING);
                release.conditions_mut().summarize_ready();
                self.patch(release).await?;
                return Ok(DriverOutcome::Done);
            };

            // Step 5: Gate (MustContinue).
            let reconciler_type = kind.reconciler_type();
            if !self.strategy.must_continue(reconciler_type, &previous) {
                release.conditions_mut().delete(RECONCILING);
                self.patch(release).await?;
                return Ok(self.requeue_or_done(release));
            }

            // Step 6: mark progress + patch.
            let action = *self.actions.get(kind.name()).ok_or_else(|| {
                DriverError::Action(ActionError::Other(format!("no action reconciler registered for '{}'", kind.name())))
            })?;
            let action_timeout = action.timeout(release);
            let message = format!("Running '{}' action with timeout of {:?}", kind.name(), action_timeout);
            release.conditions_mut().set(RECONCILING, ConditionStatus::True, "Progressing", message.clone());
            if reconciler_type == ReconcilerType::Release {
                release.conditions_mut().set(READY, ConditionStatus::Unknown, "Progressing", message);
            }
            self.patch(release).await?;

            // Step 7: run, racing the action against the ambient cancellation
            // so a cancelled reconciliation doesn't block on a well-behaved
            // action's own cancellation check.
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ActionError::Cancelled),
                outcome = action.reconcile(ctx, release, &cancel) => outcome,
            };
            if matches!(reconciler_type, ReconcilerType::Release | ReconcilerType::Remediate) {
                match &outcome {
                    Ok(()) => release.record_release_success(),
                    Err(_) => release.record_release_failure(),
                }
            }
            if let Err(err) = outcome {
                let was_true = release.conditions().get(READY).map(|c| c.status == "True").unwrap_or(false);
                if was_true {
                    release.conditions_mut().set(READY, ConditionStatus::False, "ReconcileError", err.to_string());
                    let _ = self.patch(release).await;
                }
                return Err(DriverError::Action(err));
            }

            // Step 8: Gate (MustStop).
            if self.strategy.must_stop(reconciler_type, &previous) {
                release.conditions_mut().delete(RECONCILING);
                self.patch(release).await?;
                return Ok(self.requeue_or_done(release));
            }

            // Step 9: record + patch + loop.
            previous.push(reconciler_type);
            self.patch(release).await?;
        }
    }

    fn requeue_or_done(&self, release: &dyn DeclaredRelease) -> DriverOutcome {
        match release.active_remediation() {
            Some(rem) if !rem.retries_exhausted() => DriverOutcome::MustRequeue,
            _ => DriverOutcome::Done,
        }
    }

    async fn patch(&self, release: &dyn DeclaredRelease) -> Result<(), DriverError> {
        self.patch_best_effort(release).await.map_err(DriverError::Patch)
    }

    async fn patch_best_effort(&self, release: &dyn DeclaredRelease) -> Result<(), crate::error::PatchError> {
        let status = serde_json::json!({ "conditions": condition_list(release) });
        self.patcher
            .patch_status(release.name(), release.namespace(), status, self.field_manager)
            .await
    }
}

fn condition_list(release: &dyn DeclaredRelease) -> Vec<&k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition> {
    crate::condition::OWNED_CONDITION_TYPES
        .iter()
        .filter_map(|type_| release.conditions().get(type_))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::condition::{ConditionRegistry, READY, STALLED};
    use crate::diff_summary::BulletDiffSummarizer;
    use crate::error::VerifyError;
    use crate::history::{History, ReleaseSnapshot, SnapshotState};
    use crate::remediation::{RemediationConfig, RemediationStrategy};
    use crate::selector::SnapshotVerifier;
    use crate::state::{ObservedState, ReleaseState};
    use crate::testing::{test_action_context, ActionCounts, MockActionReconciler, MockReleaseStateObserver, TestRelease};

    struct NoopEvents;
    impl EventRecorder for NoopEvents {
        fn warn(&self, _reason: &str, _message: String) {}
        fn normal(&self, _reason: &str, _message: String) {}
    }

    struct AlwaysOkVerifier;
    #[async_trait]
    impl SnapshotVerifier for AlwaysOkVerifier {
        async fn verify(&self, _snapshot: &ReleaseSnapshot) -> Result<(), VerifyError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingPatcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Patcher for CountingPatcher {
        async fn patch_status(
            &self,
            _name: &str,
            _namespace: &str,
            _status: serde_json::Value,
            _field_manager: &str,
        ) -> Result<(), crate::error::PatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn snapshot(revision: u32, state: SnapshotState, tested: Option<bool>) -> ReleaseSnapshot {
        ReleaseSnapshot {
            revision,
            chart_version: format!("1.0.{revision}"),
            manifest_digest: format!("digest-{revision}"),
            tested,
            state,
        }
    }

    struct Harness {
        observer: MockReleaseStateObserver,
        patcher: CountingPatcher,
        events: NoopEvents,
        diff_summarizer: BulletDiffSummarizer,
        verifier: AlwaysOkVerifier,
        strategy: CleanReleaseStrategy,
        counts: std::sync::Arc<std::sync::Mutex<ActionCounts>>,
    }

    impl Harness {
        fn new(states: Vec<ObservedState>) -> Self {
            Self {
                observer: MockReleaseStateObserver::sequence(states),
                patcher: CountingPatcher::default(),
                events: NoopEvents,
                diff_summarizer: BulletDiffSummarizer,
                verifier: AlwaysOkVerifier,
                strategy: CleanReleaseStrategy,
                counts: Default::default(),
            }
        }

        fn action_count(&self, name: &str) -> usize {
            self.counts.lock().unwrap().counts.get(name).copied().unwrap_or(0)
        }

        /// Every call leaks its mock reconcilers: they only need to live for
        /// the duration of one `#[tokio::test]`, and leaking avoids fighting
        /// the borrow checker over a `Harness` field that outlives `&self`.
        fn driver(&self, failing_remediation: bool) -> AtomicReleaseDriver<'_> {
            let install: &dyn ActionReconciler = &*Box::leak(Box::new(MockActionReconciler::new(
                "install",
                ReconcilerType::Release,
                self.counts.clone(),
            )));
            let upgrade: &dyn ActionReconciler = &*Box::leak(Box::new(MockActionReconciler::new(
                "upgrade",
                ReconcilerType::Release,
                self.counts.clone(),
            )));
            let mut rollback = MockActionReconciler::new(
                "rollback",
                ReconcilerType::Remediate,
                self.counts.clone(),
            );
            if failing_remediation {
                rollback = rollback.failing();
            }
            let rollback: &dyn ActionReconciler = &*Box::leak(Box::new(rollback));
            let uninstall: &dyn ActionReconciler = &*Box::leak(Box::new(MockActionReconciler::new(
                "uninstall",
                ReconcilerType::Remediate,
                self.counts.clone(),
            )));
            let test: &dyn ActionReconciler = &*Box::leak(Box::new(MockActionReconciler::new(
                "test",
                ReconcilerType::Test,
                self.counts.clone(),
            )));
            let unlock: &dyn ActionReconciler = &*Box::leak(Box::new(MockActionReconciler::new(
                "unlock",
                ReconcilerType::Unlock,
                self.counts.clone(),
            )));

            AtomicReleaseDriver::new(
                &self.observer,
                &self.patcher,
                &self.events,
                &self.diff_summarizer,
                &self.verifier,
                &self.strategy,
                vec![install, upgrade, rollback, uninstall, test, unlock],
                "sherpack-operator-test",
            )
        }
    }

    #[tokio::test]
    async fn first_install_success_reaches_done_without_rerunning_install() {
        let harness = Harness::new(vec![
            ObservedState::new(ReleaseState::Absent, "no release"),
            ObservedState::new(ReleaseState::InSync, "release matches spec"),
        ]);
        let driver = harness.driver(false);
        let mut release = TestRelease::new().with_remediation(RemediationConfig {
            strategy: RemediationStrategy::Rollback,
            failure_count: 0,
            max_retries: 3,
            ..Default::default()
        });
        let ctx = test_action_context();

        let outcome = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect("reconcile succeeds");

        assert_eq!(outcome, DriverOutcome::Done);
        assert_eq!(harness.action_count("install"), 1);
        assert!(release.conditions().get(crate::condition::RECONCILING).is_none());
    }

    #[tokio::test]
    async fn each_reconciler_type_runs_at_most_once_per_pass() {
        // The Observer keeps reporting Absent forever; Install "succeeds" every
        // time (the mock doesn't mutate observed state), so only the Strategy's
        // must_continue gate stops the Driver from looping forever.
        let harness = Harness::new(vec![ObservedState::new(ReleaseState::Absent, "no release")]);
        let driver = harness.driver(false);
        let mut release = TestRelease::new();
        let ctx = test_action_context();

        let outcome = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect("reconcile succeeds");

        assert_eq!(outcome, DriverOutcome::Done);
        assert_eq!(harness.action_count("install"), 1);
    }

    #[tokio::test]
    async fn remediation_stops_the_pass_and_requeues_when_retries_remain() {
        let harness = Harness::new(vec![ObservedState::new(ReleaseState::Failed, "upgrade failed")]);
        let driver = harness.driver(false);
        let mut release = TestRelease::new()
            .with_history(History::from_snapshots(vec![
                snapshot(1, SnapshotState::Deployed, Some(true)),
                snapshot(2, SnapshotState::Failed, None),
            ]))
            .with_remediation(RemediationConfig {
                strategy: RemediationStrategy::Rollback,
                failure_count: 1,
                max_retries: 3,
                ..Default::default()
            });
        let ctx = test_action_context();

        let outcome = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect("reconcile succeeds");

        assert_eq!(outcome, DriverOutcome::MustRequeue);
        assert_eq!(harness.action_count("rollback"), 1);
        assert!(release.conditions().get(crate::condition::RECONCILING).is_none());
    }

    #[tokio::test]
    async fn exceeded_max_retries_marks_stalled_and_returns_error() {
        let harness = Harness::new(vec![ObservedState::new(ReleaseState::Absent, "no release")]);
        let driver = harness.driver(false);
        let mut release = TestRelease::new().with_remediation(RemediationConfig {
            strategy: RemediationStrategy::Rollback,
            failure_count: 3,
            max_retries: 3,
            remediate_last_failure: false,
            ..Default::default()
        });
        let ctx = test_action_context();

        let err = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect_err("retries are exhausted");

        assert!(matches!(err, DriverError::ExceededMaxRetries(_)));
        let stalled = release.conditions().get(STALLED).expect("Stalled condition set");
        assert_eq!(stalled.status, "True");
        assert_eq!(stalled.reason, "RetriesExceeded");
        assert_eq!(harness.patcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn action_failure_flips_ready_false_only_if_previously_true() {
        let harness = Harness::new(vec![ObservedState::new(ReleaseState::Failed, "upgrade failed")]);
        let driver = harness.driver(true);
        let mut release = TestRelease::new()
            .with_history(History::from_snapshots(vec![
                snapshot(1, SnapshotState::Deployed, Some(true)),
                snapshot(2, SnapshotState::Failed, None),
            ]))
            .with_remediation(RemediationConfig {
                strategy: RemediationStrategy::Rollback,
                failure_count: 1,
                max_retries: 3,
                ..Default::default()
            });
        release
            .conditions_mut()
            .set(READY, crate::condition::ConditionStatus::True, "ReconciliationSucceeded", "ok".to_string());
        let ctx = test_action_context();

        let err = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect_err("mock remediation action fails");

        assert!(matches!(err, DriverError::Action(_)));
        let ready = release.conditions().get(READY).expect("Ready condition set");
        assert_eq!(ready.status, "False");
        assert_eq!(ready.reason, "ReconcileError");
    }

    #[tokio::test]
    async fn cancellation_before_iteration_skips_action_and_wraps_cause() {
        let harness = Harness::new(vec![ObservedState::new(ReleaseState::Absent, "no release")]);
        let driver = harness.driver(false);
        let mut release = TestRelease::new();
        let ctx = test_action_context();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = driver
            .reconcile(cancel, &mut release, &ctx)
            .await
            .expect_err("cancellation is surfaced as an error");

        assert!(matches!(err, DriverError::Cancelled(_)));
        assert_eq!(harness.action_count("install"), 0);
        assert_eq!(harness.patcher.calls.load(Ordering::SeqCst), 1);
    }

    /// An action that never returns on its own, so cancellation firing while
    /// it's in flight is the only thing that can make `reconcile` resolve.
    struct NeverFinishes;

    #[async_trait]
    impl ActionReconciler for NeverFinishes {
        fn name(&self) -> &'static str {
            "install"
        }

        fn kind(&self) -> ReconcilerType {
            ReconcilerType::Release
        }

        fn timeout(&self, _release: &dyn DeclaredRelease) -> Duration {
            Duration::from_secs(60)
        }

        async fn reconcile(
            &self,
            _ctx: &ActionContext,
            _release: &mut dyn DeclaredRelease,
            cancel: &CancellationToken,
        ) -> Result<(), ActionError> {
            std::future::pending::<()>().await;
            let _ = cancel;
            unreachable!("cancellation should win the race before this ever resolves")
        }
    }

    #[tokio::test]
    async fn cancellation_mid_action_interrupts_an_in_flight_reconcile() {
        let observer = MockReleaseStateObserver::sequence(vec![ObservedState::new(ReleaseState::Absent, "no release")]);
        let patcher = CountingPatcher::default();
        let events = NoopEvents;
        let diff_summarizer = BulletDiffSummarizer;
        let verifier = AlwaysOkVerifier;
        let strategy = CleanReleaseStrategy;
        let action: &dyn ActionReconciler = &NeverFinishes;
        let driver = AtomicReleaseDriver::new(
            &observer,
            &patcher,
            &events,
            &diff_summarizer,
            &verifier,
            &strategy,
            vec![action],
            "sherpack-operator-test",
        );
        let mut release = TestRelease::new();
        let ctx = test_action_context();

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel_clone.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), driver.reconcile(cancel, &mut release, &ctx))
            .await
            .expect("the race resolves well before the test timeout")
            .expect_err("cancellation interrupts the stuck action");

        assert!(matches!(err, DriverError::Action(ActionError::Cancelled)));
    }

    #[tokio::test]
    async fn insync_is_idempotent_across_two_calls() {
        let harness = Harness::new(vec![
            ObservedState::new(ReleaseState::InSync, "already reconciled"),
            ObservedState::new(ReleaseState::InSync, "already reconciled"),
        ]);
        let driver = harness.driver(false);
        let mut release = TestRelease::new();
        let ctx = test_action_context();

        let first = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect("first call succeeds");
        let second = driver
            .reconcile(CancellationToken::new(), &mut release, &ctx)
            .await
            .expect("second call succeeds");

        assert_eq!(first, DriverOutcome::Done);
        assert_eq!(second, DriverOutcome::Done);
        assert_eq!(harness.action_count("install"), 0);
    }
}

