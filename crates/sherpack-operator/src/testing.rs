//! Test doubles for the reconciliation core, in the style of
//! `sherpack_kube::storage::MockStorageDriver`: in-memory, `Send + Sync`,
//! and usable from any test in this crate or downstream integration tests
//! without a real cluster.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sherpack_core::{LoadedPack, Pack, PackKind, PackMetadata, Values};
use tokio_util::sync::CancellationToken;

use crate::action::{ActionContext, ActionReconciler};
use crate::condition::{ConditionRegistry, Conditions};
use crate::declared::{DeclaredRelease, DriftDetectionMode, TestPolicy};
use crate::error::{ActionError, ObserveError};
use crate::history::History;
use crate::observer::ReleaseStateObserver;
use crate::remediation::{RemediationConfig, RemediationPolicy};
use crate::state::{ActionKind, ObservedState, ReconcilerType};

/// A minimal `ActionContext` with no real chart content, for Driver tests
/// that exercise the loop's control flow through `MockActionReconciler`
/// rather than a real install/upgrade.
pub fn test_action_context() -> ActionContext {
    let pack = Pack {
        api_version: "sherpack/v1".to_string(),
        kind: PackKind::Application,
        metadata: PackMetadata {
            name: "test-pack".to_string(),
            version: semver::Version::new(0, 1, 0),
            description: None,
            app_version: None,
            kube_version: None,
            home: None,
            icon: None,
            sources: Vec::new(),
            keywords: Vec::new(),
            maintainers: Vec::new(),
            annotations: HashMap::new(),
        },
        dependencies: Vec::new(),
        engine: Default::default(),
    };
    ActionContext {
        pack: Arc::new(LoadedPack {
            pack,
            root: PathBuf::new(),
            templates_dir: PathBuf::new(),
            values_path: PathBuf::new(),
            schema_path: None,
        }),
        values: Values::new(),
    }
}

/// An in-memory `DeclaredRelease`, built up with builder methods for tests.
#[derive(Clone)]
pub struct TestRelease {
    name: String,
    namespace: String,
    default_timeout: Duration,
    test_policy: TestPolicy,
    drift_detection: DriftDetectionMode,
    history: History,
    last_attempted: Option<ActionKind>,
    remediation: Option<RemediationConfig>,
    conditions: Conditions,
    last_applied_revision: Option<String>,
    desired_digest: String,
}

impl TestRelease {
    pub fn new() -> Self {
        Self {
            name: "myapp".to_string(),
            namespace: "default".to_string(),
            default_timeout: Duration::from_secs(300),
            test_policy: TestPolicy::default(),
            drift_detection: DriftDetectionMode::Disabled,
            history: History::new(),
            last_attempted: None,
            remediation: None,
            conditions: Conditions::default(),
            last_applied_revision: None,
            desired_digest: "test-digest".to_string(),
        }
    }

    pub fn with_desired_digest(mut self, digest: impl Into<String>) -> Self {
        self.desired_digest = digest.into();
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = history;
        self
    }

    pub fn with_remediation(mut self, remediation: RemediationConfig) -> Self {
        self.remediation = Some(remediation);
        self
    }

    pub fn with_drift_detection(mut self, mode: DriftDetectionMode) -> Self {
        self.drift_detection = mode;
        self
    }

    pub fn with_test_policy(mut self, policy: TestPolicy) -> Self {
        self.test_policy = policy;
        self
    }

    pub fn last_applied_revision(&self) -> Option<&str> {
        self.last_applied_revision.as_deref()
    }
}

impl Default for TestRelease {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclaredRelease for TestRelease {
    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn timeout_for(&self, _kind: ActionKind) -> Duration {
        self.default_timeout
    }

    fn test_policy(&self) -> &TestPolicy {
        &self.test_policy
    }

    fn drift_detection_mode(&self) -> DriftDetectionMode {
        self.drift_detection
    }

    fn history(&self) -> &History {
        &self.history
    }

    fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    fn last_attempted_release_action(&self) -> Option<ActionKind> {
        self.last_attempted
    }

    fn set_last_attempted_release_action(&mut self, kind: ActionKind) {
        self.last_attempted = Some(kind);
    }

    fn active_remediation(&self) -> Option<Box<dyn RemediationPolicy + '_>> {
        self.remediation.clone().map(|r| Box::new(r) as Box<dyn RemediationPolicy>)
    }

    fn record_release_failure(&mut self) {
        if let Some(r) = self.remediation.as_mut() {
            r.failure_count = r.failure_count.saturating_add(1);
        }
    }

    fn record_release_success(&mut self) {
        if let Some(r) = self.remediation.as_mut() {
            r.failure_count = 0;
        }
    }

    fn conditions(&self) -> &dyn ConditionRegistry {
        &self.conditions
    }

    fn conditions_mut(&mut self) -> &mut dyn ConditionRegistry {
        &mut self.conditions
    }

    fn set_last_applied_revision(&mut self, revision: &str) {
        self.last_applied_revision = Some(revision.to_string());
    }

    fn desired_digest(&self) -> String {
        self.desired_digest.clone()
    }
}

/// A scripted observer: returns a fixed sequence of states, one per call,
/// repeating the last one once exhausted.
pub struct MockReleaseStateObserver {
    states: Mutex<Vec<ObservedState>>,
    calls: Arc<Mutex<usize>>,
}

impl MockReleaseStateObserver {
    pub fn sequence(states: Vec<ObservedState>) -> Self {
        Self {
            states: Mutex::new(states),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ReleaseStateObserver for MockReleaseStateObserver {
    async fn observe(&self, _release: &dyn DeclaredRelease) -> Result<ObservedState, ObserveError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        let mut states = self.states.lock().unwrap();
        if states.len() > 1 {
            Ok(states.remove(0))
        } else {
            Ok(states
                .last()
                .cloned()
                .unwrap_or_else(|| ObservedState::new(crate::state::ReleaseState::InSync, "default")))
        }
    }
}

/// Counts of action invocations, keyed by action name, for test assertions.
#[derive(Debug, Default, Clone)]
pub struct ActionCounts {
    pub counts: HashMap<&'static str, usize>,
}

/// An action reconciler that records invocations and either always succeeds
/// or always fails, for exercising the Driver's success/failure paths.
pub struct MockActionReconciler {
    name: &'static str,
    kind: ReconcilerType,
    should_fail: bool,
    counts: Arc<Mutex<ActionCounts>>,
}

impl MockActionReconciler {
    pub fn new(name: &'static str, kind: ReconcilerType, counts: Arc<Mutex<ActionCounts>>) -> Self {
        Self {
            name,
            kind,
            should_fail: false,
            counts,
        }
    }

    pub fn failing(mut self) -> Self {
        self.should_fail = true;
        self
    }
}

#[async_trait]
impl ActionReconciler for MockActionReconciler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> ReconcilerType {
        self.kind
    }

    fn timeout(&self, _release: &dyn DeclaredRelease) -> Duration {
        Duration::from_secs(60)
    }

    async fn reconcile(
        &self,
        _ctx: &ActionContext,
        _release: &mut dyn DeclaredRelease,
        _cancel: &CancellationToken,
    ) -> Result<(), ActionError> {
        *self.counts.lock().unwrap().counts.entry(self.name).or_insert(0) += 1;
        if self.should_fail {
            Err(ActionError::Other("mock action failure".to_string()))
        } else {
            Ok(())
        }
    }
}
