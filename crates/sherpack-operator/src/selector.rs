//! The Action Selector: the central decision table mapping an observed
//! release state and the declared object onto the next action to run
//! (spec §4.4).

use async_trait::async_trait;

use crate::declared::{DeclaredRelease, DriftDetectionMode};
use crate::diff_summary::DiffSummarizer;
use crate::error::{SelectorError, VerifyError};
use crate::events::EventRecorder;
use crate::history::ReleaseSnapshot;
use crate::remediation::RemediationStrategy;
use crate::state::{ActionKind, ObservedState, ReleaseState};

/// Verifies that a rollback target snapshot is still a safe place to roll
/// back to.
#[async_trait]
pub trait SnapshotVerifier: Send + Sync {
    async fn verify(&self, snapshot: &ReleaseSnapshot) -> Result<(), VerifyError>;
}

/// The side-channel dependencies the Selector needs beyond pure
/// `(state, release)` input: rollback-target verification and the
/// `DriftDetected` event (spec §4.4's `Drifted` row, §6).
pub struct SelectorContext<'a> {
    pub verifier: &'a dyn SnapshotVerifier,
    pub events: &'a dyn EventRecorder,
    pub diff_summarizer: &'a dyn DiffSummarizer,
    /// `<namespace>/<name>`, for the event body.
    pub full_release_name: String,
}

/// Decide the next action, or `None` meaning "done", or a terminal error.
///
/// Reproduces spec §4.4's table and Failed-state decision tree verbatim,
/// including its tie-breaks: `Absent` always selects Install regardless of
/// history, `Unmanaged` clears history and still selects Upgrade (not
/// Install — see DESIGN.md's open-question log), and truncation on
/// `InSync` preserves a rollback candidate alongside the latest snapshot.
pub async fn select(
    state: &ObservedState,
    release: &mut dyn DeclaredRelease,
    cx: &SelectorContext<'_>,
) -> Result<Option<ActionKind>, SelectorError> {
    match state.status {
        ReleaseState::InSync => {
            let default_ignore = release.test_policy().ignore_failures;
            let ignore_test_failures = release
                .active_remediation()
                .map(|r| r.must_ignore_test_failures(default_ignore))
                .unwrap_or(default_ignore);
            release.history_mut().truncate(ignore_test_failures);
            if let Some(latest) = release.history().latest() {
                let version = latest.chart_version.clone();
                release.set_last_applied_revision(&version);
            }
            Ok(None)
        }

        ReleaseState::Locked => Ok(Some(ActionKind::Unlock)),

        ReleaseState::Absent => {
            if let Some(rem) = release.active_remediation() {
                if rem.retries_exhausted() && !rem.must_remediate_last_failure() {
                    return Err(SelectorError::ExceededMaxRetries(
                        "cannot install release".to_string(),
                    ));
                }
            }
            Ok(Some(ActionKind::Install))
        }

        ReleaseState::Unmanaged => {
            release.history_mut().clear();
            Ok(Some(ActionKind::Upgrade))
        }

        ReleaseState::OutOfSync => {
            if let Some(rem) = release.active_remediation() {
                if rem.retries_exhausted() && !rem.must_remediate_last_failure() {
                    return Err(SelectorError::ExceededMaxRetries(
                        "cannot upgrade release".to_string(),
                    ));
                }
            }
            Ok(Some(ActionKind::Upgrade))
        }

        ReleaseState::Drifted => {
            let diff = state.diff.as_deref().unwrap_or_default();
            let summary = cx.diff_summarizer.summarize(diff);
            cx.events.warn(
                "DriftDetected",
                format!(
                    "Cluster state of release {} has drifted from the desired state:\n{}",
                    cx.full_release_name, summary
                ),
            );
            match release.drift_detection_mode() {
                DriftDetectionMode::Enabled => Ok(Some(ActionKind::Upgrade)),
                DriftDetectionMode::Disabled => {
                    for entry in diff {
                        tracing::debug!(path = %entry.path, change = ?entry.change, "drift detail");
                    }
                    Ok(None)
                }
            }
        }

        ReleaseState::Untested => Ok(Some(ActionKind::Test)),

        ReleaseState::Failed => select_failed(release, cx).await,
    }
}

/// The Failed-state decision tree (spec §4.4).
async fn select_failed(
    release: &mut dyn DeclaredRelease,
    cx: &SelectorContext<'_>,
) -> Result<Option<ActionKind>, SelectorError> {
    let Some(rem) = release.active_remediation() else {
        // No remediation policy configured: re-upgrade is the only safe
        // forward motion.
        return Ok(Some(ActionKind::Upgrade));
    };

    if rem.failure_count() == 0 {
        // The observed failure doesn't correspond to accounted history
        // (conditions changed underneath us).
        return Ok(Some(ActionKind::Upgrade));
    }

    if rem.retries_exhausted() && !rem.must_remediate_last_failure() {
        return Err(SelectorError::ExceededMaxRetries(
            "cannot remediate failed release".to_string(),
        ));
    }

    let ignore_test_failures = rem.must_ignore_test_failures(release.test_policy().ignore_failures);
    let strategy = rem.strategy();
    release.history_mut().truncate(ignore_test_failures);

    match strategy {
        RemediationStrategy::Rollback => {
            let Some(target) = release.history().previous(ignore_test_failures).cloned() else {
                // No viable rollback target at all: treat exactly like a
                // corrupt target and fall back to Upgrade.
                return Ok(Some(ActionKind::Upgrade));
            };
            match cx.verifier.verify(&target).await {
                Ok(()) => Ok(Some(ActionKind::RollbackRemediation)),
                Err(e) if e.is_corrupt_target() => Ok(Some(ActionKind::Upgrade)),
                Err(e) => Err(SelectorError::VerifyFailed(e)),
            }
        }
        RemediationStrategy::Uninstall => Ok(Some(ActionKind::UninstallRemediation)),
    }
}
