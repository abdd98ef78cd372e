//! The `ReleaseStateObserver`: classifies the declared object's relationship
//! to the observed world into one of the eight `ReleaseState` values (spec
//! §4.1), by delegating to `sherpack-kube`'s storage, diff, and health
//! machinery rather than re-implementing any of it.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use sherpack_kube::diff::DiffEngine;
use sherpack_kube::release::{ReleaseState as StoredReleaseState, StoredRelease};
use sherpack_kube::storage::StorageDriver;
use sherpack_kube::KubeError;

use crate::declared::DeclaredRelease;
use crate::error::ObserveError;
use crate::state::{DiffEntry, ObservedState, ReleaseState};

/// Label marking a stored release as owned by this operator, as opposed to
/// one installed by a human operator or a different tool (spec §4.1's
/// `Unmanaged` row).
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "sherpack-operator";

/// Computes the digest a `DeclaredRelease` should expose from `desired_digest`,
/// given the same chart/values inputs a `StoredRelease` was created from.
/// Exposed so `crd.rs` can share this exact formula.
pub fn digest_of(chart_name: &str, chart_version: &str, values_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chart_name.as_bytes());
    hasher.update(chart_version.as_bytes());
    hasher.update(values_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn stored_digest(stored: &StoredRelease) -> String {
    let values_json = serde_json::to_string(&stored.values).unwrap_or_default();
    digest_of(&stored.pack.name, &stored.pack.version.to_string(), &values_json)
}

/// Reads the world and reports a single `ObservedState` (spec §4.1).
#[async_trait]
pub trait ReleaseStateObserver: Send + Sync {
    async fn observe(&self, release: &dyn DeclaredRelease) -> Result<ObservedState, ObserveError>;
}

/// Default implementation, backed by a `StorageDriver` for release records
/// and a `DiffEngine` against the live cluster for drift.
pub struct KubeReleaseStateObserver<S: StorageDriver> {
    storage: S,
    diff_engine: DiffEngine,
    client: kube::Client,
}

impl<S: StorageDriver> KubeReleaseStateObserver<S> {
    pub fn new(storage: S, client: kube::Client) -> Self {
        Self {
            storage,
            diff_engine: DiffEngine::new(),
            client,
        }
    }

    fn is_managed(stored: &StoredRelease) -> bool {
        stored
            .labels
            .get(MANAGED_BY_LABEL)
            .is_some_and(|v| v == MANAGED_BY_VALUE)
    }
}

#[async_trait]
impl<S: StorageDriver> ReleaseStateObserver for KubeReleaseStateObserver<S> {
    async fn observe(&self, release: &dyn DeclaredRelease) -> Result<ObservedState, ObserveError> {
        let stored = match self.storage.get_latest(release.namespace(), release.name()).await {
            Ok(stored) => stored,
            Err(KubeError::ReleaseNotFound { .. }) => {
                return Ok(ObservedState::new(ReleaseState::Absent, "no stored release found"));
            }
            Err(other) => return Err(ObserveError::Backend(other)),
        };

        if stored.is_stuck() {
            return Ok(ObservedState::new(
                ReleaseState::Locked,
                format!("release is in a stuck pending state: {:?}", stored.state),
            ));
        }

        if !Self::is_managed(&stored) {
            return Ok(ObservedState::new(
                ReleaseState::Unmanaged,
                "stored release is not labeled as managed by this operator",
            ));
        }

        if let StoredReleaseState::Failed { reason, .. } = &stored.state {
            return Ok(ObservedState::new(ReleaseState::Failed, reason.clone()));
        }

        if stored_digest(&stored) != release.desired_digest() {
            return Ok(ObservedState::new(
                ReleaseState::OutOfSync,
                "recorded release inputs differ from the declared spec",
            ));
        }

        // Drift is evaluated ahead of `InSync`/`Untested`: a release whose
        // recorded inputs match the spec can still have drifted live state,
        // and that must not be masked by either of those two classifications.
        let drift = self
            .diff_engine
            .detect_drift(&stored, &self.client)
            .await
            .map_err(ObserveError::Backend)?;
        if drift.has_drift {
            let diff = drift
                .drift_changes()
                .into_iter()
                .map(DiffEntry::from_resource_change)
                .collect();
            return Ok(ObservedState::new(ReleaseState::Drifted, "live cluster state diverges from the recorded release").with_diff(diff));
        }

        if release.test_policy().enabled {
            let latest = release
                .history()
                .latest()
                .filter(|snapshot| snapshot.revision == stored.version);
            match latest {
                Some(snapshot) if snapshot.test_failed() => {
                    return Ok(ObservedState::new(ReleaseState::Failed, "test hooks failed for the current revision"));
                }
                Some(snapshot) if snapshot.tested.is_none() => {
                    return Ok(ObservedState::new(ReleaseState::Untested, "test policy is enabled and this revision has not been tested"));
                }
                None => {
                    return Ok(ObservedState::new(ReleaseState::Untested, "test policy is enabled and this revision has not been tested"));
                }
                Some(_) => {}
            }
        }

        Ok(ObservedState::new(ReleaseState::InSync, "recorded release matches the declared spec and the live cluster"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_is_stable_for_identical_inputs() {
        let a = digest_of("nginx", "1.0.0", "{}");
        let b = digest_of("nginx", "1.0.0", "{}");
        assert_eq!(a, b);
    }

    #[test]
    fn digest_of_differs_when_chart_version_changes() {
        let a = digest_of("nginx", "1.0.0", "{}");
        let b = digest_of("nginx", "1.1.0", "{}");
        assert_ne!(a, b);
    }
}
