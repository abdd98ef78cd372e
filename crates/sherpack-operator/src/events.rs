//! Event recording: the only event this core emits directly is
//! `DriftDetected` (spec §6); lifecycle events for install/upgrade/test are
//! the responsibility of the individual Action Reconcilers.

use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};

/// Narrow event-emission surface the Selector/Driver depend on.
pub trait EventRecorder: Send + Sync {
    fn warn(&self, reason: &str, message: String);
    fn normal(&self, reason: &str, message: String);
}

/// Default implementation, backed by `kube::runtime::events::Recorder`.
///
/// A `Recorder` is bound to a single object reference at construction time
/// (the kube-rs idiom), so this is built fresh per reconcile call against
/// the `SherpackRelease` currently being reconciled — the same per-call
/// construction pattern `KubeReleaseStateObserver` and `RevisionVerifier`
/// already follow in `bin/operator.rs`, rather than one recorder shared
/// across every release in the fleet.
///
/// `Recorder::publish` is async; this adapter spawns the publish onto the
/// current Tokio runtime so `EventRecorder`'s methods can stay synchronous
/// for the Selector, which otherwise has no other `.await` points on this
/// path. A publish failure is logged and swallowed — event delivery is
/// best-effort, never a reason to fail reconciliation.
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl KubeEventRecorder {
    pub fn new(client: kube::Client, reference: ObjectReference) -> Self {
        Self {
            recorder: Recorder::new(client, "sherpack-operator".into(), reference),
        }
    }

    fn publish(&self, type_: EventType, reason: &str, note: String) {
        let recorder = self.recorder.clone();
        let reason = reason.to_string();
        tokio::spawn(async move {
            let event = Event {
                type_,
                reason,
                note: Some(note),
                action: "Reconcile".to_string(),
                secondary: None,
            };
            if let Err(err) = recorder.publish(event).await {
                tracing::warn!(error = %err, "failed to publish event");
            }
        });
    }
}

impl EventRecorder for KubeEventRecorder {
    fn warn(&self, reason: &str, message: String) {
        self.publish(EventType::Warning, reason, message);
    }

    fn normal(&self, reason: &str, message: String) {
        self.publish(EventType::Normal, reason, message);
    }
}
