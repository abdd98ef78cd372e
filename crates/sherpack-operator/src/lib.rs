//! The Atomic Release Reconciler core: a Kubernetes-controller-shaped state
//! machine that reconciles a declared `SherpackRelease` against the release
//! engine `sherpack-kube` already implements, with bounded retries,
//! remediation, test gating, drift detection, and safe cancellation.
//!
//! The modules here map onto the reconciliation core's five components:
//! `observer` (State Observer), `action` (Action Reconcilers), `strategy`
//! (Release Strategy), `selector` (Action Selector), `driver` (Atomic
//! Release Driver). `crd`, `patch`, `events`, `condition`, `history`,
//! `remediation`, `declared`, `state`, `diff_summary`, and `error` are the
//! supporting data model and external-interface shapes those five
//! components are built from. `testing` holds in-memory test doubles.

pub mod action;
pub mod condition;
pub mod crd;
pub mod declared;
pub mod diff_summary;
pub mod driver;
pub mod error;
pub mod events;
pub mod history;
pub mod observer;
pub mod patch;
pub mod remediation;
pub mod selector;
pub mod state;
pub mod strategy;
pub mod testing;

pub use action::{ActionContext, ActionReconciler};
pub use crd::{ChartRef, SherpackRelease, SherpackReleaseSpec, SherpackReleaseStatus};
pub use declared::DeclaredRelease;
pub use driver::AtomicReleaseDriver;
pub use error::{DriverError, DriverOutcome};
pub use observer::{KubeReleaseStateObserver, ReleaseStateObserver};
pub use selector::select;
pub use strategy::{CleanReleaseStrategy, ReleaseStrategy};
