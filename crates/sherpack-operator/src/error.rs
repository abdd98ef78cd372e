//! Error types for sherpack-operator

use thiserror::Error;

/// Errors raised while observing the current state of a release
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ObserveError {
    /// The underlying release engine could not be reached or returned garbage
    #[error("failed to observe release state: {0}")]
    Backend(#[from] sherpack_kube::KubeError),

    /// The observer produced a status the Selector does not recognize
    #[error("observer returned an unrecognized status: {0}")]
    UnknownStatus(String),
}

/// Errors raised while verifying a rollback target snapshot
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyError {
    /// The snapshot's revision no longer exists in storage
    #[error("rollback target revision {0} not found")]
    NotFound(u32),

    /// The snapshot existed but has since disappeared (e.g. deleted underneath us)
    #[error("rollback target revision {0} disappeared")]
    Disappeared(u32),

    /// The snapshot was never actually observed as deployed
    #[error("rollback target revision {0} was never observed as deployed")]
    NotObserved(u32),

    /// The snapshot's stored digest no longer matches its recorded manifest
    #[error("rollback target revision {0} digest mismatch")]
    DigestMismatch(u32),

    /// Any other, transient verification failure
    #[error("rollback target verification failed: {0}")]
    Other(String),
}

impl VerifyError {
    /// Whether this error means "the target is corrupt, fall back to Upgrade"
    /// per the Selector's rollback branch in spec §4.4.
    pub fn is_corrupt_target(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Disappeared(_) | Self::NotObserved(_) | Self::DigestMismatch(_)
        )
    }
}

/// Errors the Action Selector can return
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SelectorError {
    /// Remediation retries are exhausted; the caller must stall
    #[error("exceeded max retries: {0}")]
    ExceededMaxRetries(String),

    /// The observed release status is not one the Selector knows how to dispatch on
    #[error("unknown release status: {0}")]
    UnknownReleaseStatus(String),

    /// The configured remediation strategy is not one the Selector knows how to dispatch on
    #[error("unknown remediation strategy: {0}")]
    UnknownRemediationStrategy(String),

    /// Verifying a rollback target failed transiently (not "corrupt", just unreachable)
    #[error("failed to verify rollback target: {0}")]
    VerifyFailed(#[from] VerifyError),
}

/// Errors an Action Reconciler can return
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ActionError {
    /// The underlying release engine failed to perform the action
    #[error("action failed: {0}")]
    Backend(#[from] sherpack_kube::KubeError),

    /// The action reported a non-backend failure (e.g. a failed health check)
    #[error("action failed: {0}")]
    Other(String),

    /// The ambient cancellation context fired while the action was in flight
    #[error("action cancelled")]
    Cancelled,
}

/// Errors raised while patching the declared object
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PatchError {
    /// The Kubernetes API rejected the patch
    #[error("failed to patch status: {0}")]
    Api(#[from] kube::Error),
}

/// The outcome of a successful (non-erroring) Driver invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    /// Steady state reached, or a graceful stop with nothing left to do.
    Done,
    /// More work remains; the caller should requeue out of the normal interval.
    MustRequeue,
}

/// Errors the Atomic Release Driver can return
///
/// Dispositions, per spec §7: terminal-stalled (`ExceededMaxRetries`),
/// terminal-protocol (`UnknownReleaseStatus`, `UnknownRemediationStrategy`),
/// transient (`Observe`, `Patch`, `Action`), and cancellation (`Cancelled`).
/// `MustRequeue` is deliberately *not* a variant here — see `DriverOutcome`
/// and DESIGN.md's open-question log for why it's modeled as a successful
/// outcome instead of an error sentinel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriverError {
    /// Terminal-stalled: remediation retries are exhausted.
    #[error("exceeded max retries: {0}")]
    ExceededMaxRetries(String),

    /// Terminal-protocol: the observed status has no known handler.
    #[error("unknown release status: {0}")]
    UnknownReleaseStatus(String),

    /// Terminal-protocol: the configured remediation strategy has no known handler.
    #[error("unknown remediation strategy: {0}")]
    UnknownRemediationStrategy(String),

    /// Transient: the Observer failed.
    #[error("observe failed: {0}")]
    Observe(#[from] ObserveError),

    /// Transient: patching the declared object failed.
    #[error("patch failed: {0}")]
    Patch(#[from] PatchError),

    /// Transient: the action reconciler failed.
    #[error("action failed: {0}")]
    Action(#[from] ActionError),

    /// Cancellation: the ambient context was cancelled before the loop could finish.
    #[error("reconciliation cancelled: {0}")]
    Cancelled(String),
}

impl From<SelectorError> for DriverError {
    fn from(e: SelectorError) -> Self {
        match e {
            SelectorError::ExceededMaxRetries(msg) => DriverError::ExceededMaxRetries(msg),
            SelectorError::UnknownReleaseStatus(msg) => DriverError::UnknownReleaseStatus(msg),
            SelectorError::UnknownRemediationStrategy(msg) => {
                DriverError::UnknownRemediationStrategy(msg)
            }
            SelectorError::VerifyFailed(e) => {
                DriverError::Action(ActionError::Other(e.to_string()))
            }
        }
    }
}
