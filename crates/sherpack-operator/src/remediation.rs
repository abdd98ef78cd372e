//! Remediation policy: what happens after a release-kind action fails.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The corrective action to take after a failed release operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RemediationStrategy {
    Rollback,
    Uninstall,
}

/// A resolved remediation policy, applicable to the current attempt.
///
/// `DeclaredRelease::active_remediation` resolves which of
/// install-remediation or upgrade-remediation applies (install-remediation
/// when no release exists yet, upgrade-remediation otherwise) and returns
/// it behind this trait so the Selector never has to ask which one it is.
pub trait RemediationPolicy: Send + Sync {
    /// rollback or uninstall.
    fn strategy(&self) -> RemediationStrategy;

    /// How many times remediation has already been attempted for the
    /// current failure streak. `0` means "no accounted failure yet".
    fn failure_count(&self) -> u32;

    /// Whether the configured retry budget has been spent.
    fn retries_exhausted(&self) -> bool;

    /// Whether remediation must still be attempted on the last failure even
    /// if retries are exhausted (spec §9's documented asymmetry: this can be
    /// `true` at the same time `retries_exhausted()` is `true`, and when it
    /// is, remediation still proceeds).
    fn must_remediate_last_failure(&self) -> bool;

    /// Whether test failures should be ignored when picking a rollback
    /// target, falling back to `default` when this policy doesn't override it.
    fn must_ignore_test_failures(&self, default: bool) -> bool;
}

/// A simple, directly-configured remediation policy.
///
/// This is the concrete type `SherpackRelease`'s install/upgrade
/// remediation specs deserialize into; it implements `RemediationPolicy`
/// verbatim over its own fields, with no cluster I/O.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemediationConfig {
    pub strategy: RemediationStrategy,

    #[serde(default)]
    pub failure_count: u32,

    #[serde(default = "default_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub remediate_last_failure: bool,

    #[serde(default)]
    pub ignore_test_failures: Option<bool>,
}

fn default_retries() -> u32 {
    3
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            strategy: RemediationStrategy::Rollback,
            failure_count: 0,
            max_retries: default_retries(),
            remediate_last_failure: false,
            ignore_test_failures: None,
        }
    }
}

impl RemediationPolicy for RemediationConfig {
    fn strategy(&self) -> RemediationStrategy {
        self.strategy
    }

    fn failure_count(&self) -> u32 {
        self.failure_count
    }

    fn retries_exhausted(&self) -> bool {
        self.failure_count >= self.max_retries
    }

    fn must_remediate_last_failure(&self) -> bool {
        self.remediate_last_failure
    }

    fn must_ignore_test_failures(&self, default: bool) -> bool {
        self.ignore_test_failures.unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_exhausted_at_the_boundary() {
        let mut cfg = RemediationConfig {
            failure_count: 2,
            max_retries: 3,
            ..Default::default()
        };
        assert!(!cfg.retries_exhausted());
        cfg.failure_count = 3;
        assert!(cfg.retries_exhausted());
    }

    #[test]
    fn ignore_test_failures_falls_back_to_default() {
        let cfg = RemediationConfig::default();
        assert!(cfg.must_ignore_test_failures(true));
        assert!(!cfg.must_ignore_test_failures(false));

        let cfg = RemediationConfig {
            ignore_test_failures: Some(true),
            ..Default::default()
        };
        assert!(cfg.must_ignore_test_failures(false));
    }
}
