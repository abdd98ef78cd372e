//! Condition bookkeeping: the core owns exactly these condition types on
//! the declared object (spec §6), and must never touch any other type a
//! third party may have set.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// The condition types this core owns exclusively (spec §6).
pub const RELEASED: &str = "Released";
pub const REMEDIATED: &str = "Remediated";
pub const TEST_SUCCESS: &str = "TestSuccess";
pub const RECONCILING: &str = "Reconciling";
pub const READY: &str = "Ready";
pub const STALLED: &str = "Stalled";

/// All condition types owned by this core, for patch-scoping (spec §6:
/// "any patch the Driver issues must be scoped to own these types").
pub const OWNED_CONDITION_TYPES: &[&str] =
    &[RELEASED, REMEDIATED, TEST_SUCCESS, RECONCILING, READY, STALLED];

/// `status` as used by `metav1.Condition`: `"True" | "False" | "Unknown"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::True => "True",
            Self::False => "False",
            Self::Unknown => "Unknown",
        }
    }
}

/// A mutable set of conditions keyed by type name, owned by the declared
/// object's status.
pub trait ConditionRegistry {
    fn get(&self, type_: &str) -> Option<&Condition>;

    fn set(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: String);

    fn delete(&mut self, type_: &str);

    /// Compute the summary `Ready` condition from the other owned
    /// conditions, used when the Selector reports `done` (spec §4.5 step 4).
    ///
    /// `Ready=True` when `Released=True` and, if present, `TestSuccess` is
    /// not `False`. Otherwise `Ready=False` citing the first unsatisfied
    /// owned condition's reason.
    fn summarize_ready(&mut self) {
        let released_ok = self
            .get(RELEASED)
            .map(|c| c.status == "True")
            .unwrap_or(false);
        let tests_ok = self
            .get(TEST_SUCCESS)
            .map(|c| c.status != "False")
            .unwrap_or(true);

        if released_ok && tests_ok {
            self.set(READY, ConditionStatus::True, "ReconciliationSucceeded", "Release reconciled successfully".to_string());
        } else {
            let (reason, message) = if !released_ok {
                self.get(RELEASED)
                    .map(|c| (c.reason.clone(), c.message.clone()))
                    .unwrap_or_else(|| ("Unknown".to_string(), "release status unknown".to_string()))
            } else {
                self.get(TEST_SUCCESS)
                    .map(|c| (c.reason.clone(), c.message.clone()))
                    .unwrap_or_else(|| ("Unknown".to_string(), "test status unknown".to_string()))
            };
            self.set(READY, ConditionStatus::False, &reason, message);
        }
    }
}

/// A simple `Vec<Condition>`-backed implementation, the shape
/// `SherpackReleaseStatus` embeds directly.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, schemars::JsonSchema)]
pub struct Conditions(pub Vec<Condition>);

impl ConditionRegistry for Conditions {
    fn get(&self, type_: &str) -> Option<&Condition> {
        self.0.iter().find(|c| c.type_ == type_)
    }

    fn set(&mut self, type_: &str, status: ConditionStatus, reason: &str, message: String) {
        let now = Time(Utc::now());
        if let Some(existing) = self.0.iter_mut().find(|c| c.type_ == type_) {
            let status_changed = existing.status != status.as_str();
            existing.status = status.as_str().to_string();
            existing.reason = reason.to_string();
            existing.message = message;
            if status_changed {
                existing.last_transition_time = now;
            }
        } else {
            self.0.push(Condition {
                type_: type_.to_string(),
                status: status.as_str().to_string(),
                reason: reason.to_string(),
                message,
                observed_generation: None,
                last_transition_time: now,
            });
        }
    }

    fn delete(&mut self, type_: &str) {
        self.0.retain(|c| c.type_ != type_);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut conditions = Conditions::default();
        conditions.set(READY, ConditionStatus::Unknown, "Progressing", "running install".to_string());
        let c = conditions.get(READY).expect("condition present");
        assert_eq!(c.status, "Unknown");
        assert_eq!(c.reason, "Progressing");
    }

    #[test]
    fn delete_removes_condition() {
        let mut conditions = Conditions::default();
        conditions.set(RECONCILING, ConditionStatus::True, "Progressing", "running".to_string());
        conditions.delete(RECONCILING);
        assert!(conditions.get(RECONCILING).is_none());
    }

    #[test]
    fn summarize_ready_true_when_released_and_tests_ok() {
        let mut conditions = Conditions::default();
        conditions.set(RELEASED, ConditionStatus::True, "InstallSucceeded", "ok".to_string());
        conditions.set(TEST_SUCCESS, ConditionStatus::True, "TestsPassed", "ok".to_string());
        conditions.summarize_ready();
        assert_eq!(conditions.get(READY).unwrap().status, "True");
    }

    #[test]
    fn summarize_ready_false_when_not_released() {
        let mut conditions = Conditions::default();
        conditions.set(RELEASED, ConditionStatus::False, "InstallFailed", "boom".to_string());
        conditions.summarize_ready();
        let ready = conditions.get(READY).unwrap();
        assert_eq!(ready.status, "False");
        assert_eq!(ready.reason, "InstallFailed");
    }
}
