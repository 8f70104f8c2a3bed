//! Supporting types for the ResolutionRequest CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Type of the condition that carries a request's terminal state
pub const CONDITION_SUCCEEDED: &str = "Succeeded";

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g. Succeeded)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    /// Succeeded condition with the given terminal status
    pub fn succeeded(
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(CONDITION_SUCCEEDED, status, reason, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_status_displays_kubernetes_strings() {
        assert_eq!(ConditionStatus::True.to_string(), "True");
        assert_eq!(ConditionStatus::False.to_string(), "False");
        assert_eq!(ConditionStatus::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn succeeded_helper_sets_the_condition_type() {
        let c = Condition::succeeded(ConditionStatus::False, "ResolutionFailed", "boom");
        assert_eq!(c.type_, CONDITION_SUCCEEDED);
        assert_eq!(c.status, ConditionStatus::False);
        assert_eq!(c.reason, "ResolutionFailed");
        assert_eq!(c.message, "boom");
    }

    #[test]
    fn condition_serializes_with_kubernetes_field_names() {
        let c = Condition::succeeded(ConditionStatus::True, "Resolved", "done");
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["type"], "Succeeded");
        assert_eq!(value["status"], "True");
        assert!(value.get("lastTransitionTime").is_some());
    }
}
