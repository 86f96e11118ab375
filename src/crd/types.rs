//! Supporting types shared by the Build and Deployment CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition status following Kubernetes conventions
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
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

/// Kubernetes-style condition recording one pipeline checkpoint
///
/// `type_` is kept as a plain string on the wire so records written by a
/// newer controller still deserialize; the typed vocabulary lives in
/// [`crate::conditions::ConditionType`].
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Initialized, Completed)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Generation of the entity when this condition was last written
    #[serde(default)]
    pub observed_generation: i64,

    /// Last time the condition's status changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition stamped with the current time
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Image produced by a build
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageStatus {
    /// Fully qualified image reference (e.g., `registry/app:sha123`)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_timestamp_and_generation() {
        let before = Utc::now();
        let condition = Condition::new(
            "Completed",
            ConditionStatus::True,
            "BuildCompleted",
            "Build completed successfully.",
            4,
        );
        let after = Utc::now();

        assert_eq!(condition.type_, "Completed");
        assert_eq!(condition.status, ConditionStatus::True);
        assert_eq!(condition.observed_generation, 4);
        assert!(condition.last_transition_time >= before);
        assert!(condition.last_transition_time <= after);
    }

    #[test]
    fn test_default_status_is_unknown() {
        assert_eq!(ConditionStatus::default(), ConditionStatus::Unknown);
        assert_eq!(ConditionStatus::Unknown.to_string(), "Unknown");
    }

    /// Story: conditions are persisted with Kubernetes field names
    #[test]
    fn story_condition_serializes_with_api_conventions() {
        let condition = Condition::new(
            "Initialized",
            ConditionStatus::True,
            "WorkflowCreated",
            "Workflow was created in the cluster.",
            2,
        );
        let json = serde_json::to_value(&condition).unwrap();

        assert_eq!(json["type"], "Initialized");
        assert_eq!(json["status"], "True");
        assert_eq!(json["observedGeneration"], 2);
        assert!(json.get("lastTransitionTime").is_some());

        let parsed: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, condition);
    }

    #[test]
    fn test_empty_image_is_omitted() {
        let json = serde_json::to_value(ImageStatus::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
