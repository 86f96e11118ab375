//! Condition vocabulary and the set-by-type transition function
//!
//! Condition types and reasons are closed enumerations; their wire strings
//! come from exhaustive matches so adding a pipeline stage is a compile-time
//! change. [`set_condition`] is pure bookkeeping with no I/O.

use chrono::Utc;

use crate::crd::{Condition, ConditionStatus};

/// Pipeline checkpoints recorded on a build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionType {
    /// The workflow has been accepted by the execution engine
    Initialized,
    /// Source clone step outcome
    CloneSucceeded,
    /// Image build step outcome
    BuildSucceeded,
    /// Image push step outcome
    PushSucceeded,
    /// Overall pipeline outcome
    Completed,
    /// A deployable artifact was created from the build output
    DeployableArtifactCreated,
    /// The auto-deploy Deployment was applied
    DeploymentApplied,
}

impl ConditionType {
    /// Every condition type in pipeline order
    pub const ALL: [ConditionType; 7] = [
        ConditionType::Initialized,
        ConditionType::CloneSucceeded,
        ConditionType::BuildSucceeded,
        ConditionType::PushSucceeded,
        ConditionType::Completed,
        ConditionType::DeployableArtifactCreated,
        ConditionType::DeploymentApplied,
    ];

    /// Wire name of the condition type
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::CloneSucceeded => "CloneSucceeded",
            Self::BuildSucceeded => "BuildSucceeded",
            Self::PushSucceeded => "PushSucceeded",
            Self::Completed => "Completed",
            Self::DeployableArtifactCreated => "DeployableArtifactCreated",
            Self::DeploymentApplied => "DeploymentApplied",
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable reasons attached to conditions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConditionReason {
    /// Initialized: workflow accepted
    WorkflowCreated,
    /// CloneSucceeded=True
    CloneSucceeded,
    /// CloneSucceeded=False
    CloneFailed,
    /// BuildSucceeded=True
    BuildSucceeded,
    /// BuildSucceeded=False
    BuildFailed,
    /// PushSucceeded=True
    PushSucceeded,
    /// PushSucceeded=False
    PushFailed,
    /// Completed=True
    WorkflowCompleted,
    /// Completed=False
    WorkflowFailed,
    /// DeployableArtifactCreated=True
    ArtifactCreated,
    /// DeploymentApplied=False
    AutoDeploymentFailed,
    /// DeploymentApplied=True
    AutoDeploymentApplied,
}

impl ConditionReason {
    /// Wire value of the reason
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkflowCreated => "WorkflowCreated",
            Self::CloneSucceeded => "CloneSourceCodeSucceeded",
            Self::CloneFailed => "CloneSourceCodeFailed",
            Self::BuildSucceeded => "BuildImageSucceeded",
            Self::BuildFailed => "BuildImageFailed",
            Self::PushSucceeded => "PushImageSucceeded",
            Self::PushFailed => "PushImageFailed",
            Self::WorkflowCompleted => "BuildCompleted",
            Self::WorkflowFailed => "BuildFailed",
            Self::ArtifactCreated => "ArtifactCreationSuccessful",
            Self::AutoDeploymentFailed => "DeploymentFailed",
            Self::AutoDeploymentApplied => "DeploymentAppliedSuccessfully",
        }
    }
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upsert a condition by type
///
/// Replaces status, reason, message and observed generation of an existing
/// condition of the same type, or appends a new one. `lastTransitionTime`
/// is refreshed only when the status value changes (or the condition is
/// new), so consumers never see a reason-only edit as a fresh transition.
///
/// Returns `true` when the status transitioned.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    type_: ConditionType,
    status: ConditionStatus,
    reason: ConditionReason,
    message: impl Into<String>,
    generation: i64,
) -> bool {
    let message = message.into();

    match conditions.iter_mut().find(|c| c.type_ == type_.as_str()) {
        Some(existing) => {
            let transitioned = existing.status != status;
            if transitioned {
                existing.last_transition_time = Utc::now();
            }
            existing.status = status;
            existing.reason = reason.as_str().to_string();
            existing.message = message;
            existing.observed_generation = generation;
            transitioned
        }
        None => {
            conditions.push(Condition::new(
                type_.as_str(),
                status,
                reason.as_str(),
                message,
                generation,
            ));
            true
        }
    }
}

/// Find the condition of the given type
pub fn find_condition(conditions: &[Condition], type_: ConditionType) -> Option<&Condition> {
    conditions.iter().find(|c| c.type_ == type_.as_str())
}

/// Status of the condition of the given type, if recorded
pub fn condition_status(conditions: &[Condition], type_: ConditionType) -> Option<ConditionStatus> {
    find_condition(conditions, type_).map(|c| c.status)
}

/// Check if the condition of the given type is True
pub fn is_condition_true(conditions: &[Condition], type_: ConditionType) -> bool {
    condition_status(conditions, type_) == Some(ConditionStatus::True)
}
