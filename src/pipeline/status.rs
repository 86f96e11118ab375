//! Build status transitions driven by pipeline lifecycle callbacks
//!
//! State machine (per generation):
//!
//! ```text
//! Initialized → Clone → Build → Push → Completed(True|False)
//!                                          ↓ True
//!                             DeployableArtifactCreated(True)
//!                                          ↓
//!                               DeploymentApplied(True|False)
//! ```
//!
//! A step failure sets the step condition False and Completed=False in the
//! same update. Completed is terminal for the generation in both directions:
//! once it is recorded, later step and completion events are skipped, so it
//! never flips until a new generation is initialized. Old conditions are never erased;
//! consumers compare `observedGeneration` to detect staleness.

use tracing::{debug, info, warn};

use crate::conditions::{
    find_condition, set_condition, ConditionReason, ConditionType,
};
use crate::crd::{Build, ConditionStatus};

use super::{PipelineEvent, PipelineOutput, PipelineStep};

/// Why a transition was not recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Completed=False already recorded for this generation
    PipelineFailed,
    /// Completed=True already recorded for this generation
    AlreadyCompleted,
    /// Completed=True not yet recorded for this generation
    NotCompleted,
    /// DeployableArtifactCreated=True not yet recorded for this generation
    NoArtifact,
}

/// Result of feeding an event to the status controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Conditions were written
    Recorded,
    /// The event was ignored
    Skipped(SkipReason),
}

impl Transition {
    /// Whether the status changed and needs persisting
    pub fn is_recorded(self) -> bool {
        matches!(self, Transition::Recorded)
    }
}

/// Whether `type_` holds `status` as of the build's current generation
fn holds_for_generation(build: &Build, type_: ConditionType, status: ConditionStatus) -> bool {
    find_condition(build.conditions(), type_)
        .map(|c| c.status == status && c.observed_generation == build.generation())
        .unwrap_or(false)
}

/// Whether the pipeline completed successfully for the current generation
pub fn is_completed(build: &Build) -> bool {
    holds_for_generation(build, ConditionType::Completed, ConditionStatus::True)
}

/// Whether a completed build still needs its deployable artifact
pub fn artifact_pending(build: &Build) -> bool {
    is_completed(build)
        && !holds_for_generation(
            build,
            ConditionType::DeployableArtifactCreated,
            ConditionStatus::True,
        )
}

fn pipeline_failed(build: &Build) -> bool {
    holds_for_generation(build, ConditionType::Completed, ConditionStatus::False)
}

/// Why step and completion events no longer apply to this generation
fn pipeline_finished(build: &Build) -> Option<SkipReason> {
    if pipeline_failed(build) {
        Some(SkipReason::PipelineFailed)
    } else if is_completed(build) {
        Some(SkipReason::AlreadyCompleted)
    } else {
        None
    }
}

fn set(
    build: &mut Build,
    type_: ConditionType,
    status: ConditionStatus,
    reason: ConditionReason,
    message: &str,
) {
    let generation = build.generation();
    set_condition(
        &mut build.status_mut().conditions,
        type_,
        status,
        reason,
        message,
        generation,
    );
}

/// Record that the execution engine accepted the pipeline
pub fn mark_initialized(build: &mut Build) -> Transition {
    set(
        build,
        ConditionType::Initialized,
        ConditionStatus::True,
        ConditionReason::WorkflowCreated,
        "Workflow was created in the cluster.",
    );
    Transition::Recorded
}

/// Record a successful step
pub fn mark_step_succeeded(build: &mut Build, step: PipelineStep) -> Transition {
    if let Some(reason) = pipeline_finished(build) {
        debug!(step = %step, ?reason, "ignoring step success after pipeline finished");
        return Transition::Skipped(reason);
    }
    let descriptor = step.success();
    set(
        build,
        step.condition_type(),
        ConditionStatus::True,
        descriptor.reason,
        descriptor.message,
    );
    Transition::Recorded
}

/// Record a failed step; the pipeline's completion fails with it
pub fn mark_step_failed(build: &mut Build, step: PipelineStep) -> Transition {
    if let Some(reason) = pipeline_finished(build) {
        debug!(step = %step, ?reason, "ignoring step failure after pipeline finished");
        return Transition::Skipped(reason);
    }
    let descriptor = step.failure();
    set(
        build,
        step.condition_type(),
        ConditionStatus::False,
        descriptor.reason,
        descriptor.message,
    );
    set(
        build,
        ConditionType::Completed,
        ConditionStatus::False,
        ConditionReason::WorkflowFailed,
        "Build completed with a failure status",
    );
    warn!(step = %step, "pipeline step failed");
    Transition::Recorded
}

/// Record overall pipeline success from the final step's output
///
/// A pipeline that succeeded without producing an `image` parameter is a
/// failure from the build's point of view.
pub fn mark_workflow_completed(build: &mut Build, output: &PipelineOutput) -> Transition {
    if let Some(reason) = pipeline_finished(build) {
        debug!(?reason, "ignoring completion after pipeline finished");
        return Transition::Skipped(reason);
    }

    match output.image() {
        Some(image) => {
            build.status_mut().image_status.image = image.to_string();
            set(
                build,
                ConditionType::Completed,
                ConditionStatus::True,
                ConditionReason::WorkflowCompleted,
                "Build completed successfully.",
            );
            info!(image = %image, "build produced image");
        }
        None => {
            set(
                build,
                ConditionType::Completed,
                ConditionStatus::False,
                ConditionReason::WorkflowFailed,
                "Image name is not found in the workflow",
            );
            warn!("pipeline succeeded without an image output");
        }
    }
    Transition::Recorded
}

/// Record that a deployable artifact was created from the build output
pub fn mark_artifact_created(build: &mut Build) -> Transition {
    if !is_completed(build) {
        return Transition::Skipped(SkipReason::NotCompleted);
    }
    set(
        build,
        ConditionType::DeployableArtifactCreated,
        ConditionStatus::True,
        ConditionReason::ArtifactCreated,
        "Successfully created a deployable artifact for the build.",
    );
    Transition::Recorded
}

/// Record the outcome of the auto-deploy attempt
pub fn mark_deployment_applied(build: &mut Build, succeeded: bool) -> Transition {
    if !holds_for_generation(
        build,
        ConditionType::DeployableArtifactCreated,
        ConditionStatus::True,
    ) {
        return Transition::Skipped(SkipReason::NoArtifact);
    }
    if succeeded {
        set(
            build,
            ConditionType::DeploymentApplied,
            ConditionStatus::True,
            ConditionReason::AutoDeploymentApplied,
            "Successfully configured the deployment.",
        );
    } else {
        set(
            build,
            ConditionType::DeploymentApplied,
            ConditionStatus::False,
            ConditionReason::AutoDeploymentFailed,
            "Deployment configuration failed.",
        );
    }
    Transition::Recorded
}

/// Dispatch a pipeline lifecycle callback
pub fn apply_event(build: &mut Build, event: &PipelineEvent) -> Transition {
    match event {
        PipelineEvent::Accepted => mark_initialized(build),
        PipelineEvent::StepSucceeded(step) => mark_step_succeeded(build, *step),
        PipelineEvent::StepFailed(step) => mark_step_failed(build, *step),
        PipelineEvent::Succeeded(output) => mark_workflow_completed(build, output),
    }
}
