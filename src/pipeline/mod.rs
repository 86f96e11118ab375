//! Pipeline vocabulary: steps, lifecycle events and output parameters
//!
//! The execution engine reports progress through [`PipelineEvent`]s; the
//! [`status`] module turns them into condition transitions on the build.

pub mod status;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::conditions::{ConditionReason, ConditionType};

pub use status::{SkipReason, Transition};

/// Output parameter carrying the produced image reference
pub const IMAGE_PARAMETER: &str = "image";

/// Steps of the CI pipeline that report individual outcomes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStep {
    /// Clone the source repository
    Clone,
    /// Build the container image
    Build,
    /// Push the image to the registry
    Push,
}

/// Reason and message recorded for a step outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepDescriptor {
    /// Condition reason
    pub reason: ConditionReason,
    /// Human-readable message
    pub message: &'static str,
}

impl PipelineStep {
    /// Condition that records this step's outcome
    pub const fn condition_type(self) -> ConditionType {
        match self {
            Self::Clone => ConditionType::CloneSucceeded,
            Self::Build => ConditionType::BuildSucceeded,
            Self::Push => ConditionType::PushSucceeded,
        }
    }

    /// Descriptor used when the step succeeds
    pub const fn success(self) -> StepDescriptor {
        match self {
            Self::Clone => StepDescriptor {
                reason: ConditionReason::CloneSucceeded,
                message: "Source code cloning was successful.",
            },
            Self::Build => StepDescriptor {
                reason: ConditionReason::BuildSucceeded,
                message: "Building the source code was successful.",
            },
            Self::Push => StepDescriptor {
                reason: ConditionReason::PushSucceeded,
                message: "Pushing the built image to the registry was successful.",
            },
        }
    }

    /// Descriptor used when the step fails
    pub const fn failure(self) -> StepDescriptor {
        match self {
            Self::Clone => StepDescriptor {
                reason: ConditionReason::CloneFailed,
                message: "Source code cloning failed.",
            },
            Self::Build => StepDescriptor {
                reason: ConditionReason::BuildFailed,
                message: "Building the source code failed.",
            },
            Self::Push => StepDescriptor {
                reason: ConditionReason::PushFailed,
                message: "Pushing the built image to the registry failed.",
            },
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Clone => write!(f, "clone"),
            Self::Build => write!(f, "build"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// Named output parameters of the pipeline's final step
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineOutput {
    parameters: BTreeMap<String, Option<String>>,
}

impl PipelineOutput {
    /// Empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter and return self for chaining
    pub fn parameter(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Value of a parameter; `None` when absent or null
    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(|v| v.as_deref())
    }

    /// Image reference produced by the pipeline, if any
    ///
    /// Absent, null and empty values all mean "no image".
    pub fn image(&self) -> Option<&str> {
        self.get(IMAGE_PARAMETER).filter(|image| !image.is_empty())
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for PipelineOutput {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Self {
            parameters: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Lifecycle callback from the pipeline execution engine
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// The engine accepted the pipeline definition
    Accepted,
    /// A step finished successfully
    StepSucceeded(PipelineStep),
    /// A step failed; the engine stops the pipeline
    StepFailed(PipelineStep),
    /// The pipeline finished; carries the final step's output
    Succeeded(PipelineOutput),
}
