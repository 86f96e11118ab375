//! Deployment Custom Resource Definition
//!
//! A Deployment binds a deployable artifact to an environment. The build
//! controller derives one from a successful build when auto-deploy is on.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default number of revisions kept for rollback
pub const DEFAULT_REVISION_HISTORY_LIMIT: i32 = 10;

/// Specification for a Deployment
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "Deployment",
    plural = "deployments",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of deployment revisions to keep for rollback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,

    /// Reference to the deployable artifact being deployed
    pub deployment_artifact_ref: String,
}

impl DeploymentSpec {
    /// Revision history limit with the default applied
    pub fn revision_history_limit(&self) -> i32 {
        self.revision_history_limit
            .unwrap_or(DEFAULT_REVISION_HISTORY_LIMIT)
    }
}
