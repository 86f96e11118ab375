//! Artifact and deployment collaborators

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::context::{LABEL_COMPONENT, LABEL_MANAGED_BY, LABEL_PROJECT, MANAGED_BY_VALUE};
use crate::crd::{Build, Deployment, DeploymentSpec, DEFAULT_REVISION_HISTORY_LIMIT};
use crate::Error;

/// Creates the deployable artifact for a completed build
///
/// Implementations must be idempotent: a reconcile that fails after the
/// artifact exists calls this again for the same generation.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Create (or find) the artifact for `build`, returning its name
    async fn create_deployable_artifact(&self, build: &Build) -> Result<String, Error>;
}

/// Applies a Deployment for a build's artifact
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentApplier: Send + Sync {
    /// Apply the deployment of `artifact` derived from `build`
    async fn apply_deployment(&self, build: &Build, artifact: &str) -> Result<(), Error>;
}

/// Deployment derived from a build and its artifact
///
/// One Deployment per component: later builds repoint the same object at
/// their own artifact.
pub fn make_deployment(build: &Build, artifact: &str) -> Result<Deployment, Error> {
    let namespace = build
        .namespace()
        .ok_or_else(|| Error::missing_namespace("Build", build.name_any()))?;

    let labels = BTreeMap::from([
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
        (LABEL_PROJECT.to_string(), build.spec.project.clone()),
        (LABEL_COMPONENT.to_string(), build.spec.component.clone()),
    ]);

    let mut deployment = Deployment::new(
        &build.spec.component,
        DeploymentSpec {
            revision_history_limit: Some(DEFAULT_REVISION_HISTORY_LIMIT),
            deployment_artifact_ref: artifact.to_string(),
        },
    );
    deployment.metadata = ObjectMeta {
        name: Some(build.spec.component.clone()),
        namespace: Some(namespace),
        labels: Some(labels),
        ..Default::default()
    };
    Ok(deployment)
}

/// [`DeploymentApplier`] that server-side applies the Deployment resource
pub struct KubeDeploymentApplier {
    client: Client,
    field_manager: String,
}

impl KubeDeploymentApplier {
    /// Create an applier writing as `field_manager`
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl DeploymentApplier for KubeDeploymentApplier {
    async fn apply_deployment(&self, build: &Build, artifact: &str) -> Result<(), Error> {
        let deployment = make_deployment(build, artifact)?;
        let namespace = deployment.namespace().unwrap_or_default();
        let name = deployment.name_any();

        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        let params = PatchParams::apply(&self.field_manager).force();
        api.patch(&name, &params, &Patch::Apply(&deployment)).await?;

        info!(deployment = %name, artifact = %artifact, "applied deployment");
        Ok(())
    }
}
