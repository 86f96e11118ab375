//! Build controller
//!
//! Entry points for the invoking reconcile loop plus the outbound
//! collaborators used once a pipeline has produced an image:
//!
//! - [`reconcile`] / [`error_policy`] in the shape kube-runtime's
//!   `Controller::run` expects
//! - [`BuildReconciler`] holding every injected collaborator
//! - [`ArtifactPublisher`] and [`DeploymentApplier`] for the
//!   post-completion artifact and auto-deploy steps

mod build;
mod deploy;

pub use build::{error_policy, reconcile, BuildReconciler};
pub use deploy::{
    make_deployment, ArtifactPublisher, DeploymentApplier, KubeDeploymentApplier,
};

#[cfg(test)]
pub use deploy::{MockArtifactPublisher, MockDeploymentApplier};
