//! Build reconciliation
//!
//! A reconcile pass converges the workflow RBAC objects in the build's CI
//! namespace, then, once the pipeline has completed for the current
//! generation, publishes the deployable artifact and optionally deploys it.
//! Pipeline callbacks arrive separately through
//! [`BuildReconciler::record_event`].

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::deploy::{ArtifactPublisher, DeploymentApplier};
use crate::config::ReconcilerConfig;
use crate::context::BuildContext;
use crate::crd::Build;
use crate::handlers::workflow_handlers;
use crate::pipeline::status::{
    apply_event, artifact_pending, mark_artifact_created, mark_deployment_applied, SkipReason,
    Transition,
};
use crate::pipeline::PipelineEvent;
use crate::resource::{apply_all, cancellable, ApplyOutcome, ClusterClient, ResourceHandler};
use crate::Error;

/// Requeue interval for a healthy build
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);
/// Requeue after an optimistic-concurrency conflict
const CONFLICT_REQUEUE: Duration = Duration::from_secs(10);
/// Requeue after any other retryable failure
const RETRY_REQUEUE: Duration = Duration::from_secs(30);
/// Requeue after an integration fault; retrying sooner will not help
const FAULT_REQUEUE: Duration = Duration::from_secs(300);

/// Shared state for the build controller
///
/// Every collaborator is injected so tests can drive the reconciler
/// against mocks. Nothing here is mutated by a reconcile; per-build state
/// lives on the [`Build`] itself.
pub struct BuildReconciler {
    client: Arc<dyn ClusterClient>,
    artifacts: Arc<dyn ArtifactPublisher>,
    deployer: Arc<dyn DeploymentApplier>,
    config: Arc<ReconcilerConfig>,
    handlers: Vec<Arc<dyn ResourceHandler<BuildContext>>>,
    cancel: CancellationToken,
}

impl BuildReconciler {
    /// Create a reconciler with the standard workflow handlers
    pub fn new(
        client: Arc<dyn ClusterClient>,
        artifacts: Arc<dyn ArtifactPublisher>,
        deployer: Arc<dyn DeploymentApplier>,
        config: Arc<ReconcilerConfig>,
    ) -> Self {
        let handlers = workflow_handlers(client.clone());
        Self {
            client,
            artifacts,
            deployer,
            config,
            handlers,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the handler list
    pub fn with_handlers(mut self, handlers: Vec<Arc<dyn ResourceHandler<BuildContext>>>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Abort in-flight control-plane calls when `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Converge the build's workflow resources, in handler order
    pub async fn reconcile_resources(&self, build: Arc<Build>) -> Result<Vec<ApplyOutcome>, Error> {
        let ctx = BuildContext::new(build, self.config.clone());
        apply_all(&self.handlers, &ctx, &self.cancel).await
    }

    /// Record a pipeline lifecycle callback and persist the status if it changed
    ///
    /// If the status cannot be persisted the in-memory status is rolled back,
    /// so retrying the same event records it again.
    #[instrument(skip(self, build), fields(build = %build.name_any()))]
    pub async fn record_event(
        &self,
        build: &mut Build,
        event: &PipelineEvent,
    ) -> Result<Transition, Error> {
        let before = build.status.clone();
        let transition = apply_event(build, event);
        match transition {
            Transition::Recorded => {
                if let Err(e) = self.persist_status(build).await {
                    build.status = before;
                    return Err(e);
                }
                debug!(?event, "pipeline event recorded");
            }
            Transition::Skipped(reason) => {
                debug!(?event, ?reason, "pipeline event skipped");
            }
        }
        Ok(transition)
    }

    /// Publish the artifact for a completed build and auto-deploy it
    ///
    /// A failed deployment is recorded as DeploymentApplied=False rather than
    /// returned; the artifact exists and the user can deploy it by hand.
    /// Any returned error (artifact creation, cancellation, status write)
    /// leaves the status as it was before the call.
    #[instrument(skip(self, build), fields(build = %build.name_any()))]
    pub async fn publish_artifact(&self, build: &mut Build) -> Result<Transition, Error> {
        if !artifact_pending(build) {
            debug!("no artifact to publish");
            return Ok(Transition::Skipped(SkipReason::NotCompleted));
        }

        let before = build.status.clone();
        let result = self.publish_and_deploy(build).await;
        if result.is_err() {
            build.status = before;
        }
        result.map(|()| Transition::Recorded)
    }

    async fn publish_and_deploy(&self, build: &mut Build) -> Result<(), Error> {
        let artifact = cancellable(
            &self.cancel,
            "create deployable artifact".to_string(),
            async { self.artifacts.create_deployable_artifact(build).await },
        )
        .await?;
        mark_artifact_created(build);
        info!(artifact = %artifact, "deployable artifact created");

        if build.spec.auto_deploy {
            let applied = cancellable(
                &self.cancel,
                "apply deployment".to_string(),
                async { self.deployer.apply_deployment(build, &artifact).await },
            )
            .await;
            let succeeded = match applied {
                Ok(()) => true,
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => {
                    warn!(error = %e, artifact = %artifact, "auto-deploy failed");
                    false
                }
            };
            mark_deployment_applied(build, succeeded);
        }

        self.persist_status(build).await
    }

    async fn persist_status(&self, build: &Build) -> Result<(), Error> {
        let name = build.name_any();
        let namespace = build
            .namespace()
            .ok_or_else(|| Error::missing_namespace("Build", &name))?;
        let Some(status) = build.status.as_ref() else {
            return Ok(());
        };
        cancellable(
            &self.cancel,
            format!("patch status of build {name}"),
            async { self.client.patch_build_status(&namespace, &name, status).await },
        )
        .await
    }
}

/// Reconcile a Build
///
/// Converges the workflow resources and, when the pipeline has completed for
/// the current generation, publishes its artifact. The build is requeued
/// periodically so drift in the managed objects is repaired.
#[instrument(skip(build, reconciler), fields(build = %build.name_any()))]
pub async fn reconcile(build: Arc<Build>, reconciler: Arc<BuildReconciler>) -> Result<Action, Error> {
    info!(generation = build.generation(), "reconciling build");

    let outcomes = reconciler.reconcile_resources(build.clone()).await?;
    debug!(?outcomes, "workflow resources converged");

    if artifact_pending(&build) {
        let mut build = (*build).clone();
        reconciler.publish_artifact(&mut build).await?;
    }

    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Error policy for the build controller
pub fn error_policy(build: Arc<Build>, error: &Error, _reconciler: Arc<BuildReconciler>) -> Action {
    error!(
        ?error,
        build = %build.name_any(),
        "build reconciliation failed"
    );

    if error.is_conflict() {
        Action::requeue(CONFLICT_REQUEUE)
    } else if error.is_integration_fault() {
        Action::requeue(FAULT_REQUEUE)
    } else if error.is_retryable() {
        Action::requeue(RETRY_REQUEUE)
    } else if matches!(error, Error::Cancelled { .. }) {
        Action::await_change()
    } else {
        Action::requeue(FAULT_REQUEUE)
    }
}
