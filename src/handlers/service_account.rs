//! Workflow ServiceAccount handler

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::WORKFLOW_SERVICE_ACCOUNT;
use crate::context::BuildContext;
use crate::resource::{
    converge, ClusterClient, ManagedKind, ManagedObject, ObjectKey, ResourceHandler,
};
use crate::Error;

/// Manages the ServiceAccount workflow pods run as
///
/// Delete is a no-op: the account is shared by every build of the project
/// and goes away with the CI namespace.
pub struct ServiceAccountHandler {
    client: Arc<dyn ClusterClient>,
}

impl ServiceAccountHandler {
    /// Create a handler using the given client
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    fn key(ctx: &BuildContext) -> ObjectKey {
        ObjectKey::new(
            ManagedKind::ServiceAccount,
            ctx.ci_namespace(),
            WORKFLOW_SERVICE_ACCOUNT,
        )
    }
}

/// Desired ServiceAccount for a build
pub fn make_service_account(ctx: &BuildContext) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(WORKFLOW_SERVICE_ACCOUNT.to_string()),
            namespace: Some(ctx.ci_namespace()),
            labels: Some(ctx.labels()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[async_trait]
impl ResourceHandler<BuildContext> for ServiceAccountHandler {
    fn name(&self) -> &'static str {
        "WorkflowServiceAccount"
    }

    fn is_required(&self, ctx: &BuildContext) -> bool {
        ctx.config.workflow_rbac
    }

    async fn get_current_state(&self, ctx: &BuildContext) -> Result<Option<ManagedObject>, Error> {
        self.client.get(&Self::key(ctx)).await
    }

    async fn create(&self, ctx: &BuildContext) -> Result<(), Error> {
        self.client
            .create(&ManagedObject::ServiceAccount(make_service_account(ctx)))
            .await
    }

    async fn update(&self, ctx: &BuildContext, current: ManagedObject) -> Result<(), Error> {
        converge(
            self.client.as_ref(),
            self.name(),
            current,
            make_service_account(ctx),
        )
        .await
    }

    async fn delete(&self, _ctx: &BuildContext) -> Result<(), Error> {
        Ok(())
    }
}
