//! Workflow Role handler

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::WORKFLOW_ROLE;
use crate::context::BuildContext;
use crate::resource::{
    converge, ClusterClient, ManagedKind, ManagedObject, ObjectKey, ResourceHandler,
};
use crate::Error;

/// Manages the Role granting the workflow executor its permissions
pub struct RoleHandler {
    client: Arc<dyn ClusterClient>,
}

impl RoleHandler {
    /// Create a handler using the given client
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    fn key(ctx: &BuildContext) -> ObjectKey {
        ObjectKey::new(ManagedKind::Role, ctx.ci_namespace(), WORKFLOW_ROLE)
    }
}

/// Desired Role for a build
///
/// The executor records step outputs as `workflowtaskresults`; without
/// create/patch on them the pipeline cannot report its output parameters.
pub fn make_role(ctx: &BuildContext) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(WORKFLOW_ROLE.to_string()),
            namespace: Some(ctx.ci_namespace()),
            labels: Some(ctx.labels()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["argoproj.io".to_string()]),
            resources: Some(vec!["workflowtaskresults".to_string()]),
            verbs: vec!["create".to_string(), "patch".to_string()],
            ..Default::default()
        }]),
    }
}

#[async_trait]
impl ResourceHandler<BuildContext> for RoleHandler {
    fn name(&self) -> &'static str {
        "WorkflowRole"
    }

    fn is_required(&self, ctx: &BuildContext) -> bool {
        ctx.config.workflow_rbac
    }

    async fn get_current_state(&self, ctx: &BuildContext) -> Result<Option<ManagedObject>, Error> {
        self.client.get(&Self::key(ctx)).await
    }

    async fn create(&self, ctx: &BuildContext) -> Result<(), Error> {
        self.client
            .create(&ManagedObject::Role(make_role(ctx)))
            .await
    }

    async fn update(&self, ctx: &BuildContext, current: ManagedObject) -> Result<(), Error> {
        converge(self.client.as_ref(), self.name(), current, make_role(ctx)).await
    }

    async fn delete(&self, ctx: &BuildContext) -> Result<(), Error> {
        self.client.delete(&Self::key(ctx)).await
    }
}
