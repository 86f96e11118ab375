//! Workflow RoleBinding handler

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use super::{WORKFLOW_ROLE, WORKFLOW_ROLE_BINDING, WORKFLOW_SERVICE_ACCOUNT};
use crate::context::BuildContext;
use crate::resource::{
    converge, ClusterClient, ManagedKind, ManagedObject, ObjectKey, ResourceHandler,
};
use crate::Error;

/// Manages the RoleBinding from the workflow ServiceAccount to its Role
pub struct RoleBindingHandler {
    client: Arc<dyn ClusterClient>,
}

impl RoleBindingHandler {
    /// Create a handler using the given client
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    fn key(ctx: &BuildContext) -> ObjectKey {
        ObjectKey::new(
            ManagedKind::RoleBinding,
            ctx.ci_namespace(),
            WORKFLOW_ROLE_BINDING,
        )
    }
}

/// Desired RoleBinding for a build
pub fn make_role_binding(ctx: &BuildContext) -> RoleBinding {
    let namespace = ctx.ci_namespace();
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(WORKFLOW_ROLE_BINDING.to_string()),
            namespace: Some(namespace.clone()),
            labels: Some(ctx.labels()),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: WORKFLOW_SERVICE_ACCOUNT.to_string(),
            namespace: Some(namespace),
            api_group: None,
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: WORKFLOW_ROLE.to_string(),
        },
    }
}

#[async_trait]
impl ResourceHandler<BuildContext> for RoleBindingHandler {
    fn name(&self) -> &'static str {
        "WorkflowRoleBinding"
    }

    fn is_required(&self, ctx: &BuildContext) -> bool {
        ctx.config.workflow_rbac
    }

    async fn get_current_state(&self, ctx: &BuildContext) -> Result<Option<ManagedObject>, Error> {
        self.client.get(&Self::key(ctx)).await
    }

    async fn create(&self, ctx: &BuildContext) -> Result<(), Error> {
        self.client
            .create(&ManagedObject::RoleBinding(make_role_binding(ctx)))
            .await
    }

    async fn update(&self, ctx: &BuildContext, current: ManagedObject) -> Result<(), Error> {
        converge(
            self.client.as_ref(),
            self.name(),
            current,
            make_role_binding(ctx),
        )
        .await
    }

    async fn delete(&self, ctx: &BuildContext) -> Result<(), Error> {
        self.client.delete(&Self::key(ctx)).await
    }
}
