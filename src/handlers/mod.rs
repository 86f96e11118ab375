//! Resource handlers for the CI workflow's RBAC objects
//!
//! A workflow pod runs as `workflow-sa`, bound through `workflow-role-binding`
//! to `workflow-role`, which grants the permissions the workflow executor
//! needs to report step results. All three live in the build's CI namespace
//! and are only managed when workflow RBAC is enabled in the configuration.

mod role;
mod role_binding;
mod service_account;

use std::sync::Arc;

pub use role::{make_role, RoleHandler};
pub use role_binding::{make_role_binding, RoleBindingHandler};
pub use service_account::{make_service_account, ServiceAccountHandler};

use crate::context::BuildContext;
use crate::resource::{ClusterClient, ResourceHandler};

/// Name of the ServiceAccount workflow pods run as
pub const WORKFLOW_SERVICE_ACCOUNT: &str = "workflow-sa";
/// Name of the Role granted to the workflow ServiceAccount
pub const WORKFLOW_ROLE: &str = "workflow-role";
/// Name of the RoleBinding tying the two together
pub const WORKFLOW_ROLE_BINDING: &str = "workflow-role-binding";

/// Handlers in the order they must be applied
pub fn workflow_handlers(
    client: Arc<dyn ClusterClient>,
) -> Vec<Arc<dyn ResourceHandler<BuildContext>>> {
    vec![
        Arc::new(ServiceAccountHandler::new(client.clone())),
        Arc::new(RoleHandler::new(client.clone())),
        Arc::new(RoleBindingHandler::new(client)),
    ]
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::config::ReconcilerConfig;
    use crate::context::BuildContext;
    use crate::crd::{Build, BuildSpec};

    pub fn build_context(workflow_rbac: bool) -> BuildContext {
        let build = Build::new(
            "checkout-build-1",
            BuildSpec {
                project: "shop".to_string(),
                component: "checkout".to_string(),
                revision: None,
                auto_deploy: false,
            },
        );
        let config = ReconcilerConfig {
            workflow_rbac,
            ..Default::default()
        };
        BuildContext::new(Arc::new(build), Arc::new(config))
    }
}
