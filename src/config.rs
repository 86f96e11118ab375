//! Reconciler configuration
//!
//! [`ReconcilerConfig`] is a `clap::Args` struct so the host binary can
//! flatten it into its own command line; every flag also reads an
//! environment variable.

use clap::{ArgAction, Args};

/// Default prefix for per-project CI namespaces
pub const DEFAULT_CI_NAMESPACE_PREFIX: &str = "keel-ci";

/// Default field manager recorded on objects the controller writes
pub const DEFAULT_FIELD_MANAGER: &str = "keel-build-controller";

/// Platform configuration consulted by the resource handlers
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Prefix for the namespaces CI workflows run in
    #[arg(
        long = "ci-namespace-prefix",
        env = "KEEL_CI_NAMESPACE_PREFIX",
        default_value = DEFAULT_CI_NAMESPACE_PREFIX
    )]
    pub ci_namespace_prefix: String,

    /// Manage the workflow ServiceAccount, Role and RoleBinding
    ///
    /// Disable when the platform provisions workflow RBAC out of band.
    #[arg(
        long = "workflow-rbac",
        env = "KEEL_WORKFLOW_RBAC",
        default_value_t = true,
        action = ArgAction::Set
    )]
    pub workflow_rbac: bool,

    /// Field manager name sent with every write
    #[arg(
        long = "field-manager",
        env = "KEEL_FIELD_MANAGER",
        default_value = DEFAULT_FIELD_MANAGER
    )]
    pub field_manager: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            ci_namespace_prefix: DEFAULT_CI_NAMESPACE_PREFIX.to_string(),
            workflow_rbac: true,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}
