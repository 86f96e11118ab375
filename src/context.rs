//! Build context handed to resource handlers
//!
//! Object names, namespaces and labels are pure functions of the context,
//! never of an object's current state.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::ReconcilerConfig;
use crate::crd::Build;

/// Label recording which controller manages an object
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
/// Label recording the project an object serves
pub const LABEL_PROJECT: &str = "keel.dev/project";
/// Label recording the component an object serves
pub const LABEL_COMPONENT: &str = "keel.dev/component";

/// Value of [`LABEL_MANAGED_BY`] on objects keel writes
pub const MANAGED_BY_VALUE: &str = "keel";

/// Label keys owned by keel; everything else belongs to other actors
pub const MANAGED_LABEL_KEYS: &[&str] = &[LABEL_MANAGED_BY, LABEL_PROJECT, LABEL_COMPONENT];

/// Maximum length of a Kubernetes namespace name (RFC 1123 label)
const MAX_NAMESPACE_LEN: usize = 63;

/// Desired-state inputs for one reconcile of one build
#[derive(Clone, Debug)]
pub struct BuildContext {
    /// The build being reconciled
    pub build: Arc<Build>,
    /// Platform configuration
    pub config: Arc<ReconcilerConfig>,
}

impl BuildContext {
    /// Create a context for a build
    pub fn new(build: Arc<Build>, config: Arc<ReconcilerConfig>) -> Self {
        Self { build, config }
    }

    /// Namespace the CI workflow for this build runs in
    ///
    /// Derived from the configured prefix and the build's project, then
    /// coerced into a valid RFC 1123 label.
    pub fn ci_namespace(&self) -> String {
        sanitize_namespace(&format!(
            "{}-{}",
            self.config.ci_namespace_prefix, self.build.spec.project
        ))
    }

    /// Labels applied to every object managed for this build
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED_BY.to_string(), MANAGED_BY_VALUE.to_string()),
            (LABEL_PROJECT.to_string(), self.build.spec.project.clone()),
            (LABEL_COMPONENT.to_string(), self.build.spec.component.clone()),
        ])
    }
}

fn sanitize_namespace(raw: &str) -> String {
    let mut name: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    name.truncate(MAX_NAMESPACE_LEN);
    name.trim_matches('-').to_string()
}
