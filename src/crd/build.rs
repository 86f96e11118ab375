//! Build Custom Resource Definition
//!
//! A Build is the logical entity whose CI pipeline the controller drives.
//! Its spec is read by the resource handlers; its status carries the
//! pipeline conditions and the image the pipeline produced.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ImageStatus};

/// Specification for a Build
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "keel.dev",
    version = "v1alpha1",
    kind = "Build",
    plural = "builds",
    status = "BuildStatus",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".status.imageStatus.image"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BuildSpec {
    /// Project the built component belongs to
    pub project: String,

    /// Component being built
    pub component: String,

    /// Source revision to build (branch, tag or commit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    /// Apply a Deployment automatically once the artifact exists
    #[serde(default)]
    pub auto_deploy: bool,
}

/// Status for a Build
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    /// Pipeline conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Image produced by the pipeline once known
    #[serde(default)]
    pub image_status: ImageStatus,
}

impl Build {
    /// Generation supplied by the control plane (0 before the first write)
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }

    /// Conditions recorded so far (empty when there is no status yet)
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }

    /// Status, created on first access
    pub fn status_mut(&mut self) -> &mut BuildStatus {
        self.status.get_or_insert_with(BuildStatus::default)
    }

    /// Image recorded by a successful pipeline, if any
    pub fn image(&self) -> Option<&str> {
        self.status
            .as_ref()
            .map(|s| s.image_status.image.as_str())
            .filter(|image| !image.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::CustomResourceExt;

    fn sample_build() -> Build {
        Build::new(
            "checkout-build-7",
            BuildSpec {
                project: "shop".to_string(),
                component: "checkout".to_string(),
                revision: Some("main".to_string()),
                auto_deploy: true,
            },
        )
    }

    #[test]
    fn test_generation_defaults_to_zero() {
        let mut build = sample_build();
        assert_eq!(build.generation(), 0);

        build.metadata.generation = Some(3);
        assert_eq!(build.generation(), 3);
    }

    #[test]
    fn test_status_is_created_lazily() {
        let mut build = sample_build();
        assert!(build.conditions().is_empty());
        assert_eq!(build.image(), None);

        build.status_mut().image_status.image = "registry/checkout:abc".to_string();
        assert_eq!(build.image(), Some("registry/checkout:abc"));
    }

    #[test]
    fn test_spec_uses_camel_case() {
        let json = serde_json::to_value(&sample_build().spec).unwrap();
        assert_eq!(json["autoDeploy"], true);
        assert_eq!(json["project"], "shop");
    }

    #[test]
    fn test_crd_has_status_subresource() {
        let crd = Build::crd();
        assert_eq!(crd.spec.group, "keel.dev");
        let version = &crd.spec.versions[0];
        assert!(version
            .subresources
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some());
    }
}
