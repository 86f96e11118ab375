//! Diff policy: decides whether an existing object needs an update
//!
//! Only fields keel owns are compared. Labels go through the managed-keys
//! projection so labels added by other actors never cause flapping, and
//! collections treat empty and absent as equal so server-side defaulting
//! does not trigger spurious writes. All functions are pure.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, Subject};

use crate::context::MANAGED_LABEL_KEYS;

/// Per-kind comparison of current vs desired state
pub trait DiffPolicy {
    /// `true` when `current` must be rewritten to match `desired`
    fn should_update(current: &Self, desired: &Self) -> bool;
}

/// Project labels onto the keys keel manages
pub fn managed_labels(labels: Option<&BTreeMap<String, String>>) -> BTreeMap<&str, &str> {
    labels
        .map(|labels| {
            labels
                .iter()
                .filter(|(k, _)| MANAGED_LABEL_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect()
        })
        .unwrap_or_default()
}

/// Compare two optional collections, treating `None` and empty as equal
pub fn equate_empty<T: PartialEq>(a: Option<&[T]>, b: Option<&[T]>) -> bool {
    a.unwrap_or_default() == b.unwrap_or_default()
}

fn labels_differ(
    current: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> bool {
    managed_labels(current) != managed_labels(desired)
}

fn empty_str_as_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn rules_equal(a: &PolicyRule, b: &PolicyRule) -> bool {
    equate_empty(a.api_groups.as_deref(), b.api_groups.as_deref())
        && equate_empty(a.resources.as_deref(), b.resources.as_deref())
        && equate_empty(a.resource_names.as_deref(), b.resource_names.as_deref())
        && equate_empty(
            a.non_resource_urls.as_deref(),
            b.non_resource_urls.as_deref(),
        )
        && a.verbs == b.verbs
}

fn subjects_equal(a: &Subject, b: &Subject) -> bool {
    a.kind == b.kind
        && a.name == b.name
        && empty_str_as_none(&a.namespace) == empty_str_as_none(&b.namespace)
        && empty_str_as_none(&a.api_group) == empty_str_as_none(&b.api_group)
}

fn all_pairs<T>(a: &[T], b: &[T], eq: impl Fn(&T, &T) -> bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| eq(x, y))
}

impl DiffPolicy for ServiceAccount {
    fn should_update(current: &Self, desired: &Self) -> bool {
        labels_differ(
            current.metadata.labels.as_ref(),
            desired.metadata.labels.as_ref(),
        )
    }
}

impl DiffPolicy for Role {
    fn should_update(current: &Self, desired: &Self) -> bool {
        if labels_differ(
            current.metadata.labels.as_ref(),
            desired.metadata.labels.as_ref(),
        ) {
            return true;
        }
        !all_pairs(
            current.rules.as_deref().unwrap_or_default(),
            desired.rules.as_deref().unwrap_or_default(),
            rules_equal,
        )
    }
}

impl DiffPolicy for RoleBinding {
    fn should_update(current: &Self, desired: &Self) -> bool {
        if labels_differ(
            current.metadata.labels.as_ref(),
            desired.metadata.labels.as_ref(),
        ) {
            return true;
        }
        if !all_pairs(
            current.subjects.as_deref().unwrap_or_default(),
            desired.subjects.as_deref().unwrap_or_default(),
            subjects_equal,
        ) {
            return true;
        }
        current.role_ref != desired.role_ref
    }
}
