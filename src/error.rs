//! Error types for the keel reconciliation core
//!
//! Errors carry enough context (object key, handler, collaborator) to be
//! actionable from a single log line. Domain outcomes such as a failed
//! pipeline step are NOT errors; they are recorded as conditions on the
//! build status. Everything here is returned to the invoking reconcile loop,
//! which decides whether to requeue via [`Error::is_retryable`].

use thiserror::Error;

use crate::resource::{ManagedKind, ObjectKey};

/// Main error type for keel operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error other than not-found or conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Write rejected because it was based on a stale read, or a concurrent
    /// actor created the object first
    #[error("conflict on {key}: {message}")]
    Conflict {
        /// Object the write targeted
        key: ObjectKey,
        /// Message returned by the API server
        message: String,
    },

    /// Current state handed to a handler is not the kind it manages
    #[error("handler {handler} expected current state of kind {expected}, got {found}")]
    TypeMismatch {
        /// Handler that received the object
        handler: &'static str,
        /// Kind the handler manages
        expected: ManagedKind,
        /// Kind actually received
        found: ManagedKind,
    },

    /// The caller cancelled the operation
    #[error("operation cancelled: {operation}")]
    Cancelled {
        /// Operation that was in flight
        operation: String,
    },

    /// A namespaced object arrived without a namespace
    #[error("{kind} {name} has no namespace")]
    MissingNamespace {
        /// Kind of the object
        kind: &'static str,
        /// Name of the object
        name: String,
    },

    /// Artifact or deployment collaborator failure
    #[error("{collaborator} failed: {message}")]
    Collaborator {
        /// Collaborator name (e.g., "artifact-publisher")
        collaborator: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a conflict error for the given object
    pub fn conflict(key: ObjectKey, msg: impl Into<String>) -> Self {
        Self::Conflict {
            key,
            message: msg.into(),
        }
    }

    /// Create a type-mismatch error for a handler
    pub fn type_mismatch(handler: &'static str, expected: ManagedKind, found: ManagedKind) -> Self {
        Self::TypeMismatch {
            handler,
            expected,
            found,
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a missing-namespace error
    pub fn missing_namespace(kind: &'static str, name: impl Into<String>) -> Self {
        Self::MissingNamespace {
            kind,
            name: name.into(),
        }
    }

    /// Create a collaborator error
    pub fn collaborator(collaborator: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Collaborator {
            collaborator: collaborator.into(),
            message: msg.into(),
        }
    }

    /// Classify a kube error returned while writing `key`
    ///
    /// HTTP 409 becomes [`Error::Conflict`]; everything else stays a
    /// [`Error::Kube`] so the original cause is preserved.
    pub fn from_kube_write(key: &ObjectKey, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 409 => Self::conflict(key.clone(), ae.message),
            other => Self::Kube { source: other },
        }
    }

    /// Check if the invoking loop should requeue on this error
    ///
    /// Conflicts are retryable: the next reconcile reads fresh state.
    /// Client errors (4xx) from the API server other than 409/429 are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    !(400..500).contains(&ae.code) || ae.code == 409 || ae.code == 429
                }
                _ => true,
            },
            Error::Conflict { .. } => true,
            Error::TypeMismatch { .. } => false,
            Error::Cancelled { .. } => false,
            Error::MissingNamespace { .. } => false,
            Error::Collaborator { .. } => true,
        }
    }

    /// Whether this error signals a programming or integration fault
    /// that needs investigation rather than blind retries
    pub fn is_integration_fault(&self) -> bool {
        matches!(
            self,
            Error::TypeMismatch { .. } | Error::MissingNamespace { .. }
        )
    }

    /// Whether this error is an optimistic-concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} error", reason),
            reason: reason.to_string(),
            code,
        })
    }

    fn sa_key() -> ObjectKey {
        ObjectKey::new(ManagedKind::ServiceAccount, "keel-ci-shop", "workflow-sa")
    }

    /// Story: a stale write is reported as a conflict, not a generic API error
    #[test]
    fn story_stale_update_becomes_conflict() {
        let err = Error::from_kube_write(&sa_key(), api_error(409, "Conflict"));
        assert!(err.is_conflict());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("keel-ci-shop/workflow-sa"));
    }

    #[test]
    fn test_other_write_errors_keep_kube_source() {
        let err = Error::from_kube_write(&sa_key(), api_error(500, "InternalError"));
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let err = Error::from(api_error(422, "Invalid"));
        assert!(!err.is_retryable());

        let throttled = Error::from(api_error(429, "TooManyRequests"));
        assert!(throttled.is_retryable());
    }

    /// Story: a handler wired to the wrong kind is an integration fault
    #[test]
    fn story_type_mismatch_is_integration_fault() {
        let err = Error::type_mismatch(
            "WorkflowRoleBinding",
            ManagedKind::RoleBinding,
            ManagedKind::Role,
        );
        assert!(err.is_integration_fault());
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "handler WorkflowRoleBinding expected current state of kind RoleBinding, got Role"
        );
    }

    #[test]
    fn test_cancelled_is_terminal_for_this_pass() {
        let err = Error::cancelled("get ServiceAccount");
        assert!(!err.is_retryable());
        assert!(!err.is_integration_fault());
        assert!(err.to_string().contains("get ServiceAccount"));
    }

    #[test]
    fn test_collaborator_errors_are_retryable() {
        let err = Error::collaborator("artifact-publisher", "store unavailable");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "artifact-publisher failed: store unavailable");
    }

    #[test]
    fn test_missing_namespace_is_not_retried() {
        let err = Error::missing_namespace("Build", "checkout-build-1");
        assert!(!err.is_retryable());
        assert!(err.is_integration_fault());
        assert_eq!(err.to_string(), "Build checkout-build-1 has no namespace");
    }
}
