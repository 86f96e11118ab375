//! Managed-resource contract and apply driver
//!
//! Every object kind the controller manages implements [`ResourceHandler`].
//! The driver ([`apply`]) runs one reconciliation pass for one handler:
//!
//! 1. not required → delete (idempotent)
//! 2. fetch current state (not-found is `None`, not an error)
//! 3. absent → create
//! 4. present → update, which writes only when the diff policy says so
//!
//! Nothing here retries or sleeps. Every collaborator call races the
//! caller's [`CancellationToken`]; errors surface unchanged to the invoking
//! reconcile loop.

pub mod client;
pub mod diff;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::Error;

pub use client::{ClusterClient, KubeClusterClient};
pub use diff::DiffPolicy;

#[cfg(test)]
pub use client::MockClusterClient;

/// Kinds of object the controller manages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagedKind {
    /// core/v1 ServiceAccount
    ServiceAccount,
    /// rbac.authorization.k8s.io/v1 Role
    Role,
    /// rbac.authorization.k8s.io/v1 RoleBinding
    RoleBinding,
}

impl std::fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount => write!(f, "ServiceAccount"),
            Self::Role => write!(f, "Role"),
            Self::RoleBinding => write!(f, "RoleBinding"),
        }
    }
}

/// Identity of a managed object: (kind, namespace, name)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object kind
    pub kind: ManagedKind,
    /// Namespace the object lives in
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key
    pub fn new(kind: ManagedKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// Typed snapshot of a managed object's current state
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    /// A ServiceAccount
    ServiceAccount(ServiceAccount),
    /// A Role
    Role(Role),
    /// A RoleBinding
    RoleBinding(RoleBinding),
}

impl ManagedObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ManagedKind {
        match self {
            Self::ServiceAccount(_) => ManagedKind::ServiceAccount,
            Self::Role(_) => ManagedKind::Role,
            Self::RoleBinding(_) => ManagedKind::RoleBinding,
        }
    }

    /// Object metadata
    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::ServiceAccount(o) => &o.metadata,
            Self::Role(o) => &o.metadata,
            Self::RoleBinding(o) => &o.metadata,
        }
    }

    /// Mutable object metadata
    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Self::ServiceAccount(o) => &mut o.metadata,
            Self::Role(o) => &mut o.metadata,
            Self::RoleBinding(o) => &mut o.metadata,
        }
    }

    /// Key derived from the object's metadata
    pub fn key(&self) -> ObjectKey {
        let meta = self.metadata();
        ObjectKey::new(
            self.kind(),
            meta.namespace.clone().unwrap_or_default(),
            meta.name.clone().unwrap_or_default(),
        )
    }

    /// Concurrency token of the snapshot
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata().resource_version.as_deref()
    }
}

/// Typed view of one [`ManagedObject`] variant
pub trait ManagedResource: DiffPolicy + Resource + Sized {
    /// Kind this type represents
    const KIND: ManagedKind;

    /// Downcast, handing the object back on mismatch
    fn from_object(object: ManagedObject) -> Result<Self, ManagedObject>;

    /// Upcast into the sum type
    fn into_object(self) -> ManagedObject;
}

impl ManagedResource for ServiceAccount {
    const KIND: ManagedKind = ManagedKind::ServiceAccount;

    fn from_object(object: ManagedObject) -> Result<Self, ManagedObject> {
        match object {
            ManagedObject::ServiceAccount(sa) => Ok(sa),
            other => Err(other),
        }
    }

    fn into_object(self) -> ManagedObject {
        ManagedObject::ServiceAccount(self)
    }
}

impl ManagedResource for Role {
    const KIND: ManagedKind = ManagedKind::Role;

    fn from_object(object: ManagedObject) -> Result<Self, ManagedObject> {
        match object {
            ManagedObject::Role(role) => Ok(role),
            other => Err(other),
        }
    }

    fn into_object(self) -> ManagedObject {
        ManagedObject::Role(self)
    }
}

impl ManagedResource for RoleBinding {
    const KIND: ManagedKind = ManagedKind::RoleBinding;

    fn from_object(object: ManagedObject) -> Result<Self, ManagedObject> {
        match object {
            ManagedObject::RoleBinding(rb) => Ok(rb),
            other => Err(other),
        }
    }

    fn into_object(self) -> ManagedObject {
        ManagedObject::RoleBinding(self)
    }
}

/// Contract every managed object kind implements
///
/// `C` is the desired-state context (e.g. [`crate::context::BuildContext`]).
/// Implementations must be stateless across calls: everything they need
/// comes from `ctx` or from collaborators injected at construction.
#[async_trait]
pub trait ResourceHandler<C: Send + Sync>: Send + Sync {
    /// Human-readable kind label for logs
    fn name(&self) -> &'static str;

    /// Whether the object should exist for this context
    fn is_required(&self, ctx: &C) -> bool;

    /// Fetch the object by its derived identity
    ///
    /// Returns `Ok(None)` when it does not exist.
    async fn get_current_state(&self, ctx: &C) -> Result<Option<ManagedObject>, Error>;

    /// Build and persist a new object
    async fn create(&self, ctx: &C) -> Result<(), Error>;

    /// Converge an existing object, writing only when it diverges
    async fn update(&self, ctx: &C, current: ManagedObject) -> Result<(), Error>;

    /// Remove the object; absent is success. May be a deliberate no-op.
    async fn delete(&self, ctx: &C) -> Result<(), Error>;
}

/// What one driver pass did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Not required; delete policy ran
    Removed,
    /// Object was absent and has been created
    Created,
    /// Object was present; update evaluated (and written only if divergent)
    Converged,
}

/// Run one reconciliation pass of `handler` for `ctx`
#[instrument(skip_all, fields(resource = handler.name()))]
pub async fn apply<C: Send + Sync>(
    handler: &dyn ResourceHandler<C>,
    ctx: &C,
    cancel: &CancellationToken,
) -> Result<ApplyOutcome, Error> {
    let name = handler.name();

    if !handler.is_required(ctx) {
        cancellable(cancel, format!("delete {}", name), handler.delete(ctx)).await?;
        debug!("resource not required, delete policy applied");
        return Ok(ApplyOutcome::Removed);
    }

    let current = cancellable(cancel, format!("get {}", name), handler.get_current_state(ctx))
        .await?;

    match current {
        None => {
            cancellable(cancel, format!("create {}", name), handler.create(ctx)).await?;
            info!("created managed resource");
            Ok(ApplyOutcome::Created)
        }
        Some(current) => {
            cancellable(cancel, format!("update {}", name), handler.update(ctx, current)).await?;
            Ok(ApplyOutcome::Converged)
        }
    }
}

/// Apply every handler in order, stopping at the first error
pub async fn apply_all<C: Send + Sync>(
    handlers: &[Arc<dyn ResourceHandler<C>>],
    ctx: &C,
    cancel: &CancellationToken,
) -> Result<Vec<ApplyOutcome>, Error> {
    let mut outcomes = Vec::with_capacity(handlers.len());
    for handler in handlers {
        outcomes.push(apply(handler.as_ref(), ctx, cancel).await?);
    }
    Ok(outcomes)
}

/// Shared update path for typed handlers
///
/// Downcasts `current`, asks the diff policy whether `desired` diverges and,
/// if so, writes `desired` carrying the current resourceVersion so a
/// concurrent modification is rejected by the API server.
pub async fn converge<R: ManagedResource>(
    client: &dyn ClusterClient,
    handler: &'static str,
    current: ManagedObject,
    mut desired: R,
) -> Result<(), Error> {
    let current = R::from_object(current)
        .map_err(|other| Error::type_mismatch(handler, R::KIND, other.kind()))?;

    if !R::should_update(&current, &desired) {
        debug!(resource = handler, "managed fields match, skipping update");
        return Ok(());
    }

    desired.meta_mut().resource_version = current.meta().resource_version.clone();
    let desired = desired.into_object();
    info!(resource = handler, key = %desired.key(), "updating diverged resource");
    client.update(&desired).await
}

/// Race `fut` against `cancel`, reporting cancellation as [`Error::Cancelled`]
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    operation: String,
    fut: F,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = fut => result,
    }
}
