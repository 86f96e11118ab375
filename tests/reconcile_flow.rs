//! Build reconciliation against an in-memory control plane
//!
//! The store enforces resourceVersion checks the way the API server does, so
//! these tests exercise idempotency, drift repair and conflict reporting
//! through the public API only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keel::conditions::{find_condition, ConditionType};
use keel::config::ReconcilerConfig;
use keel::context::BuildContext;
use keel::controller::{reconcile, ArtifactPublisher, BuildReconciler, DeploymentApplier};
use keel::crd::{Build, BuildSpec, BuildStatus, ConditionStatus};
use keel::handlers::{make_role, RoleHandler, WORKFLOW_ROLE};
use keel::pipeline::{PipelineEvent, PipelineOutput, PipelineStep};
use keel::resource::{
    ClusterClient, ManagedKind, ManagedObject, ObjectKey, ResourceHandler,
};
use keel::Error;

#[derive(Default)]
struct InMemoryCluster {
    objects: Mutex<HashMap<ObjectKey, ManagedObject>>,
    statuses: Mutex<HashMap<(String, String), BuildStatus>>,
    version: AtomicU64,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl InMemoryCluster {
    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Modify a stored object as another actor would
    fn external_write(&self, key: &ObjectKey, change: impl FnOnce(&mut ManagedObject)) {
        let mut objects = self.objects.lock().unwrap();
        let object = objects.get_mut(key).expect("object to modify");
        change(object);
        object.metadata_mut().resource_version = Some(self.next_version());
    }

    fn stored(&self, key: &ObjectKey) -> Option<ManagedObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    fn status(&self, namespace: &str, name: &str) -> Option<BuildStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ManagedObject>, Error> {
        Ok(self.stored(key))
    }

    async fn create(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = object.key();
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(Error::conflict(key, "already exists"));
        }
        let mut object = object.clone();
        object.metadata_mut().resource_version = Some(self.next_version());
        objects.insert(key, object);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, object: &ManagedObject) -> Result<(), Error> {
        let key = object.key();
        let mut objects = self.objects.lock().unwrap();
        let stored_version = objects
            .get(&key)
            .and_then(|o| o.resource_version().map(str::to_string));
        if stored_version.as_deref() != object.resource_version() {
            return Err(Error::conflict(
                key,
                "the object has been modified; please apply your changes to the latest version",
            ));
        }
        let mut object = object.clone();
        object.metadata_mut().resource_version = Some(self.next_version());
        objects.insert(key, object);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), Error> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn patch_build_status(
        &self,
        namespace: &str,
        name: &str,
        status: &BuildStatus,
    ) -> Result<(), Error> {
        self.statuses
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), status.clone());
        Ok(())
    }
}

#[derive(Default)]
struct CountingPublisher {
    calls: AtomicUsize,
}

#[async_trait]
impl ArtifactPublisher for CountingPublisher {
    async fn create_deployable_artifact(&self, build: &Build) -> Result<String, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{}", build.spec.component, build.generation()))
    }
}

#[derive(Default)]
struct RecordingApplier {
    applied: Mutex<Vec<String>>,
}

#[async_trait]
impl DeploymentApplier for RecordingApplier {
    async fn apply_deployment(&self, _build: &Build, artifact: &str) -> Result<(), Error> {
        self.applied.lock().unwrap().push(artifact.to_string());
        Ok(())
    }
}

struct Harness {
    cluster: Arc<InMemoryCluster>,
    publisher: Arc<CountingPublisher>,
    applier: Arc<RecordingApplier>,
}

impl Harness {
    fn new() -> Self {
        Self {
            cluster: Arc::new(InMemoryCluster::default()),
            publisher: Arc::new(CountingPublisher::default()),
            applier: Arc::new(RecordingApplier::default()),
        }
    }

    fn reconciler(&self, config: ReconcilerConfig) -> Arc<BuildReconciler> {
        Arc::new(BuildReconciler::new(
            self.cluster.clone(),
            self.publisher.clone(),
            self.applier.clone(),
            Arc::new(config),
        ))
    }
}

fn sample_build(generation: i64) -> Build {
    let mut build = Build::new(
        "checkout-build-3",
        BuildSpec {
            project: "shop".to_string(),
            component: "checkout".to_string(),
            revision: Some("main".to_string()),
            auto_deploy: true,
        },
    );
    build.metadata.namespace = Some("shop".to_string());
    build.metadata.generation = Some(generation);
    build
}

fn role_key() -> ObjectKey {
    ObjectKey::new(ManagedKind::Role, "keel-ci-shop", WORKFLOW_ROLE)
}

/// Story: a build goes from first reconcile to a deployed artifact
#[tokio::test]
async fn story_build_runs_to_deployment() {
    let harness = Harness::new();
    let reconciler = harness.reconciler(ReconcilerConfig::default());
    let mut build = sample_build(3);

    // Two passes with unchanged desired state: one create each, no updates
    reconcile(Arc::new(build.clone()), reconciler.clone())
        .await
        .unwrap();
    reconcile(Arc::new(build.clone()), reconciler.clone())
        .await
        .unwrap();
    assert_eq!(harness.cluster.creates.load(Ordering::SeqCst), 3);
    assert_eq!(harness.cluster.updates.load(Ordering::SeqCst), 0);
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);

    let events = [
        PipelineEvent::Accepted,
        PipelineEvent::StepSucceeded(PipelineStep::Clone),
        PipelineEvent::StepSucceeded(PipelineStep::Build),
        PipelineEvent::StepSucceeded(PipelineStep::Push),
        PipelineEvent::Succeeded(
            PipelineOutput::new().parameter("image", Some("registry/app:sha123".to_string())),
        ),
    ];
    for event in &events {
        assert!(reconciler
            .record_event(&mut build, event)
            .await
            .unwrap()
            .is_recorded());
    }

    let persisted = harness.cluster.status("shop", "checkout-build-3").unwrap();
    assert_eq!(Some(&persisted), build.status.as_ref());
    assert_eq!(persisted.image_status.image, "registry/app:sha123");

    // The next reconcile publishes the artifact and deploys it
    reconcile(Arc::new(build.clone()), reconciler.clone())
        .await
        .unwrap();
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *harness.applier.applied.lock().unwrap(),
        vec!["checkout-3".to_string()]
    );

    let persisted = harness.cluster.status("shop", "checkout-build-3").unwrap();
    assert_eq!(persisted.conditions.len(), ConditionType::ALL.len());
    for type_ in ConditionType::ALL {
        let condition = find_condition(&persisted.conditions, type_).unwrap();
        assert_eq!(condition.status, ConditionStatus::True, "{type_}");
        assert_eq!(condition.observed_generation, 3, "{type_}");
    }
}

/// Story: a step failure is final for the generation
#[tokio::test]
async fn story_failed_build_is_never_published() {
    let harness = Harness::new();
    let reconciler = harness.reconciler(ReconcilerConfig::default());
    let mut build = sample_build(1);

    reconciler
        .record_event(&mut build, &PipelineEvent::Accepted)
        .await
        .unwrap();
    reconciler
        .record_event(&mut build, &PipelineEvent::StepFailed(PipelineStep::Build))
        .await
        .unwrap();
    let late = PipelineEvent::Succeeded(
        PipelineOutput::new().parameter("image", Some("registry/app:late".to_string())),
    );
    assert!(!reconciler
        .record_event(&mut build, &late)
        .await
        .unwrap()
        .is_recorded());

    reconcile(Arc::new(build.clone()), reconciler.clone())
        .await
        .unwrap();

    let persisted = harness.cluster.status("shop", "checkout-build-3").unwrap();
    let completed = find_condition(&persisted.conditions, ConditionType::Completed).unwrap();
    assert_eq!(completed.status, ConditionStatus::False);
    assert!(persisted.image_status.image.is_empty());
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);
}

/// Story: drift introduced by another actor is repaired on the next pass
#[tokio::test]
async fn story_drifted_role_is_repaired() {
    let harness = Harness::new();
    let reconciler = harness.reconciler(ReconcilerConfig::default());
    let build = Arc::new(sample_build(1));

    reconcile(build.clone(), reconciler.clone()).await.unwrap();
    harness.cluster.external_write(&role_key(), |object| {
        if let ManagedObject::Role(role) = object {
            role.rules = Some(Vec::new());
        }
    });

    reconcile(build.clone(), reconciler.clone()).await.unwrap();

    assert_eq!(harness.cluster.updates.load(Ordering::SeqCst), 1);
    let ctx = BuildContext::new(build, Arc::new(ReconcilerConfig::default()));
    match harness.cluster.stored(&role_key()) {
        Some(ManagedObject::Role(role)) => assert_eq!(role.rules, make_role(&ctx).rules),
        other => panic!("expected stored Role, got {other:?}"),
    }
}

/// Story: an update based on a stale read is rejected, then a fresh pass wins
#[tokio::test]
async fn story_stale_update_conflicts_then_recovers() {
    let harness = Harness::new();
    let config = Arc::new(ReconcilerConfig::default());
    let reconciler = harness.reconciler(ReconcilerConfig::default());
    let build = Arc::new(sample_build(1));
    let ctx = BuildContext::new(build.clone(), config);

    reconcile(build.clone(), reconciler.clone()).await.unwrap();
    harness.cluster.external_write(&role_key(), |object| {
        if let ManagedObject::Role(role) = object {
            role.rules = None;
        }
    });
    let stale = harness.cluster.stored(&role_key()).unwrap();
    harness.cluster.external_write(&role_key(), |object| {
        object
            .metadata_mut()
            .annotations
            .get_or_insert_with(Default::default)
            .insert("example.com/touched".to_string(), "yes".to_string());
    });

    let handler = RoleHandler::new(harness.cluster.clone());
    let err = handler.update(&ctx, stale).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(harness.cluster.updates.load(Ordering::SeqCst), 0);

    reconcile(build, reconciler).await.unwrap();
    assert_eq!(harness.cluster.updates.load(Ordering::SeqCst), 1);
}

/// Story: turning workflow RBAC off removes the Role and binding only
#[tokio::test]
async fn story_disabling_rbac_removes_grants() {
    let harness = Harness::new();
    let build = Arc::new(sample_build(1));

    reconcile(build.clone(), harness.reconciler(ReconcilerConfig::default()))
        .await
        .unwrap();

    let disabled = ReconcilerConfig {
        workflow_rbac: false,
        ..Default::default()
    };
    reconcile(build, harness.reconciler(disabled)).await.unwrap();

    let kinds: Vec<ManagedKind> = harness
        .cluster
        .objects
        .lock()
        .unwrap()
        .keys()
        .map(|key| key.kind)
        .collect();
    assert_eq!(kinds, vec![ManagedKind::ServiceAccount]);
}
