use core::time::Duration;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keel_client::{
    ClientError, ListParams, MemoryTransport, ObjectRef, PropagationPolicy, Resource,
    ResourceClient, ResourceKind, ResourceVersion, Transport,
};
use serde_json::json;
use tokio::time::Instant;

use super::*;

const NAME: &str = "hello-world";
const NAMESPACE: &str = "default";

async fn seeded() -> MemoryTransport {
    let store = MemoryTransport::new();
    let deployment = Resource::new(&ResourceKind::DEPLOYMENT, NAME)
        .with_spec(json!({ "replicas": 2, "image": "nginx:1.19.3-alpine" }));
    let _ = store
        .create(&ResourceKind::DEPLOYMENT, NAMESPACE, &deployment)
        .await
        .expect("seed deployment");
    store.reset_calls();
    store
}

fn scale_down(mut deployment: Resource) -> Resource {
    deployment.spec["replicas"] = json!(1);
    deployment.spec["image"] = json!("nginx:1.19.2-alpine");
    deployment
}

fn policy(max_attempts: u32, initial_ms: u64, factor: f64) -> RetryPolicy {
    RetryPolicy::new(max_attempts, Duration::from_millis(initial_ms), factor).expect("valid policy")
}

/// Another writer commits a change right before each of the first
/// `conflicts` updates reach the store.
#[derive(Clone, Debug)]
struct ContendedStore {
    inner: MemoryTransport,
    remaining: Arc<Mutex<usize>>,
    fetched: Arc<Mutex<Vec<Option<ResourceVersion>>>>,
    submitted: Arc<Mutex<Vec<Option<ResourceVersion>>>>,
}

impl ContendedStore {
    fn new(inner: MemoryTransport, conflicts: usize) -> Self {
        Self {
            inner,
            remaining: Arc::new(Mutex::new(conflicts)),
            fetched: Arc::default(),
            submitted: Arc::default(),
        }
    }

    fn fetched(&self) -> Vec<Option<ResourceVersion>> {
        self.fetched.lock().expect("lock").clone()
    }

    fn submitted(&self) -> Vec<Option<ResourceVersion>> {
        self.submitted.lock().expect("lock").clone()
    }
}

#[async_trait]
impl Transport for ContendedStore {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Resource, ClientError> {
        let resource = self.inner.get(kind, namespace, name).await?;
        self.fetched
            .lock()
            .expect("lock")
            .push(resource.version().cloned());
        Ok(resource)
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Resource>, ClientError> {
        self.inner.list(kind, namespace, params).await
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        self.inner.create(kind, namespace, resource).await
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        self.submitted
            .lock()
            .expect("lock")
            .push(resource.version().cloned());

        let writer = {
            let mut remaining = self.remaining.lock().expect("lock");
            let writer = *remaining;
            *remaining = remaining.saturating_sub(1);
            writer
        };

        if writer > 0 {
            let _ = self.inner.modify(kind, namespace, resource.name(), |r| {
                let _ = r
                    .metadata
                    .annotations
                    .insert(format!("writer-{writer}"), "was-here".to_owned());
            })?;
        }

        self.inner.update(kind, namespace, resource).await
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        policy: PropagationPolicy,
    ) -> Result<(), ClientError> {
        self.inner.delete(kind, namespace, name, policy).await
    }
}

#[derive(Clone, Copy, Debug)]
enum Fault {
    GetNotFound,
    GetTransport,
    UpdateAuth,
    UpdateValidation,
    SlowGet,
}

/// Fails one operation in a fixed way and serves the rest from `inner`.
#[derive(Clone, Debug)]
struct FaultyStore {
    inner: MemoryTransport,
    fault: Fault,
}

#[async_trait]
impl Transport for FaultyStore {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Resource, ClientError> {
        match self.fault {
            Fault::GetNotFound => {
                return Err(ClientError::NotFound(ObjectRef::new(kind, namespace, name)))
            }
            Fault::GetTransport => {
                return Err(ClientError::Transport("connection reset by peer".to_owned()))
            }
            Fault::SlowGet => tokio::time::sleep(Duration::from_secs(60)).await,
            Fault::UpdateAuth | Fault::UpdateValidation => {}
        }
        self.inner.get(kind, namespace, name).await
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Resource>, ClientError> {
        self.inner.list(kind, namespace, params).await
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        self.inner.create(kind, namespace, resource).await
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        match self.fault {
            Fault::UpdateAuth => Err(ClientError::Auth("token rejected".to_owned())),
            Fault::UpdateValidation => Err(ClientError::Validation("spec.replicas".to_owned())),
            _ => self.inner.update(kind, namespace, resource).await,
        }
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        policy: PropagationPolicy,
    ) -> Result<(), ClientError> {
        self.inner.delete(kind, namespace, name, policy).await
    }
}

#[tokio::test(start_paused = true)]
async fn uncontended_update_takes_one_attempt() {
    let store = seeded().await;
    let client = ResourceClient::namespaced(store.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);
    let before = store
        .peek(&ResourceKind::DEPLOYMENT, NAMESPACE, NAME)
        .expect("seeded");
    let start = Instant::now();

    let updated = ConflictRetry::new(&client, NAME)
        .policy(policy(3, 10, 2.0))
        .run(scale_down)
        .await
        .expect("update succeeds");

    assert_eq!(start.elapsed(), Duration::ZERO, "no backoff expected");
    assert_eq!(store.calls().update, 1);
    assert_eq!(updated.spec["replicas"], 1);
    assert_ne!(updated.version(), before.version());
}

#[tokio::test(start_paused = true)]
async fn succeeds_on_third_attempt_after_two_backoffs() {
    let contended = ContendedStore::new(seeded().await, 2);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);
    let start = Instant::now();

    let updated = ConflictRetry::new(&client, NAME)
        .policy(policy(3, 10, 2.0))
        .run(scale_down)
        .await
        .expect("third attempt commits");

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(30), "waited only {elapsed:?}");
    assert!(elapsed < Duration::from_millis(40), "waited {elapsed:?}, expected two backoffs");

    assert_eq!(contended.inner.calls().update, 3);
    assert_eq!(contended.inner.calls().get, 3);

    let committed = contended
        .inner
        .peek(&ResourceKind::DEPLOYMENT, NAMESPACE, NAME)
        .expect("still stored");
    assert_eq!(updated, committed);
    assert_eq!(updated.spec["image"], "nginx:1.19.2-alpine");
}

#[tokio::test(start_paused = true)]
async fn concurrent_changes_survive_the_retry() {
    let contended = ContendedStore::new(seeded().await, 2);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);

    let updated = ConflictRetry::new(&client, NAME)
        .policy(policy(5, 10, 1.0))
        .run(scale_down)
        .await
        .expect("update succeeds");

    assert_eq!(updated.metadata.annotations.get("writer-2").map(String::as_str), Some("was-here"));
    assert_eq!(updated.metadata.annotations.get("writer-1").map(String::as_str), Some("was-here"));
    assert_eq!(updated.spec["replicas"], 1);
}

#[tokio::test(start_paused = true)]
async fn every_attempt_submits_the_latest_fetched_token() {
    let contended = ContendedStore::new(seeded().await, 3);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);

    let _ = ConflictRetry::new(&client, NAME)
        .policy(policy(4, 10, 2.0))
        .run(scale_down)
        .await
        .expect("fourth attempt commits");

    let fetched = contended.fetched();
    let submitted = contended.submitted();

    assert_eq!(fetched.len(), 4);
    assert_eq!(submitted, fetched, "each update must carry the token of the preceding get");
    for later in &submitted[1..] {
        assert_ne!(later, &fetched[0], "a retry reused the first token");
    }
}

#[tokio::test(start_paused = true)]
async fn mutation_cannot_smuggle_a_token() {
    let contended = ContendedStore::new(seeded().await, 1);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);

    let updated = ConflictRetry::new(&client, NAME)
        .policy(policy(3, 10, 1.0))
        .run(|mut deployment| {
            deployment.metadata.resource_version = Some(ResourceVersion::new("stale"));
            deployment.metadata.name = "somebody-else".to_owned();
            scale_down(deployment)
        })
        .await
        .expect("executor pins identity and token");

    assert_eq!(updated.name(), NAME);
    assert_eq!(contended.submitted(), contended.fetched());
}

#[tokio::test(start_paused = true)]
async fn persistent_conflicts_exhaust_the_budget() {
    let contended = ContendedStore::new(seeded().await, usize::MAX);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);

    let err = ConflictRetry::new(&client, NAME)
        .policy(policy(4, 10, 2.0))
        .run(scale_down)
        .await
        .expect_err("store never accepts");

    match err {
        UpdateError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 4);
            assert!(last.is_conflict());
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }
    assert_eq!(contended.inner.calls().update, 4);
    assert_eq!(contended.inner.calls().get, 4);
}

#[tokio::test(start_paused = true)]
async fn single_attempt_policy_never_waits() {
    let contended = ContendedStore::new(seeded().await, 1);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);
    let start = Instant::now();

    let err = ConflictRetry::new(&client, NAME)
        .policy(policy(1, 10, 1.0))
        .run(scale_down)
        .await
        .expect_err("one conflicting attempt");

    assert_eq!(err.attempts(), Some(1));
    assert!(matches!(err, UpdateError::RetriesExhausted { .. }));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

async fn run_faulty(fault: Fault) -> (UpdateError, MemoryTransport, Duration) {
    let inner = seeded().await;
    let faulty = FaultyStore {
        inner: inner.clone(),
        fault,
    };
    let client = ResourceClient::namespaced(faulty, ResourceKind::DEPLOYMENT, NAMESPACE);
    let start = Instant::now();

    let err = ConflictRetry::new(&client, NAME)
        .policy(policy(5, 10, 2.0))
        .run(scale_down)
        .await
        .expect_err("fault must surface");

    (err, inner, start.elapsed())
}

#[tokio::test(start_paused = true)]
async fn fetch_failures_are_terminal() {
    let (err, inner, elapsed) = run_faulty(Fault::GetNotFound).await;
    assert!(matches!(err, UpdateError::Client(ref e) if e.is_not_found()), "got {err}");
    assert_eq!(inner.calls().update, 0);
    assert_eq!(elapsed, Duration::ZERO);

    let (err, inner, elapsed) = run_faulty(Fault::GetTransport).await;
    assert!(matches!(err, UpdateError::Client(ClientError::Transport(_))), "got {err}");
    assert_eq!(inner.calls().update, 0);
    assert_eq!(elapsed, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn non_conflict_write_failures_are_terminal() {
    let (err, inner, elapsed) = run_faulty(Fault::UpdateAuth).await;
    assert!(matches!(err, UpdateError::Client(ClientError::Auth(_))), "got {err}");
    assert_eq!(inner.calls().get, 1);
    assert_eq!(elapsed, Duration::ZERO);

    let (err, inner, _) = run_faulty(Fault::UpdateValidation).await;
    assert!(matches!(err, UpdateError::Client(ClientError::Validation(_))), "got {err}");
    assert_eq!(inner.calls().get, 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_backoff_stops_further_attempts() {
    let contended = ContendedStore::new(seeded().await, usize::MAX);
    let client =
        ResourceClient::namespaced(contended.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);
    let start = Instant::now();

    let err = ConflictRetry::new(&client, NAME)
        .policy(policy(5, 100, 1.0))
        .timeout(Duration::from_millis(50))
        .run(scale_down)
        .await
        .expect_err("deadline falls inside the first backoff");

    assert!(matches!(err, UpdateError::Timeout { attempts: 1 }), "got {err}");
    assert_eq!(contended.inner.calls().get, 1);
    assert_eq!(contended.inner.calls().update, 1);
    assert_eq!(start.elapsed(), Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn deadline_during_fetch_is_honoured() {
    let inner = seeded().await;
    let faulty = FaultyStore {
        inner: inner.clone(),
        fault: Fault::SlowGet,
    };
    let client = ResourceClient::namespaced(faulty, ResourceKind::DEPLOYMENT, NAMESPACE);

    let err = ConflictRetry::new(&client, NAME)
        .timeout(Duration::from_millis(100))
        .run(scale_down)
        .await
        .expect_err("fetch outlives the deadline");

    assert!(matches!(err, UpdateError::Timeout { attempts: 0 }), "got {err}");
    assert_eq!(inner.calls().update, 0);
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_makes_no_calls() {
    let store = seeded().await;
    let client = ResourceClient::namespaced(store.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);

    let err = ConflictRetry::new(&client, NAME)
        .deadline(Instant::now())
        .run(scale_down)
        .await
        .expect_err("deadline already passed");

    assert!(matches!(err, UpdateError::Timeout { attempts: 0 }));
    assert_eq!(store.calls().total(), 0);
}

#[tokio::test]
async fn helper_matches_builder() {
    let store = seeded().await;
    let client = ResourceClient::namespaced(store.clone(), ResourceKind::DEPLOYMENT, NAMESPACE);

    let updated = retry_on_conflict(&client, NAME, RetryPolicy::default(), scale_down)
        .await
        .expect("update succeeds");

    assert_eq!(updated.spec["replicas"], 1);
}
