//! In-process versioned store implementing [`Transport`].
//!
//! Behaves like the remote store as far as optimistic concurrency goes:
//! every successful write gets a fresh version token, an update is applied
//! only when its token matches the stored one, and a rejected write leaves
//! the stored object untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::{ClientError, ObjectRef};
use crate::resource::{ListParams, PropagationPolicy, Resource, ResourceKind, ResourceVersion};
use crate::selector::LabelSelector;
use crate::transport::Transport;

const CONFLICT_MESSAGE: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// Number of transport calls served, per operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub get: usize,
    pub list: usize,
    pub create: usize,
    pub update: usize,
    pub delete: usize,
}

impl CallCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.get + self.list + self.create + self.update + self.delete
    }
}

type Key = (String, String, String);

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<Key, Resource>,
    revision: u64,
    calls: CallCounts,
    deletions: Vec<(ObjectRef, PropagationPolicy)>,
}

impl Store {
    fn next_version(&mut self) -> ResourceVersion {
        self.revision += 1;
        ResourceVersion::new(self.revision.to_string())
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    inner: Arc<Mutex<Store>>,
}

fn key(kind: &ResourceKind, namespace: &str, name: &str) -> Key {
    let namespace = if kind.namespaced { namespace } else { "" };
    (kind.to_string(), namespace.to_owned(), name.to_owned())
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> CallCounts {
        self.inner.lock().calls
    }

    pub fn reset_calls(&self) {
        self.inner.lock().calls = CallCounts::default();
    }

    /// Every delete served so far, in order, with the policy it carried.
    #[must_use]
    pub fn deletions(&self) -> Vec<(ObjectRef, PropagationPolicy)> {
        self.inner.lock().deletions.clone()
    }

    /// Current stored copy, without counting as a transport call.
    #[must_use]
    pub fn peek(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Option<Resource> {
        self.inner
            .lock()
            .objects
            .get(&key(kind, namespace, name))
            .cloned()
    }

    /// Applies `change` as another writer would, advancing the version token.
    pub fn modify<F>(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        change: F,
    ) -> Result<Resource, ClientError>
    where
        F: FnOnce(&mut Resource),
    {
        let mut store = self.inner.lock();
        let version = store.next_version();

        let stored = store
            .objects
            .get_mut(&key(kind, namespace, name))
            .ok_or_else(|| ClientError::NotFound(ObjectRef::new(kind, namespace, name)))?;

        change(stored);
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Resource, ClientError> {
        let mut store = self.inner.lock();
        store.calls.get += 1;

        store
            .objects
            .get(&key(kind, namespace, name))
            .cloned()
            .ok_or_else(|| ClientError::NotFound(ObjectRef::new(kind, namespace, name)))
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Resource>, ClientError> {
        let selector = match &params.label_selector {
            Some(raw) => LabelSelector::parse(raw)?,
            None => LabelSelector::default(),
        };

        let mut store = self.inner.lock();
        store.calls.list += 1;

        let kind_key = kind.to_string();
        let limit = params
            .limit
            .and_then(|limit| usize::try_from(limit).ok())
            .unwrap_or(usize::MAX);

        Ok(store
            .objects
            .iter()
            .filter(|((k, ns, _), _)| {
                *k == kind_key && (namespace.is_empty() || !kind.namespaced || ns == namespace)
            })
            .map(|(_, resource)| resource)
            .filter(|resource| selector.matches(&resource.metadata.labels))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        let mut store = self.inner.lock();
        store.calls.create += 1;

        if resource.name().is_empty() {
            return Err(ClientError::Validation("metadata.name is required".to_owned()));
        }

        let key = key(kind, namespace, resource.name());
        if store.objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists(ObjectRef::new(
                kind,
                namespace,
                resource.name(),
            )));
        }

        let version = store.next_version();
        let mut created = resource.clone();
        created.api_version = kind.api_version();
        created.kind = kind.kind.to_owned();
        created.metadata.namespace = key.1.clone();
        created.metadata.uid = Some(format!("uid-{}", store.revision));
        created.metadata.resource_version = Some(version);

        let _ = store.objects.insert(key, created.clone());
        Ok(created)
    }

    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError> {
        let mut store = self.inner.lock();
        store.calls.update += 1;

        let object = ObjectRef::new(kind, namespace, resource.name());
        let Some(submitted) = resource.version().cloned() else {
            return Err(ClientError::Validation(
                "metadata.resourceVersion must be specified for an update".to_owned(),
            ));
        };

        let key = key(kind, namespace, resource.name());
        let current = store
            .objects
            .get(&key)
            .ok_or_else(|| ClientError::NotFound(object.clone()))?;

        if current.version() != Some(&submitted) {
            return Err(ClientError::Conflict {
                object,
                message: CONFLICT_MESSAGE.to_owned(),
            });
        }

        let mut updated = resource.clone();
        updated.api_version = kind.api_version();
        updated.kind = kind.kind.to_owned();
        updated.metadata.namespace.clone_from(&key.1);
        updated.metadata.uid.clone_from(&current.metadata.uid);
        updated.status = current.status.clone();
        updated.metadata.resource_version = Some(store.next_version());

        let _ = store.objects.insert(key, updated.clone());
        Ok(updated)
    }

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        policy: PropagationPolicy,
    ) -> Result<(), ClientError> {
        let mut store = self.inner.lock();
        store.calls.delete += 1;

        let object = ObjectRef::new(kind, namespace, name);
        if store.objects.remove(&key(kind, namespace, name)).is_none() {
            return Err(ClientError::NotFound(object));
        }

        store.deletions.push((object, policy));
        Ok(())
    }
}
