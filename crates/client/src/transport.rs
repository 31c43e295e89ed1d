use async_trait::async_trait;

use crate::errors::ClientError;
use crate::resource::{ListParams, PropagationPolicy, Resource, ResourceKind};

/// Remote resource API consumed by [`ResourceClient`](crate::ResourceClient).
///
/// Implementations perform one request per call and report failures through
/// the [`ClientError`] taxonomy. They must not retry. An empty `namespace`
/// addresses cluster-scoped kinds, or every namespace when listing.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Resource, ClientError>;

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Resource>, ClientError>;

    /// Stores a new object; the store assigns its initial version token.
    async fn create(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError>;

    /// Replaces an object if, and only if, its version token is current.
    async fn update(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        resource: &Resource,
    ) -> Result<Resource, ClientError>;

    async fn delete(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        policy: PropagationPolicy,
    ) -> Result<(), ClientError>;
}
