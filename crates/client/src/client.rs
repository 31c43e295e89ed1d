//! Resource client bound to one kind and one namespace scope
//!
//! Thin, typed surface over a [`Transport`]. Inputs are validated locally
//! before anything is sent; every transport failure is returned as-is.

use tracing::debug;

use crate::errors::ClientError;
use crate::resource::{ListParams, Namespace, PropagationPolicy, Resource, ResourceKind};
use crate::transport::Transport;

#[derive(Clone, Debug)]
pub struct ResourceClient<T> {
    transport: T,
    kind: ResourceKind,
    namespace: Namespace,
}

impl<T: Transport> ResourceClient<T> {
    pub fn namespaced(transport: T, kind: ResourceKind, namespace: impl Into<String>) -> Self {
        Self {
            transport,
            kind,
            namespace: Namespace::new(namespace),
        }
    }

    /// Client spanning every namespace; only [`list`](Self::list) is usable
    /// for namespaced kinds.
    pub const fn all(transport: T, kind: ResourceKind) -> Self {
        Self {
            transport,
            kind,
            namespace: Namespace::All,
        }
    }

    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Namespace to address a single object in.
    fn object_namespace(&self) -> Result<&str, ClientError> {
        if self.kind.namespaced && self.namespace.is_all() {
            return Err(ClientError::Validation(format!(
                "{} are namespaced; select a namespace to address a single object",
                self.kind
            )));
        }
        Ok(self.namespace.as_str())
    }

    fn check_target(&self, resource: &Resource) -> Result<&str, ClientError> {
        let namespace = self.object_namespace()?;

        if resource.name().is_empty() {
            return Err(ClientError::Validation("metadata.name is required".to_owned()));
        }

        if !resource.namespace().is_empty() && resource.namespace() != namespace {
            return Err(ClientError::Validation(format!(
                "object namespace `{}` does not match client namespace `{}`",
                resource.namespace(),
                namespace
            )));
        }

        Ok(namespace)
    }

    pub async fn create(&self, resource: &Resource) -> Result<Resource, ClientError> {
        let namespace = self.check_target(resource)?;
        debug!(kind = %self.kind, namespace, name = resource.name(), "creating resource");

        self.transport.create(&self.kind, namespace, resource).await
    }

    pub async fn get(&self, name: &str) -> Result<Resource, ClientError> {
        let namespace = self.object_namespace()?;
        if name.is_empty() {
            return Err(ClientError::Validation("name is required".to_owned()));
        }
        debug!(kind = %self.kind, namespace, name, "fetching resource");

        self.transport.get(&self.kind, namespace, name).await
    }

    /// Queries the store afresh on every call.
    pub async fn list(&self, params: &ListParams) -> Result<Vec<Resource>, ClientError> {
        debug!(
            kind = %self.kind,
            namespace = %self.namespace,
            selector = params.label_selector.as_deref(),
            "listing resources"
        );

        self.transport
            .list(&self.kind, self.namespace.as_str(), params)
            .await
    }

    /// Writes `resource` if its version token is still the stored one.
    pub async fn update(&self, resource: &Resource) -> Result<Resource, ClientError> {
        let namespace = self.check_target(resource)?;
        let Some(version) = resource.version() else {
            return Err(ClientError::Validation(
                "metadata.resourceVersion is required for an update".to_owned(),
            ));
        };
        debug!(
            kind = %self.kind,
            namespace,
            name = resource.name(),
            %version,
            "updating resource"
        );

        self.transport.update(&self.kind, namespace, resource).await
    }

    pub async fn delete(&self, name: &str, policy: PropagationPolicy) -> Result<(), ClientError> {
        let namespace = self.object_namespace()?;
        if name.is_empty() {
            return Err(ClientError::Validation("name is required".to_owned()));
        }
        debug!(kind = %self.kind, namespace, name, %policy, "deleting resource");

        self.transport
            .delete(&self.kind, namespace, name, policy)
            .await
    }
}
