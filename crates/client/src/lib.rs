//! Keel resource client
//!
//! Typed create/read/update/delete access to versioned resources held by a
//! cluster control plane. Every read carries the store's opaque
//! [`ResourceVersion`]; updates submit it back and are rejected with
//! [`ClientError::Conflict`] when another writer got there first.
//!
//! ## Layers
//!
//! - [`Transport`]: the seam to the remote store. [`HttpTransport`] speaks the
//!   Kubernetes REST API; `MemoryTransport` (feature `testing`) is an
//!   in-process versioned store for tests.
//! - [`ResourceClient`]: one resource kind inside one namespace scope. It
//!   surfaces every transport error verbatim and never retries.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keel_client::{HttpTransport, ListParams, ResourceClient, ResourceKind};
//! use keel_config::ConnectionConfig;
//!
//! let config = ConnectionConfig::builder("https://10.0.0.1:6443", token).build()?;
//! let transport = HttpTransport::new(&config)?;
//! let deployments = ResourceClient::namespaced(transport, ResourceKind::DEPLOYMENT, "default");
//!
//! for deployment in deployments.list(&ListParams::default()).await? {
//!     println!("{}", deployment.name());
//! }
//! ```

pub mod client;
pub mod connection;
pub mod errors;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod resource;
pub mod selector;
pub mod transport;


pub use client::ResourceClient;
pub use connection::HttpTransport;
pub use errors::{ClientError, ObjectRef};
#[cfg(any(test, feature = "testing"))]
pub use memory::{CallCounts, MemoryTransport};
pub use resource::{
    ListParams, Namespace, ObjectMeta, PropagationPolicy, Resource, ResourceKind, ResourceVersion,
    DEFAULT_NAMESPACE,
};
pub use selector::LabelSelector;
pub use transport::Transport;
