//! Connection descriptors for a cluster control plane.
//!
//! A [`ConnectionConfig`] is assembled from explicit caller-supplied values:
//! an API server endpoint, the names of the cluster, context and identity, a
//! bearer credential and a TLS policy. Nothing is read from disk and nothing
//! touches the network; the resulting value is immutable and is handed to a
//! transport by reference.
//!
//! The descriptor mirrors the shape of a kubeconfig with exactly one cluster,
//! one identity and one context binding the two, so the context can never
//! reference a cluster or identity that does not exist.

use core::fmt;

use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use thiserror::Error;
use url::Url;


pub const DEFAULT_CLUSTER_NAME: &str = "sgx1";
pub const DEFAULT_CONTEXT_NAME: &str = "sgx1";
pub const DEFAULT_IDENTITY_NAME: &str = "xml";

/// Reasons a connection descriptor could not be built.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("API server endpoint must not be empty")]
    MissingEndpoint,

    #[error("bearer credential must not be empty")]
    MissingCredential,

    #[error("invalid API server endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("unsupported endpoint scheme `{0}`, expected `http` or `https`")]
    UnsupportedScheme(String),

    #[error("{field} name must not be empty")]
    EmptyName { field: &'static str },
}

/// Whether the transport verifies the API server's certificate chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TlsVerification {
    Verify,
    SkipVerify,
}

impl TlsVerification {
    #[must_use]
    pub const fn from_skip_flag(skip: bool) -> Self {
        if skip {
            Self::SkipVerify
        } else {
            Self::Verify
        }
    }

    #[must_use]
    pub const fn is_skipped(self) -> bool {
        matches!(self, Self::SkipVerify)
    }
}

/// Bearer credential presented on every request.
///
/// The value is redacted in `Debug` output and never serialized.
#[derive(Clone)]
pub struct BearerToken(Secret<String>);

impl BearerToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token.into()))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

impl PartialEq for BearerToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for BearerToken {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Cluster {
    pub name: String,
    pub server: Url,
    pub tls: TlsVerification,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    #[serde(skip)]
    pub token: BearerToken,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Context {
    pub name: String,
    pub cluster: String,
    pub identity: String,
}

/// Immutable, fully resolved connection descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionConfig {
    cluster: Cluster,
    identity: Identity,
    context: Context,
}

impl ConnectionConfig {
    /// Builds a descriptor from discrete inputs.
    ///
    /// Identical inputs always produce an identical descriptor.
    pub fn build(
        endpoint: &str,
        cluster_name: &str,
        context_name: &str,
        identity_name: &str,
        credential: &str,
        skip_tls_verify: bool,
    ) -> Result<Self, ConfigError> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        if credential.trim().is_empty() {
            return Err(ConfigError::MissingCredential);
        }

        let server = Url::parse(endpoint)?;
        match server.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_owned())),
        }

        let cluster_name = non_empty("cluster", cluster_name)?;
        let context_name = non_empty("context", context_name)?;
        let identity_name = non_empty("identity", identity_name)?;

        Ok(Self {
            cluster: Cluster {
                name: cluster_name.clone(),
                server,
                tls: TlsVerification::from_skip_flag(skip_tls_verify),
            },
            identity: Identity {
                name: identity_name.clone(),
                token: BearerToken::new(credential),
            },
            context: Context {
                name: context_name,
                cluster: cluster_name,
                identity: identity_name,
            },
        })
    }

    #[must_use]
    pub fn builder(endpoint: impl Into<String>, credential: impl Into<String>) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(endpoint, credential)
    }

    #[must_use]
    pub const fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub const fn current_context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub const fn server(&self) -> &Url {
        &self.cluster.server
    }

    #[must_use]
    pub const fn token(&self) -> &BearerToken {
        &self.identity.token
    }

    #[must_use]
    pub const fn tls(&self) -> TlsVerification {
        self.cluster.tls
    }

    /// Looks up the cluster a named context points at.
    #[must_use]
    pub fn cluster_for(&self, context: &str) -> Option<&Cluster> {
        (context == self.context.name && self.context.cluster == self.cluster.name)
            .then_some(&self.cluster)
    }

    /// Looks up the identity a named context authenticates as.
    #[must_use]
    pub fn identity_for(&self, context: &str) -> Option<&Identity> {
        (context == self.context.name && self.context.identity == self.identity.name)
            .then_some(&self.identity)
    }
}

fn non_empty(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::EmptyName { field });
    }
    Ok(value.to_owned())
}

/// Incremental construction of a [`ConnectionConfig`].
///
/// Names default to the values the demos have always used and TLS
/// verification is skipped unless [`verify_tls`](Self::verify_tls) is set.
#[derive(Clone, Debug)]
pub struct ConnectionConfigBuilder {
    endpoint: String,
    credential: BearerToken,
    cluster_name: String,
    context_name: String,
    identity_name: String,
    skip_tls_verify: bool,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: BearerToken::new(credential),
            cluster_name: DEFAULT_CLUSTER_NAME.to_owned(),
            context_name: DEFAULT_CONTEXT_NAME.to_owned(),
            identity_name: DEFAULT_IDENTITY_NAME.to_owned(),
            skip_tls_verify: true,
        }
    }

    #[must_use]
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = name.into();
        self
    }

    #[must_use]
    pub fn context_name(mut self, name: impl Into<String>) -> Self {
        self.context_name = name.into();
        self
    }

    #[must_use]
    pub fn identity_name(mut self, name: impl Into<String>) -> Self {
        self.identity_name = name.into();
        self
    }

    #[must_use]
    pub const fn verify_tls(mut self, verify: bool) -> Self {
        self.skip_tls_verify = !verify;
        self
    }

    pub fn build(&self) -> Result<ConnectionConfig, ConfigError> {
        ConnectionConfig::build(
            &self.endpoint,
            &self.cluster_name,
            &self.context_name,
            &self.identity_name,
            self.credential.expose(),
            self.skip_tls_verify,
        )
    }
}
