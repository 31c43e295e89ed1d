use core::fmt;

use thiserror::Error;

use crate::resource::ResourceKind;

/// Identifies the object an operation targeted, for error reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    #[must_use]
    pub fn new(kind: &ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{} {}", self.kind, self.name)
        } else {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Failures surfaced by a [`Transport`](crate::Transport) or a
/// [`ResourceClient`](crate::ResourceClient).
///
/// Exactly one variant describes each failed operation. None of them are
/// retried at this layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Malformed or missing caller input.
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(ObjectRef),

    #[error("{0} already exists")]
    AlreadyExists(ObjectRef),

    /// The submitted version token no longer matches the stored one.
    #[error("conflict writing {object}: {message}")]
    Conflict { object: ObjectRef, message: String },

    /// The identity or credential was rejected.
    #[error("not authorized: {0}")]
    Auth(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ClientError {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("malformed response body: {err}"))
    }
}
