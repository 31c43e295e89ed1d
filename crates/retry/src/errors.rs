use keel_client::ClientError;
use thiserror::Error;

/// Terminal failure of a conflict-retried update.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UpdateError {
    /// A non-retryable failure from `get` or `update`, unchanged.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Every attempt allowed by the policy was rejected as stale.
    #[error("update still conflicting after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: ClientError,
    },

    #[error("deadline exceeded after {attempts} attempts")]
    Timeout { attempts: u32 },
}

impl UpdateError {
    /// Number of update attempts made before giving up, when known.
    #[must_use]
    pub const fn attempts(&self) -> Option<u32> {
        match self {
            Self::Client(_) => None,
            Self::RetriesExhausted { attempts, .. } | Self::Timeout { attempts } => Some(*attempts),
        }
    }
}
