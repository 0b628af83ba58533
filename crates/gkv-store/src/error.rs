use chrono::{DateTime, Utc};
use gkv_types::ObjectId;

/// Errors reported by a remote store.
///
/// Absence is never an error: reads return `Option`. Everything here is a
/// rejected request or a failed transport.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// A ref update was refused; no ref in the batch was changed.
    #[error("ref update rejected for {name}: {reason}")]
    RefUpdateRejected { name: String, reason: String },

    /// An object referenced by a new tree, commit, or ref does not exist.
    #[error("object not found in remote: {0}")]
    MissingObject(ObjectId),

    /// The request needs credentials the client does not have.
    #[error("authentication required: {0}")]
    Unauthenticated(String),

    /// The request budget is exhausted until `reset_at`.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// The store refused a malformed object.
    #[error("invalid object: {0}")]
    InvalidObject(String),

    #[error("invalid ref name {name:?}: {reason}")]
    InvalidRefName { name: String, reason: String },

    /// Network, protocol, or server failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether the error is a refusal of a ref update, as opposed to a
    /// failure to reach the store.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::RefUpdateRejected { .. } | Self::MissingObject(_)
        )
    }
}

/// Result alias for remote store operations.
pub type RemoteResult<T> = Result<T, RemoteError>;
