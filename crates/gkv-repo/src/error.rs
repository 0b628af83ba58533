use chrono::{DateTime, Utc};
use gkv_crypto::{CipherError, HashError};
use gkv_store::RemoteError;
use gkv_types::{ObjectId, ObjectKind};

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// The store reported a different id than the one computed locally.
    #[error("integrity fault: remote {kind} id {remote} does not match local {local}")]
    IntegrityFault {
        kind: ObjectKind,
        local: ObjectId,
        remote: ObjectId,
    },

    /// An atomic ref update was refused.
    #[error("transaction rejected: {source}")]
    TransactionConflict {
        #[source]
        source: RemoteError,
    },

    /// The request budget is exhausted.
    #[error("rate limited until {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;
