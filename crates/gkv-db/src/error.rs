use gkv_codec::CodecError;
use gkv_expiry::ExpiryError;
use gkv_repo::RepoError;
use gkv_types::{ObjectId, TypeTag};

/// Errors from database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The value cannot be encoded, or stored bytes cannot be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The atomic update was rejected for a reason the diagnostics could not
    /// pin down, typically a concurrent writer.
    #[error("transaction conflict: {source}")]
    TransactionConflict {
        #[source]
        source: RepoError,
    },

    /// The type registry refs are missing from the repository.
    #[error("database not initialized; run init first")]
    NotInitialized,

    #[error("key exists: {uuid}")]
    KeyExists { uuid: String },

    #[error("nothing to overwrite: {uuid}")]
    NothingToOverwrite { uuid: String },

    #[error("nothing to expire: {uuid}")]
    NothingToExpire { uuid: String },

    /// The update modifier failed; nothing was published.
    #[error("modifier failed: {source}")]
    ModifierFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("an expected old value requires overwrite to be allowed")]
    OldValueWithoutOverwrite,

    #[error("invalid key uuid {0:?}")]
    InvalidUuid(String),

    /// The type ref points at a commit that is not a registered type.
    #[error("unknown type commit {0}")]
    UnknownType(ObjectId),

    #[error("expiry error: {0}")]
    Expiry(#[from] ExpiryError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
}

impl DbError {
    /// Whether the store reported an object id different from ours.
    pub fn is_integrity_fault(&self) -> bool {
        matches!(self, Self::Repo(RepoError::IntegrityFault { .. }))
    }
}

/// Failures of the built-in update modifiers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModifierError {
    #[error("expected a {expected} value, found {found}")]
    TypeMismatch {
        expected: TypeTag,
        found: &'static str,
    },
}

/// Errors building the type registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("type registry is not bijective: {tag} and commit {commit} collide")]
    NotBijective { tag: TypeTag, commit: ObjectId },
}

/// Result alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
