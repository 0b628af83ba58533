use async_trait::async_trait;
use bytes::Bytes;
use gkv_types::{CommitObject, ObjectId, TreeEntry};

use crate::error::RemoteResult;
use crate::types::{EdgeResponse, KeyStateQuery, KeyStateSnapshot, RateLimitStatus, RefUpdate, RepositoryInfo};

/// A remote git-style repository.
///
/// Ref names passed in are fully qualified. Reads answer `None` (or
/// `false`) for things that do not exist; errors mean the request itself
/// failed.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn repository_info(&self) -> RemoteResult<RepositoryInfo>;

    /// Whether requests carry credentials. Writes and bulk queries need them.
    fn is_authenticated(&self) -> bool;

    async fn has_commit(&self, id: &ObjectId) -> RemoteResult<bool>;

    async fn has_ref(&self, name: &str) -> RemoteResult<bool>;

    async fn read_ref(&self, name: &str) -> RemoteResult<Option<ObjectId>>;

    /// Store a blob and return the id the store assigned to it.
    async fn create_blob(&self, data: Bytes) -> RemoteResult<ObjectId>;

    async fn create_tree(&self, entries: Vec<TreeEntry>) -> RemoteResult<ObjectId>;

    async fn create_commit(&self, commit: CommitObject) -> RemoteResult<ObjectId>;

    /// Apply every update or none of them.
    async fn update_refs(&self, updates: Vec<RefUpdate>) -> RemoteResult<()>;

    /// Blob id at `path` in the commit's tree.
    async fn resolve_path(&self, commit: &ObjectId, path: &str) -> RemoteResult<Option<ObjectId>>;

    async fn read_blob(&self, id: &ObjectId) -> RemoteResult<Option<Bytes>>;

    async fn read_commit_message(&self, commit: &ObjectId) -> RemoteResult<Option<String>>;

    /// Fully qualified names of the branches whose head is `commit`.
    async fn list_refs_pointing_at(&self, commit: &ObjectId) -> RemoteResult<Vec<String>>;

    /// Read a key's value, type, and expiry refs in one request.
    async fn query_key_state(&self, query: KeyStateQuery) -> RemoteResult<KeyStateSnapshot>;

    /// The budget reported with the most recent response, if the store
    /// reports one.
    fn rate_limit(&self) -> Option<RateLimitStatus> {
        None
    }
}

/// Plain GETs against edge caches that mirror public repositories.
#[async_trait]
pub trait EdgeFetcher: Send + Sync {
    async fn get(&self, url: &str) -> EdgeResponse;
}
