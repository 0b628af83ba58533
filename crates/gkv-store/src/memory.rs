//! In-memory remote store for tests and local use.
//!
//! [`InMemoryRemote`] keeps objects and refs in maps behind `RwLock`s and
//! behaves like the hosted store gitkv talks to: ids are git ids, ref
//! updates are validated as a batch before any of them is applied, writes
//! and bulk queries need credentials, and public repositories are served
//! through edge caches. Knobs let tests take edge hosts down, corrupt the
//! ids the store reports, and impose a request budget.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use gkv_crypto::{blob_hash, commit_hash, tree_hash};
use gkv_types::{normalize_message, CommitObject, ObjectId, TreeEntry};
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::names::validate_ref_name;
use crate::traits::{EdgeFetcher, RemoteStore};
use crate::types::{
    EdgeResponse, KeyStateQuery, KeyStateSnapshot, RateLimitStatus, RefUpdate, RepositoryInfo,
    ValueRefState,
};

/// A stored git object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum StoredObject {
    Blob(Bytes),
    Tree(Vec<TreeEntry>),
    Commit(CommitObject),
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RemoteState {
    pub(crate) objects: HashMap<ObjectId, StoredObject>,
    pub(crate) refs: BTreeMap<String, ObjectId>,
}

impl RemoteState {
    fn commit(&self, id: &ObjectId) -> Option<&CommitObject> {
        match self.objects.get(id) {
            Some(StoredObject::Commit(commit)) => Some(commit),
            _ => None,
        }
    }

    fn blob(&self, id: &ObjectId) -> Option<&Bytes> {
        match self.objects.get(id) {
            Some(StoredObject::Blob(data)) => Some(data),
            _ => None,
        }
    }

    fn resolve_path(&self, commit: &ObjectId, path: &str) -> Option<ObjectId> {
        let commit = self.commit(commit)?;
        match self.objects.get(&commit.tree) {
            Some(StoredObject::Tree(entries)) => entries
                .iter()
                .find(|entry| entry.name == path)
                .map(|entry| entry.id),
            _ => None,
        }
    }

    fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> bool {
        let mut pending = vec![*descendant];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if id == *ancestor {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(commit) = self.commit(&id) {
                pending.extend(commit.parents.iter().copied());
            }
        }
        false
    }
}

/// An in-memory implementation of [`RemoteStore`] and [`EdgeFetcher`].
#[derive(Debug)]
pub struct InMemoryRemote {
    pub(crate) state: RwLock<RemoteState>,
    pub(crate) info: RepositoryInfo,
    public: AtomicBool,
    authenticated: AtomicBool,
    corrupt_ids: AtomicBool,
    edge_outages: RwLock<HashSet<String>>,
    budget: Mutex<Option<RateLimitStatus>>,
    api_calls: AtomicU64,
    edge_calls: AtomicU64,
}

impl InMemoryRemote {
    /// An empty, public repository accessed with credentials.
    pub fn new() -> Self {
        Self::with_info(RepositoryInfo {
            id: "R_inmemory".into(),
            is_public: true,
            created_at: Utc::now(),
        })
    }

    pub(crate) fn with_info(info: RepositoryInfo) -> Self {
        Self {
            public: AtomicBool::new(info.is_public),
            state: RwLock::new(RemoteState::default()),
            info,
            authenticated: AtomicBool::new(true),
            corrupt_ids: AtomicBool::new(false),
            edge_outages: RwLock::new(HashSet::new()),
            budget: Mutex::new(None),
            api_calls: AtomicU64::new(0),
            edge_calls: AtomicU64::new(0),
        }
    }

    pub fn set_public(&self, public: bool) {
        self.public.store(public, Ordering::SeqCst);
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Make the store report wrong ids for the objects it creates.
    pub fn set_corrupt_ids(&self, corrupt: bool) {
        self.corrupt_ids.store(corrupt, Ordering::SeqCst);
    }

    /// Take an edge host down (or bring it back).
    pub fn set_edge_outage(&self, host: &str, down: bool) {
        if let Ok(mut outages) = self.edge_outages.write() {
            if down {
                outages.insert(host.to_string());
            } else {
                outages.remove(host);
            }
        }
    }

    /// Allow `limit` API requests until `reset_at`, then a fresh hour.
    pub fn set_rate_limit(&self, limit: u32, reset_at: DateTime<Utc>) {
        if let Ok(mut budget) = self.budget.lock() {
            *budget = Some(RateLimitStatus {
                limit,
                remaining: limit,
                reset_at,
            });
        }
    }

    pub(crate) fn repository_is_public(&self) -> bool {
        self.public.load(Ordering::SeqCst)
    }

    /// Number of API requests received, edge requests excluded.
    pub fn api_calls(&self) -> u64 {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn edge_calls(&self) -> u64 {
        self.edge_calls.load(Ordering::SeqCst)
    }

    /// All refs below `prefix`, sorted by name.
    pub fn refs_with_prefix(&self, prefix: &str) -> RemoteResult<Vec<(String, ObjectId)>> {
        let state = self.read_state()?;
        Ok(state
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }

    pub fn object_count(&self) -> RemoteResult<usize> {
        Ok(self.read_state()?.objects.len())
    }

    pub(crate) fn read_state(&self) -> RemoteResult<std::sync::RwLockReadGuard<'_, RemoteState>> {
        self.state
            .read()
            .map_err(|e| RemoteError::Transport(format!("lock poisoned: {e}")))
    }

    fn write_state(&self) -> RemoteResult<std::sync::RwLockWriteGuard<'_, RemoteState>> {
        self.state
            .write()
            .map_err(|e| RemoteError::Transport(format!("lock poisoned: {e}")))
    }

    /// Count an API request against the budget.
    fn charge(&self) -> RemoteResult<()> {
        self.api_calls.fetch_add(1, Ordering::SeqCst);
        let mut budget = self
            .budget
            .lock()
            .map_err(|e| RemoteError::Transport(format!("lock poisoned: {e}")))?;
        if let Some(status) = budget.as_mut() {
            let now = Utc::now();
            if now >= status.reset_at {
                status.remaining = status.limit;
                status.reset_at = now + Duration::hours(1);
            }
            if status.remaining == 0 {
                return Err(RemoteError::RateLimited {
                    reset_at: status.reset_at,
                });
            }
            status.remaining -= 1;
        }
        Ok(())
    }

    fn require_auth(&self, operation: &str) -> RemoteResult<()> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unauthenticated(operation.to_string()))
        }
    }

    fn reported(&self, id: ObjectId) -> ObjectId {
        if !self.corrupt_ids.load(Ordering::SeqCst) {
            return id;
        }
        let mut bytes = *id.as_bytes();
        bytes[0] ^= 0xff;
        ObjectId::from_hash(bytes)
    }

    fn check_update(state: &RemoteState, update: &RefUpdate) -> RemoteResult<()> {
        validate_ref_name(&update.name)?;
        let reject = |reason: String| RemoteError::RefUpdateRejected {
            name: update.name.clone(),
            reason,
        };
        let current = state.refs.get(&update.name);
        if !update.before.matches(current) {
            return Err(reject(format!(
                "expected {:?}, found {}",
                update.before,
                current.map_or_else(|| "nothing".to_string(), |id| id.to_hex())
            )));
        }
        if let Some(after) = &update.after {
            if state.commit(after).is_none() {
                return Err(RemoteError::MissingObject(*after));
            }
            if let Some(current) = current {
                if !update.force && current != after && !state.is_ancestor(current, after) {
                    return Err(reject("not a fast-forward".into()));
                }
            }
        }
        Ok(())
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn repository_info(&self) -> RemoteResult<RepositoryInfo> {
        self.charge()?;
        let mut info = self.info.clone();
        info.is_public = self.repository_is_public();
        Ok(info)
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn has_commit(&self, id: &ObjectId) -> RemoteResult<bool> {
        self.charge()?;
        Ok(self.read_state()?.commit(id).is_some())
    }

    async fn has_ref(&self, name: &str) -> RemoteResult<bool> {
        self.charge()?;
        Ok(self.read_state()?.refs.contains_key(name))
    }

    async fn read_ref(&self, name: &str) -> RemoteResult<Option<ObjectId>> {
        self.charge()?;
        Ok(self.read_state()?.refs.get(name).copied())
    }

    async fn create_blob(&self, data: Bytes) -> RemoteResult<ObjectId> {
        self.require_auth("create blob")?;
        self.charge()?;
        let id = blob_hash(&data);
        self.write_state()?
            .objects
            .insert(id, StoredObject::Blob(data));
        Ok(self.reported(id))
    }

    async fn create_tree(&self, entries: Vec<TreeEntry>) -> RemoteResult<ObjectId> {
        self.require_auth("create tree")?;
        self.charge()?;
        let id = tree_hash(&entries).map_err(|e| RemoteError::InvalidObject(e.to_string()))?;
        let mut state = self.write_state()?;
        if let Some(missing) = entries
            .iter()
            .find(|entry| !state.objects.contains_key(&entry.id))
        {
            return Err(RemoteError::MissingObject(missing.id));
        }
        state.objects.insert(id, StoredObject::Tree(entries));
        Ok(self.reported(id))
    }

    async fn create_commit(&self, mut commit: CommitObject) -> RemoteResult<ObjectId> {
        self.require_auth("create commit")?;
        self.charge()?;
        commit.message = normalize_message(commit.message);
        let mut state = self.write_state()?;
        if !matches!(state.objects.get(&commit.tree), Some(StoredObject::Tree(_))) {
            return Err(RemoteError::MissingObject(commit.tree));
        }
        if let Some(parent) = commit.parents.iter().find(|p| state.commit(p).is_none()) {
            return Err(RemoteError::MissingObject(*parent));
        }
        let id = commit_hash(&commit);
        state.objects.insert(id, StoredObject::Commit(commit));
        Ok(self.reported(id))
    }

    async fn update_refs(&self, updates: Vec<RefUpdate>) -> RemoteResult<()> {
        self.require_auth("update refs")?;
        self.charge()?;
        let mut state = self.write_state()?;

        let mut names = HashSet::with_capacity(updates.len());
        for update in &updates {
            if !names.insert(update.name.as_str()) {
                return Err(RemoteError::RefUpdateRejected {
                    name: update.name.clone(),
                    reason: "ref appears twice in one update".into(),
                });
            }
            Self::check_update(&state, update)?;
        }

        for update in updates {
            match update.after {
                Some(after) => {
                    state.refs.insert(update.name, after);
                }
                None => {
                    state.refs.remove(&update.name);
                }
            }
        }
        Ok(())
    }

    async fn resolve_path(&self, commit: &ObjectId, path: &str) -> RemoteResult<Option<ObjectId>> {
        self.charge()?;
        Ok(self.read_state()?.resolve_path(commit, path))
    }

    async fn read_blob(&self, id: &ObjectId) -> RemoteResult<Option<Bytes>> {
        self.charge()?;
        Ok(self.read_state()?.blob(id).cloned())
    }

    async fn read_commit_message(&self, commit: &ObjectId) -> RemoteResult<Option<String>> {
        self.charge()?;
        Ok(self
            .read_state()?
            .commit(commit)
            .map(|commit| commit.message.clone()))
    }

    async fn list_refs_pointing_at(&self, commit: &ObjectId) -> RemoteResult<Vec<String>> {
        self.charge()?;
        let state = self.read_state()?;
        Ok(state
            .refs
            .iter()
            .filter(|(name, target)| name.starts_with("refs/heads/") && *target == commit)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn query_key_state(&self, query: KeyStateQuery) -> RemoteResult<KeyStateSnapshot> {
        self.require_auth("bulk query")?;
        self.charge()?;
        let state = self.read_state()?;

        let value = state.refs.get(&query.bytes_ref).and_then(|commit| {
            state.commit(commit).map(|object| ValueRefState {
                commit: *commit,
                message: object.message.clone(),
                blob: state.resolve_path(commit, &query.path),
            })
        });
        let value_type = state.refs.get(&query.type_ref).copied();
        let expiry_text = state
            .refs
            .get(&query.expiry_ref)
            .and_then(|commit| state.resolve_path(commit, &query.path))
            .and_then(|blob| state.blob(&blob).cloned())
            .and_then(|data| String::from_utf8(data.to_vec()).ok());

        Ok(KeyStateSnapshot {
            value,
            value_type,
            expiry_text,
        })
    }

    fn rate_limit(&self) -> Option<RateLimitStatus> {
        self.budget.lock().ok().and_then(|budget| *budget)
    }
}

#[async_trait]
impl EdgeFetcher for InMemoryRemote {
    async fn get(&self, url: &str) -> EdgeResponse {
        self.edge_calls.fetch_add(1, Ordering::SeqCst);

        let Some(location) = url.split_once("://").map(|(_, rest)| rest) else {
            return EdgeResponse::Unavailable(format!("malformed url: {url}"));
        };
        let host = location.split('/').next().unwrap_or_default();
        let down = self
            .edge_outages
            .read()
            .map(|outages| outages.contains(host))
            .unwrap_or(true);
        if down {
            debug!(host, "edge host unavailable");
            return EdgeResponse::Unavailable(format!("{host} is unavailable"));
        }
        if !self.public.load(Ordering::SeqCst) {
            return EdgeResponse::NotFound;
        }

        // .../<owner>/<repo>@<commit>/<path> or .../<owner>/<repo>/<commit>/<path>
        let mut segments = location.rsplit('/');
        let path = segments.next().unwrap_or_default();
        let commit = segments
            .next()
            .and_then(|segment| segment.rsplit('@').next())
            .and_then(|hex| ObjectId::from_hex(hex).ok());
        let Some(commit) = commit else {
            return EdgeResponse::Unavailable(format!("malformed url: {url}"));
        };

        let Ok(state) = self.state.read() else {
            return EdgeResponse::Unavailable("lock poisoned".into());
        };
        match state
            .resolve_path(&commit, path)
            .and_then(|blob| state.blob(&blob).cloned())
        {
            Some(data) => EdgeResponse::Found(data),
            None => EdgeResponse::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Expect;
    use gkv_types::Signature;

    async fn commit_text(remote: &InMemoryRemote, text: &str) -> ObjectId {
        let blob = remote.create_blob(Bytes::from(text.to_string())).await.unwrap();
        let tree = remote
            .create_tree(vec![TreeEntry::file("bytes", blob), TreeEntry::file("view.txt", blob)])
            .await
            .unwrap();
        remote
            .create_commit(CommitObject::root(tree, Signature::fixed(), ""))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn created_objects_have_git_ids() {
        let remote = InMemoryRemote::new();
        let id = remote.create_blob(Bytes::new()).await.unwrap();
        assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
        let tree = remote.create_tree(vec![]).await.unwrap();
        assert_eq!(tree.to_hex(), "4b825dc642cb6eb9a060e54bf8d69288fbee4904");
    }

    #[tokio::test]
    async fn tree_requires_existing_blobs() {
        let remote = InMemoryRemote::new();
        let missing = blob_hash(b"never stored");
        let err = remote
            .create_tree(vec![TreeEntry::file("bytes", missing)])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::MissingObject(id) if id == missing));
    }

    #[tokio::test]
    async fn resolve_and_read() {
        let remote = InMemoryRemote::new();
        let commit = commit_text(&remote, "42").await;
        assert!(remote.has_commit(&commit).await.unwrap());
        let blob = remote.resolve_path(&commit, "view.txt").await.unwrap().unwrap();
        assert_eq!(remote.read_blob(&blob).await.unwrap().unwrap(), Bytes::from("42"));
        assert_eq!(remote.resolve_path(&commit, "nope").await.unwrap(), None);
        assert_eq!(remote.read_commit_message(&commit).await.unwrap().as_deref(), Some(""));
    }

    #[tokio::test]
    async fn update_refs_is_all_or_nothing() {
        let remote = InMemoryRemote::new();
        let a = commit_text(&remote, "a").await;
        let b = commit_text(&remote, "b").await;
        remote
            .update_refs(vec![RefUpdate::set("refs/heads/one", Some(a))])
            .await
            .unwrap();

        let err = remote
            .update_refs(vec![
                RefUpdate::set("refs/heads/two", Some(b)),
                RefUpdate::set("refs/heads/one", Some(b)).expecting(Expect::Absent),
            ])
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(remote.read_ref("refs/heads/two").await.unwrap(), None);
        assert_eq!(remote.read_ref("refs/heads/one").await.unwrap(), Some(a));

        remote
            .update_refs(vec![
                RefUpdate::set("refs/heads/one", Some(b)).expecting(Expect::Exactly(a)),
                RefUpdate::set("refs/heads/two", Some(b)),
            ])
            .await
            .unwrap();
        assert_eq!(remote.read_ref("refs/heads/one").await.unwrap(), Some(b));

        remote
            .update_refs(vec![RefUpdate::set("refs/heads/one", None)])
            .await
            .unwrap();
        assert!(!remote.has_ref("refs/heads/one").await.unwrap());
    }

    #[tokio::test]
    async fn update_rejects_missing_targets_and_bad_names() {
        let remote = InMemoryRemote::new();
        let ghost = ObjectId::from_hash([9; 20]);
        let err = remote
            .update_refs(vec![RefUpdate::set("refs/heads/x", Some(ghost))])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::MissingObject(_)));

        let a = commit_text(&remote, "a").await;
        let err = remote
            .update_refs(vec![RefUpdate::set("heads/x", Some(a))])
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::InvalidRefName { .. }));
    }

    #[tokio::test]
    async fn unforced_updates_must_fast_forward() {
        let remote = InMemoryRemote::new();
        let a = commit_text(&remote, "a").await;
        let b = commit_text(&remote, "b").await;
        remote
            .update_refs(vec![RefUpdate::set("refs/heads/x", Some(a))])
            .await
            .unwrap();
        let mut update = RefUpdate::set("refs/heads/x", Some(b));
        update.force = false;
        let err = remote.update_refs(vec![update]).await.unwrap_err();
        assert!(matches!(err, RemoteError::RefUpdateRejected { .. }));

        let tree = remote.create_tree(vec![]).await.unwrap();
        let mut child = CommitObject::root(tree, Signature::fixed(), "");
        child.parents.push(a);
        let child = remote.create_commit(child).await.unwrap();
        let mut update = RefUpdate::set("refs/heads/x", Some(child));
        update.force = false;
        remote.update_refs(vec![update]).await.unwrap();
    }

    #[tokio::test]
    async fn writes_and_bulk_queries_need_credentials() {
        let remote = InMemoryRemote::new();
        remote.set_authenticated(false);
        assert!(matches!(
            remote.create_blob(Bytes::new()).await,
            Err(RemoteError::Unauthenticated(_))
        ));
        let query = KeyStateQuery {
            bytes_ref: "refs/heads/a".into(),
            type_ref: "refs/heads/b".into(),
            expiry_ref: "refs/heads/c".into(),
            path: "bytes".into(),
        };
        assert!(matches!(
            remote.query_key_state(query).await,
            Err(RemoteError::Unauthenticated(_))
        ));
        assert_eq!(remote.read_ref("refs/heads/a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn bulk_query_reads_all_three_refs() {
        let remote = InMemoryRemote::new();
        let value = commit_text(&remote, "hello").await;
        let expiry = commit_text(&remote, "17").await;
        remote
            .update_refs(vec![
                RefUpdate::set("refs/heads/k/value/bytes", Some(value)),
                RefUpdate::set("refs/heads/k/expiry", Some(expiry)),
            ])
            .await
            .unwrap();
        let snapshot = remote
            .query_key_state(KeyStateQuery {
                bytes_ref: "refs/heads/k/value/bytes".into(),
                type_ref: "refs/heads/k/value/type".into(),
                expiry_ref: "refs/heads/k/expiry".into(),
                path: "bytes".into(),
            })
            .await
            .unwrap();
        let state = snapshot.value.unwrap();
        assert_eq!(state.commit, value);
        assert_eq!(state.blob, Some(blob_hash(b"hello")));
        assert_eq!(snapshot.value_type, None);
        assert_eq!(snapshot.expiry_text.as_deref(), Some("17"));
    }

    #[tokio::test]
    async fn lists_branches_at_commit() {
        let remote = InMemoryRemote::new();
        let a = commit_text(&remote, "a").await;
        remote
            .update_refs(vec![
                RefUpdate::set("refs/heads/kv/x/expiry", Some(a)),
                RefUpdate::set("refs/heads/kv/y/expiry", Some(a)),
                RefUpdate::set("refs/tags/kv/x", Some(a)),
            ])
            .await
            .unwrap();
        assert_eq!(
            remote.list_refs_pointing_at(&a).await.unwrap(),
            vec!["refs/heads/kv/x/expiry", "refs/heads/kv/y/expiry"]
        );
    }

    #[tokio::test]
    async fn corrupted_ids_differ_from_git_ids() {
        let remote = InMemoryRemote::new();
        remote.set_corrupt_ids(true);
        let id = remote.create_blob(Bytes::from_static(b"x")).await.unwrap();
        assert_ne!(id, blob_hash(b"x"));
    }

    #[tokio::test]
    async fn budget_exhaustion_is_rate_limited() {
        let remote = InMemoryRemote::new();
        remote.set_rate_limit(2, Utc::now() + Duration::hours(1));
        remote.has_ref("refs/heads/a").await.unwrap();
        remote.has_ref("refs/heads/a").await.unwrap();
        assert!(matches!(
            remote.has_ref("refs/heads/a").await,
            Err(RemoteError::RateLimited { .. })
        ));
        assert_eq!(remote.rate_limit().unwrap().remaining, 0);
    }

    #[tokio::test]
    async fn edge_serves_public_content() {
        let remote = InMemoryRemote::new();
        let commit = commit_text(&remote, "cdn").await;
        let url = format!("https://cdn.jsdelivr.net/gh/o/r@{commit}/view.txt");
        assert_eq!(remote.get(&url).await, EdgeResponse::Found(Bytes::from("cdn")));

        let other = format!("https://cdn.statically.io/gh/o/r/{commit}/missing");
        assert_eq!(remote.get(&other).await, EdgeResponse::NotFound);

        remote.set_edge_outage("cdn.jsdelivr.net", true);
        assert!(matches!(remote.get(&url).await, EdgeResponse::Unavailable(_)));

        remote.set_edge_outage("cdn.jsdelivr.net", false);
        remote.set_public(false);
        assert_eq!(remote.get(&url).await, EdgeResponse::NotFound);
        assert!(remote.api_calls() > 0);
        assert_eq!(remote.edge_calls(), 4);
    }
}
