use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use gkv_cache::{ContentCache, MessageCache};
use gkv_crypto::{blob_hash, commit_hash, tree_hash, Cipher};
use gkv_store::{
    qualify_ref_name, EdgeFetcher, EdgeResponse, KeyStateQuery, RateLimitStatus, RefUpdate,
    RemoteError, RemoteResult, RemoteStore, RepositoryInfo,
};
use gkv_types::{CommitObject, ObjectId, ObjectKind, Signature, TreeEntry};
use tracing::{debug, warn};

use crate::config::RepositoryConfig;
use crate::error::{RepoError, RepoResult};
use crate::ratelimit::RateLimiter;

/// Path of the payload inside every commit.
pub const PAYLOAD_PATH: &str = "bytes";

/// How [`Repository::commit_bytes`] builds and publishes a commit.
#[derive(Clone, Debug)]
pub struct CommitOptions {
    pub message: String,
    /// Tree paths; every one points at the payload blob.
    pub paths: Vec<String>,
    /// Encrypt the payload. `None` encrypts when a cipher is configured.
    pub encrypt: Option<bool>,
    /// Publish the objects. Otherwise only the id is computed.
    pub push: bool,
    /// Commit timestamp; defaults to the configured committer's.
    pub when: Option<DateTime<Utc>>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            message: String::new(),
            paths: vec![PAYLOAD_PATH.to_string()],
            encrypt: None,
            push: true,
            when: None,
        }
    }
}

/// How [`Repository::fetch_content`] reads a payload.
#[derive(Clone, Debug)]
pub struct FetchOptions {
    /// Decrypt the payload. `None` decrypts when a cipher is configured.
    pub decrypt: Option<bool>,
    pub path: String,
    /// Blob id, when already known from a bulk query.
    pub blob_hint: Option<ObjectId>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            decrypt: None,
            path: PAYLOAD_PATH.to_string(),
            blob_hint: None,
        }
    }
}

/// A key's value, type, and expiry refs as read in one go.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyState {
    pub value_commit: Option<ObjectId>,
    /// Message of the value commit, when the read path returned it.
    pub value_message: Option<String>,
    pub value_blob: Option<ObjectId>,
    pub type_commit: Option<ObjectId>,
    /// Unencrypted expiry payload.
    pub expiry_payload: Option<Bytes>,
}

/// A handle on one remote repository.
pub struct Repository {
    remote: Arc<dyn RemoteStore>,
    edge: Option<Arc<dyn EdgeFetcher>>,
    cipher: Option<Arc<dyn Cipher>>,
    config: RepositoryConfig,
    info: RepositoryInfo,
    contents: ContentCache,
    messages: MessageCache,
    limiter: RateLimiter,
}

impl Repository {
    /// Connect to a repository and fetch its info.
    pub async fn open(config: RepositoryConfig, remote: Arc<dyn RemoteStore>) -> RepoResult<Self> {
        let limiter = RateLimiter::new();
        let info = remote.repository_info().await.map_err(|e| {
            limiter.observe_error(&e);
            classify(e)
        })?;
        debug!(owner = %config.owner, name = %config.name, public = info.is_public, "opened repository");
        Ok(Self {
            contents: ContentCache::new(&config.cache),
            messages: MessageCache::new(&config.cache),
            remote,
            edge: None,
            cipher: None,
            config,
            info,
            limiter,
        })
    }

    /// Serve public content through edge caches.
    pub fn with_edge(mut self, edge: Arc<dyn EdgeFetcher>) -> Self {
        self.edge = Some(edge);
        self
    }

    /// Encrypt payloads with `cipher`.
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    pub fn info(&self) -> &RepositoryInfo {
        &self.info
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn committer(&self) -> &Signature {
        &self.config.committer
    }

    pub fn is_public(&self) -> bool {
        self.info.is_public
    }

    pub fn is_authenticated(&self) -> bool {
        self.remote.is_authenticated()
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// The last budget the store reported.
    pub fn rate_limit(&self) -> Option<RateLimitStatus> {
        self.remote.rate_limit()
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Put `bytes` in a commit and return its id.
    ///
    /// The id is computed locally. Nothing is uploaded when `push` is off or
    /// the store already has the commit; otherwise blob, tree and commit are
    /// created and each id the store reports is checked against ours.
    pub async fn commit_bytes(&self, bytes: &[u8], options: CommitOptions) -> RepoResult<ObjectId> {
        let payload = if options.encrypt.unwrap_or(self.is_encrypted()) {
            self.encrypt(bytes)?
        } else {
            Bytes::copy_from_slice(bytes)
        };

        let blob = blob_hash(&payload);
        let entries: Vec<TreeEntry> = options
            .paths
            .iter()
            .map(|path| TreeEntry::file(path.as_str(), blob))
            .collect();
        let tree = tree_hash(&entries)?;
        let mut identity = self.config.committer.clone();
        if let Some(when) = options.when {
            identity.when = when;
        }
        let commit = CommitObject::root(tree, identity, options.message);
        let id = commit_hash(&commit);

        if !options.push {
            return Ok(id);
        }
        if self.has_commit(&id).await? {
            debug!(commit = %id.short_hex(), "commit already published");
            return Ok(id);
        }

        let remote_blob = self.call(|| self.remote.create_blob(payload)).await?;
        verify(ObjectKind::Blob, blob, remote_blob)?;
        let remote_tree = self.call(|| self.remote.create_tree(entries)).await?;
        verify(ObjectKind::Tree, tree, remote_tree)?;
        let remote_commit = self.call(|| self.remote.create_commit(commit)).await?;
        verify(ObjectKind::Commit, id, remote_commit)?;
        debug!(commit = %id.short_hex(), "published commit");
        Ok(id)
    }

    /// Apply all updates atomically.
    ///
    /// Short names are qualified as branches. A refusal by the store is a
    /// [`RepoError::TransactionConflict`].
    pub async fn update_refs(&self, updates: Vec<RefUpdate>) -> RepoResult<()> {
        let updates: Vec<RefUpdate> = updates
            .into_iter()
            .map(|mut update| {
                update.name = qualify_ref_name(&update.name);
                update
            })
            .collect();
        self.limiter.check(Utc::now())?;
        let result = self.remote.update_refs(updates).await;
        self.observe(&result);
        result.map_err(|e| {
            if e.is_rejection() {
                RepoError::TransactionConflict { source: e }
            } else {
                classify(e)
            }
        })
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    pub async fn has_commit(&self, id: &ObjectId) -> RepoResult<bool> {
        self.call(|| self.remote.has_commit(id)).await
    }

    pub async fn has_ref(&self, name: &str) -> RepoResult<bool> {
        let name = qualify_ref_name(name);
        self.call(|| self.remote.has_ref(&name)).await
    }

    pub async fn ref_target(&self, name: &str) -> RepoResult<Option<ObjectId>> {
        let name = qualify_ref_name(name);
        self.call(|| self.remote.read_ref(&name)).await
    }

    /// Branches whose head is `commit`.
    pub async fn refs_pointing_at(&self, commit: &ObjectId) -> RepoResult<Vec<String>> {
        self.call(|| self.remote.list_refs_pointing_at(commit)).await
    }

    pub async fn fetch_commit_message(&self, commit: &ObjectId) -> RepoResult<Option<String>> {
        if let Some(message) = self.messages.get(commit) {
            return Ok(Some(message));
        }
        let message = self.call(|| self.remote.read_commit_message(commit)).await?;
        if let Some(message) = &message {
            self.messages.insert(*commit, message.clone());
        }
        Ok(message)
    }

    /// Read the payload of a commit. `None` when the commit or path does not
    /// exist.
    pub async fn fetch_content(
        &self,
        commit: &ObjectId,
        options: FetchOptions,
    ) -> RepoResult<Option<Bytes>> {
        let payload = match self.contents.get(commit) {
            Some(payload) => Some(payload),
            None => {
                let fetched = self.fetch_uncached(commit, &options).await?;
                if let Some(payload) = &fetched {
                    self.contents.insert(*commit, payload.clone());
                }
                fetched
            }
        };
        match payload {
            Some(payload) if options.decrypt.unwrap_or(self.is_encrypted()) => {
                Ok(Some(self.decrypt(&payload)?))
            }
            other => Ok(other),
        }
    }

    /// Read a key's value, type, and expiry refs.
    ///
    /// Authenticated clients use a single bulk query. Otherwise the three
    /// refs are read concurrently and the expiry payload is fetched after.
    pub async fn key_state(
        &self,
        bytes_ref: &str,
        type_ref: &str,
        expiry_ref: &str,
    ) -> RepoResult<KeyState> {
        if self.is_authenticated() {
            let query = KeyStateQuery {
                bytes_ref: qualify_ref_name(bytes_ref),
                type_ref: qualify_ref_name(type_ref),
                expiry_ref: qualify_ref_name(expiry_ref),
                path: PAYLOAD_PATH.to_string(),
            };
            let snapshot = self.call(|| self.remote.query_key_state(query)).await?;
            if let Some(value) = &snapshot.value {
                self.messages.insert(value.commit, value.message.clone());
            }
            return Ok(KeyState {
                value_commit: snapshot.value.as_ref().map(|v| v.commit),
                value_message: snapshot.value.as_ref().map(|v| v.message.clone()),
                value_blob: snapshot.value.and_then(|v| v.blob),
                type_commit: snapshot.value_type,
                expiry_payload: snapshot.expiry_text.map(Bytes::from),
            });
        }

        let (value_commit, type_commit, expiry_commit) = tokio::try_join!(
            self.ref_target(bytes_ref),
            self.ref_target(type_ref),
            self.ref_target(expiry_ref),
        )?;
        let expiry_payload = match expiry_commit {
            Some(commit) => {
                let options = FetchOptions {
                    decrypt: Some(false),
                    ..FetchOptions::default()
                };
                self.fetch_content(&commit, options).await?
            }
            None => None,
        };
        Ok(KeyState {
            value_commit,
            value_message: None,
            value_blob: None,
            type_commit,
            expiry_payload,
        })
    }

    /// Edge URLs serving `path` of `commit`; empty for non-public stores.
    pub fn content_links(&self, commit: &ObjectId, path: &str) -> Vec<String> {
        if !self.is_public() {
            return Vec::new();
        }
        self.config
            .edge_endpoints
            .iter()
            .map(|template| self.config.edge_url(template, commit, path))
            .collect()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    async fn fetch_uncached(
        &self,
        commit: &ObjectId,
        options: &FetchOptions,
    ) -> RepoResult<Option<Bytes>> {
        if let Some(edge) = self.edge.as_ref().filter(|_| self.is_public()) {
            for url in self.content_links(commit, &options.path) {
                match edge.get(&url).await {
                    EdgeResponse::Found(payload) => return Ok(Some(payload)),
                    EdgeResponse::NotFound => {
                        debug!(%url, "edge reports content missing");
                        return Ok(None);
                    }
                    EdgeResponse::Unavailable(reason) => {
                        debug!(%url, %reason, "edge unavailable, trying next");
                    }
                }
            }
            warn!(commit = %commit.short_hex(), "all edge endpoints failed, reading through the API");
        }

        let blob = match options.blob_hint {
            Some(blob) => Some(blob),
            None => {
                self.call(|| self.remote.resolve_path(commit, &options.path))
                    .await?
            }
        };
        match blob {
            Some(blob) => self.call(|| self.remote.read_blob(&blob)).await,
            None => Ok(None),
        }
    }

    /// Place one remote call under the rate limiter.
    async fn call<T, F, Fut>(&self, request: F) -> RepoResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        self.limiter.check(Utc::now())?;
        let result = request().await;
        self.observe(&result);
        result.map_err(classify)
    }

    fn observe<T>(&self, result: &RemoteResult<T>) {
        if let Err(e) = result {
            self.limiter.observe_error(e);
        }
        self.limiter.observe_status(self.remote.rate_limit());
    }

    fn encrypt(&self, bytes: &[u8]) -> RepoResult<Bytes> {
        match &self.cipher {
            Some(cipher) => Ok(Bytes::from(cipher.encrypt(bytes)?)),
            None => Ok(Bytes::copy_from_slice(bytes)),
        }
    }

    fn decrypt(&self, bytes: &[u8]) -> RepoResult<Bytes> {
        match &self.cipher {
            Some(cipher) => Ok(Bytes::from(cipher.decrypt(bytes)?)),
            None => Ok(Bytes::copy_from_slice(bytes)),
        }
    }
}

fn classify(error: RemoteError) -> RepoError {
    match error {
        RemoteError::RateLimited { reset_at } => RepoError::RateLimited { reset_at },
        other => RepoError::Remote(other),
    }
}

fn verify(kind: ObjectKind, local: ObjectId, remote: ObjectId) -> RepoResult<()> {
    if local == remote {
        Ok(())
    } else {
        Err(RepoError::IntegrityFault {
            kind,
            local,
            remote,
        })
    }
}
