use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use gkv_codec::{decode, encode, parse_message, Value};
use gkv_expiry::{expiry_for_ttl, is_stale, to_date, to_index, ttl_days, ExpiryError};
use gkv_repo::{CommitOptions, FetchOptions, RepoError, Repository, PAYLOAD_PATH};
use gkv_store::{Expect, RefUpdate, RemoteStore};
use gkv_types::{ObjectId, TypeTag};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{DbError, DbResult, ModifierError};
use crate::refs::{type_ref, KeyUuid};
use crate::registry::TypeRegistry;

/// Paths present in every value commit.
const DEFAULT_PATHS: [&str; 3] = [PAYLOAD_PATH, "view.txt", "view.json"];

/// Options for [`Database::create`].
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    /// `Some(true)`: the key must exist. `Some(false)`: it must not.
    /// `None`: either.
    pub overwrite: Option<bool>,
    /// Days to live, counted from the end of today. `None` never expires;
    /// `Some(0)` expires at the end of today.
    pub ttl: Option<i64>,
    /// Value the key must currently hold.
    pub old_value: Option<Value>,
}

/// Result of a successful [`Database::create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateOutcome {
    pub uuid: KeyUuid,
    /// Edge URLs serving the value's view, when it has one.
    pub links: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

/// A live value and when it expires.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub value: Value,
    pub expiry: Option<DateTime<Utc>>,
}

/// Options for [`Database::update`].
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions {
    /// Carry the current expiry over. Takes precedence over `ttl`.
    pub keep_ttl: bool,
    pub ttl: Option<i64>,
}

/// Result of a successful [`Database::update`].
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOutcome {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub created: CreateOutcome,
}

/// A commit made from a typed value.
#[derive(Clone, Debug)]
pub(crate) struct Committed {
    pub(crate) commit: ObjectId,
    pub(crate) tag: Option<TypeTag>,
    pub(crate) links: Vec<String>,
}

/// A key-value database stored in a git repository.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Database {
    pub(crate) repo: Repository,
    registry: OnceCell<TypeRegistry>,
    pub(crate) gc_batch_size: usize,
}

impl Database {
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            registry: OnceCell::new(),
            gc_batch_size: DatabaseConfig::default().gc_batch_size,
        }
    }

    /// Open the configured repository on `remote`.
    pub async fn open(config: DatabaseConfig, remote: Arc<dyn RemoteStore>) -> DbResult<Self> {
        let repo = Repository::open(config.repository, remote).await?;
        Ok(Self::new(repo).with_gc_batch_size(config.gc_batch_size))
    }

    pub fn with_gc_batch_size(mut self, batch_size: usize) -> Self {
        self.gc_batch_size = batch_size.max(1);
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// The type registry, computed on first use.
    pub async fn registry(&self) -> DbResult<&TypeRegistry> {
        self.registry
            .get_or_try_init(|| async {
                let commits = try_join_all(TypeTag::ALL.into_iter().map(|tag| async move {
                    let committed = self.type_commit_of(tag, false).await?;
                    Ok::<_, DbError>((tag, committed))
                }))
                .await?;
                TypeRegistry::from_pairs(commits).map_err(DbError::from)
            })
            .await
    }

    /// Publish the type commits and point the registry tags at them.
    pub async fn init(&self) -> DbResult<()> {
        let registry = self.registry().await?;
        let published = try_join_all(
            TypeTag::ALL
                .into_iter()
                .map(|tag| async move { self.type_commit_of(tag, true).await }),
        )
        .await?;
        let updates = TypeTag::ALL
            .into_iter()
            .zip(published)
            .map(|(tag, commit)| RefUpdate::set(type_ref(tag), Some(commit)))
            .collect();
        self.repo.update_refs(updates).await?;
        info!(types = registry.len(), "initialized database");
        Ok(())
    }

    /// Whether the registry tags in the repository match ours.
    pub async fn verify_initialized(&self) -> DbResult<bool> {
        let registry = self.registry().await?;
        let published = self.repo.ref_target(&type_ref(TypeTag::Blob)).await?;
        Ok(published.is_some() && published == registry.commit_of(TypeTag::Blob))
    }

    /// The UUID of `key`.
    pub async fn uuid(&self, key: &Value) -> DbResult<KeyUuid> {
        let committed = self.commit_typed(key, false, None).await?;
        Ok(KeyUuid::new(committed.tag, committed.commit))
    }

    /// Recover a key from its UUID. `None` when the key commit is unknown.
    pub async fn uuid_to_key(&self, uuid: &str) -> DbResult<Option<Value>> {
        let uuid: KeyUuid = uuid.parse()?;
        let (bytes, message) = tokio::try_join!(
            self.repo.fetch_content(&uuid.commit, FetchOptions::default()),
            async {
                if uuid.tag == Some(TypeTag::Blob) {
                    self.repo.fetch_commit_message(&uuid.commit).await
                } else {
                    Ok(None)
                }
            },
        )?;
        let Some(bytes) = bytes else {
            return Ok(None);
        };
        let meta = parse_message(message.as_deref().unwrap_or_default());
        Ok(Some(decode(uuid.tag, bytes, meta.mime_type.as_deref())?))
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Set `key` to `value`, or delete it when `value` is `None`.
    ///
    /// All four refs of the key move in one atomic update. The before-states
    /// encode `overwrite` and `old_value`, so a concurrent writer makes the
    /// update fail rather than interleave.
    ///
    /// A TTL of zero is not "no expiry": `ttl: Some(0)` stales the key after
    /// today. Pass `ttl: None` for a key that never expires.
    pub async fn create(
        &self,
        key: &Value,
        value: Option<&Value>,
        options: CreateOptions,
    ) -> DbResult<CreateOutcome> {
        if options.overwrite == Some(false) && options.old_value.is_some() {
            return Err(DbError::OldValueWithoutOverwrite);
        }
        let now = Utc::now();
        let expiry = match (value, options.ttl) {
            (Some(_), Some(ttl)) => Some(expiry_for_ttl(ttl, now)?),
            _ => None,
        };
        let registry = self.registry().await?;

        let push_key = options.overwrite != Some(true);
        let (key_commit, new, expiry_commit, old) = tokio::try_join!(
            self.commit_typed(key, push_key, None),
            self.commit_optional(value, true, None),
            self.expiry_commit(expiry, true),
            self.commit_optional(options.old_value.as_ref(), false, None),
        )?;
        let uuid = KeyUuid::new(key_commit.tag, key_commit.commit);
        let refs = uuid.refs();

        let key_before = match options.overwrite {
            Some(true) => Expect::Exactly(key_commit.commit),
            Some(false) => Expect::Absent,
            None => Expect::Any,
        };
        let bytes_before = old.as_ref().map_or(Expect::Any, |old| Expect::Exactly(old.commit));
        let type_before = match &old {
            Some(old) => Expect::from_option(self.registered(registry, old.tag)?),
            None => Expect::Any,
        };
        let type_after = match &new {
            Some(new) => self.registered(registry, new.tag)?,
            None => None,
        };
        let key_after = new.as_ref().map(|_| key_commit.commit);

        let updates = vec![
            RefUpdate::set(refs.key, key_after).expecting(key_before),
            RefUpdate::set(refs.value_bytes, new.as_ref().map(|n| n.commit))
                .expecting(bytes_before),
            RefUpdate::set(refs.value_type, type_after).expecting(type_before),
            RefUpdate::set(refs.expiry, expiry_commit),
        ];

        match self.repo.update_refs(updates).await {
            Ok(()) => {
                debug!(%uuid, deleted = new.is_none(), "updated key");
                Ok(CreateOutcome {
                    uuid,
                    links: new.map(|n| n.links).unwrap_or_default(),
                    expiry,
                })
            }
            Err(RepoError::TransactionConflict { source }) => Err(self
                .diagnose(
                    key,
                    &uuid,
                    options.overwrite,
                    new.and_then(|n| n.tag),
                    RepoError::TransactionConflict { source },
                )
                .await),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete `key`, optionally only while it holds `expected`.
    pub async fn delete(&self, key: &Value, expected: Option<Value>) -> DbResult<CreateOutcome> {
        let options = CreateOptions {
            old_value: expected,
            ..CreateOptions::default()
        };
        self.create(key, None, options).await
    }

    /// Replace the value of `key` with what `modifier` makes of it.
    ///
    /// The modifier gets its own copy of the current value. If it fails,
    /// nothing is written. The write asserts the value read, so a concurrent
    /// change turns into an error instead of being overwritten.
    pub async fn update<F, Fut, E>(
        &self,
        key: &Value,
        modifier: F,
        options: UpdateOptions,
    ) -> DbResult<UpdateOutcome>
    where
        F: FnOnce(Option<Value>) -> Fut,
        Fut: Future<Output = Result<Option<Value>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let current = self.read_entry(key).await?;
        let (old_value, old_expiry) = match current {
            Some(entry) => (Some(entry.value), entry.expiry),
            None => (None, None),
        };

        let new_value = modifier(old_value.clone())
            .await
            .map_err(|e| DbError::ModifierFailed { source: e.into() })?;

        let ttl = if options.keep_ttl {
            let now = Utc::now();
            old_expiry.map(|expiry| ttl_days(expiry, now).floor() as i64)
        } else {
            options.ttl
        };
        let create = CreateOptions {
            overwrite: Some(true),
            ttl,
            old_value: old_value.clone(),
        };
        let created = self.create(key, new_value.as_ref(), create).await?;
        Ok(UpdateOutcome {
            old_value,
            new_value,
            created,
        })
    }

    /// Add `by` to a number. The result never expires; use [`Database::update`]
    /// with `keep_ttl` to carry the expiry over.
    pub async fn increment(&self, key: &Value, by: f64) -> DbResult<UpdateOutcome> {
        let modifier = |old: Option<Value>| async move {
            match old {
                Some(Value::Number(n)) => Ok(Some(Value::Number(n + by))),
                other => Err(mismatch(TypeTag::Number, other.as_ref())),
            }
        };
        self.update(key, modifier, UpdateOptions::default()).await
    }

    /// Negate a boolean. Like [`Database::increment`], drops the expiry.
    pub async fn toggle(&self, key: &Value) -> DbResult<UpdateOutcome> {
        let modifier = |old: Option<Value>| async move {
            match old {
                Some(Value::Boolean(b)) => Ok(Some(Value::Boolean(!b))),
                other => Err(mismatch(TypeTag::Boolean, other.as_ref())),
            }
        };
        self.update(key, modifier, UpdateOptions::default()).await
    }

    /// Give an existing key a new TTL; `None` makes it permanent.
    pub async fn expire(&self, key: &Value, ttl: Option<i64>) -> DbResult<Option<DateTime<Utc>>> {
        let expiry = ttl
            .map(|ttl| expiry_for_ttl(ttl, Utc::now()))
            .transpose()?;
        let (key_commit, expiry_commit) = tokio::try_join!(
            self.commit_typed(key, false, None),
            self.expiry_commit(expiry, true),
        )?;
        let uuid = KeyUuid::new(key_commit.tag, key_commit.commit);
        let refs = uuid.refs();
        let updates = vec![
            RefUpdate::set(refs.key, Some(key_commit.commit))
                .expecting(Expect::Exactly(key_commit.commit)),
            RefUpdate::set(refs.expiry, expiry_commit),
        ];
        match self.repo.update_refs(updates).await {
            Ok(()) => Ok(expiry),
            Err(RepoError::TransactionConflict { source }) => {
                if !self.has(key).await? {
                    return Err(DbError::NothingToExpire {
                        uuid: uuid.to_string(),
                    });
                }
                Err(DbError::TransactionConflict {
                    source: RepoError::TransactionConflict { source },
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Whether the key ref exists.
    ///
    /// Stale keys still count until GC removes them, while [`read`] already
    /// treats them as absent.
    ///
    /// [`read`]: Database::read
    pub async fn has(&self, key: &Value) -> DbResult<bool> {
        let uuid = self.uuid(key).await?;
        Ok(self.repo.has_ref(&uuid.refs().key).await?)
    }

    pub async fn read(&self, key: &Value) -> DbResult<Option<Value>> {
        Ok(self.read_entry(key).await?.map(|entry| entry.value))
    }

    /// The live value of `key` and its expiry.
    pub async fn read_entry(&self, key: &Value) -> DbResult<Option<Entry>> {
        let uuid = self.uuid(key).await?;
        let refs = uuid.refs();
        let state = self
            .repo
            .key_state(&refs.value_bytes, &refs.value_type, &refs.expiry)
            .await?;
        let Some(value_commit) = state.value_commit else {
            return Ok(None);
        };

        let now = Utc::now();
        let expiry = match state.expiry_payload {
            Some(payload) => {
                let index = expiry_index(decode(Some(TypeTag::Number), payload, None)?)?;
                if is_stale(index, now) {
                    debug!(%uuid, "stale key");
                    return Ok(None);
                }
                Some(to_date(i64::from(index), now)?)
            }
            None => None,
        };

        let tag = match state.type_commit {
            Some(commit) => Some(
                self.registry()
                    .await?
                    .tag_of(&commit)
                    .ok_or(DbError::UnknownType(commit))?,
            ),
            None => None,
        };
        let message = match (tag, state.value_message) {
            (Some(TypeTag::Blob), None) => self.repo.fetch_commit_message(&value_commit).await?,
            (_, message) => message,
        };
        let meta = parse_message(message.as_deref().unwrap_or_default());

        let options = FetchOptions {
            blob_hint: state.value_blob,
            ..FetchOptions::default()
        };
        let Some(bytes) = self.repo.fetch_content(&value_commit, options).await? else {
            debug!(%uuid, commit = %value_commit.short_hex(), "value content missing");
            return Ok(None);
        };
        let value = decode(tag, bytes, meta.mime_type.as_deref())?;
        Ok(Some(Entry { value, expiry }))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    pub(crate) async fn commit_typed(
        &self,
        value: &Value,
        push: bool,
        encrypt: Option<bool>,
    ) -> DbResult<Committed> {
        let encoded = encode(value)?;
        let mut paths: Vec<String> = DEFAULT_PATHS.iter().map(|p| p.to_string()).collect();
        if let (Some(_), Some(ext)) = (&encoded.mime_type, &encoded.extension) {
            let view = format!("view.{ext}");
            // text/plain and application/json already have their view path.
            if !paths.contains(&view) {
                paths.push(view);
            }
        }
        let options = CommitOptions {
            message: encoded.message(),
            paths,
            encrypt,
            push,
            when: None,
        };
        let commit = self.repo.commit_bytes(&encoded.bytes, options).await?;
        let links = encoded
            .extension
            .as_ref()
            .map(|ext| self.repo.content_links(&commit, &format!("view.{ext}")))
            .unwrap_or_default();
        Ok(Committed {
            commit,
            tag: encoded.tag,
            links,
        })
    }

    async fn commit_optional(
        &self,
        value: Option<&Value>,
        push: bool,
        encrypt: Option<bool>,
    ) -> DbResult<Option<Committed>> {
        match value {
            Some(value) => Ok(Some(self.commit_typed(value, push, encrypt).await?)),
            None => Ok(None),
        }
    }

    /// Commit of an expiry date's index, always unencrypted.
    pub(crate) async fn expiry_commit(
        &self,
        expiry: Option<DateTime<Utc>>,
        push: bool,
    ) -> DbResult<Option<ObjectId>> {
        match expiry {
            Some(date) => Ok(Some(self.index_commit(to_index(date), push).await?)),
            None => Ok(None),
        }
    }

    pub(crate) async fn index_commit(&self, index: u32, push: bool) -> DbResult<ObjectId> {
        let value = Value::Number(f64::from(index));
        Ok(self.commit_typed(&value, push, Some(false)).await?.commit)
    }

    async fn type_commit_of(&self, tag: TypeTag, push: bool) -> DbResult<ObjectId> {
        let value = Value::String(tag.as_str().to_string());
        Ok(self.commit_typed(&value, push, Some(false)).await?.commit)
    }

    /// Registry commit of a tag; `None` for raw values.
    fn registered(
        &self,
        registry: &TypeRegistry,
        tag: Option<TypeTag>,
    ) -> DbResult<Option<ObjectId>> {
        match tag {
            Some(tag) => registry
                .commit_of(tag)
                .map(Some)
                .ok_or(DbError::NotInitialized),
            None => Ok(None),
        }
    }

    /// Explain a rejected update.
    ///
    /// The checks run after the fact and are racy: with concurrent writers
    /// the answer describes the state at diagnosis time, not at rejection.
    async fn diagnose(
        &self,
        key: &Value,
        uuid: &KeyUuid,
        overwrite: Option<bool>,
        value_tag: Option<TypeTag>,
        error: RepoError,
    ) -> DbError {
        if let Some(overwrite) = overwrite {
            match self.has(key).await {
                Ok(true) if !overwrite => {
                    return DbError::KeyExists {
                        uuid: uuid.to_string(),
                    }
                }
                Ok(false) if overwrite => {
                    return DbError::NothingToOverwrite {
                        uuid: uuid.to_string(),
                    }
                }
                Ok(_) => {}
                Err(e) => return e,
            }
        }
        if let Some(tag) = value_tag {
            let initialized = match self.registry().await {
                Ok(registry) => match registry.commit_of(tag) {
                    Some(commit) => self.repo.has_commit(&commit).await,
                    None => Ok(false),
                },
                Err(e) => return e,
            };
            match initialized {
                Ok(false) => return DbError::NotInitialized,
                Ok(true) => {}
                Err(e) => return e.into(),
            }
        }
        DbError::TransactionConflict { source: error }
    }
}

fn mismatch(expected: TypeTag, found: Option<&Value>) -> ModifierError {
    ModifierError::TypeMismatch {
        expected,
        found: found.map_or("nothing", Value::kind_name),
    }
}

/// The day index stored in an expiry payload.
fn expiry_index(value: Value) -> DbResult<u32> {
    let number = value.as_number().unwrap_or(f64::NAN);
    if number.fract() != 0.0 || !number.is_finite() {
        return Err(gkv_codec::CodecError::InvalidNumber(gkv_codec::to_js_string(number)).into());
    }
    let index = number as i64;
    u32::try_from(index).map_err(|_| ExpiryError::IndexOutOfRange(index).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gkv_crypto::{Cipher, CipherError};
    use gkv_repo::RepositoryConfig;
    use gkv_store::InMemoryRemote;
    use serde_json::json;

    struct XorCipher(u8);

    impl Cipher for XorCipher {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
            Ok(plaintext.iter().map(|b| b ^ self.0).collect())
        }

        fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
            self.encrypt(ciphertext)
        }
    }

    async fn repo(remote: &Arc<InMemoryRemote>) -> Repository {
        Repository::open(RepositoryConfig::new("octo", "kv"), remote.clone())
            .await
            .unwrap()
            .with_edge(remote.clone())
    }

    async fn setup() -> (Arc<InMemoryRemote>, Database) {
        let remote = Arc::new(InMemoryRemote::new());
        let db = Database::new(repo(&remote).await);
        db.init().await.unwrap();
        (remote, db)
    }

    fn s(text: &str) -> Value {
        Value::from(text)
    }

    fn overwrite(flag: bool) -> CreateOptions {
        CreateOptions {
            overwrite: Some(flag),
            ..CreateOptions::default()
        }
    }

    #[tokio::test]
    async fn create_then_read() {
        let (_, db) = setup().await;
        let outcome = db
            .create(&s("greeting"), Some(&s("hello")), CreateOptions::default())
            .await
            .unwrap();
        assert!(outcome.uuid.to_string().starts_with("String/"));
        assert_eq!(outcome.expiry, None);
        assert_eq!(db.read(&s("greeting")).await.unwrap(), Some(s("hello")));
        assert!(db.has(&s("greeting")).await.unwrap());
        assert_eq!(db.read(&s("missing")).await.unwrap(), None);
        assert!(!db.has(&s("missing")).await.unwrap());
    }

    #[tokio::test]
    async fn every_type_reads_back() {
        let (_, db) = setup().await;
        let values = vec![
            Value::Number(42.0),
            Value::Number(0.1 + 0.2),
            Value::Boolean(false),
            s("text"),
            Value::Json(json!({"a": [1, 2, {"b": null}]})),
            Value::blob("image/png", &b"\x89PNG"[..]),
            Value::ArrayBuffer(bytes::Bytes::from_static(&[0, 1, 2])),
            Value::Raw(bytes::Bytes::from_static(b"raw")),
        ];
        for (i, value) in values.into_iter().enumerate() {
            let key = Value::Number(i as f64);
            db.create(&key, Some(&value), CreateOptions::default())
                .await
                .unwrap();
            assert_eq!(db.read(&key).await.unwrap(), Some(value));
        }
    }

    #[tokio::test]
    async fn unauthenticated_reads_match() {
        let (remote, db) = setup().await;
        let png = Value::blob("image/png", &b"png-bytes"[..]);
        db.create(&s("img"), Some(&png), CreateOptions { ttl: Some(3), ..Default::default() })
            .await
            .unwrap();
        let authed = db.read_entry(&s("img")).await.unwrap().unwrap();

        remote.set_authenticated(false);
        let reader = Database::new(repo(&remote).await);
        let anonymous = reader.read_entry(&s("img")).await.unwrap().unwrap();
        assert_eq!(anonymous, authed);
        assert_eq!(anonymous.value, png);

        remote.set_public(false);
        let private = Database::new(repo(&remote).await);
        assert_eq!(private.read(&s("img")).await.unwrap(), Some(png));
    }

    #[tokio::test]
    async fn key_exists_when_overwrite_is_false() {
        let (_, db) = setup().await;
        db.create(&s("k"), Some(&s("v1")), overwrite(false)).await.unwrap();
        let err = db
            .create(&s("k"), Some(&s("v2")), overwrite(false))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::KeyExists { .. }), "{err}");
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(s("v1")));
    }

    #[tokio::test]
    async fn overwrite_requires_existing_key() {
        let (_, db) = setup().await;
        let err = db
            .create(&s("k"), Some(&s("v")), overwrite(true))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NothingToOverwrite { .. }), "{err}");

        db.create(&s("k"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap();
        db.create(&s("k"), Some(&s("w")), overwrite(true)).await.unwrap();
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(s("w")));
    }

    #[tokio::test]
    async fn old_value_needs_overwrite() {
        let (_, db) = setup().await;
        let options = CreateOptions {
            overwrite: Some(false),
            old_value: Some(s("x")),
            ..CreateOptions::default()
        };
        let err = db.create(&s("k"), Some(&s("v")), options).await.unwrap_err();
        assert!(matches!(err, DbError::OldValueWithoutOverwrite));
    }

    #[tokio::test]
    async fn wrong_old_value_is_a_conflict() {
        let (_, db) = setup().await;
        db.create(&s("k"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap();
        let options = CreateOptions {
            overwrite: Some(true),
            old_value: Some(s("not v")),
            ..CreateOptions::default()
        };
        let err = db.create(&s("k"), Some(&s("w")), options).await.unwrap_err();
        assert!(matches!(err, DbError::TransactionConflict { .. }), "{err}");
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(s("v")));
    }

    #[tokio::test]
    async fn uninitialized_database() {
        let remote = Arc::new(InMemoryRemote::new());
        let db = Database::new(repo(&remote).await);
        assert!(!db.verify_initialized().await.unwrap());
        let err = db
            .create(&s("k"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotInitialized), "{err}");

        db.init().await.unwrap();
        assert!(db.verify_initialized().await.unwrap());
        db.init().await.unwrap();
    }

    #[tokio::test]
    async fn increment_and_toggle() {
        let (_, db) = setup().await;
        db.create(&s("n"), Some(&Value::Number(1.0)), CreateOptions::default())
            .await
            .unwrap();
        let outcome = db.increment(&s("n"), 2.0).await.unwrap();
        assert_eq!(outcome.old_value, Some(Value::Number(1.0)));
        assert_eq!(outcome.new_value, Some(Value::Number(3.0)));
        assert_eq!(db.read(&s("n")).await.unwrap(), Some(Value::Number(3.0)));

        db.create(&s("b"), Some(&Value::Boolean(true)), CreateOptions::default())
            .await
            .unwrap();
        db.toggle(&s("b")).await.unwrap();
        assert_eq!(db.read(&s("b")).await.unwrap(), Some(Value::Boolean(false)));
    }

    #[tokio::test]
    async fn type_mismatch_leaves_value_unchanged() {
        let (_, db) = setup().await;
        db.create(&s("k"), Some(&s("text")), CreateOptions::default())
            .await
            .unwrap();

        let err = db.increment(&s("k"), 1.0).await.unwrap_err();
        let DbError::ModifierFailed { source } = err else {
            panic!("expected ModifierFailed, got {err}");
        };
        assert_eq!(
            source.downcast_ref::<ModifierError>(),
            Some(&ModifierError::TypeMismatch {
                expected: TypeTag::Number,
                found: "String"
            })
        );
        assert!(matches!(
            db.toggle(&s("k")).await.unwrap_err(),
            DbError::ModifierFailed { .. }
        ));
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(s("text")));
    }

    #[tokio::test]
    async fn update_hands_out_an_unaliased_copy() {
        let (_, db) = setup().await;
        let key = s("obj");
        db.create(&key, Some(&Value::Json(json!({"hello": "world"}))), CreateOptions::default())
            .await
            .unwrap();

        let outcome = db
            .update(
                &key,
                |old| async move {
                    let mut json = old.and_then(|v| v.as_json().cloned()).unwrap_or_default();
                    if let Some(map) = json.as_object_mut() {
                        map.remove("hello");
                        map.insert("how".into(), json!("are you?"));
                    }
                    Ok::<_, ModifierError>(Some(Value::Json(json)))
                },
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.old_value, Some(Value::Json(json!({"hello": "world"}))));
        assert_eq!(outcome.new_value, Some(Value::Json(json!({"how": "are you?"}))));
        assert_eq!(
            db.read(&key).await.unwrap(),
            Some(Value::Json(json!({"how": "are you?"})))
        );
    }

    #[tokio::test]
    async fn update_to_none_deletes() {
        let (_, db) = setup().await;
        db.create(&s("k"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap();
        db.update(&s("k"), |_| async { Ok::<_, ModifierError>(None) }, UpdateOptions::default())
            .await
            .unwrap();
        assert!(!db.has(&s("k")).await.unwrap());
    }

    #[tokio::test]
    async fn keep_ttl_carries_expiry() {
        let (_, db) = setup().await;
        let options = CreateOptions {
            ttl: Some(5),
            ..CreateOptions::default()
        };
        let created = db
            .create(&s("n"), Some(&Value::Number(1.0)), options)
            .await
            .unwrap();
        let keep = UpdateOptions {
            keep_ttl: true,
            ttl: None,
        };
        let add_one = |v: Option<Value>| async move {
            Ok::<_, ModifierError>(v.and_then(|v| v.as_number()).map(|n| Value::Number(n + 1.0)))
        };
        let outcome = db.update(&s("n"), add_one, keep).await.unwrap();
        assert_eq!(outcome.created.expiry, created.expiry);
        let entry = db.read_entry(&s("n")).await.unwrap().unwrap();
        assert_eq!(entry.value, Value::Number(2.0));
        assert_eq!(entry.expiry, created.expiry);

        let dropped = db
            .update(
                &s("n"),
                |v| async move { Ok::<_, ModifierError>(v) },
                UpdateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(dropped.created.expiry, None);
    }

    #[tokio::test]
    async fn increment_and_toggle_drop_the_expiry() {
        let (_, db) = setup().await;
        let options = || CreateOptions {
            ttl: Some(5),
            ..CreateOptions::default()
        };
        db.create(&s("n"), Some(&Value::Number(1.0)), options())
            .await
            .unwrap();
        db.create(&s("b"), Some(&Value::Boolean(false)), options())
            .await
            .unwrap();

        let incremented = db.increment(&s("n"), 2.0).await.unwrap();
        assert_eq!(incremented.created.expiry, None);
        let toggled = db.toggle(&s("b")).await.unwrap();
        assert_eq!(toggled.created.expiry, None);

        let entry = db.read_entry(&s("n")).await.unwrap().unwrap();
        assert_eq!(entry, Entry { value: Value::Number(3.0), expiry: None });
        let entry = db.read_entry(&s("b")).await.unwrap().unwrap();
        assert_eq!(entry, Entry { value: Value::Boolean(true), expiry: None });
    }

    #[tokio::test]
    async fn zero_ttl_expires_end_of_today() {
        let (_, db) = setup().await;
        let before = Utc::now();
        let options = CreateOptions {
            ttl: Some(0),
            ..CreateOptions::default()
        };
        let created = db.create(&s("k"), Some(&s("v")), options).await.unwrap();
        let expiry = created.expiry.unwrap();
        let after = Utc::now();
        let today = [gkv_expiry::end_of_day(before), gkv_expiry::end_of_day(after)];
        assert!(today.contains(&expiry));
        // Still live today.
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(s("v")));

        let permanent = db
            .create(&s("p"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap();
        assert_eq!(permanent.expiry, None);
    }

    #[tokio::test]
    async fn stale_keys_read_absent_but_exist() {
        let (_, db) = setup().await;
        let options = CreateOptions {
            ttl: Some(-1),
            ..CreateOptions::default()
        };
        db.create(&s("old"), Some(&s("v")), options).await.unwrap();
        assert_eq!(db.read(&s("old")).await.unwrap(), None);
        assert!(db.has(&s("old")).await.unwrap());
    }

    #[tokio::test]
    async fn ttl_out_of_range() {
        let (_, db) = setup().await;
        let options = CreateOptions {
            ttl: Some(gkv_expiry::MAX_TTL_DAYS),
            ..CreateOptions::default()
        };
        let err = db.create(&s("k"), Some(&s("v")), options).await.unwrap_err();
        assert!(matches!(err, DbError::Expiry(ExpiryError::TtlOutOfRange(_))));
    }

    #[tokio::test]
    async fn delete_with_expected_value() {
        let (_, db) = setup().await;
        db.create(&s("k"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap();
        assert!(db.delete(&s("k"), Some(s("other"))).await.is_err());
        assert!(db.has(&s("k")).await.unwrap());
        db.delete(&s("k"), Some(s("v"))).await.unwrap();
        assert!(!db.has(&s("k")).await.unwrap());
        assert_eq!(db.read(&s("k")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn raw_values_drop_the_type_ref() {
        let (remote, db) = setup().await;
        let raw = Value::Raw(bytes::Bytes::from_static(b"\x00\x01"));
        let outcome = db
            .create(&s("k"), Some(&raw), CreateOptions::default())
            .await
            .unwrap();
        let type_ref = outcome.uuid.refs().value_type;
        assert!(remote.refs_with_prefix(&type_ref).unwrap().is_empty());
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(raw.clone()));

        let options = CreateOptions {
            overwrite: Some(true),
            old_value: Some(raw),
            ..CreateOptions::default()
        };
        db.create(&s("k"), Some(&s("typed")), options).await.unwrap();
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(s("typed")));
    }

    #[tokio::test]
    async fn equal_values_share_links() {
        let (_, db) = setup().await;
        let a = db
            .create(&s("a"), Some(&s("same")), CreateOptions::default())
            .await
            .unwrap();
        let b = db
            .create(&s("b"), Some(&s("same")), CreateOptions::default())
            .await
            .unwrap();
        assert!(!a.links.is_empty());
        assert!(a.links.iter().all(|link| link.ends_with("/view.txt")));
        assert_eq!(a.links, b.links);
        assert_ne!(a.uuid, b.uuid);

        let png = db
            .create(&s("p"), Some(&Value::blob("image/png", &b"x"[..])), CreateOptions::default())
            .await
            .unwrap();
        assert!(png.links.iter().all(|link| link.ends_with("/view.png")));
    }

    #[tokio::test]
    async fn json_blob_reuses_the_json_view() {
        let (remote, db) = setup().await;
        let value = Value::blob("application/json", &b"{}"[..]);
        let created = db
            .create(&s("k"), Some(&value), CreateOptions::default())
            .await
            .unwrap();
        assert!(created.links.iter().all(|link| link.ends_with("/view.json")));
        let commit = db
            .repository()
            .ref_target(&created.uuid.refs().value_bytes)
            .await
            .unwrap()
            .unwrap();
        assert!(remote.resolve_path(&commit, "view.json").await.unwrap().is_some());
        assert_eq!(db.read(&s("k")).await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn blob_views_use_common_extensions() {
        let (remote, db) = setup().await;
        for (key, mime, ext) in [("t", "text/plain", "txt"), ("j", "image/jpeg", "jpeg")] {
            let value = Value::blob(mime, &b"payload"[..]);
            let created = db
                .create(&s(key), Some(&value), CreateOptions::default())
                .await
                .unwrap();
            let suffix = format!("/view.{ext}");
            assert!(!created.links.is_empty());
            assert!(created.links.iter().all(|link| link.ends_with(&suffix)), "{mime}");

            let commit = db
                .repository()
                .ref_target(&created.uuid.refs().value_bytes)
                .await
                .unwrap()
                .unwrap();
            let view = remote
                .resolve_path(&commit, &format!("view.{ext}"))
                .await
                .unwrap();
            assert!(view.is_some(), "{mime} commit has no view.{ext}");
            assert_eq!(
                remote.resolve_path(&commit, "bytes").await.unwrap(),
                view
            );
            let message = db.repository().fetch_commit_message(&commit).await.unwrap();
            assert_eq!(
                message.as_deref().map(|m| m.trim_end_matches('\n')),
                Some(format!("{mime};extension={ext}").as_str())
            );
            assert_eq!(db.read(&s(key)).await.unwrap(), Some(value));
        }
    }

    #[tokio::test]
    async fn uuid_round_trips_to_key() {
        let (_, db) = setup().await;
        for key in [
            s("name"),
            Value::Number(7.0),
            Value::Json(json!([1, 2])),
            Value::blob("text/csv", &b"a,b"[..]),
        ] {
            let outcome = db
                .create(&key, Some(&Value::Boolean(true)), CreateOptions::default())
                .await
                .unwrap();
            let recovered = db.uuid_to_key(&outcome.uuid.to_string()).await.unwrap();
            assert_eq!(recovered, Some(key));
        }
        assert!(matches!(
            db.uuid_to_key("nonsense").await,
            Err(DbError::InvalidUuid(_))
        ));
    }

    #[tokio::test]
    async fn expire_republishes_only_the_expiry() {
        let (_, db) = setup().await;
        let err = db.expire(&s("k"), Some(1)).await.unwrap_err();
        assert!(matches!(err, DbError::NothingToExpire { .. }), "{err}");

        db.create(&s("k"), Some(&s("v")), CreateOptions::default())
            .await
            .unwrap();
        let expiry = db.expire(&s("k"), Some(2)).await.unwrap();
        assert!(expiry.is_some());
        assert_eq!(db.read_entry(&s("k")).await.unwrap().unwrap().expiry, expiry);

        db.expire(&s("k"), Some(-1)).await.unwrap();
        assert_eq!(db.read(&s("k")).await.unwrap(), None);
        db.expire(&s("k"), None).await.unwrap();
        let entry = db.read_entry(&s("k")).await.unwrap().unwrap();
        assert_eq!(entry, Entry { value: s("v"), expiry: None });
    }

    #[tokio::test]
    async fn encrypted_values_are_opaque_in_the_store() {
        let remote = Arc::new(InMemoryRemote::new());
        let plain = Database::new(repo(&remote).await);
        plain.init().await.unwrap();
        let secret = Database::new(repo(&remote).await.with_cipher(Arc::new(XorCipher(0x33))));

        secret
            .create(&s("k"), Some(&s("hidden")), CreateOptions { ttl: Some(1), ..Default::default() })
            .await
            .unwrap();
        let entry = secret.read_entry(&s("k")).await.unwrap().unwrap();
        assert_eq!(entry.value, s("hidden"));
        assert!(entry.expiry.is_some());

        // Keys are encrypted too, so the plain client addresses another UUID.
        assert_ne!(
            secret.uuid(&s("k")).await.unwrap(),
            plain.uuid(&s("k")).await.unwrap()
        );
        assert!(!plain.has(&s("k")).await.unwrap());
    }

    #[tokio::test]
    async fn integrity_faults_surface() {
        let (remote, db) = setup().await;
        remote.set_corrupt_ids(true);
        let err = db
            .create(&s("k"), Some(&s("fresh value")), CreateOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_integrity_fault(), "{err}");
    }

    #[test]
    fn expiry_index_checks_shape() {
        assert_eq!(expiry_index(Value::Number(12.0)).unwrap(), 12);
        assert!(expiry_index(Value::Number(1.5)).is_err());
        assert!(expiry_index(Value::Number(-3.0)).is_err());
        assert!(expiry_index(s("12")).is_err());
    }
}
