use bytes::Bytes;
use chrono::{DateTime, Utc};
use gkv_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Static facts about a repository, fetched once when it is opened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    /// Opaque id the store uses for the repository.
    pub id: String,
    /// Public repositories are mirrored by edge caches.
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// Expected state of a ref before an update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expect {
    /// No expectation.
    #[default]
    Any,
    /// The ref must not exist.
    Absent,
    /// The ref must point at exactly this commit.
    Exactly(ObjectId),
}

impl Expect {
    /// `Exactly(id)` when an id is known, `Absent` otherwise.
    pub fn from_option(id: Option<ObjectId>) -> Self {
        match id {
            Some(id) => Self::Exactly(id),
            None => Self::Absent,
        }
    }

    /// Whether a ref currently at `current` satisfies the expectation.
    pub fn matches(&self, current: Option<&ObjectId>) -> bool {
        match self {
            Self::Any => true,
            Self::Absent => current.is_none(),
            Self::Exactly(id) => current == Some(id),
        }
    }
}

/// One step of an atomic multi-ref update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefUpdate {
    /// Fully qualified ref name (`refs/...`).
    pub name: String,
    pub before: Expect,
    /// New target; `None` deletes the ref.
    pub after: Option<ObjectId>,
    /// Allow a non fast-forward move. The `before` expectation still holds.
    pub force: bool,
}

impl RefUpdate {
    /// A forced update to `after`, with no expectation on the current target.
    pub fn set(name: impl Into<String>, after: Option<ObjectId>) -> Self {
        Self {
            name: name.into(),
            before: Expect::Any,
            after,
            force: true,
        }
    }

    pub fn expecting(mut self, before: Expect) -> Self {
        self.before = before;
        self
    }
}

/// The refs read by a single bulk key-state query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStateQuery {
    pub bytes_ref: String,
    pub type_ref: String,
    pub expiry_ref: String,
    /// Path of the payload inside value and expiry commits.
    pub path: String,
}

/// What the value-bytes ref points at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueRefState {
    pub commit: ObjectId,
    pub message: String,
    /// Blob at the query path, if the commit's tree has it.
    pub blob: Option<ObjectId>,
}

/// Answer to a [`KeyStateQuery`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStateSnapshot {
    pub value: Option<ValueRefState>,
    pub value_type: Option<ObjectId>,
    /// Text of the expiry payload, when the expiry ref exists.
    pub expiry_text: Option<String>,
}

/// Request budget last reported by the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitStatus {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// Outcome of an edge-cache GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeResponse {
    Found(Bytes),
    /// Authoritative: the path does not exist at that commit.
    NotFound,
    /// Transient failure; another endpoint may still answer.
    Unavailable(String),
}
