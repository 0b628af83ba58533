use std::fmt;
use std::path::Path;

use gkv_cache::CacheConfig;
use gkv_types::{ObjectId, Signature};
use serde::{Deserialize, Serialize};

use crate::error::RepoResult;

/// Edge caches that mirror public repositories, tried in this order.
///
/// Templates use `{owner}`, `{repo}`, `{commit}` and `{path}`.
pub const DEFAULT_EDGE_ENDPOINTS: &[&str] = &[
    "https://cdn.jsdelivr.net/gh/{owner}/{repo}@{commit}/{path}",
    "https://cdn.statically.io/gh/{owner}/{repo}/{commit}/{path}",
    "https://rawcdn.githack.com/{owner}/{repo}/{commit}/{path}",
    "https://esm.sh/gh/{owner}/{repo}@{commit}/{path}",
    "https://raw.githubusercontent.com/{owner}/{repo}/{commit}/{path}",
];

/// Where the database lives and how commits are written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub owner: String,
    pub name: String,
    /// Identity stamped on every commit. Changing it changes every id.
    pub committer: Signature,
    pub edge_endpoints: Vec<String>,
    pub cache: CacheConfig,
}

impl RepositoryConfig {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse `"owner/name"`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let (owner, name) = slug.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn from_toml_str(text: &str) -> RepoResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> RepoResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Fill an endpoint template for one file of one commit.
    pub fn edge_url(&self, template: &str, commit: &ObjectId, path: &str) -> String {
        template
            .replace("{owner}", &self.owner)
            .replace("{repo}", &self.name)
            .replace("{commit}", &commit.to_hex())
            .replace("{path}", path)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            name: String::new(),
            committer: Signature::fixed(),
            edge_endpoints: DEFAULT_EDGE_ENDPOINTS.iter().map(|s| s.to_string()).collect(),
            cache: CacheConfig::default(),
        }
    }
}

/// Access token for the store. Never serialized or logged.
#[derive(Clone, Default)]
pub struct Credentials {
    pub token: Option<String>,
}

impl Credentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
