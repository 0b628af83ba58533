//! Repository transaction layer for gitkv.
//!
//! [`Repository`] owns every interaction with the remote store: it computes
//! commit ids locally and publishes only what is missing, applies atomic
//! multi-ref updates, and reads content through the cheapest path available
//! (content cache, edge caches for public stores, or the API).
//!
//! Requests are shaped locally: once the store reports an exhausted budget
//! the repository fails fast with [`RepoError::RateLimited`] until the reset
//! instant.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod repository;

pub use config::{Credentials, RepositoryConfig, DEFAULT_EDGE_ENDPOINTS};
pub use error::{RepoError, RepoResult};
pub use ratelimit::RateLimiter;
pub use repository::{CommitOptions, FetchOptions, KeyState, Repository, PAYLOAD_PATH};

pub use gkv_cache::CacheConfig;
