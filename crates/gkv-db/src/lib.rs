//! Key-value engine for gitkv.
//!
//! A [`Database`] maps typed keys to typed values inside a git repository.
//! Keys are content-addressed: the key's commit id names a small set of refs
//! holding the value, its type, and its expiry. All mutations go through one
//! atomic multi-ref update whose expected before-states provide optimistic
//! concurrency.
//!
//! ```text
//! refs/tags/kv/<uuid>                 key
//! refs/heads/kv/<uuid>/value/bytes    value payload
//! refs/heads/kv/<uuid>/value/type     value type (shared per type)
//! refs/heads/kv/<uuid>/expiry         expiry day index
//! refs/tags/kv/types/<Type>           type registry
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod gc;
pub mod refs;
pub mod registry;

pub use config::DatabaseConfig;
pub use database::{
    CreateOptions, CreateOutcome, Database, Entry, UpdateOptions, UpdateOutcome,
};
pub use error::{DbError, DbResult, ModifierError, RegistryError};
pub use gc::GcOptions;
pub use refs::{KeyRefs, KeyUuid};
pub use registry::TypeRegistry;

pub use gkv_codec::Value;
