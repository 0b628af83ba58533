//! Foundation types for gitkv.
//!
//! Every other gitkv crate depends on `gkv-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: SHA-1 content identifier of a git object
//! - [`TreeEntry`], [`EntryMode`], [`CommitObject`], [`Signature`]: the git
//!   object model as the remote store sees it
//! - [`TypeTag`]: the closed set of stored value types

pub mod error;
pub mod git;
pub mod object;
pub mod tag;

pub use error::TypeError;
pub use git::{normalize_message, CommitObject, EntryMode, ObjectKind, Signature, TreeEntry};
pub use object::{ObjectId, OBJECT_ID_LEN};
pub use tag::TypeTag;
