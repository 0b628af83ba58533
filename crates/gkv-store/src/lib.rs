//! The remote object store behind gitkv.
//!
//! gitkv stores everything in a git-style repository reached over a network
//! API. This crate defines the interface the rest of gitkv needs from that
//! repository and ships [`InMemoryRemote`], a faithful in-process
//! implementation used by tests and by the CLI's local mode.
//!
//! # Key Types
//!
//! - [`RemoteStore`]: object creation, ref reads, atomic multi-ref updates
//! - [`EdgeFetcher`]: plain HTTP GETs against edge caches of public stores
//! - [`RefUpdate`] / [`Expect`]: one compare-and-swap step of an update
//! - [`InMemoryRemote`]: in-memory store with failure knobs and snapshots

pub mod error;
pub mod memory;
pub mod names;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use error::{RemoteError, RemoteResult};
pub use memory::InMemoryRemote;
pub use names::{qualify_ref_name, validate_ref_name};
pub use snapshot::{RemoteSnapshot, SnapshotObject};
pub use traits::{EdgeFetcher, RemoteStore};
pub use types::{
    EdgeResponse, Expect, KeyStateQuery, KeyStateSnapshot, RateLimitStatus, RefUpdate,
    RepositoryInfo, ValueRefState,
};
