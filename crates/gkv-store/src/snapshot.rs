//! JSON snapshots of an [`InMemoryRemote`].
//!
//! Snapshots let the CLI keep a local database between runs. Object ids are
//! not trusted on load: they are recomputed from the content, and every ref
//! must point at a commit present in the snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use gkv_crypto::{blob_hash, commit_hash, tree_hash};
use gkv_types::{CommitObject, ObjectId, TreeEntry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::memory::{InMemoryRemote, RemoteState, StoredObject};
use crate::names::validate_ref_name;
use crate::types::RepositoryInfo;

/// One object in a snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SnapshotObject {
    /// Blob content, base64 encoded.
    Blob { data: String },
    Tree { entries: Vec<TreeEntry> },
    Commit { commit: CommitObject },
}

/// Serializable contents of an [`InMemoryRemote`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub info: RepositoryInfo,
    pub objects: Vec<SnapshotObject>,
    pub refs: BTreeMap<String, ObjectId>,
}

impl InMemoryRemote {
    /// Capture the current objects and refs.
    pub fn snapshot(&self) -> RemoteResult<RemoteSnapshot> {
        let state = self.read_state()?;
        // Sorted by id so identical stores produce identical files.
        let mut ids: Vec<&ObjectId> = state.objects.keys().collect();
        ids.sort();
        let objects = ids
            .into_iter()
            .filter_map(|id| state.objects.get(id))
            .map(|object| match object {
                StoredObject::Blob(data) => SnapshotObject::Blob {
                    data: STANDARD.encode(data),
                },
                StoredObject::Tree(entries) => SnapshotObject::Tree {
                    entries: entries.clone(),
                },
                StoredObject::Commit(commit) => SnapshotObject::Commit {
                    commit: commit.clone(),
                },
            })
            .collect();
        let mut info = self.info.clone();
        info.is_public = self.repository_is_public();
        Ok(RemoteSnapshot {
            info,
            objects,
            refs: state.refs.clone(),
        })
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: RemoteSnapshot) -> RemoteResult<Self> {
        let mut state = RemoteState::default();
        for object in snapshot.objects {
            let (id, stored) = match object {
                SnapshotObject::Blob { data } => {
                    let data = STANDARD
                        .decode(data)
                        .map_err(|e| RemoteError::Snapshot(format!("bad blob encoding: {e}")))?;
                    (blob_hash(&data), StoredObject::Blob(Bytes::from(data)))
                }
                SnapshotObject::Tree { entries } => {
                    let id = tree_hash(&entries)
                        .map_err(|e| RemoteError::Snapshot(e.to_string()))?;
                    (id, StoredObject::Tree(entries))
                }
                SnapshotObject::Commit { commit } => {
                    (commit_hash(&commit), StoredObject::Commit(commit))
                }
            };
            state.objects.insert(id, stored);
        }
        for (name, target) in &snapshot.refs {
            validate_ref_name(name)?;
            if !matches!(state.objects.get(target), Some(StoredObject::Commit(_))) {
                return Err(RemoteError::Snapshot(format!(
                    "ref {name} points at unknown commit {target}"
                )));
            }
        }
        state.refs = snapshot.refs;

        let remote = Self::with_info(snapshot.info);
        *remote
            .state
            .write()
            .map_err(|e| RemoteError::Snapshot(format!("lock poisoned: {e}")))? = state;
        Ok(remote)
    }

    /// Write a snapshot to `path` as JSON.
    pub fn save(&self, path: &Path) -> RemoteResult<()> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| RemoteError::Snapshot(e.to_string()))?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), objects = snapshot.objects.len(), "saved snapshot");
        Ok(())
    }

    /// Load a snapshot written by [`InMemoryRemote::save`].
    pub fn load(path: &Path) -> RemoteResult<Self> {
        let json = std::fs::read(path)?;
        let snapshot: RemoteSnapshot =
            serde_json::from_slice(&json).map_err(|e| RemoteError::Snapshot(e.to_string()))?;
        Self::from_snapshot(snapshot)
    }
}
