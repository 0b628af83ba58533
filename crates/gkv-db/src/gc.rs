//! Garbage collection of stale keys.
//!
//! A key is stale once its expiry ref points at the commit of yesterday's
//! day index. All stale keys therefore share one expiry commit, and finding
//! them is a single "which branches point here" query.

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use gkv_expiry::yesterday_index;
use gkv_repo::RepoError;
use gkv_store::{Expect, RefUpdate};
use gkv_types::ObjectId;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::error::DbResult;
use crate::refs::{uuid_from_expiry_ref, KeyUuid};

/// Options for [`Database::gc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct GcOptions {
    /// Keys removed per atomic update. `None` uses the database setting.
    pub batch_size: Option<usize>,
}

impl Database {
    /// Remove every key that is stale at `now`. Returns how many were removed.
    ///
    /// Batches run concurrently. Each deletion pins the expiry ref to the
    /// stale commit, so a key whose TTL was refreshed meanwhile survives. A
    /// rejected batch is retried one key at a time.
    pub async fn gc(&self, now: DateTime<Utc>, options: GcOptions) -> DbResult<usize> {
        let stale = self.index_commit(yesterday_index(now), false).await?;
        let uuids: Vec<KeyUuid> = self
            .repo
            .refs_pointing_at(&stale)
            .await?
            .iter()
            .filter_map(|name| uuid_from_expiry_ref(name))
            .collect();
        if uuids.is_empty() {
            debug!("no stale keys");
            return Ok(0);
        }

        let batch_size = options.batch_size.unwrap_or(self.gc_batch_size).max(1);
        let removed: usize = try_join_all(
            uuids
                .chunks(batch_size)
                .map(|batch| self.collect_batch(batch, stale)),
        )
        .await?
        .into_iter()
        .sum();
        info!(removed, found = uuids.len(), "garbage collected stale keys");
        Ok(removed)
    }

    async fn collect_batch(&self, batch: &[KeyUuid], stale: ObjectId) -> DbResult<usize> {
        let updates = batch
            .iter()
            .flat_map(|uuid| removal(uuid, stale))
            .collect();
        match self.repo.update_refs(updates).await {
            Ok(()) => return Ok(batch.len()),
            Err(RepoError::TransactionConflict { source }) => {
                warn!(keys = batch.len(), error = %source, "batch rejected, retrying per key");
            }
            Err(e) => return Err(e.into()),
        }

        let mut removed = 0;
        for uuid in batch {
            match self.repo.update_refs(removal(uuid, stale)).await {
                Ok(()) => removed += 1,
                Err(RepoError::TransactionConflict { source }) => {
                    debug!(%uuid, error = %source, "key no longer stale");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }
}

/// Deletion of all four refs of a key, valid only while it is still stale.
fn removal(uuid: &KeyUuid, stale: ObjectId) -> Vec<RefUpdate> {
    let refs = uuid.refs();
    vec![
        RefUpdate::set(refs.key, None),
        RefUpdate::set(refs.value_bytes, None),
        RefUpdate::set(refs.value_type, None),
        RefUpdate::set(refs.expiry, None).expecting(Expect::Exactly(stale)),
    ]
}
