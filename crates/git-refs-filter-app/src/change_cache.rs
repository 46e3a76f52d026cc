//! Process-wide change-state caches.
//!
//! Both caches are keyed by [`ChangeCacheKey`], which embeds the change's meta
//! ref revision. Any status change rewrites the meta ref, so an entry can never
//! go stale; outdated revisions are simply not asked for again and fall out
//! through the entry-count bound.

use std::sync::Arc;

use git_refs_filter_core::{ChangeId, ChangeRecord};
use git_refs_filter_store_git::GitStoreError;
use git2::Oid;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::cache_key::ChangeCacheKey;
use crate::config::CacheConfig;

/// Name of the "is the change open" cache.
pub const OPEN_CHANGES_CACHE: &str = "open_changes";
/// Name of the "when was the change last updated" cache.
pub const CHANGES_TS_CACHE: &str = "changes_ts";

/// Failure of a targeted single-change read on a cache miss.
#[derive(Debug, Error)]
pub enum CacheLoadError {
    /// The request owning the storage handle already finished.
    #[error("storage handle for change {change} is no longer available")]
    RepositoryReleased {
        /// Change being loaded.
        change: ChangeId,
    },
    /// Metadata could not be read or decoded.
    #[error("failed to load change {change} at {revision}: {source}")]
    Load {
        /// Change being loaded.
        change: ChangeId,
        /// Meta ref revision being loaded.
        revision: Oid,
        /// Store failure.
        #[source]
        source: GitStoreError,
    },
}

/// State and timestamp caches shared by every filter call of the process.
pub struct ChangeCaches {
    open_changes: Cache<ChangeCacheKey, bool>,
    changes_ts: Cache<ChangeCacheKey, OffsetDateTime>,
}

impl ChangeCaches {
    /// Create both caches with the configured entry-count bounds.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            open_changes: Cache::builder()
                .name(OPEN_CHANGES_CACHE)
                .max_capacity(config.open_changes_max_entries())
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            changes_ts: Cache::builder()
                .name(CHANGES_TS_CACHE)
                .max_capacity(config.changes_ts_max_entries())
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Whether the change is open at the key's revision.
    ///
    /// Concurrent callers asking for the same key share a single load.
    ///
    /// # Errors
    /// Returns the loader failure; failures are not cached.
    pub fn is_open(&self, key: &ChangeCacheKey) -> Result<bool, Arc<CacheLoadError>> {
        self.open_changes
            .try_get_with(key.clone(), || load_record(key).map(|record| record.status.is_open()))
    }

    /// Last update of the change at the key's revision.
    ///
    /// # Errors
    /// Returns the loader failure; failures are not cached.
    pub fn last_updated(
        &self,
        key: &ChangeCacheKey,
    ) -> Result<OffsetDateTime, Arc<CacheLoadError>> {
        self.changes_ts
            .try_get_with(key.clone(), || load_record(key).map(|record| record.last_updated))
    }

    /// Snapshot of the state cache.
    #[must_use]
    pub fn open_changes_entries(&self) -> Vec<(ChangeCacheKey, bool)> {
        self.open_changes.run_pending_tasks();
        self.open_changes
            .iter()
            .map(|(key, open)| (ChangeCacheKey::clone(&key), open))
            .collect()
    }

    /// Snapshot of the timestamp cache.
    #[must_use]
    pub fn changes_ts_entries(&self) -> Vec<(ChangeCacheKey, OffsetDateTime)> {
        self.changes_ts.run_pending_tasks();
        self.changes_ts
            .iter()
            .map(|(key, ts)| (ChangeCacheKey::clone(&key), ts))
            .collect()
    }

    /// Number of entries in the state cache.
    #[must_use]
    pub fn open_changes_len(&self) -> u64 {
        self.open_changes.run_pending_tasks();
        self.open_changes.entry_count()
    }

    /// Number of entries in the timestamp cache.
    #[must_use]
    pub fn changes_ts_len(&self) -> u64 {
        self.changes_ts.run_pending_tasks();
        self.changes_ts.entry_count()
    }
}

impl Default for ChangeCaches {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

fn load_record(key: &ChangeCacheKey) -> Result<ChangeRecord, CacheLoadError> {
    let change = key.change_id();
    let revision = key.change_revision();
    let repo = key
        .repo()
        .ok_or(CacheLoadError::RepositoryReleased { change })?;
    debug!(project = %key.project(), %change, %revision, "Loading change on cache miss");
    repo.load_change(change, revision)
        .map_err(|source| CacheLoadError::Load {
            change,
            revision,
            source,
        })
}
