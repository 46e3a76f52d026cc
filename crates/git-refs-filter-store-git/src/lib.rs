//! Git-backed change metadata store.
//!
//! Change metadata lives on `refs/changes/NN/CC/meta` as a chain of commits whose
//! messages carry footers such as `Status: abandoned`. The newest `Status:`
//! footer along the first-parent history decides the change status, and the tip
//! commit time is the change's last update.

mod error;

pub use error::GitStoreError;

use git_refs_filter_core::refs::REFS_CHANGES;
use git_refs_filter_core::{ChangeId, ChangeRecord, ChangeStatus, RefKind, classify};
use git2::{Commit, Oid, Repository};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::debug;

const RECORD_CACHE_CAPACITY: usize = 256;
const STATUS_FOOTER: &str = "Status:";

/// A change's meta ref as found while listing the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaRef {
    /// Change owning the ref.
    pub change: ChangeId,
    /// Commit the ref points at, `None` when the ref is symbolic.
    pub revision: Option<Oid>,
}

/// Change metadata store over one opened repository.
///
/// A store is meant to live for a single request: the decoded-record LRU only
/// deduplicates reads made through the same handle.
pub struct GitChangeStore {
    repo: Mutex<Repository>,
    record_cache: Mutex<LruCache<Oid, ChangeRecord>>,
}

impl GitChangeStore {
    /// Discover and open the repository from `cwd_or_repo`.
    ///
    /// # Errors
    /// Returns an error if a Git repository cannot be discovered from the given path.
    pub fn open(cwd_or_repo: impl AsRef<Path>) -> Result<Self, GitStoreError> {
        let repo = Repository::discover(cwd_or_repo)?;
        Self::from_repository(repo)
    }

    /// Wrap an already opened repository.
    ///
    /// # Errors
    /// Returns an error if the record cache cannot be created.
    pub fn from_repository(repo: Repository) -> Result<Self, GitStoreError> {
        let capacity = NonZeroUsize::new(RECORD_CACHE_CAPACITY)
            .ok_or_else(|| GitStoreError::Other("cache capacity must be non-zero".into()))?;
        Ok(Self {
            repo: Mutex::new(repo),
            record_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    fn repo(&self) -> Result<MutexGuard<'_, Repository>, GitStoreError> {
        self.repo.lock().map_err(|_| GitStoreError::LockError)
    }

    fn cached_record(&self, oid: Oid) -> Option<ChangeRecord> {
        self.record_cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(&oid).cloned())
    }

    fn cache_record(&self, oid: Oid, record: ChangeRecord) {
        if let Ok(mut cache) = self.record_cache.lock() {
            cache.put(oid, record);
        }
    }

    /// List the meta refs of every change in the repository.
    ///
    /// # Errors
    /// Returns an error if reference enumeration fails.
    pub fn change_meta_refs(&self) -> Result<Vec<MetaRef>, GitStoreError> {
        let repo = self.repo()?;
        let mut out = Vec::new();
        for r in repo.references_glob(&format!("{REFS_CHANGES}*"))? {
            let r = r?;
            let Some(name) = r.name() else {
                debug!("Skipping change ref with non UTF-8 name");
                continue;
            };
            if let RefKind::ChangeMeta(change) = classify(name) {
                out.push(MetaRef {
                    change,
                    revision: r.target(),
                });
            }
        }
        Ok(out)
    }

    /// Revision of the change's meta ref, or `None` when the change has none.
    ///
    /// # Errors
    /// Returns an error if the ref exists but cannot be read.
    pub fn resolve_current_revision(&self, change: ChangeId) -> Result<Option<Oid>, GitStoreError> {
        let repo = self.repo()?;
        let reference = match repo.find_reference(&change.meta_ref()) {
            Ok(reference) => reference,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(reference.resolve()?.target())
    }

    /// Decode the change metadata at `revision`.
    ///
    /// # Errors
    /// Returns an error if the revision is not a commit or carries no valid status.
    pub fn load_change(
        &self,
        change: ChangeId,
        revision: Oid,
    ) -> Result<ChangeRecord, GitStoreError> {
        if let Some(record) = self.cached_record(revision)
            && record.id == change
        {
            return Ok(record);
        }
        let record = {
            let repo = self.repo()?;
            let tip = repo.find_commit(revision)?;
            Self::record_from_history(change, revision, &tip)?
        };
        debug!(%change, %revision, status = %record.status, "Decoded change metadata");
        self.cache_record(revision, record.clone());
        Ok(record)
    }

    fn record_from_history(
        change: ChangeId,
        revision: Oid,
        tip: &Commit<'_>,
    ) -> Result<ChangeRecord, GitStoreError> {
        let seconds = tip.time().seconds();
        let last_updated = OffsetDateTime::from_unix_timestamp(seconds)
            .map_err(|_| GitStoreError::InvalidTimestamp {
                change,
                revision,
                seconds,
            })?;

        let mut commit = tip.clone();
        let status = loop {
            if let Some(value) = commit.message().and_then(status_footer) {
                break value
                    .parse::<ChangeStatus>()
                    .map_err(|source| GitStoreError::InvalidStatus {
                        change,
                        revision,
                        source,
                    })?;
            }
            if commit.parent_count() == 0 {
                return Err(GitStoreError::MissingStatus { change, revision });
            }
            commit = commit.parent(0)?;
        };

        Ok(ChangeRecord {
            id: change,
            status,
            last_updated,
        })
    }

    /// Every ref with a resolvable target, symbolic refs resolved.
    ///
    /// # Errors
    /// Returns an error if reference enumeration fails.
    pub fn all_refs(&self) -> Result<Vec<(String, Oid)>, GitStoreError> {
        let repo = self.repo()?;
        let mut out = Vec::new();
        for r in repo.references()? {
            let r = r?;
            let Some(name) = r.name().map(str::to_owned) else {
                continue;
            };
            match r.resolve().map(|resolved| resolved.target()) {
                Ok(Some(oid)) => out.push((name, oid)),
                Ok(None) | Err(_) => debug!(%name, "Skipping unresolvable ref"),
            }
        }
        Ok(out)
    }
}

// Last `Status:` footer of a commit message.
fn status_footer(message: &str) -> Option<&str> {
    message
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(STATUS_FOOTER))
        .map(str::trim)
}
