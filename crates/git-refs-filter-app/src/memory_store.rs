//! In-process [`ChangeStore`] for embedding and tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use git_refs_filter_core::{ChangeId, ChangeRecord, ChangeStatus};
use git_refs_filter_store_git::{GitStoreError, MetaRef};
use git2::Oid;
use time::OffsetDateTime;

use crate::change_store::ChangeStore;

#[derive(Default)]
struct MemoryState {
    // Revision history per change, oldest first. `None` marks corrupt metadata.
    changes: BTreeMap<ChangeId, Vec<(Oid, Option<ChangeRecord>)>>,
    next_revision: u64,
    listing_error: Option<String>,
    load_delay: Option<Duration>,
    loads: usize,
}

/// Change metadata kept in memory, with synthetic revisions.
///
/// Every [`update`](Self::update) produces a new revision, mirroring how a meta
/// ref moves on each metadata write.
#[derive(Default)]
pub struct MemoryChangeStore {
    inner: Mutex<MemoryState>,
}

impl MemoryChangeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, GitStoreError> {
        self.inner.lock().map_err(|_| GitStoreError::LockError)
    }

    fn push_revision(
        &self,
        change: ChangeId,
        record: Option<ChangeRecord>,
    ) -> Result<Oid, GitStoreError> {
        let mut state = self.state()?;
        state.next_revision += 1;
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(&state.next_revision.to_be_bytes());
        let revision = Oid::from_bytes(&bytes)?;
        state
            .changes
            .entry(change)
            .or_default()
            .push((revision, record));
        drop(state);
        Ok(revision)
    }

    /// Record a metadata update and return the new revision.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn update(
        &self,
        change: ChangeId,
        status: ChangeStatus,
        last_updated: OffsetDateTime,
    ) -> Result<Oid, GitStoreError> {
        let record = ChangeRecord {
            id: change,
            status,
            last_updated,
        };
        self.push_revision(change, Some(record))
    }

    /// Record an unreadable metadata revision and return it.
    ///
    /// # Errors
    /// Returns an error if the store lock is poisoned.
    pub fn corrupt(&self, change: ChangeId) -> Result<Oid, GitStoreError> {
        self.push_revision(change, None)
    }

    /// Make every subsequent listing fail with `message`.
    pub fn fail_listing(&self, message: impl Into<String>) {
        if let Ok(mut state) = self.inner.lock() {
            state.listing_error = Some(message.into());
        }
    }

    /// Delay every metadata read, to widen race windows.
    pub fn set_load_delay(&self, delay: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.load_delay = Some(delay);
        }
    }

    /// Number of metadata reads served so far.
    #[must_use]
    pub fn load_count(&self) -> usize {
        self.inner.lock().map_or(0, |state| state.loads)
    }
}

impl ChangeStore for MemoryChangeStore {
    fn change_meta_refs(&self) -> Result<Vec<MetaRef>, GitStoreError> {
        let state = self.state()?;
        if let Some(message) = &state.listing_error {
            return Err(GitStoreError::Other(message.clone()));
        }
        Ok(state
            .changes
            .iter()
            .map(|(&change, history)| MetaRef {
                change,
                revision: history.last().map(|(revision, _)| *revision),
            })
            .collect())
    }

    fn resolve_current_revision(&self, change: ChangeId) -> Result<Option<Oid>, GitStoreError> {
        let state = self.state()?;
        Ok(state
            .changes
            .get(&change)
            .and_then(|history| history.last())
            .map(|(revision, _)| *revision))
    }

    fn load_change(&self, change: ChangeId, revision: Oid) -> Result<ChangeRecord, GitStoreError> {
        let delay = {
            let mut state = self.state()?;
            state.loads += 1;
            state.load_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let state = self.state()?;
        let entry = state
            .changes
            .get(&change)
            .and_then(|history| history.iter().find(|(rev, _)| *rev == revision))
            .ok_or_else(|| {
                GitStoreError::Other(format!("unknown revision {revision} of change {change}"))
            })?;
        entry
            .1
            .clone()
            .ok_or(GitStoreError::MissingStatus { change, revision })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn every_update_moves_the_meta_revision() -> anyhow::Result<()> {
        let store = MemoryChangeStore::new();
        let first = store.update(ChangeId(1), ChangeStatus::New, datetime!(2024-01-01 0:00 UTC))?;
        let second =
            store.update(ChangeId(1), ChangeStatus::Abandoned, datetime!(2024-01-02 0:00 UTC))?;
        assert_ne!(first, second);
        assert!(!first.is_zero());
        assert_eq!(store.resolve_current_revision(ChangeId(1))?, Some(second));
        assert_eq!(store.load_change(ChangeId(1), first)?.status, ChangeStatus::New);
        assert_eq!(
            store.load_change(ChangeId(1), second)?.status,
            ChangeStatus::Abandoned
        );
        assert_eq!(store.load_count(), 2);
        Ok(())
    }

    #[test]
    fn corrupt_revision_fails_to_load() -> anyhow::Result<()> {
        let store = MemoryChangeStore::new();
        let rev = store.corrupt(ChangeId(2))?;
        assert!(matches!(
            store.load_change(ChangeId(2), rev),
            Err(GitStoreError::MissingStatus { .. })
        ));
        Ok(())
    }

    #[test]
    fn listing_failure_is_reported() {
        let store = MemoryChangeStore::new();
        store.fail_listing("disk on fire");
        assert!(matches!(
            store.change_meta_refs(),
            Err(GitStoreError::Other(message)) if message == "disk on fire"
        ));
    }
}
