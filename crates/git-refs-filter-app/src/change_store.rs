//! Storage seam consulted by the scanner and the cache loaders.

use git_refs_filter_core::{ChangeId, ChangeRecord};
use git_refs_filter_store_git::{GitChangeStore, GitStoreError, MetaRef};
use git2::Oid;
use std::sync::Arc;

/// Minimal ref storage abstraction required by the filter.
///
/// Implementations are request-scoped handles; they are shared with the cache
/// loaders only through weak references.
pub trait ChangeStore: Send + Sync {
    /// Enumerate the meta ref of every change in the repository.
    ///
    /// # Errors
    /// Returns a store error when the repository cannot be scanned at all.
    fn change_meta_refs(&self) -> Result<Vec<MetaRef>, GitStoreError>;

    /// Current revision of a change's meta ref, `None` when the change has none.
    ///
    /// # Errors
    /// Returns a store error when the ref cannot be read.
    fn resolve_current_revision(&self, change: ChangeId) -> Result<Option<Oid>, GitStoreError>;

    /// Decode one change's metadata at exactly `revision`.
    ///
    /// # Errors
    /// Returns a store error when the metadata is missing or corrupt.
    fn load_change(&self, change: ChangeId, revision: Oid) -> Result<ChangeRecord, GitStoreError>;
}

/// Shared handle to a request's ref storage.
pub type RepoHandle = Arc<dyn ChangeStore>;

impl ChangeStore for GitChangeStore {
    fn change_meta_refs(&self) -> Result<Vec<MetaRef>, GitStoreError> {
        Self::change_meta_refs(self)
    }

    fn resolve_current_revision(&self, change: ChangeId) -> Result<Option<Oid>, GitStoreError> {
        Self::resolve_current_revision(self, change)
    }

    fn load_change(&self, change: ChangeId, revision: Oid) -> Result<ChangeRecord, GitStoreError> {
        Self::load_change(self, change, revision)
    }
}
