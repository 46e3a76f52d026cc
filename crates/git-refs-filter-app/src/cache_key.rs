//! Identity of a cached change-state answer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use git_refs_filter_core::{ChangeId, ProjectName};
use git2::Oid;

use crate::change_store::{ChangeStore, RepoHandle};

/// Cache key `(project, change, metadata revision)`.
///
/// The key also carries a weak reference to the request's ref storage so a
/// cache miss can be loaded from it. That handle is excluded from equality and
/// hashing, and it never keeps the storage alive after the request is done.
#[derive(Clone)]
pub struct ChangeCacheKey {
    project: ProjectName,
    change_id: ChangeId,
    change_revision: Oid,
    repo: Weak<dyn ChangeStore>,
}

impl ChangeCacheKey {
    /// Build a key for `change_id` at `change_revision`.
    #[must_use]
    pub fn create(
        repo: &RepoHandle,
        change_id: ChangeId,
        change_revision: Oid,
        project: ProjectName,
    ) -> Self {
        Self {
            project,
            change_id,
            change_revision,
            repo: Arc::downgrade(repo),
        }
    }

    /// Project the change belongs to.
    #[must_use]
    pub const fn project(&self) -> &ProjectName {
        &self.project
    }

    /// Change number.
    #[must_use]
    pub const fn change_id(&self) -> ChangeId {
        self.change_id
    }

    /// Revision of the change's meta ref.
    #[must_use]
    pub const fn change_revision(&self) -> Oid {
        self.change_revision
    }

    /// Storage handle of the request that built this key, if still alive.
    #[must_use]
    pub fn repo(&self) -> Option<RepoHandle> {
        self.repo.upgrade()
    }
}

impl PartialEq for ChangeCacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project
            && self.change_id == other.change_id
            && self.change_revision == other.change_revision
    }
}

impl Eq for ChangeCacheKey {}

impl Hash for ChangeCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.project.hash(state);
        self.change_id.hash(state);
        self.change_revision.hash(state);
    }
}

impl fmt::Debug for ChangeCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeCacheKey")
            .field("project", &self.project)
            .field("change_id", &self.change_id)
            .field("change_revision", &self.change_revision)
            .finish_non_exhaustive()
    }
}
