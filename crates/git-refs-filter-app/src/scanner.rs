//! Bulk enumeration of a project's changes.
//!
//! The scan lists every change's meta ref once and hands out one tagged result
//! per change. A broken entry yields an error tagged with its change and the
//! scan goes on; only a failure to list the repository at all fails the scan.

use git_refs_filter_core::{ChangeId, ProjectName};
use git_refs_filter_store_git::{GitStoreError, MetaRef};
use git2::Oid;
use thiserror::Error;

use crate::change_store::ChangeStore;

/// A change found by the scan, at its current metadata revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannedChange {
    /// Change number.
    pub change: ChangeId,
    /// Current meta ref revision.
    pub revision: Oid,
}

/// A single change that could not be scanned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChangeScanError {
    /// The meta ref does not point at an object.
    #[error("meta ref of change {0} does not resolve to a revision")]
    Unresolved(ChangeId),
    /// The meta ref points at the null object id.
    #[error("meta ref of change {0} points at the null revision")]
    NullRevision(ChangeId),
}

impl ChangeScanError {
    /// Change the error is about.
    #[must_use]
    pub const fn change(&self) -> ChangeId {
        match *self {
            Self::Unresolved(change) | Self::NullRevision(change) => change,
        }
    }
}

/// The repository could not be scanned at all.
#[derive(Debug, Error)]
#[error("cannot scan changes of project {project}: {source}")]
pub struct ScanError {
    /// Project being scanned.
    pub project: ProjectName,
    /// Store failure.
    #[source]
    pub source: GitStoreError,
}

/// Scans one project's changes.
#[derive(Debug, Clone)]
pub struct ChangeScanner {
    project: ProjectName,
}

impl ChangeScanner {
    /// Scanner for `project`.
    #[must_use]
    pub const fn new(project: ProjectName) -> Self {
        Self { project }
    }

    /// List the project's changes.
    ///
    /// # Errors
    /// Returns [`ScanError`] when the store cannot enumerate changes.
    pub fn scan(&self, store: &dyn ChangeStore) -> Result<ChangeScan, ScanError> {
        let meta_refs = store.change_meta_refs().map_err(|source| ScanError {
            project: self.project.clone(),
            source,
        })?;
        Ok(ChangeScan {
            inner: meta_refs.into_iter(),
        })
    }
}

/// Lazy sequence of per-change scan results.
#[derive(Debug)]
pub struct ChangeScan {
    inner: std::vec::IntoIter<MetaRef>,
}

impl Iterator for ChangeScan {
    type Item = Result<ScannedChange, ChangeScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|meta| match meta.revision {
            Some(revision) if revision.is_zero() => Err(ChangeScanError::NullRevision(meta.change)),
            Some(revision) => Ok(ScannedChange {
                change: meta.change,
                revision,
            }),
            None => Err(ChangeScanError::Unresolved(meta.change)),
        })
    }
}
