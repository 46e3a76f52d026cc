//! Permission-layer seam.
//!
//! The host permission engine decides which refs a viewer may see at all.
//! [`ForProjectFilter`](crate::filter::ForProjectFilter) wraps an implementation
//! of [`ProjectPermissions`] and implements the same trait, so the two compose
//! transparently.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::time::Instant;

use git_refs_filter_core::{ProjectName, RefKind, classify};
use git2::Oid;

use crate::change_store::RepoHandle;

/// An advertised ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ref {
    /// Full ref name.
    pub name: String,
    /// Object the ref points at.
    pub target: Oid,
}

/// Refs keyed by name.
pub type RefMap = BTreeMap<String, Ref>;

/// Build a [`RefMap`] from `(name, target)` pairs.
pub fn ref_map<I, S>(refs: I) -> RefMap
where
    I: IntoIterator<Item = (S, Oid)>,
    S: Into<String>,
{
    refs.into_iter()
        .map(|(name, target)| {
            let name = name.into();
            (name.clone(), Ref { name, target })
        })
        .collect()
}

/// Options of a ref filter call.
#[derive(Debug, Clone, Default)]
pub struct RefFilterOptions {
    /// Ask the permission layer to drop change meta refs.
    pub filter_meta: bool,
    /// Abandon the change scan (hiding all change refs) once this instant passes.
    pub deadline: Option<Instant>,
}

impl RefFilterOptions {
    /// Whether the deadline, if any, has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Project-level permissions the host can check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProjectPermission {
    /// See the project at all.
    Access,
    /// Read refs.
    Read,
    /// Create branches.
    CreateRef,
    /// Create tags.
    CreateTagRef,
    /// Upload changes for review.
    CreateChange,
    /// Push directly.
    Push,
    /// Read `refs/meta/config`.
    ReadConfig,
    /// Write `refs/meta/config`.
    WriteConfig,
}

/// Ref-level permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefPermission {
    /// Fetch the ref.
    Read,
    /// Create the ref.
    Create,
    /// Fast-forward the ref.
    Update,
    /// Delete the ref.
    Delete,
    /// Rewind the ref.
    ForceUpdate,
}

/// Permission view of a single ref.
pub trait RefPermissions {
    /// Full ref name.
    fn name(&self) -> &str;

    /// Whether the viewer holds `perm` on this ref.
    fn test_cond(&self, perm: RefPermission) -> bool;
}

/// Permission backend for one project and one viewer.
pub trait ProjectPermissions {
    /// Error type bubbled up from the backend.
    type Error;

    /// Per-ref view returned by [`for_ref`](Self::for_ref).
    type ForRef: RefPermissions;

    /// Reduce `refs` to what the viewer may see.
    ///
    /// # Errors
    /// Returns a backend-specific error when permissions cannot be evaluated.
    fn filter(
        &self,
        refs: RefMap,
        repo: &RepoHandle,
        opts: &RefFilterOptions,
    ) -> Result<RefMap, Self::Error>;

    /// Fail unless the viewer holds `perm`.
    ///
    /// # Errors
    /// Returns a backend-specific error when the permission is denied.
    fn check(&self, perm: ProjectPermission) -> Result<(), Self::Error>;

    /// Subset of `perms` the viewer holds.
    ///
    /// # Errors
    /// Returns a backend-specific error when permissions cannot be evaluated.
    fn test(&self, perms: &[ProjectPermission]) -> Result<BTreeSet<ProjectPermission>, Self::Error>;

    /// Whether the viewer holds `perm`, for use in conditions.
    fn test_cond(&self, perm: ProjectPermission) -> bool;

    /// Path of the resource being checked, for diagnostics.
    fn resource_path(&self) -> String;

    /// Permissions of the viewer on the ref `name`.
    fn for_ref(&self, name: &str) -> Self::ForRef;
}

/// Ref on which every permission is granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantedRef {
    name: String,
}

impl RefPermissions for GrantedRef {
    fn name(&self) -> &str {
        &self.name
    }

    fn test_cond(&self, _perm: RefPermission) -> bool {
        true
    }
}

/// Backend granting every permission on every ref.
#[derive(Debug, Clone)]
pub struct AllRefsVisible {
    project: ProjectName,
}

impl AllRefsVisible {
    /// Backend for `project`.
    #[must_use]
    pub const fn new(project: ProjectName) -> Self {
        Self { project }
    }
}

impl ProjectPermissions for AllRefsVisible {
    type Error = Infallible;
    type ForRef = GrantedRef;

    fn filter(
        &self,
        mut refs: RefMap,
        _repo: &RepoHandle,
        opts: &RefFilterOptions,
    ) -> Result<RefMap, Self::Error> {
        if opts.filter_meta {
            refs.retain(|name, _| !matches!(classify(name), RefKind::ChangeMeta(_)));
        }
        Ok(refs)
    }

    fn check(&self, _perm: ProjectPermission) -> Result<(), Self::Error> {
        Ok(())
    }

    fn test(
        &self,
        perms: &[ProjectPermission],
    ) -> Result<BTreeSet<ProjectPermission>, Self::Error> {
        Ok(perms.iter().copied().collect())
    }

    fn test_cond(&self, _perm: ProjectPermission) -> bool {
        true
    }

    fn resource_path(&self) -> String {
        format!("/projects/{}", self.project)
    }

    fn for_ref(&self, name: &str) -> Self::ForRef {
        GrantedRef { name: name.to_owned() }
    }
}
